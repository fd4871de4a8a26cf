//! Server-Sent Events (SSE) frame decoding.
//!
//! SSE format:
//! ```text
//! event: message
//! data: {"type": "thinking", "message": "Searching"}
//!
//! data: {"type": "complete", "answer": "Done", "sources": []}
//! ```
//!
//! Bytes are split into lines before any UTF-8 decoding, so a multi-byte
//! character cut between two network chunks is reassembled intact.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};

use crate::client::{AgentServiceError, NO_STATUS};

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if the server sent one.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    /// A frame carrying only data.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }
}

/// Longest line the decoder buffers before failing the stream.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental line-oriented SSE decoder.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_line: DEFAULT_MAX_LINE_BYTES,
            event: None,
            data: None,
            id: None,
        }
    }

    pub fn with_max_line(mut self, bytes: usize) -> Self {
        self.max_line = bytes;
        self
    }

    /// Push a chunk of bytes, returning every frame it completes.
    ///
    /// Fails with `STREAM_ERROR` once a single line grows past the limit.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, AgentServiceError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;

            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            return Err(AgentServiceError::Stream {
                status: NO_STATUS,
                message: format!("SSE line exceeds {} bytes", self.max_line),
            });
        }
        Ok(frames)
    }

    /// Flush at end of input. A trailing event without its blank line is
    /// still dispatched.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.scanned = 0;
            if let Some(frame) = self.process_line(rest.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = split_field(line);
        match field {
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // retry and unknown fields carry nothing a client needs.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = self.data.take()?;
        Some(SseFrame {
            event,
            data,
            id: self.id.clone(),
        })
    }
}

/// Split an SSE line into field name and value, dropping one leading space.
///
/// # Example
/// ```
/// use agentask::sse::split_field;
///
/// assert_eq!(split_field("data: {\"key\": 1}"), ("data", "{\"key\": 1}"));
/// assert_eq!(split_field("data:x"), ("data", "x"));
/// assert_eq!(split_field("data"), ("data", ""));
/// ```
pub fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

/// Decode a byte stream into SSE frames.
///
/// The first transport error is yielded and ends the stream.
pub fn frames<S>(byte_stream: S) -> impl Stream<Item = Result<SseFrame, AgentServiceError>> + Send
where
    S: Stream<Item = Result<Bytes, AgentServiceError>> + Send,
{
    stream::unfold(
        (Box::pin(byte_stream), SseDecoder::new(), VecDeque::new(), false),
        |(mut byte_stream, mut decoder, mut pending, mut ended)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (byte_stream, decoder, pending, ended)));
                }
                if ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => match decoder.feed(&chunk) {
                        Ok(frames) => pending.extend(frames),
                        Err(e) => {
                            ended = true;
                            return Some((Err(e), (byte_stream, decoder, pending, ended)));
                        }
                    },
                    Some(Err(e)) => {
                        ended = true;
                        return Some((Err(e), (byte_stream, decoder, pending, ended)));
                    }
                    None => {
                        ended = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
}

/// Extension trait for `reqwest::Response` to enable SSE streaming.
pub trait SseResponseExt {
    /// Convert the response body into a stream of SSE frames.
    fn sse(self) -> impl Stream<Item = Result<SseFrame, AgentServiceError>> + Send;
}

impl SseResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<SseFrame, AgentServiceError>> + Send {
        frames(
            self.bytes_stream()
                .map(|chunk| chunk.map_err(AgentServiceError::from_stream_transport)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_field() {
        assert_eq!(split_field("data: hello"), ("data", "hello"));
        assert_eq!(split_field("data:  two"), ("data", " two"));
        assert_eq!(split_field("event:complete"), ("event", "complete"));
        assert_eq!(split_field("retry"), ("retry", ""));
    }

    #[test]
    fn test_feed_dispatches_on_blank_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":").unwrap().is_empty());
        assert!(decoder.feed(b"\"thinking\"}\n").unwrap().is_empty());

        let frames = decoder.feed(b"\n").unwrap();
        assert_eq!(frames, vec![SseFrame::new("{\"type\":\"thinking\"}")]);
    }

    #[test]
    fn test_multiline_data_event_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder
            .feed(b": keep-alive\r\nevent: complete\r\nid: 7\r\ndata: a\r\ndata: b\r\n\r\n")
            .unwrap();
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("complete".to_string()),
                data: "a\nb".to_string(),
                id: Some("7".to_string()),
            }]
        );
    }

    #[test]
    fn test_blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: ping\n\n\n").unwrap().is_empty());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_split_utf8_character() {
        let bytes = "data: café\n\n".as_bytes();
        let cut = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&bytes[..cut]).unwrap().is_empty());
        let frames = decoder.feed(&bytes[cut..]).unwrap();
        assert_eq!(frames[0].data, "café");
    }

    #[test]
    fn test_overlong_line_fails() {
        let mut decoder = SseDecoder::new().with_max_line(16);
        assert!(decoder.feed(b"data: 0123456").unwrap().is_empty());

        let err = decoder.feed(b"789abcdef").unwrap_err();
        assert_eq!(err.code(), "STREAM_ERROR");
    }

    #[test]
    fn test_line_limit_applies_per_line() {
        let mut decoder = SseDecoder::new().with_max_line(16);
        let frames = decoder.feed(b"data: first\n\ndata: second\n\n").unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: last").unwrap().is_empty());
        assert_eq!(decoder.finish(), Some(SseFrame::new("last")));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_frames_across_chunks() {
        let chunks: Vec<Result<Bytes, AgentServiceError>> = vec![
            Ok(Bytes::from_static(b"data: one\n\nda")),
            Ok(Bytes::from_static(b"ta: two\n\n")),
        ];
        let collected: Vec<_> = frames(stream::iter(chunks)).collect().await;
        assert_eq!(
            collected,
            vec![Ok(SseFrame::new("one")), Ok(SseFrame::new("two"))]
        );
    }

    #[tokio::test]
    async fn test_frames_stop_after_transport_error() {
        let chunks: Vec<Result<Bytes, AgentServiceError>> = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err(AgentServiceError::Stream {
                status: 0,
                message: "connection reset".to_string(),
            }),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let collected: Vec<_> = frames(stream::iter(chunks)).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[1].is_err());
    }
}
