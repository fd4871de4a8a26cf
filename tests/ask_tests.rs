use std::time::Duration;

use agentask::options::{ClientOptions, TransportOptions};
use agentask::{AgentClient, HttpAgentClient, Language, QueryParameters};
use mockito::{Matcher, Server};
use serde_json::json;
use tokio::net::TcpListener;

mod common;

fn client_for(base: String) -> HttpAgentClient {
    common::init_tracing();
    HttpAgentClient::new(ClientOptions::new(base)).expect("client")
}

/// A server that accepts connections and never answers.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// An address nothing listens on.
fn refused_base() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_ask_returns_parsed_response() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/ask")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("question".into(), "Test question".into()),
            Matcher::UrlEncoded("thread_id".into(), "thread-123".into()),
            Matcher::UrlEncoded("lang".into(), "es".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"answer": "Test answer", "sources": [], "thread_id": "thread-123"}).to_string(),
        )
        .create_async()
        .await;

    let client = client_for(format!("{}/api", server.url()));
    let params = QueryParameters::new("Test question")
        .unwrap()
        .with_thread_id("thread-123")
        .with_language(Language::Es);

    let response = client.ask(&params).await.expect("ask failed");

    assert_eq!(response.answer, "Test answer");
    assert!(response.sources.is_empty());
    assert_eq!(response.thread_id.as_deref(), Some("thread-123"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ask_with_relative_base_and_sources() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/ask")
        .match_query(Matcher::UrlEncoded("question".into(), "hello".into()))
        .with_status(200)
        .with_body(
            json!({
                "answer": "Hi",
                "sources": [{"id": "doc-1", "content": "greeting", "similarity": 0.92, "title": "Intro"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client =
        HttpAgentClient::new(ClientOptions::new("/api").with_origin(server.url())).unwrap();
    let response = client
        .ask(&QueryParameters::new("hello").unwrap())
        .await
        .unwrap();

    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].id, "doc-1");
    assert_eq!(response.sources[0].similarity, 0.92);
    assert_eq!(response.thread_id, None);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ask_sends_extra_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/ask")
        .match_query(Matcher::Any)
        .match_header("x-tenant", "acme")
        .with_status(200)
        .with_body(r#"{"answer": "ok"}"#)
        .create_async()
        .await;

    let options = ClientOptions::new(server.url()).with_transport(
        TransportOptions::new().with_header("X-Tenant".to_string(), "acme".to_string()),
    );
    let client = HttpAgentClient::new(options).unwrap();
    let response = client
        .ask(&QueryParameters::new("q").unwrap())
        .await
        .unwrap();

    assert_eq!(response.answer, "ok");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ask_http_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ask")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("vector store unavailable")
        .create_async()
        .await;

    let client = client_for(server.url());
    let err = client
        .ask(&QueryParameters::new("q").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "HTTP_ERROR");
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains("vector store unavailable"));
}

#[tokio::test]
async fn test_ask_http_error_with_server_code() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ask")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(r#"{"detail": "slow down", "code": "RATE_LIMITED"}"#)
        .create_async()
        .await;

    let client = client_for(server.url());
    let err = client
        .ask(&QueryParameters::new("q").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RATE_LIMITED");
    assert_eq!(err.status_code(), 429);
}

#[tokio::test]
async fn test_ask_malformed_body() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ask")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>proxy login</html>")
        .create_async()
        .await;

    let client = client_for(server.url());
    let err = client
        .ask(&QueryParameters::new("q").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NETWORK_ERROR");
    assert_eq!(err.status_code(), 0);
}

#[tokio::test]
async fn test_ask_null_fields_read_as_empty() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ask")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"answer":"ok","sources":null,"thread_id":null}"#)
        .create_async()
        .await;

    let response = client_for(server.url())
        .ask(&QueryParameters::new("q").unwrap())
        .await
        .expect("null optional fields must not fail the call");

    assert_eq!(response.answer, "ok");
    assert!(response.sources.is_empty());
    assert!(response.thread_id.is_none());
}

#[tokio::test]
async fn test_ask_timeout() {
    let base = silent_server().await;
    let client = HttpAgentClient::new(
        ClientOptions::new(base).with_request_timeout(Duration::from_millis(200)),
    )
    .unwrap();

    let err = client
        .ask(&QueryParameters::new("q").unwrap())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.code(), "TIMEOUT");
    assert_eq!(err.status_code(), 504);
}

#[tokio::test]
async fn test_ask_connection_refused() {
    let client = client_for(refused_base());
    let err = client
        .ask(&QueryParameters::new("q").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NETWORK_ERROR");
    assert_eq!(err.status_code(), 0);
}

#[tokio::test]
async fn test_get_config() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/ask/config")
        .with_status(200)
        .with_body(
            json!({
                "providers": [
                    {"key": "openai", "label": "OpenAI"},
                    {"key": "ollama", "label": "Ollama (local)"}
                ],
                "models": {"openai": ["gpt-4o", "gpt-4o-mini"], "ollama": ["llama3"]}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(format!("{}/api/", server.url()));
    let config = client.get_config().await.unwrap();

    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[1].label, "Ollama (local)");
    assert_eq!(config.models_for("openai"), ["gpt-4o", "gpt-4o-mini"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_config_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ask/config")
        .with_status(404)
        .create_async()
        .await;

    let err = client_for(server.url()).get_config().await.unwrap_err();
    assert_eq!(err.code(), "HTTP_ERROR");
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_health_check() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(204)
        .create_async()
        .await;
    assert!(client_for(server.url()).health_check().await);

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(404)
        .create_async()
        .await;
    assert!(!client_for(server.url()).health_check().await);

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(503)
        .create_async()
        .await;
    assert!(!client_for(server.url()).health_check().await);

    assert!(!client_for(refused_base()).health_check().await);
}

#[tokio::test]
async fn test_concurrent_asks() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ask")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"answer": "same"}"#)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(server.url());
    let params = QueryParameters::new("q").unwrap();
    let (a, b, c) = tokio::join!(client.ask(&params), client.ask(&params), client.ask(&params));

    assert_eq!(a.unwrap().answer, "same");
    assert_eq!(b.unwrap().answer, "same");
    assert_eq!(c.unwrap().answer, "same");
}
