//! Service client implementations.

pub mod agent;

pub use agent::HttpAgentClient;
