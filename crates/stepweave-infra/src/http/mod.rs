//! HTTP capability clients (reqwest).
//!
//! - `agent` -- the agent service's REST API
//! - `mcp` -- JSON-RPC `tools/call` for `mcp` script steps

pub mod agent;
pub mod mcp;

/// Errors constructing an HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}
