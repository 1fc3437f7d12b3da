//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server configuration is missing a required field or is otherwise invalid.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// The configured transport has no implementation yet (SSE / HTTP).
    #[error("transport not supported for server '{name}': {transport}")]
    UnsupportedTransport { name: String, transport: String },

    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// The server never answered the `initialize` request.
    #[error("server '{name}' handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { name: String, timeout_ms: u64 },

    /// The whole connect attempt (spawn + handshake) exceeded its deadline.
    #[error("connecting to server '{name}' timed out after {timeout_ms}ms")]
    ConnectTimeout { name: String, timeout_ms: u64 },

    /// JSON-RPC communication error (I/O failure on the pipes).
    #[error("transport error for server '{server}': {reason}")]
    TransportError { server: String, reason: String },

    /// The server closed its stdout.
    #[error("server '{server}' closed its output stream (process may have exited)")]
    ConnectionClosed { server: String },

    /// No line arrived within the response timeout.
    #[error("no response from server for {method}")]
    NoResponse { server: String, method: String },

    /// Only notifications or unrelated messages arrived.
    #[error("no matching response for {method} after {attempts} messages")]
    NoMatchingResponse {
        server: String,
        method: String,
        attempts: usize,
    },

    /// A response grew past the reassembly byte cap.
    #[error("response too large or malformed for {method} (exceeded {limit} bytes)")]
    ResponseTooLarge {
        server: String,
        method: String,
        limit: usize,
    },

    /// A response could not be parsed and no more bytes arrived.
    #[error("malformed response for {method}: {reason}")]
    MalformedResponse {
        server: String,
        method: String,
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A well-formed response whose `result` did not have the expected shape.
    #[error("invalid result for {method}: {reason}")]
    InvalidResult { method: String, reason: String },

    /// The session is closed or failed and rejects further requests.
    #[error("session closed for server '{server}'")]
    SessionClosed { server: String },

    /// No session exists for the server name.
    #[error("server '{name}' not connected")]
    NotConnected { name: String },

    /// All reconnect attempts exhausted for a server.
    #[error("server '{name}' failed after {attempts} reconnect attempts")]
    RestartExhausted { name: String, attempts: u32 },
}

impl McpError {
    /// Whether this failure leaves the byte stream in an unknown state.
    ///
    /// A session that hits one of these moves to `Failed` and is not reused.
    pub fn is_protocol_failure(&self) -> bool {
        matches!(
            self,
            Self::TransportError { .. }
                | Self::ConnectionClosed { .. }
                | Self::NoResponse { .. }
                | Self::NoMatchingResponse { .. }
                | Self::ResponseTooLarge { .. }
                | Self::MalformedResponse { .. }
        )
    }
}
