//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with an MCP server child process:
//! - Writing JSON-RPC requests to stdin (one JSON object per line)
//! - Reading lines from stdout with a bounded line buffer
//! - Skipping notifications until the response with the matching `id` arrives
//! - Reassembling responses that outgrow the line buffer
//!
//! The transport is generic over the byte streams so it can be driven by
//! in-memory pipes in tests.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use super::errors::McpError;
use super::types::{error_codes, methods, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Largest slice copied per reassembly read.
const CHUNK_SIZE: usize = 8192;

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Timeouts and size bounds applied while reading responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingLimits {
    /// Bound on waiting for the first line of each incoming message.
    pub response_timeout: Duration,
    /// Bound on each chunk read while reassembling a truncated message.
    pub chunk_timeout: Duration,
    /// Total byte cap for one reassembled message.
    pub max_message_bytes: usize,
    /// Line buffer size; longer lines are handed to reassembly.
    pub line_limit: usize,
    /// Messages that may be skipped before giving up on a response.
    pub max_skipped_messages: usize,
}

impl Default for FramingLimits {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(5),
            chunk_timeout: Duration::from_secs(1),
            max_message_bytes: 1024 * 1024,
            line_limit: 64 * 1024,
            max_skipped_messages: 10,
        }
    }
}

// ─── Incoming Messages ───────────────────────────────────────────────────────

/// What a parsed line turned out to be, relative to the outstanding request.
#[derive(Debug)]
enum Incoming {
    /// The response to the outstanding request.
    Response(JsonRpcResponse),
    /// A peer-initiated request that expects an answer.
    PeerRequest { id: Value, method: String },
    /// A one-way notification from the peer.
    Notification { method: String },
    /// Anything else (stale response, non-object JSON).
    Unrelated,
}

impl Incoming {
    fn classify(message: Value, expected_id: u64) -> Result<Self, serde_json::Error> {
        let (id, method) = match &message {
            Value::Object(obj) => (
                obj.get("id").filter(|id| !id.is_null()).cloned(),
                obj.get("method").and_then(Value::as_str).map(str::to_string),
            ),
            _ => return Ok(Self::Unrelated),
        };

        if let Some(method) = method {
            return Ok(match id {
                Some(id) => Self::PeerRequest { id, method },
                None => Self::Notification { method },
            });
        }

        if id.as_ref().and_then(Value::as_u64) == Some(expected_id) {
            return serde_json::from_value(message).map(Self::Response);
        }

        Ok(Self::Unrelated)
    }
}

/// Result of one bounded line read.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A full line, terminated by `\n`.
    Complete,
    /// The line buffer filled before a newline arrived.
    Truncated,
    /// The stream ended mid-line.
    Partial,
    /// The stream ended with nothing read.
    Eof,
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a pair of byte streams.
///
/// Not internally synchronized: callers hold it behind a mutex so that at
/// most one request is in flight.
pub struct StdioTransport<R, W> {
    server_name: String,
    writer: W,
    reader: BufReader<R>,
    limits: FramingLimits,
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a new transport from a child process's stdout/stdin.
    pub fn new(server_name: &str, reader: R, writer: W, limits: FramingLimits) -> Self {
        Self {
            server_name: server_name.to_string(),
            writer,
            reader: BufReader::new(reader),
            limits,
        }
    }

    /// Send a request and wait for the response carrying the same `id`.
    ///
    /// A JSON-RPC `error` member is returned inside the `JsonRpcResponse`;
    /// use [`JsonRpcResponse::into_result`] to surface it.
    pub async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        self.write_message(request, &request.method).await?;
        self.read_response(request.id, &request.method).await
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        self.write_message(&notification, method).await
    }

    /// Shut down the write half, signalling EOF to the peer.
    pub async fn close_input(&mut self) -> Result<(), McpError> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| self.io_error("failed to close stdin", &e))
    }

    async fn write_message<T: serde::Serialize>(
        &mut self,
        message: &T,
        method: &str,
    ) -> Result<(), McpError> {
        let mut json = serde_json::to_string(message).map_err(|e| McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("failed to serialize {method}: {e}"),
        })?;
        json.push('\n');

        self.writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.io_error("failed to write to stdin", &e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| self.io_error("failed to flush stdin", &e))?;

        tracing::trace!(server = %self.server_name, method, bytes = json.len(), "sent message");
        Ok(())
    }

    /// Read messages until the response for `id` arrives.
    ///
    /// Notifications and unrelated messages are skipped, up to
    /// `max_skipped_messages` in total. Peer requests are answered so the
    /// peer does not stall waiting on us.
    async fn read_response(&mut self, id: u64, method: &str) -> Result<JsonRpcResponse, McpError> {
        let attempts = self.limits.max_skipped_messages;

        for _ in 0..attempts {
            let message = self.read_message(method).await?;

            match Incoming::classify(message, id) {
                Ok(Incoming::Response(response)) => return Ok(response),
                Ok(Incoming::Notification { method: note }) => {
                    tracing::debug!(
                        server = %self.server_name,
                        notification = %note,
                        "skipping notification"
                    );
                }
                Ok(Incoming::PeerRequest { id: peer_id, method: peer_method }) => {
                    self.answer_peer_request(peer_id, &peer_method).await?;
                }
                Ok(Incoming::Unrelated) => {
                    tracing::debug!(
                        server = %self.server_name,
                        expected_id = id,
                        "skipping unrelated message"
                    );
                }
                Err(e) => {
                    return Err(McpError::MalformedResponse {
                        server: self.server_name.clone(),
                        method: method.to_string(),
                        reason: format!("response does not match JSON-RPC shape: {e}"),
                    });
                }
            }
        }

        Err(McpError::NoMatchingResponse {
            server: self.server_name.clone(),
            method: method.to_string(),
            attempts,
        })
    }

    /// Read one JSON message, falling back to reassembly when the line does
    /// not parse on its own.
    async fn read_message(&mut self, method: &str) -> Result<Value, McpError> {
        loop {
            let mut buf = Vec::new();
            let outcome = timeout(self.limits.response_timeout, self.read_bounded_line(&mut buf))
                .await
                .map_err(|_| McpError::NoResponse {
                    server: self.server_name.clone(),
                    method: method.to_string(),
                })?
                .map_err(|e| self.io_error("failed to read from stdout", &e))?;

            if outcome == LineRead::Eof {
                return Err(McpError::ConnectionClosed {
                    server: self.server_name.clone(),
                });
            }

            let trimmed = buf.trim_ascii();
            if trimmed.is_empty() && outcome == LineRead::Complete {
                continue;
            }

            if let Ok(value) = serde_json::from_slice::<Value>(trimmed) {
                return Ok(value);
            }

            if outcome == LineRead::Partial {
                return Err(self.malformed(method, "server closed stream mid-message"));
            }

            tracing::debug!(
                server = %self.server_name,
                method,
                bytes = buf.len(),
                truncated = outcome == LineRead::Truncated,
                "line did not parse, reassembling"
            );
            return self.reassemble(buf, method).await;
        }
    }

    /// Keep appending chunks to `buf` until it parses, the byte cap is hit,
    /// or the peer stops sending.
    async fn reassemble(&mut self, mut buf: Vec<u8>, method: &str) -> Result<Value, McpError> {
        loop {
            if buf.len() >= self.limits.max_message_bytes {
                return Err(McpError::ResponseTooLarge {
                    server: self.server_name.clone(),
                    method: method.to_string(),
                    limit: self.limits.max_message_bytes,
                });
            }

            let read = timeout(self.limits.chunk_timeout, self.read_chunk(&mut buf))
                .await
                .map_err(|_| self.malformed(method, "response incomplete or server hung"))?
                .map_err(|e| self.io_error("failed to read from stdout", &e))?;

            if read == 0 {
                return Err(self.malformed(method, "server closed stream mid-message"));
            }

            if let Ok(value) = serde_json::from_slice::<Value>(buf.trim_ascii()) {
                return Ok(value);
            }
        }
    }

    /// Read up to and including the next `\n`, but no more than the line limit.
    async fn read_bounded_line(&mut self, buf: &mut Vec<u8>) -> std::io::Result<LineRead> {
        let limit = self.limits.line_limit;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(if buf.is_empty() {
                    LineRead::Eof
                } else {
                    LineRead::Partial
                });
            }

            let room = limit.saturating_sub(buf.len());
            let window = &available[..available.len().min(room)];

            if let Some(pos) = window.iter().position(|b| *b == b'\n') {
                buf.extend_from_slice(&window[..=pos]);
                self.reader.consume(pos + 1);
                return Ok(LineRead::Complete);
            }

            let taken = window.len();
            buf.extend_from_slice(window);
            self.reader.consume(taken);

            if buf.len() >= limit {
                return Ok(LineRead::Truncated);
            }
        }
    }

    /// Append one chunk to `buf`, stopping at a newline so the next message
    /// stays in the reader. Returns the number of bytes appended.
    async fn read_chunk(&mut self, buf: &mut Vec<u8>) -> std::io::Result<usize> {
        let available = self.reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }

        let take = available
            .iter()
            .position(|b| *b == b'\n')
            .map_or(available.len(), |pos| pos + 1)
            .min(CHUNK_SIZE);
        buf.extend_from_slice(&available[..take]);
        self.reader.consume(take);
        Ok(take)
    }

    async fn answer_peer_request(&mut self, id: Value, method: &str) -> Result<(), McpError> {
        tracing::debug!(server = %self.server_name, method, "answering server-initiated request");

        let reply = if method == methods::PING {
            serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {}})
        } else {
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": error_codes::METHOD_NOT_FOUND,
                    "message": format!("client does not support '{method}'"),
                },
            })
        };
        self.write_message(&reply, method).await
    }

    fn malformed(&self, method: &str, reason: &str) -> McpError {
        McpError::MalformedResponse {
            server: self.server_name.clone(),
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }

    fn io_error(&self, context: &str, e: &std::io::Error) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("{context}: {e}"),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
