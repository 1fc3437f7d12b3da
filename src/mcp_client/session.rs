//! One live connection to a single MCP server.
//!
//! A `Session` spawns the server as a child process, performs the
//! `initialize` handshake, and then serves `tools/list` / `tools/call`
//! requests one at a time. The transport lives behind an async mutex, so
//! concurrent callers on the same session are serialized and request ids
//! never interleave on the wire.
//!
//! The child is spawned with `kill_on_drop`, and every exit path (close,
//! failed handshake, cancelled connect) goes through `terminate_child`.
//! The child sits behind its own lock: `close()` never waits on an
//! in-flight request before signalling the process.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::errors::McpError;
use super::transport::{FramingLimits, StdioTransport};
use super::types::{
    methods, CallToolResult, InitializeResult, JsonRpcRequest, ServerConfig, ServerInfo,
    ToolDescriptor, ToolsResult, Transport, PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Upper bound on `tools/list` pages followed via `nextCursor`.
const MAX_TOOL_PAGES: usize = 32;

/// Lines of child stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 40;

/// Longest stderr excerpt attached to an error.
const STDERR_EXCERPT_CHARS: usize = 2000;

/// How long to wait for the stderr drain to reach EOF after the child dies.
const STDERR_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

// ─── Options ─────────────────────────────────────────────────────────────────

/// Per-session knobs, usually derived from `ClientSettings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub client_name: String,
    pub client_version: String,
    pub protocol_version: String,
    pub limits: FramingLimits,
    /// Wait between SIGTERM and a forced kill.
    pub shutdown_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            limits: FramingLimits::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connecting,
    Ready,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether the session refuses all further requests.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

type ChildTransport = StdioTransport<ChildStdout, ChildStdin>;

struct SessionInner {
    state: SessionState,
    transport: Option<ChildTransport>,
    stderr: Option<StderrTail>,
    /// Last id handed out; pre-incremented, so the handshake uses 2.
    last_id: u64,
    /// Set while a request is on the wire. Still set on entry means the
    /// previous caller was cancelled mid-request and the stream is out of sync.
    in_flight: bool,
    server_info: Option<ServerInfo>,
}

impl SessionInner {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// A request/response JSON-RPC peer backed by a child process.
pub struct Session {
    server_name: String,
    options: SessionOptions,
    inner: Mutex<SessionInner>,
    /// Held only while storing or taking the process, never across a request.
    child: Mutex<Option<Child>>,
    closing: AtomicBool,
}

impl Session {
    /// Create an unconnected session.
    pub fn new(server_name: &str, options: SessionOptions) -> Self {
        Self {
            server_name: server_name.to_string(),
            options,
            inner: Mutex::new(SessionInner {
                state: SessionState::Unconnected,
                transport: None,
                stderr: None,
                last_id: 1,
                in_flight: false,
                server_info: None,
            }),
            child: Mutex::new(None),
            closing: AtomicBool::new(false),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Current lifecycle state.
    ///
    /// Reports `Closed` as soon as `close()` starts, without waiting for an
    /// in-flight request.
    pub async fn state(&self) -> SessionState {
        if self.is_closing() {
            return SessionState::Closed;
        }
        self.inner.lock().await.state
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Server identity reported in the handshake, if any.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.inner.lock().await.server_info.clone()
    }

    // ─── Connect ─────────────────────────────────────────────────────────

    /// Spawn the server process and perform the `initialize` handshake.
    ///
    /// On failure the session is `Failed` and the child has been reaped.
    pub async fn connect(&self, config: &ServerConfig) -> Result<(), McpError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if self.is_closing() {
            return Err(McpError::SessionClosed {
                server: self.server_name.clone(),
            });
        }

        match inner.state {
            SessionState::Unconnected => {}
            SessionState::Closed | SessionState::Failed => {
                return Err(McpError::SessionClosed {
                    server: self.server_name.clone(),
                });
            }
            SessionState::Connecting | SessionState::Ready => {
                return Err(McpError::ConfigError {
                    reason: format!("session for '{}' is already connected", self.server_name),
                });
            }
        }

        if config.transport() != Transport::Stdio {
            inner.state = SessionState::Failed;
            return Err(McpError::UnsupportedTransport {
                name: self.server_name.clone(),
                transport: config.transport().to_string(),
            });
        }

        inner.state = SessionState::Connecting;
        tracing::debug!(server = %self.server_name, command = ?config.command(), "connecting");

        match self.spawn_and_initialize(inner, config).await {
            Ok(()) => {
                inner.state = SessionState::Ready;
                tracing::info!(
                    server = %self.server_name,
                    server_info = ?inner.server_info.as_ref().and_then(|i| i.name.as_deref()),
                    "session ready"
                );
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                let stderr_ctx = self.reap(inner).await;
                if !stderr_ctx.is_empty() {
                    tracing::warn!(
                        server = %self.server_name,
                        stderr = %stderr_ctx,
                        "server stderr captured on failure"
                    );
                }
                Err(attach_stderr(e, &stderr_ctx))
            }
        }
    }

    async fn spawn_and_initialize(
        &self,
        inner: &mut SessionInner,
        config: &ServerConfig,
    ) -> Result<(), McpError> {
        let (program, args) = config.program_and_args().ok_or_else(|| McpError::ConfigError {
            reason: format!("server '{}': STDIO transport requires command", self.server_name),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(config.env());

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: self.server_name.clone(),
            reason: format!("{e}"),
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        if let Some(stderr) = child.stderr.take() {
            inner.stderr = Some(StderrTail::drain(&self.server_name, stderr));
        }
        // Stored before the handshake so a cancelled connect can still reap it.
        *self.child.lock().await = Some(child);

        if self.is_closing() {
            return Err(McpError::SessionClosed {
                server: self.server_name.clone(),
            });
        }

        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(McpError::SpawnFailed {
                name: self.server_name.clone(),
                reason: "failed to capture stdio pipes".into(),
            });
        };

        let transport = inner.transport.insert(StdioTransport::new(
            &self.server_name,
            stdout,
            stdin,
            self.options.limits,
        ));

        let id = {
            inner.last_id += 1;
            inner.last_id
        };
        let request = JsonRpcRequest::new(
            id,
            methods::INITIALIZE,
            Some(json!({
                "protocolVersion": self.options.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": self.options.client_name,
                    "version": self.options.client_version,
                },
            })),
        );

        let response = transport.request(&request).await.map_err(|e| match e {
            McpError::NoResponse { .. } => McpError::HandshakeTimeout {
                name: self.server_name.clone(),
                timeout_ms: duration_ms(self.options.limits.response_timeout),
            },
            other => McpError::InitFailed {
                name: self.server_name.clone(),
                reason: other.to_string(),
            },
        })?;

        let result = response.into_result().map_err(|e| McpError::InitFailed {
            name: self.server_name.clone(),
            reason: e.to_string(),
        })?;

        let init: InitializeResult = match result {
            Some(value) => serde_json::from_value(value).map_err(|e| McpError::InitFailed {
                name: self.server_name.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?,
            None => InitializeResult::default(),
        };

        if let Some(version) = init.protocol_version.as_deref() {
            if version != self.options.protocol_version {
                tracing::warn!(
                    server = %self.server_name,
                    requested = %self.options.protocol_version,
                    offered = %version,
                    "server negotiated a different protocol version"
                );
            }
        }

        // Conforming servers wait for this before serving requests.
        if let Err(e) = transport.notify(methods::INITIALIZED, None).await {
            tracing::warn!(
                server = %self.server_name,
                error = %e,
                "failed to send initialized notification"
            );
        }

        inner.server_info = init.server_info;
        Ok(())
    }

    // ─── Requests ────────────────────────────────────────────────────────

    /// Send one request and wait for its response.
    ///
    /// Returns the `result` member (absent results are `None`). A JSON-RPC
    /// `error` member becomes `McpError::ServerError`. Protocol failures
    /// move the session to `Failed`.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Option<Value>, McpError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if inner.in_flight {
            tracing::warn!(server = %self.server_name, "previous request was abandoned mid-flight");
            inner.state = SessionState::Failed;
            inner.in_flight = false;
        }

        match inner.state {
            SessionState::Ready => {}
            SessionState::Unconnected | SessionState::Connecting => {
                return Err(McpError::NotConnected {
                    name: self.server_name.clone(),
                });
            }
            SessionState::Closed | SessionState::Failed => {
                return Err(McpError::SessionClosed {
                    server: self.server_name.clone(),
                });
            }
        }
        if self.is_closing() {
            return Err(McpError::SessionClosed {
                server: self.server_name.clone(),
            });
        }

        let id = inner.next_id();
        let Some(transport) = inner.transport.as_mut() else {
            inner.state = SessionState::Failed;
            return Err(McpError::SessionClosed {
                server: self.server_name.clone(),
            });
        };

        let request = JsonRpcRequest::new(id, method, params);
        inner.in_flight = true;
        let outcome = transport.request(&request).await;
        inner.in_flight = false;

        match outcome {
            Ok(response) => response.into_result(),
            Err(e) => {
                if e.is_protocol_failure() {
                    tracing::warn!(
                        server = %self.server_name,
                        method,
                        id,
                        error = %e,
                        "session failed"
                    );
                    inner.state = SessionState::Failed;
                }
                Err(e)
            }
        }
    }

    /// Fetch the server's tool catalog.
    ///
    /// A result without a `tools` array yields an empty list.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let result = self.send_request(methods::TOOLS_LIST, params).await?;
            let page = ToolsResult::from_result(result);
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }

        tracing::warn!(
            server = %self.server_name,
            pages = MAX_TOOL_PAGES,
            "stopped following tools/list pagination"
        );
        Ok(tools)
    }

    /// Invoke a tool.
    ///
    /// A response without `result` yields `{content: [], isError: true}`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });

        match self.send_request(methods::TOOLS_CALL, Some(params)).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| McpError::InvalidResult {
                method: methods::TOOLS_CALL.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(CallToolResult::missing_result()),
        }
    }

    // ─── Shutdown ────────────────────────────────────────────────────────

    /// Terminate the server process. Idempotent; never fails.
    ///
    /// The process is signalled before the session lock is taken, so a
    /// request stuck on a misbehaving peer sees EOF and returns promptly.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.terminate().await;

        let mut guard = self.inner.lock().await;
        guard.state = SessionState::Closed;
        let leftover = self.reap(&mut guard).await;
        if !leftover.is_empty() {
            tracing::debug!(
                server = %self.server_name,
                stderr = %leftover,
                "server stderr at close"
            );
        }
        tracing::info!(server = %self.server_name, "session closed");
    }

    /// Close stdin, terminate the child, and collect the stderr tail.
    async fn reap(&self, inner: &mut SessionInner) -> String {
        if let Some(mut transport) = inner.transport.take() {
            if let Err(e) = transport.close_input().await {
                tracing::debug!(server = %self.server_name, error = %e, "closing stdin failed");
            }
        }

        self.terminate().await;

        match inner.stderr.take() {
            Some(tail) => tail.finish().await,
            None => String::new(),
        }
    }

    /// Take the child, if still held, and run the SIGTERM/kill sequence.
    async fn terminate(&self) {
        let child = self.child.lock().await.take();
        if let Some(child) = child {
            terminate_child(&self.server_name, child, self.options.shutdown_grace).await;
        }
    }
}

// ─── Process Helpers ─────────────────────────────────────────────────────────

/// SIGTERM, wait for the grace period, then force-kill.
async fn terminate_child(server: &str, mut child: Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(server, %status, "server process already exited");
            return;
        }
        Ok(None) => {}
        Err(e) => tracing::debug!(server, error = %e, "could not poll server process"),
    }

    if !send_terminate(server, &mut child) {
        if let Err(e) = child.kill().await {
            tracing::warn!(server, error = %e, "failed to kill server process");
        }
        return;
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(server, %status, "server process exited"),
        Ok(Err(e)) => tracing::warn!(server, error = %e, "failed waiting for server process"),
        Err(_) => {
            tracing::warn!(
                server,
                grace_ms = duration_ms(grace),
                "server ignored SIGTERM, killing"
            );
            if let Err(e) = child.kill().await {
                tracing::warn!(server, error = %e, "failed to kill server process");
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(server: &str, child: &mut Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(server, error = %e, "SIGTERM failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(server: &str, child: &mut Child) -> bool {
    if let Err(e) = child.start_kill() {
        tracing::debug!(server, error = %e, "terminate failed");
        return false;
    }
    true
}

/// Background reader that keeps the child's stderr pipe drained and retains
/// the last few lines for diagnostics.
struct StderrTail {
    lines: Arc<std::sync::Mutex<VecDeque<String>>>,
    task: JoinHandle<()>,
}

impl StderrTail {
    fn drain(server: &str, stderr: ChildStderr) -> Self {
        let lines = Arc::new(std::sync::Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&lines);
        let server = server.to_string();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        tracing::debug!(server = %server, stderr = %line, "server stderr");
                        let mut tail = sink.lock().unwrap_or_else(PoisonError::into_inner);
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }
        });

        Self { lines, task }
    }

    /// Wait briefly for EOF, then return the retained lines.
    async fn finish(mut self) -> String {
        if timeout(STDERR_FLUSH_TIMEOUT, &mut self.task).await.is_err() {
            self.task.abort();
        }

        let tail = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let mut joined = tail.iter().cloned().collect::<Vec<_>>().join("\n");
        if joined.len() > STDERR_EXCERPT_CHARS {
            let mut cut = STDERR_EXCERPT_CHARS;
            while !joined.is_char_boundary(cut) {
                cut -= 1;
            }
            joined.truncate(cut);
            joined.push_str("...(truncated)");
        }
        joined
    }
}

/// Append captured stderr to connection errors.
fn attach_stderr(error: McpError, stderr: &str) -> McpError {
    if stderr.is_empty() {
        return error;
    }
    let suffix = format!(" | stderr: {}", stderr.trim());
    match error {
        McpError::SpawnFailed { name, reason } => McpError::SpawnFailed {
            name,
            reason: format!("{reason}{suffix}"),
        },
        McpError::InitFailed { name, reason } => McpError::InitFailed {
            name,
            reason: format!("{reason}{suffix}"),
        },
        other => other,
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
