//! mcplink: a client for MCP tool servers spoken to over stdio.
//!
//! - [`mcp_client`]: sessions, framing, the connection registry, and the tool catalog
//! - [`recovery`]: the handler chain that turns tool failures into retries or guidance
//! - [`validation`]: pre-flight checks for configs, the host, and tool arguments
//! - [`config`]: client settings and the on-disk server list
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod logging;
pub mod mcp_client;
pub mod recovery;
pub mod validation;

pub use config::ClientSettings;
pub use mcp_client::{ConnectionRegistry, McpError, ServerConfig, ToolInvocation, ToolResult};
pub use recovery::RecoveryRegistry;
