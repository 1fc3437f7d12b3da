//! MCP client: JSON-RPC over stdio for MCP tool servers.
//!
//! This module handles:
//! - Spawning MCP server child processes and the `initialize` handshake
//! - Newline-delimited JSON-RPC 2.0 framing, with reassembly of oversized lines
//! - Tool discovery and a per-server tool catalog
//! - Tool call routing through the [`ConnectionRegistry`]
//! - Session shutdown (SIGTERM, grace period, forced kill)

pub mod client;
pub mod defaults;
pub mod errors;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::ConnectionRegistry;
pub use errors::McpError;
pub use registry::{CatalogStatus, ToolCatalog};
pub use session::{Session, SessionOptions, SessionState};
pub use transport::FramingLimits;
pub use types::{
    CallToolResult, CatalogEntry, ServerConfig, ServerSpec, ToolDescriptor, ToolInvocation,
    ToolResult, Transport,
};
