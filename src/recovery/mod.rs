//! Recovery registry: turns failed tool calls into retries or guidance.
//!
//! Handlers form an ordered chain. The first handler that accepts the error
//! and produces text wins; a handler that fails is skipped; if nothing
//! produces text a generic fallback message is returned.

mod handlers;
mod retry;

pub use handlers::{
    DirectoryNotFoundHandler, FileNotFoundHandler, NetworkHandler, PermissionHandler,
    ProcessHandler,
};
pub use retry::{Backoff, RetryPolicy};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::mcp_client::types::{CatalogEntry, ToolInvocation, ToolResult};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A handler could not complete its recovery attempt.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("handler '{handler}' failed: {reason}")]
    HandlerFailed { handler: String, reason: String },
}

// ─── Categories ──────────────────────────────────────────────────────────────

/// Broad class of a tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    FileNotFound,
    Permission,
    DirectoryNotFound,
    Network,
    Process,
    Unclassified,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FileNotFound => "file_not_found",
            Self::Permission => "permission",
            Self::DirectoryNotFound => "directory_not_found",
            Self::Network => "network",
            Self::Process => "process",
            Self::Unclassified => "unclassified",
        };
        f.write_str(label)
    }
}

// ─── Seams ───────────────────────────────────────────────────────────────────

/// Something that can run a tool, so handlers can retry or investigate.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, invocation: ToolInvocation) -> ToolResult;
}

/// Everything a handler may look at when deciding how to recover.
pub struct RecoveryContext<'a> {
    pub tool_name: &'a str,
    /// Server the failed call was routed to, when known.
    pub server_name: Option<&'a str>,
    /// Usually an object; a bare string is treated as a path or command.
    pub arguments: &'a Value,
    pub error: &'a str,
    pub tools: &'a [CatalogEntry],
    pub invoker: &'a dyn ToolInvoker,
}

impl<'a> RecoveryContext<'a> {
    /// Whether the lower-cased error text contains any of `phrases`.
    pub fn error_mentions(&self, phrases: &[&str]) -> bool {
        let lowered = self.error.to_lowercase();
        phrases.iter().any(|p| lowered.contains(p))
    }

    /// First non-empty string argument among `keys`, or the whole
    /// argument if it is a bare string.
    pub fn string_argument(&self, keys: &[&str]) -> Option<&'a str> {
        match self.arguments {
            Value::String(s) if !s.is_empty() => Some(s.as_str()),
            Value::Object(map) => keys
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty()),
            _ => None,
        }
    }

    /// Catalog entry for the failed tool, preferring the server it ran on.
    pub fn failed_tool_entry(&self) -> Option<&'a CatalogEntry> {
        let tools = self.tools;
        tools
            .iter()
            .find(|e| {
                e.tool.name == self.tool_name && Some(e.server_name.as_str()) == self.server_name
            })
            .or_else(|| tools.iter().find(|e| e.tool.name == self.tool_name))
    }

    /// Whether any cataloged server advertises `tool_name`.
    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|e| e.tool.name == tool_name)
    }
}

/// One link in the recovery chain.
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> FailureCategory;

    fn can_handle(&self, ctx: &RecoveryContext<'_>) -> bool;

    /// Produce recovery text, or `None` to let later handlers try.
    async fn handle(&self, ctx: &RecoveryContext<'_>) -> Result<Option<String>, RecoveryError>;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Result of running the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub category: FailureCategory,
    /// Name of the handler that produced `message`; `None` for the fallback.
    pub handled_by: Option<String>,
    pub message: String,
}

/// Ordered chain of recovery handlers.
pub struct RecoveryRegistry {
    handlers: Vec<Box<dyn RecoveryHandler>>,
}

impl Default for RecoveryRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::linear(2, Duration::from_secs(1)))
    }
}

impl RecoveryRegistry {
    /// The built-in chain, with `network_policy` driving network retries.
    pub fn new(network_policy: RetryPolicy) -> Self {
        Self {
            handlers: vec![
                Box::new(FileNotFoundHandler),
                Box::new(PermissionHandler),
                Box::new(NetworkHandler::new(network_policy)),
                Box::new(DirectoryNotFoundHandler),
                Box::new(ProcessHandler),
            ],
        }
    }

    /// Add a handler ahead of everything already registered.
    pub fn add_handler(&mut self, handler: Box<dyn RecoveryHandler>) {
        self.handlers.insert(0, handler);
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run the chain against one failure.
    pub async fn handle_error(&self, ctx: &RecoveryContext<'_>) -> RecoveryOutcome {
        for handler in &self.handlers {
            if !handler.can_handle(ctx) {
                continue;
            }
            match handler.handle(ctx).await {
                Ok(Some(message)) => {
                    tracing::debug!(
                        tool = ctx.tool_name,
                        handler = handler.name(),
                        "recovery handler produced guidance"
                    );
                    return RecoveryOutcome {
                        category: handler.category(),
                        handled_by: Some(handler.name().to_string()),
                        message,
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        tool = ctx.tool_name,
                        handler = handler.name(),
                        error = %e,
                        "recovery handler failed"
                    );
                }
            }
        }

        RecoveryOutcome {
            category: FailureCategory::Unclassified,
            handled_by: None,
            message: format!(
                "Unhandled error in {}: {}. Please check your input and try again.",
                ctx.tool_name, ctx.error
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mcp_client::types::ToolDescriptor;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Invoker that fails `failures` times, then succeeds.
    pub(crate) struct ScriptedInvoker {
        pub calls: AtomicUsize,
        pub failures: usize,
    }

    impl ScriptedInvoker {
        pub(crate) fn failing_forever() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures: usize::MAX,
            }
        }

        pub(crate) fn succeeding_after(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolInvoker for ScriptedInvoker {
        async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                ToolResult::error("connection reset by peer")
            } else {
                ToolResult::success(format!("{} ok", invocation.tool_name))
            }
        }
    }

    pub(crate) fn entry(server: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            server_name: server.to_string(),
            tool: ToolDescriptor {
                name: name.to_string(),
                description: String::new(),
                input_schema: Default::default(),
            },
        }
    }

    struct Broken;

    #[async_trait]
    impl RecoveryHandler for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn category(&self) -> FailureCategory {
            FailureCategory::Unclassified
        }
        fn can_handle(&self, _ctx: &RecoveryContext<'_>) -> bool {
            true
        }
        async fn handle(
            &self,
            _ctx: &RecoveryContext<'_>,
        ) -> Result<Option<String>, RecoveryError> {
            Err(RecoveryError::HandlerFailed {
                handler: "broken".into(),
                reason: "boom".into(),
            })
        }
    }

    struct Custom;

    #[async_trait]
    impl RecoveryHandler for Custom {
        fn name(&self) -> &str {
            "custom"
        }
        fn category(&self) -> FailureCategory {
            FailureCategory::Unclassified
        }
        fn can_handle(&self, ctx: &RecoveryContext<'_>) -> bool {
            ctx.error_mentions(&["quota"])
        }
        async fn handle(
            &self,
            _ctx: &RecoveryContext<'_>,
        ) -> Result<Option<String>, RecoveryError> {
            Ok(Some("Quota exceeded. Wait and retry.".into()))
        }
    }

    #[tokio::test]
    async fn test_fallback_message() {
        let registry = RecoveryRegistry::default();
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({});
        let ctx = RecoveryContext {
            tool_name: "frobnicate",
            server_name: None,
            arguments: &args,
            error: "something odd",
            tools: &[],
            invoker: &invoker,
        };

        let outcome = registry.handle_error(&ctx).await;
        assert_eq!(outcome.category, FailureCategory::Unclassified);
        assert_eq!(outcome.handled_by, None);
        assert_eq!(
            outcome.message,
            "Unhandled error in frobnicate: something odd. Please check your input and try again."
        );
        assert_eq!(invoker.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_handler_is_skipped() {
        let mut registry = RecoveryRegistry::default();
        registry.add_handler(Box::new(Broken));
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({});
        let ctx = RecoveryContext {
            tool_name: "write_file",
            server_name: None,
            arguments: &args,
            error: "EACCES: permission denied",
            tools: &[],
            invoker: &invoker,
        };

        let outcome = registry.handle_error(&ctx).await;
        assert_eq!(outcome.category, FailureCategory::Permission);
        assert_eq!(outcome.handled_by.as_deref(), Some("permission"));
    }

    #[tokio::test]
    async fn test_custom_handler_runs_first() {
        let mut registry = RecoveryRegistry::default();
        registry.add_handler(Box::new(Custom));
        assert_eq!(registry.handler_names()[0], "custom");

        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({});
        let ctx = RecoveryContext {
            tool_name: "search",
            server_name: None,
            arguments: &args,
            error: "network quota exceeded",
            tools: &[],
            invoker: &invoker,
        };

        let outcome = registry.handle_error(&ctx).await;
        assert_eq!(outcome.message, "Quota exceeded. Wait and retry.");
        assert_eq!(invoker.calls(), 0);
    }

    #[test]
    fn test_context_helpers() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({"file_path": "/tmp/a.txt", "path": ""});
        let tools = vec![entry("a", "read_file"), entry("b", "read_file")];
        let ctx = RecoveryContext {
            tool_name: "read_file",
            server_name: Some("b"),
            arguments: &args,
            error: "ENOENT: No Such File",
            tools: &tools,
            invoker: &invoker,
        };

        assert!(ctx.error_mentions(&["no such file"]));
        assert_eq!(ctx.string_argument(&["path", "file_path"]), Some("/tmp/a.txt"));
        assert_eq!(ctx.failed_tool_entry().unwrap().server_name, "b");
        assert!(ctx.has_tool("read_file"));
        assert!(!ctx.has_tool("search_files"));
    }
}
