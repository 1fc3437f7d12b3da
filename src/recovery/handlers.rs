//! Built-in recovery handlers, in chain order.

use std::path::Path;

use async_trait::async_trait;

use super::{FailureCategory, RecoveryContext, RecoveryError, RecoveryHandler, RetryPolicy};
use crate::mcp_client::types::ToolInvocation;

/// Tools worth pointing at when a file cannot be found.
const INVESTIGATION_TOOLS: &[&str] = &[
    "search_files",
    "list_directory",
    "directory_tree",
    "execute_command",
];

// ─── File Not Found ──────────────────────────────────────────────────────────

/// Names the investigation tools the catalog offers for a missing file.
pub struct FileNotFoundHandler;

#[async_trait]
impl RecoveryHandler for FileNotFoundHandler {
    fn name(&self) -> &str {
        "file_not_found"
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::FileNotFound
    }

    fn can_handle(&self, ctx: &RecoveryContext<'_>) -> bool {
        ctx.error_mentions(&["file not found", "no such file", "does not exist", "cannot find"])
    }

    async fn handle(&self, ctx: &RecoveryContext<'_>) -> Result<Option<String>, RecoveryError> {
        let Some(filename) = ctx.string_argument(&["path", "file_path", "filename"]) else {
            return Ok(None);
        };

        let mut message = format!("File '{filename}' not found.");

        let available: Vec<&str> = INVESTIGATION_TOOLS
            .iter()
            .copied()
            .filter(|t| ctx.has_tool(t))
            .collect();

        if !available.is_empty() {
            message.push_str(&format!(
                " Available tools to investigate: {}. {}",
                available.join(", "),
                investigation_suggestions(filename)
            ));
        }

        Ok(Some(message))
    }
}

fn investigation_suggestions(filename: &str) -> String {
    let path = Path::new(filename);
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    let mut suggestions = vec![
        format!("search_files to look for '{basename}' or similar files"),
        "list_directory to see what's available in the current or parent directories".to_string(),
    ];
    if let Some(ext) = path.extension() {
        suggestions.push(format!("search for other .{} files", ext.to_string_lossy()));
    }
    suggestions.push("execute_command with 'find' to search the filesystem".to_string());

    format!("Consider using: {}.", suggestions.join("; "))
}

// ─── Permission ──────────────────────────────────────────────────────────────

/// Fixed guidance for access errors.
pub struct PermissionHandler;

#[async_trait]
impl RecoveryHandler for PermissionHandler {
    fn name(&self) -> &str {
        "permission"
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Permission
    }

    fn can_handle(&self, ctx: &RecoveryContext<'_>) -> bool {
        ctx.error_mentions(&[
            "permission denied",
            "access denied",
            "not permitted",
            "insufficient privileges",
        ])
    }

    async fn handle(&self, ctx: &RecoveryContext<'_>) -> Result<Option<String>, RecoveryError> {
        let mut suggestions = vec![
            "Check file/directory permissions",
            "Verify you have the necessary access rights",
            "Consider using sudo if appropriate",
            "Check if the file is locked by another process",
        ];

        let tool = ctx.tool_name.to_lowercase();
        if tool.contains("write") || tool.contains("edit") {
            suggestions.push("Ensure the target location is writable");
        }

        Ok(Some(format!(
            "Permission denied. Suggestions: {}.",
            suggestions.join("; ")
        )))
    }
}

// ─── Network ─────────────────────────────────────────────────────────────────

/// Retries the original call on transient network failures.
pub struct NetworkHandler {
    policy: RetryPolicy,
}

impl NetworkHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RecoveryHandler for NetworkHandler {
    fn name(&self) -> &str {
        "network"
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Network
    }

    fn can_handle(&self, ctx: &RecoveryContext<'_>) -> bool {
        ctx.error_mentions(&[
            "connection",
            "timeout",
            "network",
            "unreachable",
            "dns",
            "socket",
        ])
    }

    async fn handle(&self, ctx: &RecoveryContext<'_>) -> Result<Option<String>, RecoveryError> {
        let Some(entry) = ctx.failed_tool_entry() else {
            return Ok(Some(
                "Network error occurred. Please check your connection and try again.".into(),
            ));
        };

        let arguments = ctx.arguments.as_object().cloned().unwrap_or_default();
        let mut last_error = ctx.error.to_string();

        for attempt in self.policy.attempts() {
            self.policy.wait(attempt).await;

            let invocation = ToolInvocation::new(&entry.server_name, ctx.tool_name)
                .with_arguments(arguments.clone());
            let result = ctx.invoker.invoke(invocation).await;

            if !result.is_error {
                tracing::info!(tool = ctx.tool_name, attempt, "network retry succeeded");
                return Ok(Some(format!(
                    "Network retry successful after {attempt} attempts: {}",
                    result.content
                )));
            }

            tracing::debug!(
                tool = ctx.tool_name,
                attempt,
                error = %result.content,
                "network retry failed"
            );
            last_error = result.content;
        }

        Ok(Some(format!(
            "Network error persisted after {} retries. Last error: {last_error}",
            self.policy.max_attempts
        )))
    }
}

// ─── Directory Not Found ─────────────────────────────────────────────────────

/// Points at the parent directory of a missing path.
pub struct DirectoryNotFoundHandler;

#[async_trait]
impl RecoveryHandler for DirectoryNotFoundHandler {
    fn name(&self) -> &str {
        "directory_not_found"
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::DirectoryNotFound
    }

    fn can_handle(&self, ctx: &RecoveryContext<'_>) -> bool {
        ctx.error_mentions(&["directory not found", "no such directory", "path does not exist"])
    }

    async fn handle(&self, ctx: &RecoveryContext<'_>) -> Result<Option<String>, RecoveryError> {
        let Some(directory) = ctx.string_argument(&["path", "directory"]) else {
            return Ok(Some("Directory not found. Please verify the path exists.".into()));
        };

        let parent = Path::new(directory)
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let suggestions = [
            format!("Check if parent directory '{parent}' exists"),
            "Use list_directory to explore available paths".to_string(),
            "Consider creating the directory first if needed".to_string(),
            "Verify the path format is correct".to_string(),
        ];

        Ok(Some(format!(
            "Directory '{directory}' not found. {}.",
            suggestions.join("; ")
        )))
    }
}

// ─── Process ─────────────────────────────────────────────────────────────────

/// Guidance for commands that are missing or exit non-zero.
pub struct ProcessHandler;

#[async_trait]
impl RecoveryHandler for ProcessHandler {
    fn name(&self) -> &str {
        "process"
    }

    fn category(&self) -> FailureCategory {
        FailureCategory::Process
    }

    fn can_handle(&self, ctx: &RecoveryContext<'_>) -> bool {
        ctx.error_mentions(&[
            "command not found",
            "no such command",
            "executable not found",
            "process failed",
            "exit code",
        ])
    }

    async fn handle(&self, ctx: &RecoveryContext<'_>) -> Result<Option<String>, RecoveryError> {
        if ctx.error_mentions(&["command not found"]) {
            let command = ctx.string_argument(&["command"]).unwrap_or_default();
            return Ok(Some(format!(
                "Command '{command}' not found. Check if it's installed and in PATH."
            )));
        }

        if ctx.error_mentions(&["exit code"]) {
            return Ok(Some(
                "Command executed but failed. Check command syntax and arguments.".into(),
            ));
        }

        Ok(Some(format!(
            "Process execution error in {}. Verify command and arguments.",
            ctx.tool_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::tests::{entry, ScriptedInvoker};
    use crate::recovery::{RecoveryRegistry, ToolInvoker};
    use serde_json::{json, Value};
    use std::time::{Duration, Instant};

    fn ctx<'a>(
        tool_name: &'a str,
        arguments: &'a Value,
        error: &'a str,
        tools: &'a [crate::mcp_client::types::CatalogEntry],
        invoker: &'a dyn ToolInvoker,
    ) -> RecoveryContext<'a> {
        RecoveryContext {
            tool_name,
            server_name: Some("fs"),
            arguments,
            error,
            tools,
            invoker,
        }
    }

    #[tokio::test]
    async fn test_file_not_found_lists_investigation_tools() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({"path": "/work/src/main.rs"});
        let tools = vec![
            entry("fs", "read_file"),
            entry("fs", "search_files"),
            entry("fs", "list_directory"),
        ];
        let c = ctx("read_file", &args, "ENOENT: no such file or directory", &tools, &invoker);

        let outcome = RecoveryRegistry::default().handle_error(&c).await;
        assert_eq!(outcome.category, FailureCategory::FileNotFound);
        assert!(outcome
            .message
            .starts_with("File '/work/src/main.rs' not found. Available tools to investigate: search_files, list_directory."));
        assert!(outcome.message.contains("look for 'main.rs'"));
        assert!(outcome.message.contains("search for other .rs files"));
        assert!(outcome.message.ends_with("to search the filesystem."));
    }

    #[tokio::test]
    async fn test_file_not_found_without_path_falls_through() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({});
        let c = ctx("read_file", &args, "file not found", &[], &invoker);

        let handler = FileNotFoundHandler;
        assert!(handler.can_handle(&c));
        assert_eq!(handler.handle(&c).await.unwrap(), None);

        let outcome = RecoveryRegistry::default().handle_error(&c).await;
        assert_eq!(outcome.category, FailureCategory::Unclassified);
    }

    #[tokio::test]
    async fn test_permission_mentions_writable_for_write_tools() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({"path": "/etc/hosts"});
        let c = ctx("write_file", &args, "Access denied", &[], &invoker);

        let message = PermissionHandler.handle(&c).await.unwrap().unwrap();
        assert!(message.starts_with("Permission denied. Suggestions: Check file/directory permissions;"));
        assert!(message.ends_with("Ensure the target location is writable."));

        let c = ctx("read_file", &args, "Access denied", &[], &invoker);
        let message = PermissionHandler.handle(&c).await.unwrap().unwrap();
        assert!(!message.contains("writable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_retries_exactly_max_attempts() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({"url": "https://example.com"});
        let tools = vec![entry("fs", "fetch")];
        let c = ctx("fetch", &args, "connection refused", &tools, &invoker);

        let handler = NetworkHandler::new(RetryPolicy::linear(2, Duration::from_secs(1)));
        let started = tokio::time::Instant::now();
        let message = handler.handle(&c).await.unwrap().unwrap();

        assert_eq!(invoker.calls(), 2);
        assert_eq!(
            message,
            "Network error persisted after 2 retries. Last error: connection reset by peer"
        );
        // 1s before the first retry, 2s before the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_returns_first_success() {
        let invoker = ScriptedInvoker::succeeding_after(1);
        let args = json!({});
        let tools = vec![entry("fs", "fetch")];
        let c = ctx("fetch", &args, "socket hang up", &tools, &invoker);

        let outcome = RecoveryRegistry::default().handle_error(&c).await;
        assert_eq!(outcome.category, FailureCategory::Network);
        assert_eq!(outcome.message, "Network retry successful after 2 attempts: fetch ok");
        assert_eq!(invoker.calls(), 2);
    }

    #[tokio::test]
    async fn test_network_without_cataloged_tool_does_not_retry() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({});
        let c = ctx("fetch", &args, "DNS lookup failed", &[], &invoker);

        let started = Instant::now();
        let message = NetworkHandler::new(RetryPolicy::linear(2, Duration::from_secs(1)))
            .handle(&c)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            message,
            "Network error occurred. Please check your connection and try again."
        );
        assert_eq!(invoker.calls(), 0);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_directory_not_found_suggests_parent() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({"directory": "/work/missing/dir"});
        let c = ctx("list_directory", &args, "Directory not found", &[], &invoker);

        let outcome = RecoveryRegistry::default().handle_error(&c).await;
        assert_eq!(outcome.category, FailureCategory::DirectoryNotFound);
        assert!(outcome
            .message
            .starts_with("Directory '/work/missing/dir' not found. Check if parent directory '/work/missing' exists;"));

        let empty = json!({});
        let c = ctx("list_directory", &empty, "no such directory", &[], &invoker);
        let outcome = RecoveryRegistry::default().handle_error(&c).await;
        assert_eq!(outcome.message, "Directory not found. Please verify the path exists.");
    }

    #[tokio::test]
    async fn test_process_messages() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({"command": "frob"});

        let c = ctx("execute_command", &args, "sh: frob: command not found", &[], &invoker);
        assert_eq!(
            ProcessHandler.handle(&c).await.unwrap().unwrap(),
            "Command 'frob' not found. Check if it's installed and in PATH."
        );

        let c = ctx("execute_command", &args, "process exited with exit code 2", &[], &invoker);
        assert_eq!(
            ProcessHandler.handle(&c).await.unwrap().unwrap(),
            "Command executed but failed. Check command syntax and arguments."
        );

        let c = ctx("execute_command", &args, "process failed", &[], &invoker);
        assert_eq!(
            ProcessHandler.handle(&c).await.unwrap().unwrap(),
            "Process execution error in execute_command. Verify command and arguments."
        );
    }

    #[tokio::test]
    async fn test_chain_order_file_before_directory() {
        let invoker = ScriptedInvoker::failing_forever();
        let args = json!({"path": "/a/b"});
        // Matches both FileNotFound ("does not exist") and DirectoryNotFound.
        let c = ctx("list_directory", &args, "path does not exist", &[], &invoker);

        let outcome = RecoveryRegistry::default().handle_error(&c).await;
        assert_eq!(outcome.category, FailureCategory::FileNotFound);
        assert_eq!(outcome.message, "File '/a/b' not found.");
    }
}
