//! Connection registry: the high-level interface for tool execution.
//!
//! Owns one [`Session`] per server name plus the cached tool catalog, and
//! routes invocations to the right session. Invocation failures come back as
//! `ToolResult { is_error: true }`, never as `Err`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use super::errors::McpError;
use super::registry::{CatalogStatus, ToolCatalog};
use super::session::{duration_ms, Session, SessionState};
use super::types::{CatalogEntry, ServerConfig, ToolDescriptor, ToolInvocation, ToolResult};
use crate::config::ClientSettings;
use crate::recovery::{RecoveryContext, RecoveryOutcome, RecoveryRegistry, ToolInvoker};
use crate::validation::ValidationIssue;

// ─── ConnectionRegistry ──────────────────────────────────────────────────────

/// Manages sessions for many servers and routes tool calls between them.
pub struct ConnectionRegistry {
    settings: ClientSettings,
    /// Every server ever added, kept even when its connect failed.
    configs: RwLock<BTreeMap<String, ServerConfig>>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    catalog: RwLock<ToolCatalog>,
    /// Serializes add/remove/reconnect for the same name.
    name_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}

impl ConnectionRegistry {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            configs: RwLock::new(BTreeMap::new()),
            sessions: RwLock::new(HashMap::new()),
            catalog: RwLock::new(ToolCatalog::new()),
            name_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.name_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Forget a name's lock once only the map and `lock` still hold it.
    fn release_name_lock(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.name_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(name);
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Store `config`, connect, and cache the server's tools.
    ///
    /// An existing server with the same name is closed and replaced. If the
    /// connect fails the config is kept but no session remains.
    pub async fn add_server(&self, config: ServerConfig) -> Result<(), McpError> {
        let name = config.name().to_string();
        let lock = self.name_lock(&name);
        let _guard = lock.lock().await;

        self.drop_session(&name).await;
        self.configs.write().await.insert(name, config.clone());

        self.connect_locked(&config).await
    }

    /// Add several servers concurrently. Returns the ones that failed.
    ///
    /// Partial startup is acceptable; failures are logged and reported.
    pub async fn connect_all(&self, configs: Vec<ServerConfig>) -> Vec<(String, McpError)> {
        let attempts = configs.into_iter().map(|config| async move {
            let name = config.name().to_string();
            (name, self.add_server(config).await)
        });

        join_all(attempts)
            .await
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e)))
            .collect()
    }

    /// Close a server's session and forget its config and tools.
    ///
    /// Returns whether anything was removed.
    pub async fn remove_server(&self, name: &str) -> bool {
        let lock = self.name_lock(name);
        let removed = {
            let _guard = lock.lock().await;
            let had_session = self.drop_session(name).await;
            let had_config = self.configs.write().await.remove(name).is_some();
            had_session || had_config
        };
        self.release_name_lock(name, lock);

        if removed {
            tracing::info!(server = name, "server removed");
        }
        removed
    }

    /// Close every session and clear the tool cache. Safe to call repeatedly.
    ///
    /// Configs are kept so servers can be reconnected later.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, session)| session).collect()
        };
        self.catalog.write().await.clear();

        if sessions.is_empty() {
            return;
        }
        let count = sessions.len();
        join_all(sessions.iter().map(|session| session.close())).await;
        tracing::info!(count, "closed all sessions");
    }

    /// Close and reopen a server's session, backing off exponentially
    /// between attempts.
    pub async fn reconnect_server(&self, name: &str) -> Result<(), McpError> {
        let lock = self.name_lock(name);
        let _guard = lock.lock().await;

        let config = self
            .configs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::ConfigError {
                reason: format!("no configuration for server '{name}'"),
            })?;

        self.drop_session(name).await;

        let policy = self.settings.reconnect_policy();
        for attempt in policy.attempts() {
            policy.wait(attempt).await;
            match self.connect_locked(&config).await {
                Ok(()) => {
                    tracing::info!(server = name, attempt, "server reconnected");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(server = name, attempt, error = %e, "reconnect attempt failed");
                }
            }
        }

        Err(McpError::RestartExhausted {
            name: name.to_string(),
            attempts: policy.max_attempts,
        })
    }

    /// Connect a fresh session for `config`. Caller holds the name lock.
    async fn connect_locked(&self, config: &ServerConfig) -> Result<(), McpError> {
        let name = config.name();
        let session = Arc::new(Session::new(name, self.settings.session_options()));
        let deadline = self.settings.connect_timeout();

        let connected = match timeout(deadline, session.connect(config)).await {
            Ok(result) => result,
            Err(_) => Err(McpError::ConnectTimeout {
                name: name.to_string(),
                timeout_ms: duration_ms(deadline),
            }),
        };

        if let Err(e) = connected {
            // A timed-out connect leaves the child alive until close() reaps it.
            session.close().await;
            tracing::warn!(server = name, error = %e, "failed to connect server");
            return Err(e);
        }

        match session.list_tools().await {
            Ok(tools) => {
                tracing::info!(server = name, tools = tools.len(), "server connected");
                self.catalog.write().await.replace(name, tools);
            }
            Err(e) => {
                tracing::warn!(
                    server = name,
                    error = %e,
                    "tools/list failed, caching empty catalog"
                );
                self.catalog
                    .write()
                    .await
                    .mark_unavailable(name, &e.to_string());
            }
        }

        self.sessions
            .write()
            .await
            .insert(name.to_string(), session);
        Ok(())
    }

    /// Remove and close a session plus its cached tools.
    async fn drop_session(&self, name: &str) -> bool {
        let session = self.sessions.write().await.remove(name);
        let had_tools = self.catalog.write().await.remove(name);
        match session {
            Some(session) => {
                session.close().await;
                true
            }
            None => had_tools,
        }
    }

    // ─── Catalog ─────────────────────────────────────────────────────────

    /// Cached tools for one server, empty when unknown. Never hits the wire.
    pub async fn list_tools(&self, server_name: &str) -> Vec<ToolDescriptor> {
        self.catalog
            .read()
            .await
            .tools_for(server_name)
            .map(|tools| tools.to_vec())
            .unwrap_or_default()
    }

    /// The full cached map: every server's tools, keyed by server name.
    pub async fn list_all_tools(&self) -> BTreeMap<String, Arc<[ToolDescriptor]>> {
        self.catalog.read().await.snapshot()
    }

    /// Shared read-only snapshot of one server's cached tools.
    pub async fn tools_snapshot(&self, server_name: &str) -> Option<Arc<[ToolDescriptor]>> {
        self.catalog.read().await.tools_for(server_name)
    }

    /// Every cached tool, tagged with its server.
    pub async fn get_all_tools(&self) -> Vec<CatalogEntry> {
        self.catalog.read().await.all_entries()
    }

    /// Re-run `tools/list` for a server and replace its cached tools.
    ///
    /// Returns the number of tools now cached.
    pub async fn refresh_tools(&self, name: &str) -> Result<usize, McpError> {
        let session = self.session(name).await.ok_or_else(|| McpError::NotConnected {
            name: name.to_string(),
        })?;

        match session.list_tools().await {
            Ok(tools) => {
                let count = tools.len();
                self.catalog.write().await.replace(name, tools);
                Ok(count)
            }
            Err(e) => {
                self.catalog
                    .write()
                    .await
                    .mark_unavailable(name, &e.to_string());
                Err(e)
            }
        }
    }

    /// Advisory check of an invocation against the cached schema.
    pub async fn validate_invocation(&self, invocation: &ToolInvocation) -> Vec<ValidationIssue> {
        self.catalog.read().await.validate_arguments(
            &invocation.server_name,
            &invocation.tool_name,
            &invocation.arguments,
        )
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Execute a tool on the server named in the invocation.
    ///
    /// Unknown servers and every transport or server failure are returned as
    /// error results. Metadata records the server, tool, and elapsed time.
    pub async fn call_tool(&self, invocation: &ToolInvocation) -> ToolResult {
        let start = Instant::now();
        let server = invocation.server_name.as_str();
        let tool = invocation.tool_name.as_str();

        let result = match self.session(server).await {
            None => ToolResult::error(
                McpError::NotConnected {
                    name: server.to_string(),
                }
                .to_string(),
            ),
            Some(session) => match session.call_tool(tool, &invocation.arguments).await {
                Ok(call) => ToolResult::from(call),
                Err(e) => {
                    tracing::warn!(server, tool, error = %e, "tool call failed");
                    ToolResult::error(e.to_string())
                }
            },
        };

        let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            server,
            tool,
            elapsed_ms = elapsed,
            is_error = result.is_error,
            "tool call finished"
        );

        result
            .with_metadata("server", server)
            .with_metadata("tool", tool)
            .with_metadata("execution_time_ms", elapsed.to_string())
    }

    /// Ask the recovery chain what to do about a failed invocation.
    ///
    /// Handlers may call back into this registry to retry or investigate.
    pub async fn recover(
        &self,
        recovery: &RecoveryRegistry,
        invocation: &ToolInvocation,
        error: &str,
    ) -> RecoveryOutcome {
        let tools = self.get_all_tools().await;
        let arguments = serde_json::Value::Object(invocation.arguments.clone());
        let ctx = RecoveryContext {
            tool_name: &invocation.tool_name,
            server_name: Some(&invocation.server_name),
            arguments: &arguments,
            error,
            tools: &tools,
            invoker: self,
        };
        recovery.handle_error(&ctx).await
    }

    // ─── Status ──────────────────────────────────────────────────────────

    async fn session(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(name).cloned()
    }

    /// Lifecycle state of a server's session, if one exists.
    pub async fn server_state(&self, name: &str) -> Option<SessionState> {
        match self.session(name).await {
            Some(session) => Some(session.state().await),
            None => None,
        }
    }

    pub async fn catalog_status(&self, name: &str) -> Option<CatalogStatus> {
        self.catalog.read().await.status(name)
    }

    /// Names of every stored config, sorted.
    pub async fn configured_servers(&self) -> Vec<String> {
        self.configs.read().await.keys().cloned().collect()
    }

    pub async fn server_config(&self, name: &str) -> Option<ServerConfig> {
        self.configs.read().await.get(name).cloned()
    }

    /// Names of servers whose session is `Ready`, sorted.
    pub async fn connected_servers(&self) -> Vec<String> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut ready = Vec::new();
        for session in sessions {
            if session.state().await == SessionState::Ready {
                ready.push(session.server_name().to_string());
            }
        }
        ready.sort();
        ready
    }

    /// Total cached tools across servers.
    pub async fn tool_count(&self) -> usize {
        self.catalog.read().await.len()
    }
}

#[async_trait]
impl ToolInvoker for ConnectionRegistry {
    async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        self.call_tool(&invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::Transport;

    #[tokio::test]
    async fn test_call_tool_unknown_server() {
        let registry = ConnectionRegistry::default();
        let result = registry
            .call_tool(&ToolInvocation::new("nonexistent", "read_file"))
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("not connected"), "{}", result.content);
        let metadata = result.metadata.unwrap();
        assert_eq!(metadata["server"], "nonexistent");
        assert_eq!(metadata["tool"], "read_file");
        assert!(metadata.contains_key("execution_time_ms"));
    }

    #[tokio::test]
    async fn test_failed_add_keeps_config_without_session() {
        let registry = ConnectionRegistry::default();
        let config =
            ServerConfig::remote("web", Transport::Http, "http://localhost:1/mcp").unwrap();

        let err = registry.add_server(config).await.unwrap_err();
        assert!(matches!(err, McpError::UnsupportedTransport { .. }));
        assert_eq!(registry.configured_servers().await, vec!["web"]);
        assert!(registry.connected_servers().await.is_empty());
        assert_eq!(registry.server_state("web").await, None);
        assert_eq!(registry.catalog_status("web").await, None);

        assert!(registry.remove_server("web").await);
        assert!(!registry.remove_server("web").await);
    }

    #[tokio::test]
    async fn test_remove_server_prunes_name_lock() {
        let registry = ConnectionRegistry::default();
        let config =
            ServerConfig::remote("web", Transport::Http, "http://localhost:1/mcp").unwrap();
        let _ = registry.add_server(config).await;
        assert_eq!(registry.name_locks.lock().unwrap().len(), 1);

        assert!(registry.remove_server("web").await);
        assert!(!registry.remove_server("never-added").await);
        assert!(registry.name_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_server_keeps_lock_with_other_holder() {
        let registry = ConnectionRegistry::default();
        let held = registry.name_lock("fs");

        registry.remove_server("fs").await;
        assert!(registry.name_locks.lock().unwrap().contains_key("fs"));

        drop(held);
        registry.remove_server("fs").await;
        assert!(registry.name_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_all_twice_on_empty_registry() {
        let registry = ConnectionRegistry::default();
        registry.close_all().await;
        registry.close_all().await;
        assert_eq!(registry.tool_count().await, 0);
        assert!(registry.get_all_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_unknown_server() {
        let registry = ConnectionRegistry::default();
        let err = registry.refresh_tools("ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "server 'ghost' not connected");
    }

    #[tokio::test]
    async fn test_reconnect_without_config() {
        let registry = ConnectionRegistry::default();
        let err = registry.reconnect_server("ghost").await.unwrap_err();
        assert!(matches!(err, McpError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn test_connect_all_reports_failures() {
        let registry = ConnectionRegistry::default();
        let failures = registry
            .connect_all(vec![
                ServerConfig::remote("a", Transport::Sse, "http://localhost/sse").unwrap(),
                ServerConfig::stdio("b", vec!["/no/such/mcplink-binary".into()]).unwrap(),
            ])
            .await;

        let mut names: Vec<_> = failures.iter().map(|(n, _)| n.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
        assert!(failures
            .iter()
            .any(|(_, e)| matches!(e, McpError::SpawnFailed { .. })));
        assert_eq!(registry.configured_servers().await, vec!["a", "b"]);
    }
}
