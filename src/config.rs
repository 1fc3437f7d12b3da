//! Client configuration loading.
//!
//! Reads `~/.mcplink/config.json` (or the file named by `MCPLINK_CONFIG`),
//! resolves `${VAR}` / `${VAR:-default}` references, and applies
//! `MCPLINK_*` environment overrides to the timing and retry settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mcp_client::session::SessionOptions;
use crate::mcp_client::transport::FramingLimits;
use crate::mcp_client::types::{ServerConfig, ServerSpec, PROTOCOL_VERSION};
use crate::recovery::RetryPolicy;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MCPLINK_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid server '{name}': {reason}")]
    InvalidServer { name: String, reason: String },
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Timeouts, limits, and retry knobs for every session the client opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Wait for the first line of a response.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Wait for each chunk while reassembling an oversized line.
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    #[serde(default = "default_line_limit")]
    pub line_limit: usize,
    #[serde(default = "default_max_skipped_messages")]
    pub max_skipped_messages: usize,
    /// Grace period between SIGTERM and SIGKILL.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Deadline for spawn plus handshake in `add_server`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_network_retries")]
    pub network_retries: u32,
    #[serde(default = "default_network_retry_delay_ms")]
    pub network_retry_delay_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
}

fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_string()
}
fn default_response_timeout_ms() -> u64 {
    5_000
}
fn default_chunk_timeout_ms() -> u64 {
    1_000
}
fn default_max_message_bytes() -> usize {
    1024 * 1024
}
fn default_line_limit() -> usize {
    64 * 1024
}
fn default_max_skipped_messages() -> usize {
    10
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}
fn default_connect_timeout_ms() -> u64 {
    30_000
}
fn default_network_retries() -> u32 {
    2
}
fn default_network_retry_delay_ms() -> u64 {
    1_000
}
fn default_reconnect_attempts() -> u32 {
    3
}
fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_version: default_client_version(),
            protocol_version: default_protocol_version(),
            response_timeout_ms: default_response_timeout_ms(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
            line_limit: default_line_limit(),
            max_skipped_messages: default_max_skipped_messages(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            network_retries: default_network_retries(),
            network_retry_delay_ms: default_network_retry_delay_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
        }
    }
}

impl ClientSettings {
    /// Defaults with `MCPLINK_*` overrides applied.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    /// Override fields from `MCPLINK_*` variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        override_from_env("MCPLINK_CLIENT_NAME", &mut self.client_name);
        override_from_env("MCPLINK_RESPONSE_TIMEOUT_MS", &mut self.response_timeout_ms);
        override_from_env("MCPLINK_CHUNK_TIMEOUT_MS", &mut self.chunk_timeout_ms);
        override_from_env("MCPLINK_MAX_MESSAGE_BYTES", &mut self.max_message_bytes);
        override_from_env("MCPLINK_LINE_LIMIT", &mut self.line_limit);
        override_from_env("MCPLINK_MAX_SKIPPED_MESSAGES", &mut self.max_skipped_messages);
        override_from_env("MCPLINK_SHUTDOWN_GRACE_MS", &mut self.shutdown_grace_ms);
        override_from_env("MCPLINK_CONNECT_TIMEOUT_MS", &mut self.connect_timeout_ms);
        override_from_env("MCPLINK_NETWORK_RETRIES", &mut self.network_retries);
        override_from_env("MCPLINK_NETWORK_RETRY_DELAY_MS", &mut self.network_retry_delay_ms);
        override_from_env("MCPLINK_RECONNECT_ATTEMPTS", &mut self.reconnect_attempts);
        override_from_env("MCPLINK_RECONNECT_BASE_DELAY_MS", &mut self.reconnect_base_delay_ms);
    }

    pub fn framing_limits(&self) -> FramingLimits {
        FramingLimits {
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            chunk_timeout: Duration::from_millis(self.chunk_timeout_ms),
            max_message_bytes: self.max_message_bytes,
            // A line buffer larger than the cap would bypass it.
            line_limit: self.line_limit.clamp(1, self.max_message_bytes.max(1)),
            max_skipped_messages: self.max_skipped_messages,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            client_name: self.client_name.clone(),
            client_version: self.client_version.clone(),
            protocol_version: self.protocol_version.clone(),
            limits: self.framing_limits(),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Linear schedule used by the network recovery handler.
    pub fn network_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.network_retries,
            Duration::from_millis(self.network_retry_delay_ms),
        )
    }

    /// Exponential schedule used when reconnecting a server.
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.reconnect_attempts,
            Duration::from_millis(self.reconnect_base_delay_ms),
        )
    }
}

fn override_from_env<T: FromStr>(var: &str, target: &mut T)
where
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(e) => tracing::warn!(var, value = %raw, error = %e, "ignoring invalid override"),
    }
}

// ─── Config File ─────────────────────────────────────────────────────────────

/// On-disk configuration: persisted servers plus client settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, ServerSpec>,
    #[serde(default)]
    pub settings: Option<ClientSettings>,
}

impl ConfigFile {
    /// Validated server configs, in name order.
    pub fn server_configs(&self) -> Result<Vec<ServerConfig>, ConfigError> {
        self.mcp_servers
            .iter()
            .map(|(name, spec)| {
                ServerConfig::from_spec(name, spec).map_err(|e| ConfigError::InvalidServer {
                    name: name.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Settings from the file (or defaults) with env overrides applied.
    pub fn effective_settings(&self) -> ClientSettings {
        let mut settings = self.settings.clone().unwrap_or_default();
        settings.apply_env_overrides();
        settings
    }
}

/// Locate the config file: `MCPLINK_CONFIG`, then `~/.mcplink/config.{json,yaml,yml}`.
pub fn find_config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points to a missing file");
    }

    let dir = dirs::home_dir()?.join(".mcplink");
    ["config.json", "config.yaml", "config.yml"]
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.exists())
}

/// Load and parse a config file. YAML is chosen by extension, JSON otherwise.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );

    let parsed = if is_yaml {
        serde_yaml::from_str(&interpolated).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&interpolated).map_err(|e| e.to_string())
    };

    parsed.map_err(|reason| ConfigError::Parse {
        path: path.display().to_string(),
        reason,
    })
}

/// Load the discovered config file, or an empty config when none exists.
pub fn load_default_config() -> Result<ConfigFile, ConfigError> {
    match find_config_path() {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            load_config(&path)
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(ConfigFile::default())
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
pub fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let expr: String = chars.by_ref().take_while(|c| *c != '}').collect();
            result.push_str(&resolve_var_expr(&expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::Transport;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__MCPLINK_TEST_UNSET__");
        assert_eq!(
            interpolate_env_vars("${__MCPLINK_TEST_UNSET__:-/fallback/path}"),
            "/fallback/path"
        );
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__MCPLINK_TEST_SET__", "/custom/path");
        assert_eq!(
            interpolate_env_vars("root=${__MCPLINK_TEST_SET__:-/fallback}/x"),
            "root=/custom/path/x"
        );
        std::env::remove_var("__MCPLINK_TEST_SET__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain $text with no {variables}";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/workspace");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/workspace"));
        assert_eq!(expand_tilde("/abs"), "/abs");
    }

    #[test]
    fn test_settings_defaults() {
        let settings: ClientSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ClientSettings::default());
        let limits = settings.framing_limits();
        assert_eq!(limits, FramingLimits::default());
        assert_eq!(settings.connect_timeout(), Duration::from_secs(30));
        assert_eq!(settings.network_retry_policy().max_attempts, 2);
        assert_eq!(
            settings.reconnect_policy().delay_for(3),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("MCPLINK_CHUNK_TIMEOUT_MS", "250");
        std::env::set_var("MCPLINK_NETWORK_RETRIES", "many");
        let settings = ClientSettings::from_env();
        std::env::remove_var("MCPLINK_CHUNK_TIMEOUT_MS");
        std::env::remove_var("MCPLINK_NETWORK_RETRIES");

        assert_eq!(settings.chunk_timeout_ms, 250);
        assert_eq!(settings.network_retries, 2);
    }

    #[test]
    fn test_load_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::env::set_var("__MCPLINK_TEST_TOKEN__", "secret");
        std::fs::write(
            &path,
            r#"{
                "mcp_servers": {
                    "fs": {"transport": "stdio", "command": ["npx", "-y", "pkg", "${__MCPLINK_TEST_WS__:-/ws}"]},
                    "gh": {"command": ["gh-mcp"], "env": {"TOKEN": "${__MCPLINK_TEST_TOKEN__}"}}
                },
                "settings": {"response_timeout_ms": 750}
            }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        std::env::remove_var("__MCPLINK_TEST_TOKEN__");

        let servers = config.server_configs().unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name(), "fs");
        assert_eq!(servers[0].command().last().map(String::as_str), Some("/ws"));
        assert_eq!(servers[1].transport(), Transport::Stdio);
        assert_eq!(servers[1].env().get("TOKEN").map(String::as_str), Some("secret"));
        assert_eq!(config.effective_settings().response_timeout_ms, 750);
    }

    #[test]
    fn test_load_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "mcp_servers:\n  remote:\n    transport: sse\n    url: http://localhost:9000/sse\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        let servers = config.server_configs().unwrap();
        assert_eq!(servers[0].transport(), Transport::Sse);
        assert_eq!(servers[0].url(), Some("http://localhost:9000/sse"));
    }

    #[test]
    fn test_invalid_server_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"mcp_servers": {"broken": {"transport": "stdio"}}}"#).unwrap();

        let err = load_config(&path).unwrap().server_configs().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer { ref name, .. } if name == "broken"));
        assert!(err.to_string().contains("requires command"));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            load_config(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
