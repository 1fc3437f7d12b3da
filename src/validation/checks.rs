//! Pre-flight checks for server entries, host commands, and the workspace.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::ValidationIssue;
use crate::mcp_client::types::{ServerSpec, Transport};

/// Commands that launch Node-based servers.
const NODE_LAUNCHERS: &[&str] = &["npx", "npm"];

/// Commands the host should provide for the default tool set.
const ESSENTIAL_COMMANDS: &[&str] = &["git"];

fn url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^https?://(?:(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,6}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
        )
        .ok()
    })
    .as_ref()
}

/// Checks configs and the host before any server is spawned.
pub struct ConfigValidator {
    command_available: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Validator that resolves commands on `PATH`.
    pub fn new() -> Self {
        Self {
            command_available: Box::new(|cmd| which::which(cmd).is_ok()),
        }
    }

    /// Validator with a custom command lookup.
    pub fn with_command_lookup(lookup: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            command_available: Box::new(lookup),
        }
    }

    /// Check one server entry as it appears in a config file.
    pub fn validate_server_config(&self, name: &str, spec: &ServerSpec) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if name.trim().is_empty() {
            issues.push(
                ValidationIssue::error("Missing required field 'name' in MCP server config")
                    .with_field("name"),
            );
        }

        let transport_name = match spec.transport.as_deref() {
            Some(t) => t.to_lowercase(),
            None => {
                issues.push(
                    ValidationIssue::info(format!(
                        "Server '{name}' has no transport, defaulting to stdio"
                    ))
                    .with_field("transport"),
                );
                Transport::Stdio.as_str().to_string()
            }
        };

        let Some(transport) = Transport::parse(&transport_name) else {
            issues.push(
                ValidationIssue::error(format!("Invalid transport '{transport_name}'"))
                    .with_field("transport")
                    .with_suggestion("Valid transports: stdio, sse, http"),
            );
            return issues;
        };

        match transport {
            Transport::Stdio => self.check_command(spec, &mut issues),
            Transport::Sse | Transport::Http => check_url(transport, spec, &mut issues),
        }

        issues
    }

    fn check_command(&self, spec: &ServerSpec, issues: &mut Vec<ValidationIssue>) {
        let program = spec
            .command
            .as_deref()
            .and_then(<[String]>::first)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty());

        let Some(program) = program else {
            issues.push(
                ValidationIssue::error("STDIO transport requires a valid command array")
                    .with_field("command"),
            );
            return;
        };

        if NODE_LAUNCHERS.contains(&program) {
            if !(self.command_available)("node") {
                issues.push(
                    ValidationIssue::warning("Node.js not found but required for npx/npm commands")
                        .with_field("command")
                        .with_suggestion("Install Node.js to use this MCP server"),
                );
            }
        } else if !(self.command_available)(program) {
            issues.push(
                ValidationIssue::warning(format!("Command '{program}' not found in PATH"))
                    .with_field("command")
                    .with_suggestion("Install it or use an absolute path"),
            );
        }
    }

    /// Check for host commands the default servers rely on.
    pub fn validate_environment(&self) -> Vec<ValidationIssue> {
        ESSENTIAL_COMMANDS
            .iter()
            .filter(|cmd| !(self.command_available)(**cmd))
            .map(|cmd| {
                ValidationIssue::warning(format!("Command '{cmd}' not found in PATH"))
                    .with_suggestion(format!("Install {cmd} for full functionality"))
            })
            .collect()
    }

    /// Check that a workspace directory is usable by the filesystem server.
    pub fn validate_workspace(&self, workspace: &Path) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let shown = workspace.display();

        let metadata = match std::fs::metadata(workspace) {
            Ok(m) => m,
            Err(_) => {
                issues.push(
                    ValidationIssue::error(format!("Workspace path does not exist: {shown}"))
                        .with_field("workspace_path")
                        .with_suggestion("Create the directory or use a valid path"),
                );
                return issues;
            }
        };

        if !metadata.is_dir() {
            issues.push(
                ValidationIssue::error(format!("Workspace path is not a directory: {shown}"))
                    .with_field("workspace_path"),
            );
            return issues;
        }

        if std::fs::read_dir(workspace).is_err() {
            issues.push(
                ValidationIssue::error(format!("No read permission for workspace: {shown}"))
                    .with_field("workspace_path"),
            );
        }

        if metadata.permissions().readonly() {
            issues.push(
                ValidationIssue::warning(format!("No write permission for workspace: {shown}"))
                    .with_field("workspace_path")
                    .with_suggestion("Some operations may fail without write access"),
            );
        }

        if workspace.join(".git").exists() {
            issues.push(ValidationIssue::info(
                "Workspace is a Git repository - Git tools will be available",
            ));
        }

        issues
    }
}

fn check_url(transport: Transport, spec: &ServerSpec, issues: &mut Vec<ValidationIssue>) {
    let upper = transport.as_str().to_uppercase();
    match spec.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        None => issues.push(
            ValidationIssue::error(format!("{upper} transport requires a URL")).with_field("url"),
        ),
        Some(url) => {
            if !url_regex().is_some_and(|re| re.is_match(url)) {
                issues.push(
                    ValidationIssue::warning(format!("URL '{url}' may not be valid"))
                        .with_field("url"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Severity;

    fn validator_with(available: &'static [&'static str]) -> ConfigValidator {
        ConfigValidator::with_command_lookup(move |cmd| available.iter().any(|c| *c == cmd))
    }

    fn stdio_spec(command: &[&str]) -> ServerSpec {
        ServerSpec {
            transport: Some("stdio".into()),
            command: Some(command.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_stdio_config_has_no_issues() {
        let v = validator_with(&["node", "python3"]);
        assert!(v
            .validate_server_config("fs", &stdio_spec(&["npx", "-y", "server"]))
            .is_empty());
        assert!(v
            .validate_server_config("py", &stdio_spec(&["python3", "server.py"]))
            .is_empty());
    }

    #[test]
    fn test_empty_command_is_error() {
        let v = validator_with(&[]);
        let issues = v.validate_server_config("fs", &stdio_spec(&[]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].field.as_deref(), Some("command"));
    }

    #[test]
    fn test_npx_without_node_warns() {
        let v = validator_with(&[]);
        let issues = v.validate_server_config("fs", &stdio_spec(&["npx", "pkg"]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].message.contains("Node.js"));
    }

    #[test]
    fn test_invalid_transport() {
        let v = validator_with(&[]);
        let spec = ServerSpec {
            transport: Some("carrier-pigeon".into()),
            ..Default::default()
        };
        let issues = v.validate_server_config("x", &spec);
        assert!(issues[0].is_error());
        assert!(issues[0].message.contains("carrier-pigeon"));
    }

    #[test]
    fn test_remote_url_checks() {
        let v = validator_with(&[]);
        let missing = ServerSpec {
            transport: Some("sse".into()),
            ..Default::default()
        };
        let issues = v.validate_server_config("web", &missing);
        assert_eq!(issues[0].message, "SSE transport requires a URL");

        let odd = ServerSpec {
            transport: Some("http".into()),
            url: Some("not a url".into()),
            ..Default::default()
        };
        let issues = v.validate_server_config("web", &odd);
        assert_eq!(issues[0].severity, Severity::Warning);

        let good = ServerSpec {
            transport: Some("http".into()),
            url: Some("http://localhost:8080/mcp".into()),
            ..Default::default()
        };
        assert!(v.validate_server_config("web", &good).is_empty());
    }

    #[test]
    fn test_missing_git_warns() {
        let issues = validator_with(&[]).validate_environment();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("'git'"));
        assert!(validator_with(&["git"]).validate_environment().is_empty());
    }

    #[test]
    fn test_workspace_checks() {
        let v = validator_with(&[]);
        let dir = tempfile::tempdir().unwrap();
        assert!(v.validate_workspace(dir.path()).is_empty());

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let issues = v.validate_workspace(dir.path());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Info);

        let missing = dir.path().join("nope");
        let issues = v.validate_workspace(&missing);
        assert!(issues[0].is_error());
        assert!(issues[0].message.contains("does not exist"));

        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let issues = v.validate_workspace(&file);
        assert!(issues[0].message.contains("not a directory"));
    }
}
