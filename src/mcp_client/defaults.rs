//! Default server catalog: the servers a fresh install starts with.
//!
//! The filesystem server is always offered for the workspace. Optional
//! servers are added when their credentials are present in the environment.
//! Persisted configs take precedence over all of these.

use std::collections::BTreeMap;
use std::path::Path;

use super::errors::McpError;
use super::types::ServerConfig;

const FILESYSTEM_PACKAGE: &str = "@modelcontextprotocol/server-filesystem";
const GITHUB_PACKAGE: &str = "@modelcontextprotocol/server-github";
const BRAVE_SEARCH_PACKAGE: &str = "@modelcontextprotocol/server-brave-search";
const MEMORY_PACKAGE: &str = "@modelcontextprotocol/server-memory";

const GITHUB_TOKEN_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";
const BRAVE_KEY_VAR: &str = "BRAVE_API_KEY";

/// Platform-correct npx command.
///
/// Windows requires `npx.cmd` because `npx` is a batch script;
/// `Command::new("npx")` fails without the extension on Windows.
fn default_npx_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "npx.cmd"
    } else {
        "npx"
    }
}

fn npx_server(name: &str, package: &str, extra: &[&str]) -> Result<ServerConfig, McpError> {
    let command = [default_npx_command(), "-y", package]
        .iter()
        .chain(extra.iter())
        .map(|s| s.to_string())
        .collect();
    ServerConfig::stdio(name, command)
}

/// Servers configured when nothing is persisted. Keyed by name.
pub fn default_servers(workspace: &Path) -> Result<BTreeMap<String, ServerConfig>, McpError> {
    let workspace = workspace.display().to_string();
    let filesystem = npx_server("filesystem", FILESYSTEM_PACKAGE, &[workspace.as_str()])?;
    Ok(BTreeMap::from([(filesystem.name().to_string(), filesystem)]))
}

/// Extra servers enabled by credentials in the process environment.
pub fn optional_servers() -> Result<BTreeMap<String, ServerConfig>, McpError> {
    optional_servers_from(|var| std::env::var(var).ok())
}

/// Like [`optional_servers`], with a custom variable lookup.
pub fn optional_servers_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BTreeMap<String, ServerConfig>, McpError> {
    let present = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
    let mut servers = BTreeMap::new();

    if let Some(token) = present(GITHUB_TOKEN_VAR) {
        let github = npx_server("github", GITHUB_PACKAGE, &[])?.with_env(GITHUB_TOKEN_VAR, &token);
        servers.insert(github.name().to_string(), github);
    }

    if let Some(key) = present(BRAVE_KEY_VAR) {
        let brave =
            npx_server("brave-search", BRAVE_SEARCH_PACKAGE, &[])?.with_env(BRAVE_KEY_VAR, &key);
        servers.insert(brave.name().to_string(), brave);
    }

    let memory = npx_server("memory", MEMORY_PACKAGE, &[])?;
    servers.insert(memory.name().to_string(), memory);

    Ok(servers)
}

/// Tool names the client expects a full setup to provide.
pub fn essential_tools() -> &'static [&'static str] {
    &[
        // Filesystem operations
        "read_file",
        "write_file",
        "edit_file",
        "list_files",
        "create_directory",
        "search_files",
        // GitHub operations
        "get_repo",
        "list_repos",
        "create_issue",
        "get_issue",
        "create_pull_request",
        // Memory operations
        "store_memory",
        "retrieve_memory",
        "search_memory",
    ]
}

/// Merge override configs into a base set.
///
/// Override entries fully replace base entries of the same name.
pub fn merge_configs(
    mut base: BTreeMap<String, ServerConfig>,
    overrides: BTreeMap<String, ServerConfig>,
) -> BTreeMap<String, ServerConfig> {
    base.extend(overrides);
    base
}

/// Servers to connect at startup: the persisted set if non-empty, else the defaults.
pub fn startup_servers(
    persisted: Vec<ServerConfig>,
    workspace: &Path,
) -> Result<Vec<ServerConfig>, McpError> {
    if !persisted.is_empty() {
        return Ok(persisted);
    }
    tracing::info!(workspace = %workspace.display(), "no persisted servers, using defaults");
    Ok(default_servers(workspace)?.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_filesystem_server() {
        let servers = default_servers(Path::new("/work/project")).unwrap();
        assert_eq!(servers.len(), 1);

        let fs = &servers["filesystem"];
        let (program, args) = fs.program_and_args().unwrap();
        assert_eq!(program, default_npx_command());
        assert_eq!(args, vec!["-y", FILESYSTEM_PACKAGE, "/work/project"]);
    }

    #[test]
    fn test_optional_servers_follow_credentials() {
        let none = optional_servers_from(|_| None).unwrap();
        assert_eq!(none.keys().collect::<Vec<_>>(), vec!["memory"]);

        let env: HashMap<&str, &str> =
            HashMap::from([(GITHUB_TOKEN_VAR, "ghp_abc"), (BRAVE_KEY_VAR, "  ")]);
        let some = optional_servers_from(|var| env.get(var).map(|v| v.to_string())).unwrap();
        assert_eq!(some.keys().collect::<Vec<_>>(), vec!["github", "memory"]);
        assert_eq!(
            some["github"].env().get(GITHUB_TOKEN_VAR).map(String::as_str),
            Some("ghp_abc")
        );
    }

    #[test]
    fn test_essential_tools_include_filesystem_basics() {
        let tools = essential_tools();
        assert!(tools.contains(&"read_file"));
        assert!(tools.contains(&"search_memory"));
    }

    #[test]
    fn test_merge_override_replaces() {
        let base = default_servers(Path::new("/a")).unwrap();
        let custom =
            ServerConfig::stdio("filesystem", vec!["node".into(), "fs.js".into()]).unwrap();
        let merged = merge_configs(base, BTreeMap::from([("filesystem".to_string(), custom)]));
        assert_eq!(merged["filesystem"].command()[0], "node");
    }

    #[test]
    fn test_merge_preserves_non_overridden() {
        let base = default_servers(Path::new("/a")).unwrap();
        let extra = optional_servers_from(|_| None).unwrap();
        let merged = merge_configs(base, extra);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["filesystem"].command()[0], default_npx_command());
    }

    #[test]
    fn test_startup_prefers_persisted() {
        let persisted = vec![ServerConfig::stdio("mine", vec!["my-server".into()]).unwrap()];
        let chosen = startup_servers(persisted, Path::new("/w")).unwrap();
        assert_eq!(chosen[0].name(), "mine");

        let chosen = startup_servers(Vec::new(), Path::new("/w")).unwrap();
        assert_eq!(chosen[0].name(), "filesystem");
    }
}
