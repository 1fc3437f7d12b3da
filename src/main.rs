//! mcplink CLI - inspect and call MCP tool servers from the command line

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use mcplink::config::{load_config, load_default_config, ConfigFile};
use mcplink::logging::{init_tracing, LogOptions};
use mcplink::mcp_client::defaults::{merge_configs, optional_servers, startup_servers};
use mcplink::mcp_client::{CatalogStatus, ConnectionRegistry, ServerConfig, ToolInvocation};
use mcplink::recovery::RecoveryRegistry;
use mcplink::validation::{ConfigValidator, ValidationIssue, ValidationReporter};

#[derive(Parser)]
#[command(name = "mcplink")]
#[command(about = "Connect to MCP tool servers over stdio", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (JSON or YAML)
    #[arg(long, global = true, env = "MCPLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace served by the default filesystem server
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the configured servers and list their tools
    Tools {
        /// Also start servers enabled by credentials in the environment
        #[arg(long)]
        with_optional: bool,
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check configs, host commands, and the workspace without spawning anything
    Validate,
    /// Call one tool and print its result
    Call {
        server: String,
        tool: String,
        /// Arguments as a JSON object
        arguments: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing(&LogOptions::from_env()).context("failed to initialize logging")?;

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path),
        None => load_default_config(),
    }
    .context("failed to load config")?;

    let workspace = match cli.workspace.clone() {
        Some(path) => path,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };

    match cli.command {
        Commands::Tools {
            with_optional,
            json,
        } => list_tools(&config, &workspace, with_optional, json).await,
        Commands::Validate => Ok(validate(&config, &workspace)),
        Commands::Call {
            server,
            tool,
            arguments,
        } => call(&config, &workspace, &server, &tool, arguments.as_deref()).await,
    }
}

fn servers_for(
    config: &ConfigFile,
    workspace: &Path,
    with_optional: bool,
) -> Result<Vec<ServerConfig>> {
    let persisted = config.server_configs().context("invalid server in config")?;
    let base = startup_servers(persisted, workspace)?;
    if !with_optional {
        return Ok(base);
    }

    let base = base
        .into_iter()
        .map(|c| (c.name().to_string(), c))
        .collect();
    // Explicit config wins over credential-enabled extras.
    Ok(merge_configs(optional_servers()?, base).into_values().collect())
}

async fn list_tools(
    config: &ConfigFile,
    workspace: &Path,
    with_optional: bool,
    json: bool,
) -> Result<ExitCode> {
    let servers = servers_for(config, workspace, with_optional)?;
    let registry = ConnectionRegistry::new(config.effective_settings());

    let failures = registry.connect_all(servers).await;
    for (name, error) in &failures {
        eprintln!("{name}: {error}");
    }

    let entries = registry.get_all_tools().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for name in registry.connected_servers().await {
            match registry.catalog_status(&name).await {
                Some(CatalogStatus::Unavailable { reason }) => {
                    println!("{name}: catalog unavailable ({reason})");
                }
                _ => {
                    let tools = registry.list_tools(&name).await;
                    println!("{name}: {} tool(s)", tools.len());
                    for tool in tools {
                        println!("  {:<28} {}", tool.name, first_line(&tool.description));
                    }
                }
            }
        }
    }

    registry.close_all().await;
    Ok(if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn validate(config: &ConfigFile, workspace: &Path) -> ExitCode {
    let validator = ConfigValidator::new();
    let reporter = ValidationReporter;
    let mut issues: Vec<ValidationIssue> = Vec::new();

    if config.mcp_servers.is_empty() {
        match mcplink::mcp_client::defaults::default_servers(workspace) {
            Ok(defaults) => {
                for (name, server) in defaults {
                    issues.extend(validator.validate_server_config(&name, &server.to_spec()));
                }
            }
            Err(e) => issues.push(ValidationIssue::error(e.to_string())),
        }
    } else {
        for (name, spec) in &config.mcp_servers {
            issues.extend(validator.validate_server_config(name, spec));
        }
    }
    issues.extend(validator.validate_environment());
    issues.extend(validator.validate_workspace(workspace));

    println!("{}", reporter.format_issues(&issues));
    println!("{}", reporter.summary(&issues));

    if reporter.has_errors(&issues) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn call(
    config: &ConfigFile,
    workspace: &Path,
    server: &str,
    tool: &str,
    raw_arguments: Option<&str>,
) -> Result<ExitCode> {
    let arguments = parse_arguments(raw_arguments)?;

    let servers = servers_for(config, workspace, true)?;
    let Some(server_config) = servers.into_iter().find(|c| c.name() == server) else {
        bail!("no server named '{server}' is configured");
    };

    let settings = config.effective_settings();
    let recovery = RecoveryRegistry::new(settings.network_retry_policy());
    let registry = ConnectionRegistry::new(settings);

    if let Err(e) = registry.add_server(server_config).await {
        eprintln!("{server}: {e}");
        return Ok(ExitCode::FAILURE);
    }

    let invocation = ToolInvocation::new(server, tool).with_arguments(arguments);
    for issue in registry.validate_invocation(&invocation).await {
        eprintln!("{}: {}", issue.severity, issue.message);
    }

    let result = registry.call_tool(&invocation).await;
    let code = if result.is_error {
        eprintln!("error: {}", result.content);
        let outcome = registry.recover(&recovery, &invocation, &result.content).await;
        eprintln!("{}", outcome.message);
        ExitCode::FAILURE
    } else {
        println!("{}", result.content);
        ExitCode::SUCCESS
    };

    registry.close_all().await;
    Ok(code)
}

fn parse_arguments(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("arguments must be valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("arguments must be a JSON object, got {other}"),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
