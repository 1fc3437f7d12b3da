//! Scriptable MCP server used by the process-level tests.
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout. The `--mode` flag
//! picks a misbehaviour; `filesystem` is a well-behaved server.

use std::io::{BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Answer every request correctly.
    Filesystem,
    /// Emit notifications and a ping before each response.
    Noisy,
    /// Read requests but never answer.
    Silent,
    /// Reject `initialize` with a JSON-RPC error.
    HandshakeError,
    /// Answer `tools/call` with a line that is not JSON, then stall.
    Garbage,
    /// Answer `tools/call` with one very long line.
    Large,
    /// Exit as soon as a tool is called.
    Exit,
    /// Keep sending notifications for `tools/call` and never answer it.
    Stall,
}

#[derive(Parser)]
#[command(name = "mock-mcp-server")]
struct Args {
    #[arg(long, value_enum, default_value = "filesystem", env = "MOCK_MCP_MODE")]
    mode: Mode,

    /// Payload size for `large` mode.
    #[arg(long, default_value_t = 200 * 1024)]
    payload_bytes: usize,

    /// Lines written to stderr at startup.
    #[arg(long, default_value_t = 0)]
    stderr_lines: usize,

    /// Write the process id here at startup.
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.pid_file {
        std::fs::write(path, std::process::id().to_string())
            .with_context(|| format!("failed to write pid file {}", path.display()))?;
    }

    for i in 0..args.stderr_lines {
        eprintln!("mock-mcp-server: startup line {i}");
    }

    let stdin = std::io::stdin();
    let mut out = BufWriter::new(std::io::stdout().lock());
    let mut peer_requests = 0u64;

    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        // Notifications and replies to our own pings need no answer.
        let (Some(id), Some(method)) = (
            message.get("id").cloned(),
            message.get("method").and_then(Value::as_str),
        ) else {
            continue;
        };

        if args.mode == Mode::Silent {
            continue;
        }

        if args.mode == Mode::Noisy {
            peer_requests += 1;
            send(
                &mut out,
                &notification("notifications/message", json!({"level": "info", "data": "working"})),
            )?;
            send(
                &mut out,
                &notification("notifications/progress", json!({"progress": 1})),
            )?;
            send(
                &mut out,
                &json!({"jsonrpc": "2.0", "id": format!("srv-{peer_requests}"), "method": "ping"}),
            )?;
            // Stale response for an id the client never sent.
            send(&mut out, &result(json!(9999), json!({})))?;
        }

        match method {
            "initialize" => {
                if args.mode == Mode::HandshakeError {
                    send(&mut out, &error(id, -32603, "initialization refused"))?;
                } else {
                    send(&mut out, &result(id, initialize_result()))?;
                }
            }
            "tools/list" => send(&mut out, &result(id, json!({"tools": tool_catalog()})))?,
            "tools/call" => match args.mode {
                Mode::Garbage => {
                    out.write_all(b"not json\n")?;
                    out.flush()?;
                    // Hold stdout open so the client has to time out.
                    thread::sleep(Duration::from_secs(60));
                }
                Mode::Exit => std::process::exit(3),
                Mode::Stall => loop {
                    send(
                        &mut out,
                        &notification("notifications/progress", json!({"progress": 0})),
                    )?;
                    thread::sleep(Duration::from_millis(500));
                },
                Mode::Large => {
                    let text = "x".repeat(args.payload_bytes);
                    send(&mut out, &result(id, text_content(&text, false)))?;
                }
                _ => send(&mut out, &call_tool(id, message.get("params")))?,
            },
            "ping" => send(&mut out, &result(id, json!({})))?,
            other => send(&mut out, &error(id, -32601, &format!("Method '{other}' not found")))?,
        }
    }

    Ok(())
}

fn send(out: &mut impl Write, message: &Value) -> Result<()> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn result(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn notification(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params})
}

fn error(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {"tools": {}},
        "serverInfo": {"name": "mock-mcp-server", "version": env!("CARGO_PKG_VERSION")}
    })
}

fn tool_catalog() -> Value {
    json!([
        {
            "name": "read_file",
            "description": "Read a file from the workspace",
            "inputSchema": {
                "type": "object",
                "properties": {"path": {"type": "string", "description": "File to read"}},
                "required": ["path"]
            }
        },
        {
            "name": "list_directory",
            "description": "List entries in a directory",
            "inputSchema": {
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }
        }
    ])
}

fn text_content(text: &str, is_error: bool) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": is_error})
}

fn call_tool(id: Value, params: Option<&Value>) -> Value {
    let name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let path = params
        .and_then(|p| p.get("arguments"))
        .and_then(|a| a.get("path"))
        .and_then(Value::as_str);

    match (name, path) {
        ("read_file", Some(path)) if path.contains("missing") => {
            let message = format!("ENOENT: no such file or directory, open '{path}'");
            result(id, text_content(&message, true))
        }
        ("read_file", Some(path)) => {
            result(id, text_content(&format!("contents of {path}"), false))
        }
        ("list_directory", Some(path)) => {
            result(id, text_content(&format!("[FILE] {path}/a.txt"), false))
        }
        ("read_file" | "list_directory", None) => {
            error(id, -32602, "Missing required argument: path")
        }
        (other, _) => error(id, -32601, &format!("Tool '{other}' not found")),
    }
}
