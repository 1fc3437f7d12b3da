//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, server configuration, and the tagged MCP
//! result structures every response is decoded into.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::errors::McpError;

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Convert a JSON-RPC `error` member into `McpError::ServerError`.
    ///
    /// Returns the (possibly absent) `result` otherwise.
    pub fn into_result(self) -> Result<Option<Value>, McpError> {
        match self.error {
            Some(err) => Err(McpError::ServerError {
                code: err.code,
                message: err.message,
                data: err.data,
            }),
            None => Ok(self.result),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 notification (no `id`, no reply expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

// ─── MCP Protocol Constants ──────────────────────────────────────────────────

/// Protocol version announced in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP method names used by the client.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PING: &str = "ping";
}

// ─── Server Configuration ────────────────────────────────────────────────────

/// How the client reaches a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Child process speaking newline-delimited JSON-RPC over stdio.
    Stdio,
    /// Server-sent events (reserved).
    Sse,
    /// Streamable HTTP (reserved).
    Http,
}

impl Transport {
    /// Parse a transport name case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "stdio" => Some(Self::Stdio),
            "sse" => Some(Self::Sse),
            "http" => Some(Self::Http),
            _ => None,
        }
    }

    /// The lower-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server entry as written in a config file.
///
/// Every field is optional so the validator can report exactly what is
/// missing. Convert to a [`ServerConfig`] with [`ServerConfig::from_spec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

/// A validated tool server configuration.
///
/// STDIO configs always carry a non-empty `command`; SSE/HTTP configs always
/// carry a non-empty `url`. Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    name: String,
    transport: Transport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    env: HashMap<String, String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
}

impl ServerConfig {
    /// Build a STDIO config from an executable and its argv.
    pub fn stdio(name: &str, command: Vec<String>) -> Result<Self, McpError> {
        Self::build(name, Transport::Stdio, command, None)
    }

    /// Build an SSE or HTTP config. These are accepted but cannot connect yet.
    pub fn remote(name: &str, transport: Transport, url: &str) -> Result<Self, McpError> {
        Self::build(name, transport, Vec::new(), Some(url.to_string()))
    }

    /// Convert a loosely-typed file entry into a validated config.
    ///
    /// `name` is the map key the entry was stored under; it wins over any
    /// `name` field inside the entry.
    pub fn from_spec(name: &str, spec: &ServerSpec) -> Result<Self, McpError> {
        let transport_name = spec.transport.as_deref().unwrap_or("stdio");
        let transport = Transport::parse(transport_name).ok_or_else(|| McpError::ConfigError {
            reason: format!("server '{name}': invalid transport '{transport_name}'"),
        })?;

        let mut config = Self::build(
            name,
            transport,
            spec.command.clone().unwrap_or_default(),
            spec.url.clone(),
        )?;
        config.env = spec.env.clone().unwrap_or_default();
        config.headers = spec.headers.clone().unwrap_or_default();
        config.args = spec.args.clone().unwrap_or_default();
        Ok(config)
    }

    fn build(
        name: &str,
        transport: Transport,
        command: Vec<String>,
        url: Option<String>,
    ) -> Result<Self, McpError> {
        if name.trim().is_empty() {
            return Err(McpError::ConfigError {
                reason: "server name must not be empty".into(),
            });
        }

        match transport {
            Transport::Stdio => {
                if command.first().map_or(true, |program| program.trim().is_empty()) {
                    return Err(McpError::ConfigError {
                        reason: format!("server '{name}': STDIO transport requires command"),
                    });
                }
            }
            Transport::Sse | Transport::Http => {
                if url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(McpError::ConfigError {
                        reason: format!("server '{name}': {transport} transport requires url"),
                    });
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            transport,
            command,
            url,
            env: HashMap::new(),
            headers: HashMap::new(),
            args: Vec::new(),
        })
    }

    /// Add an environment variable for the spawned process.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Extra arguments appended after `command`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The program to execute and the full argument list (`command[1..] + args`).
    pub fn program_and_args(&self) -> Option<(&str, Vec<&str>)> {
        let (program, rest) = self.command.split_first()?;
        let args = rest
            .iter()
            .chain(self.args.iter())
            .map(String::as_str)
            .collect();
        Some((program.as_str(), args))
    }

    /// The loosely-typed form, suitable for writing back to a config file.
    pub fn to_spec(&self) -> ServerSpec {
        let non_empty_map = |m: &HashMap<String, String>| (!m.is_empty()).then(|| m.clone());
        ServerSpec {
            name: Some(self.name.clone()),
            transport: Some(self.transport.as_str().to_string()),
            command: (!self.command.is_empty()).then(|| self.command.clone()),
            url: self.url.clone(),
            env: non_empty_map(&self.env),
            headers: non_empty_map(&self.headers),
            args: (!self.args.is_empty()).then(|| self.args.clone()),
        }
    }
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// A tool advertised by a server in its `tools/list` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: InputSchema,
}

/// JSON-Schema-like description of a tool's parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single parameter in an [`InputSchema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// Usually a string, but JSON Schema also allows an array of types.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded `tools/list` result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolsResult {
    pub tools: Vec<ToolDescriptor>,
    pub next_cursor: Option<String>,
}

impl ToolsResult {
    /// Decode a `tools/list` result, tolerating peers that omit or mangle it.
    ///
    /// A missing `result`, a non-object result, or a missing `tools` array all
    /// yield an empty list. Individual malformed descriptors are skipped.
    pub fn from_result(result: Option<Value>) -> Self {
        let Some(Value::Object(mut obj)) = result else {
            return Self::default();
        };

        let tools = match obj.remove("tools") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<ToolDescriptor>(item) {
                    Ok(tool) => Some(tool),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed tool descriptor");
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let next_cursor = obj
            .get("nextCursor")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self { tools, next_cursor }
    }
}

/// One block of a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentItem {
    /// A plain text block.
    pub fn text(text: &str) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.to_string()),
            data: None,
            mime_type: None,
            extra: Map::new(),
        }
    }

    /// Render the block as display text.
    fn render(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        if let Some(data) = &self.data {
            let mime = self.mime_type.as_deref().unwrap_or("application/octet-stream");
            return format!("[{} {mime}, {} bytes]", self.kind, data.len());
        }
        if self.extra.is_empty() {
            format!("[{}]", self.kind)
        } else {
            Value::Object(self.extra.clone()).to_string()
        }
    }
}

/// Decoded `tools/call` result. Unknown members are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CallToolResult {
    /// Conservative stand-in for a response that carried no `result`.
    pub fn missing_result() -> Self {
        Self {
            content: Vec::new(),
            is_error: true,
            extra: Map::new(),
        }
    }

    /// All content blocks rendered and joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(ContentItem::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeResult {
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ─── Invocation Types ────────────────────────────────────────────────────────

/// A request to run one tool on one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub server_name: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(server_name: &str, tool_name: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            arguments: Map::new(),
        }
    }

    pub fn with_argument(mut self, key: &str, value: Value) -> Self {
        self.arguments.insert(key.to_string(), value);
        self
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Outcome of a tool invocation as seen by the caller.
///
/// Failures are data: `is_error` is set and `content` explains what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: None,
        }
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.into());
        self
    }
}

impl From<CallToolResult> for ToolResult {
    fn from(result: CallToolResult) -> Self {
        Self {
            content: result.text(),
            is_error: result.is_error,
            metadata: None,
        }
    }
}

/// A catalog entry annotated with the server that owns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub server_name: String,
    #[serde(flatten)]
    pub tool: ToolDescriptor,
}

// ─── JSON-RPC Error Codes ────────────────────────────────────────────────────

/// JSON-RPC error codes the client emits or inspects.
pub mod error_codes {
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_request_response_pair_survives_serialization() {
        let req = JsonRpcRequest::new(
            7,
            "tools/call",
            Some(json!({"name": "read_file", "arguments": {"path": "/tmp/a.txt"}})),
        );
        let parsed: JsonRpcRequest =
            serde_json::from_str(&serde_json::to_string(&req).unwrap()).unwrap();
        assert_eq!(parsed, req);

        let ok = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 7,
            result: Some(json!({"content": [{"type": "text", "text": "hi"}]})),
            error: None,
        };
        let parsed: JsonRpcResponse =
            serde_json::from_str(&serde_json::to_string(&ok).unwrap()).unwrap();
        assert_eq!(parsed, ok);

        let failed = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 8,
            result: None,
            error: Some(JsonRpcError {
                code: error_codes::METHOD_NOT_FOUND,
                message: "Method not found".into(),
                data: Some(json!({"method": "nope"})),
            }),
        };
        let parsed: JsonRpcResponse =
            serde_json::from_str(&serde_json::to_string(&failed).unwrap()).unwrap();
        assert_eq!(parsed, failed);
    }

    #[test]
    fn test_into_result_surfaces_server_error() {
        let json = r#"{"jsonrpc": "2.0", "id": 2, "error": {"code": -32601, "message": "Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        match resp.into_result().unwrap_err() {
            McpError::ServerError { code, message, .. } => {
                assert_eq!(code, error_codes::METHOD_NOT_FOUND);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_stdio_config_requires_command() {
        assert!(ServerConfig::stdio("fs", vec![]).is_err());
        assert!(ServerConfig::stdio("fs", vec!["".into()]).is_err());
        let config = ServerConfig::stdio("fs", vec!["python".into(), "-m".into(), "srv".into()])
            .unwrap()
            .with_env("API_KEY", "secret");
        assert_eq!(config.transport(), Transport::Stdio);
        assert_eq!(config.url(), None);
        assert_eq!(config.env().get("API_KEY").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_remote_config_requires_url() {
        assert!(ServerConfig::remote("web", Transport::Http, "").is_err());
        let config = ServerConfig::remote("web", Transport::Sse, "http://localhost:8080").unwrap();
        assert_eq!(config.url(), Some("http://localhost:8080"));
        assert!(config.command().is_empty());
    }

    #[test]
    fn test_from_spec_rejects_unknown_transport() {
        let spec = ServerSpec {
            transport: Some("carrier-pigeon".into()),
            command: Some(vec!["x".into()]),
            ..ServerSpec::default()
        };
        let err = ServerConfig::from_spec("odd", &spec).unwrap_err();
        assert!(err.to_string().contains("invalid transport"));
    }

    #[test]
    fn test_program_and_args_appends_extra_args() {
        let config = ServerConfig::stdio("fs", vec!["npx".into(), "-y".into()])
            .unwrap()
            .with_args(vec!["/workspace".into()]);
        let (program, args) = config.program_and_args().unwrap();
        assert_eq!(program, "npx");
        assert_eq!(args, vec!["-y", "/workspace"]);
    }

    #[test]
    fn test_tools_result_tolerates_missing_shape() {
        assert!(ToolsResult::from_result(None).tools.is_empty());
        assert!(ToolsResult::from_result(Some(json!("nope"))).tools.is_empty());
        assert!(ToolsResult::from_result(Some(json!({"other": 1}))).tools.is_empty());
    }

    #[test]
    fn test_tools_result_decodes_schema() {
        let result = json!({
            "tools": [
                {
                    "name": "read_file",
                    "description": "Read a file",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"path": {"type": "string", "description": "File path"}},
                        "required": ["path"]
                    }
                },
                {"description": "no name, skipped"}
            ],
            "nextCursor": "page-2"
        });
        let decoded = ToolsResult::from_result(Some(result));
        assert_eq!(decoded.tools.len(), 1);
        let tool = &decoded.tools[0];
        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.input_schema.required, vec!["path"]);
        assert_eq!(
            tool.input_schema.properties["path"].description.as_deref(),
            Some("File path")
        );
        assert_eq!(decoded.next_cursor.as_deref(), Some("page-2"));
    }

    #[test]
    fn test_tool_description_null_defaults_to_empty() {
        let tool: ToolDescriptor =
            serde_json::from_value(json!({"name": "t", "description": null})).unwrap();
        assert_eq!(tool.description, "");
    }

    #[test]
    fn test_call_tool_result_keeps_unknown_members() {
        let value = json!({
            "content": [{"type": "text", "text": "line one"}, {"type": "image", "data": "AAAA", "mimeType": "image/png"}],
            "isError": false,
            "structuredContent": {"ok": true}
        });
        let result: CallToolResult = serde_json::from_value(value.clone()).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.extra["structuredContent"], json!({"ok": true}));
        assert_eq!(serde_json::to_value(&result).unwrap(), value);
        assert_eq!(result.text(), "line one\n[image image/png, 4 bytes]");
    }

    #[test]
    fn test_missing_result_is_error() {
        let result = CallToolResult::missing_result();
        assert!(result.is_error);
        assert!(result.content.is_empty());
    }

    #[test]
    fn test_catalog_entry_flattens_tool() {
        let entry = CatalogEntry {
            server_name: "fs".into(),
            tool: ToolDescriptor {
                name: "read_file".into(),
                description: "Read".into(),
                input_schema: InputSchema::default(),
            },
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["server_name"], "fs");
        assert_eq!(value["name"], "read_file");
    }
}
