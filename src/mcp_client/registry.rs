//! Tool catalog: cached `tools/list` results for every connected server.
//!
//! Provides:
//! - Per-server catalog snapshots handed out as shared `Arc` slices
//! - A status per server that separates "zero tools" from "catalog unavailable"
//! - The flattened, server-tagged view used by callers and recovery handlers
//! - Advisory argument checks against a tool's `inputSchema`

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::types::{CatalogEntry, ToolDescriptor};
use crate::validation::ValidationIssue;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Whether a server's cached tool list reflects a successful `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogStatus {
    Available,
    /// Listing failed; the cached list is empty and should not be trusted.
    Unavailable { reason: String },
}

impl CatalogStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

#[derive(Debug, Clone)]
struct ServerCatalog {
    tools: Arc<[ToolDescriptor]>,
    status: CatalogStatus,
}

// ─── ToolCatalog ─────────────────────────────────────────────────────────────

/// Cached tool descriptors keyed by server name.
///
/// Entries are only replaced wholesale, by a fresh `tools/list`.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    servers: BTreeMap<String, ServerCatalog>,
}

impl ToolCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a server's tools with a fresh listing.
    pub fn replace(&mut self, server_name: &str, tools: Vec<ToolDescriptor>) {
        tracing::debug!(server = %server_name, count = tools.len(), "catalog updated");
        self.servers.insert(
            server_name.to_string(),
            ServerCatalog {
                tools: tools.into(),
                status: CatalogStatus::Available,
            },
        );
    }

    /// Cache an empty list for a server whose listing failed.
    pub fn mark_unavailable(&mut self, server_name: &str, reason: &str) {
        self.servers.insert(
            server_name.to_string(),
            ServerCatalog {
                tools: Arc::from(Vec::new()),
                status: CatalogStatus::Unavailable {
                    reason: reason.to_string(),
                },
            },
        );
    }

    /// Drop a server's entry. Returns whether it existed.
    pub fn remove(&mut self, server_name: &str) -> bool {
        self.servers.remove(server_name).is_some()
    }

    pub fn clear(&mut self) {
        self.servers.clear();
    }

    /// Snapshot of one server's tools.
    pub fn tools_for(&self, server_name: &str) -> Option<Arc<[ToolDescriptor]>> {
        self.servers.get(server_name).map(|c| Arc::clone(&c.tools))
    }

    pub fn status(&self, server_name: &str) -> Option<CatalogStatus> {
        self.servers.get(server_name).map(|c| c.status.clone())
    }

    /// Every tool, tagged with its server, ordered by server name.
    pub fn all_entries(&self) -> Vec<CatalogEntry> {
        self.servers
            .iter()
            .flat_map(|(server, catalog)| {
                catalog.tools.iter().map(move |tool| CatalogEntry {
                    server_name: server.clone(),
                    tool: tool.clone(),
                })
            })
            .collect()
    }

    /// Look up a tool on a specific server.
    pub fn get_tool(&self, server_name: &str, tool_name: &str) -> Option<&ToolDescriptor> {
        self.servers
            .get(server_name)?
            .tools
            .iter()
            .find(|t| t.name == tool_name)
    }

    /// First server that advertises `tool_name`.
    pub fn server_for_tool(&self, tool_name: &str) -> Option<&str> {
        self.servers
            .iter()
            .find(|(_, c)| c.tools.iter().any(|t| t.name == tool_name))
            .map(|(server, _)| server.as_str())
    }

    /// Total number of cached tools across servers.
    pub fn len(&self) -> usize {
        self.servers.values().map(|c| c.tools.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every server's tool list, keyed by server name.
    pub fn snapshot(&self) -> BTreeMap<String, Arc<[ToolDescriptor]>> {
        self.servers
            .iter()
            .map(|(server, catalog)| (server.clone(), Arc::clone(&catalog.tools)))
            .collect()
    }

    /// Up to `max_results` tool names on `server_name` that resemble `name`.
    pub fn find_similar(&self, server_name: &str, name: &str, max_results: usize) -> Vec<String> {
        let Some(catalog) = self.servers.get(server_name) else {
            return Vec::new();
        };

        let mut scored: Vec<(String, f64)> = catalog
            .tools
            .iter()
            .map(|t| (t.name.clone(), similarity(name, &t.name)))
            .filter(|(_, score)| *score > 0.3)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);
        scored.into_iter().map(|(name, _)| name).collect()
    }

    // ─── Argument Checks ─────────────────────────────────────────────────

    /// Check an invocation's arguments against the cached `inputSchema`.
    ///
    /// Advisory only: the server remains the authority on what it accepts.
    pub fn validate_arguments(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Vec<ValidationIssue> {
        if !self.servers.contains_key(server_name) {
            return vec![ValidationIssue::error(format!(
                "Server '{server_name}' has no cached catalog"
            ))
            .with_field("server_name")];
        }

        let Some(tool) = self.get_tool(server_name, tool_name) else {
            let mut issue = ValidationIssue::error(format!(
                "Tool '{tool_name}' is not advertised by server '{server_name}'"
            ))
            .with_field("tool_name");
            let similar = self.find_similar(server_name, tool_name, 3);
            if !similar.is_empty() {
                issue = issue.with_suggestion(format!("Did you mean: {}", similar.join(", ")));
            }
            return vec![issue];
        };

        let schema = &tool.input_schema;
        let mut issues = Vec::new();

        for field in &schema.required {
            if !arguments.contains_key(field) {
                issues.push(
                    ValidationIssue::error(format!("Missing required argument '{field}'"))
                        .with_field(field),
                );
            }
        }

        let closed = schema.extra.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, value) in arguments {
            match schema.properties.get(key) {
                Some(property) => {
                    if let Some(expected) = property.property_type.as_ref() {
                        if !matches_json_type(expected, value) {
                            issues.push(
                                ValidationIssue::warning(format!(
                                    "Argument '{key}' should be {}",
                                    describe_type(expected)
                                ))
                                .with_field(key),
                            );
                        }
                    }
                }
                None if closed => issues.push(
                    ValidationIssue::warning(format!("Unexpected argument '{key}'"))
                        .with_field(key),
                ),
                None => {}
            }
        }

        issues
    }
}

/// Whether `value` satisfies a JSON Schema `type` (a name or list of names).
fn matches_json_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

// ─── Edit Distance ──────────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let n = b_bytes.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, &ca) in a_bytes.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_bytes.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalized similarity (0.0 = completely different, 1.0 = identical).
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}
