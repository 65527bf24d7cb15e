//! Per-format client config builders.
//!
//! Three native shapes exist in the wild:
//!
//! - **standard** — `{"mcpServers": {"<name>": {...}}}`; the document is
//!   replaced wholesale.
//! - **vscode** — servers live under `"mcp": {"servers": {...}}` inside the
//!   editor's settings document; everything else in that document must
//!   survive a sync.
//! - **continue** — servers live under `"mcpServers"` inside a larger config;
//!   the rest of the document must survive.
//!
//! Entries are keyed by server display name. Env and header maps are emitted
//! in sorted key order so generated text is deterministic for a given
//! registry state.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use nexus_core::types::{ConfigFormat, ServerDefinition, Transport};

// ---------------------------------------------------------------------------
// Server entries
// ---------------------------------------------------------------------------

/// One server's entry in a client config.
///
/// Stdio transports serialize as `{"command", "args"?, "env"?}`; SSE
/// transports as `{"url", "transport": "sse", "headers"?}`. Empty args, env,
/// and headers are omitted entirely. Values — including credential
/// references — pass through verbatim.
pub fn transport_entry(server: &ServerDefinition) -> Value {
    match &server.transport {
        Transport::Stdio { command, args, env } => {
            let mut obj = Map::new();
            obj.insert("command".to_string(), json!(command));
            if !args.is_empty() {
                obj.insert("args".to_string(), json!(args));
            }
            if !env.is_empty() {
                let sorted: BTreeMap<&String, &String> = env.iter().collect();
                obj.insert("env".to_string(), json!(sorted));
            }
            Value::Object(obj)
        }
        Transport::Sse { url, headers } => {
            let mut obj = Map::new();
            obj.insert("url".to_string(), json!(url));
            obj.insert("transport".to_string(), json!("sse"));
            if !headers.is_empty() {
                let sorted: BTreeMap<&String, &String> = headers.iter().collect();
                obj.insert("headers".to_string(), json!(sorted));
            }
            Value::Object(obj)
        }
    }
}

fn entry_map(servers: &[&ServerDefinition]) -> Map<String, Value> {
    let mut map = Map::new();
    for server in servers {
        map.insert(server.name.clone(), transport_entry(server));
    }
    map
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Standard-format document: `{"mcpServers": {...}}`. Replaces whatever the
/// client had.
pub fn standard_document(servers: &[&ServerDefinition]) -> Value {
    json!({ "mcpServers": entry_map(servers) })
}

/// VS Code document: server entries under `mcp.servers`, everything else in
/// `existing` preserved. A missing or non-object existing document is
/// replaced with a fresh one.
pub fn vscode_document(servers: &[&ServerDefinition], existing: Option<&Value>) -> Value {
    let entries = entry_map(servers);

    if let Some(existing) = existing {
        if let Some(obj) = existing.as_object() {
            let mut merged = obj.clone();
            let mcp = merged
                .entry("mcp".to_string())
                .or_insert_with(|| json!({}));
            match mcp.as_object_mut() {
                Some(mcp_obj) => {
                    mcp_obj.insert("servers".to_string(), Value::Object(entries));
                }
                // "mcp" held a non-object value; replace it.
                None => {
                    *mcp = json!({ "servers": entries });
                }
            }
            return Value::Object(merged);
        }
    }

    json!({ "mcp": { "servers": entries } })
}

/// Continue document: server entries under `mcpServers`, the rest of
/// `existing` preserved. Writes always use the object form; the reader side
/// accepts the legacy array form too.
pub fn continue_document(servers: &[&ServerDefinition], existing: Option<&Value>) -> Value {
    let entries = entry_map(servers);

    if let Some(existing) = existing {
        if let Some(obj) = existing.as_object() {
            let mut merged = obj.clone();
            merged.insert("mcpServers".to_string(), Value::Object(entries));
            return Value::Object(merged);
        }
    }

    json!({ "mcpServers": entries })
}

/// Build the config document for `format` from the given servers, merging
/// into `existing` where the format calls for it.
pub fn render(format: ConfigFormat, servers: &[&ServerDefinition], existing: Option<&Value>) -> Value {
    match format {
        ConfigFormat::Standard => standard_document(servers),
        ConfigFormat::Vscode => vscode_document(servers, existing),
        ConfigFormat::Continue => continue_document(servers, existing),
    }
}

// ---------------------------------------------------------------------------
// Manual payload
// ---------------------------------------------------------------------------

/// Configuration text for a manual-only target, ready for paste-in.
///
/// Pretty-printed standard format reflecting the passed server set. Values
/// stay verbatim so the user sees exactly what will run.
pub fn manual_config(servers: &[&ServerDefinition]) -> String {
    match serde_json::to_string_pretty(&standard_document(servers)) {
        Ok(text) => text,
        Err(_) => "{}".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
