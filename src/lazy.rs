//! Lazy tool visibility: replaces the advertised `tools/list` view with a
//! reduced one once the catalog is big enough, and serves a synthetic
//! `ultra_lean_mcp_proxy.search_tools` meta-tool locally so the client can
//! still discover everything that's been hidden.
//!
//! Per DESIGN.md's Open Question decision, the meta-tool is appended in
//! every active mode (`minimal`, `catalog`, `search_only`), not only
//! `search_only` — `search_only` with no meta-tool would leave the client
//! with nothing callable at all.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};

use crate::config::{LazyLoadingConfig, LazyMode};
use crate::json::{clone_json, estimate_tokens};
use crate::protocol::SEARCH_TOOL_NAME;

/// True once the catalog has grown past either size threshold, the
/// trigger for switching on lazy visibility at all.
pub fn should_activate(tools: &[Value], cfg: &LazyLoadingConfig) -> bool {
    if !cfg.enabled || cfg.lazy_mode == LazyMode::Off {
        return false;
    }
    if tools.len() >= cfg.min_tools {
        return true;
    }
    let serialized = serde_json::to_string(tools).unwrap_or_default();
    estimate_tokens(&serialized) >= cfg.min_tokens
}

fn minimal_view(tool: &Value) -> Value {
    let mut properties = Map::new();
    if let Some(props) = tool
        .get("inputSchema")
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
    {
        for (name, schema) in props {
            let ty = schema.get("type").cloned().unwrap_or_else(|| Value::String("string".into()));
            properties.insert(name.clone(), json!({"type": ty}));
        }
    }
    json!({
        "name": tool.get("name").cloned().unwrap_or(Value::Null),
        "description": tool.get("description").cloned().unwrap_or(Value::Null),
        "inputSchema": {"type": "object", "properties": Value::Object(properties)},
    })
}

fn catalog_view(tool: &Value) -> Value {
    json!({
        "name": tool.get("name").cloned().unwrap_or(Value::Null),
        "inputSchema": {"type": "object"},
    })
}

fn search_tool_definition(full_catalog: &[Value], cfg: &LazyLoadingConfig) -> Value {
    let description = match cfg.lazy_mode {
        LazyMode::Catalog => {
            let names: Vec<&str> = full_catalog
                .iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .collect();
            format!(
                "Search the full tool catalog by keyword. Available tools: {}",
                names.join(", ")
            )
        }
        _ => "Search the full tool catalog by keyword; returns matching tool definitions.".to_string(),
    };

    json!({
        "name": SEARCH_TOOL_NAME,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "server": {"type": "string"},
                "top_k": {"type": "integer"},
                "include_schemas": {"type": "boolean"}
            },
            "required": ["query"]
        }
    })
}

/// Builds the tool array to ship to the client: the reduced view for the
/// active mode plus the search meta-tool, or the untouched catalog when
/// lazy visibility hasn't activated.
pub fn visible_tools(full_catalog: &[Value], cfg: &LazyLoadingConfig) -> Vec<Value> {
    if !should_activate(full_catalog, cfg) {
        return full_catalog.to_vec();
    }

    let mut visible: Vec<Value> = match cfg.lazy_mode {
        LazyMode::Off => return full_catalog.to_vec(),
        LazyMode::Minimal => full_catalog.iter().map(minimal_view).collect(),
        LazyMode::Catalog => full_catalog.iter().map(catalog_view).collect(),
        LazyMode::SearchOnly => Vec::new(),
    };
    visible.push(search_tool_definition(full_catalog, cfg));
    visible
}

struct SearchMatch {
    tool: Value,
    score: f64,
}

fn tokenize(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn score_tool(tool: &Value, query_lower: &str, tokens: &[String]) -> f64 {
    let name = tool.get("name").and_then(Value::as_str).unwrap_or("").to_lowercase();
    let description = tool
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    let property_names = tool
        .get("inputSchema")
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
        .to_lowercase();
    let haystack = format!("{name} {description} {property_names}");

    let mut score = 0.0;
    if !query_lower.is_empty() && name.contains(query_lower) {
        score += 4.0;
    }
    for token in tokens {
        if name.contains(token) {
            score += 2.0;
        }
        if description.contains(token) {
            score += 1.0;
        }
        if property_names.contains(token) {
            score += 1.25;
        }
        if haystack.contains(token) {
            score += 0.2;
        }
    }
    score
}

fn search(full_catalog: &[Value], query: &str, top_k: usize) -> Vec<SearchMatch> {
    let query_lower = query.to_lowercase();
    let tokens = tokenize(&query_lower);

    let mut scored: Vec<SearchMatch> = full_catalog
        .iter()
        .map(|tool| SearchMatch {
            tool: clone_json(tool),
            score: score_tool(tool, &query_lower, &tokens),
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}

/// Answers a `tools/call` to the search meta-tool locally. Never forwarded
/// upstream.
pub fn handle_search_call(arguments: &Value, full_catalog: &[Value], cfg: &LazyLoadingConfig) -> Value {
    let query = arguments.get("query").and_then(Value::as_str).unwrap_or("");
    let top_k = arguments
        .get("top_k")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(cfg.search_top_k);
    let include_schemas = arguments.get("include_schemas").and_then(Value::as_bool).unwrap_or(true);

    let matches = search(full_catalog, query, top_k.max(1));
    let best_score = matches.first().map(|m| m.score).unwrap_or(0.0);

    let tools: Vec<Value> = matches
        .iter()
        .map(|m| {
            if include_schemas {
                m.tool.clone()
            } else {
                json!({
                    "name": m.tool.get("name").cloned().unwrap_or(Value::Null),
                    "description": m.tool.get("description").cloned().unwrap_or(Value::Null),
                })
            }
        })
        .collect();

    let mut structured = json!({"matches": tools, "query": query});
    if best_score < cfg.min_confidence_score && cfg.fallback_full_on_low_confidence {
        structured["tools"] = Value::Array(full_catalog.iter().map(clone_json).collect());
    }

    json!({
        "structuredContent": structured,
        "content": [{"type": "text", "text": serde_json::to_string(&structured).unwrap_or_default()}],
    })
}
