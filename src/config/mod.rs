//! Configuration resolver: defaults ← config file ← environment ← CLI.
//!
//! The merge itself operates on untyped `serde_json::Value` documents (deep
//! merge: scalar/non-object replaces, object+object recurses key-wise, per
//! spec.md §9 DESIGN NOTES), then the fully-merged document is deserialized
//! into the typed [`ProxyConfig`]/[`OptimizationsConfig`] structs that the
//! rest of the crate works with — the same "typed struct over a dynamic
//! document" shape the teacher's `mcp/config.rs` uses for server
//! definitions.

mod document;
mod merge;

pub use document::{
    AutoDisableConfig, CachingConfig, DefinitionCompressionConfig, DeltaResponsesConfig,
    LazyLoadingConfig, LazyMode, OptimizationsConfig, ProxyConfig, ProxySection,
    ResultCompressionConfig, ResultCompressionMode, ToolsHashSyncConfig,
};
pub use merge::deep_merge;

use std::{collections::BTreeMap, env, path::Path};

use serde_json::Value;

use crate::cli::{CliOverrides, FlagState};
use crate::error::ProxyError;

const ENV_PREFIX: &str = "ULTRA_LEAN_MCP_PROXY_";

/// Fully-resolved configuration: the global defaults plus whichever server
/// profile matched the upstream command line, with per-tool overrides kept
/// alongside so the pipeline can apply them per call.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub proxy: ProxySection,
    pub optimizations: OptimizationsConfig,
    /// Raw per-tool override patches (tool name -> JSON patch), from the
    /// active profile's `tools` map. Applied on demand via
    /// [`ResolvedConfig::optimizations_for_tool`].
    tool_overrides: BTreeMap<String, Value>,
}

impl ResolvedConfig {
    /// Returns optimizations with the named tool's overrides (if any)
    /// deep-merged on top of the profile-resolved defaults.
    pub fn optimizations_for_tool(&self, tool: &str) -> OptimizationsConfig {
        match self.tool_overrides.get(tool) {
            Some(patch) => {
                let base = serde_json::to_value(&self.optimizations)
                    .expect("OptimizationsConfig always serializes");
                let merged = deep_merge(base, patch.clone());
                serde_json::from_value(merged).unwrap_or_else(|_| self.optimizations.clone())
            }
            None => self.optimizations.clone(),
        }
    }

    /// `treat_as_mutating` override for a tool's caching section, if set.
    /// See DESIGN.md Open Question #2.
    pub fn treat_as_mutating_override(&self, tool: &str) -> Option<bool> {
        self.tool_overrides
            .get(tool)?
            .get("caching")?
            .get("treat_as_mutating")?
            .as_bool()
    }

    /// The fully-resolved document, for `--dump-effective-config`.
    pub fn effective_document(&self) -> Value {
        serde_json::json!({
            "proxy": self.proxy,
            "optimizations": self.optimizations,
            "tool_overrides": self.tool_overrides,
        })
    }
}

/// Loads and resolves configuration from an optional config file path, the
/// process environment, and parsed CLI overrides, then selects the server
/// profile whose `match.command_contains` is a substring of the joined
/// upstream command (falling back to just the `default` profile).
pub fn resolve(
    config_path: Option<&Path>,
    cli: &CliOverrides,
    upstream_command: &[String],
) -> Result<ResolvedConfig, ProxyError> {
    let mut doc = document::defaults();

    if let Some(path) = config_path {
        let contents = std::fs::read_to_string(path).map_err(|source| ProxyError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file_doc: Value =
            serde_json::from_str(&contents).map_err(|source| ProxyError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        doc = deep_merge(doc, file_doc);
    }

    doc = deep_merge(doc, env_patch());
    doc = deep_merge(doc, cli.to_patch());

    let strict = doc
        .get("proxy")
        .and_then(|p| p.get("strict_config"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if strict {
        check_strict_config(&doc)?;
    }

    let servers = doc
        .get("servers")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let mut globals = doc.clone();
    if let Value::Object(map) = &mut globals {
        map.remove("servers");
    }

    // The `default` server profile applies globally, before profile
    // selection by command substring.
    if let Some(default_profile) = servers.get("default") {
        let mut patch = default_profile.clone();
        if let Value::Object(map) = &mut patch {
            map.remove("tools");
            map.remove("match");
        }
        globals = deep_merge(globals, patch);
    }

    let joined_command = upstream_command.join(" ");
    let mut active_tools: BTreeMap<String, Value> = BTreeMap::new();
    if let Some(default_tools) = servers.get("default").and_then(|d| d.get("tools")) {
        collect_tools(default_tools, &mut active_tools);
    }

    if let Value::Object(profiles) = &servers {
        for (name, profile) in profiles {
            if name == "default" {
                continue;
            }
            let matches = profile
                .get("match")
                .and_then(|m| m.get("command_contains"))
                .and_then(Value::as_str)
                .map(|needle| !needle.is_empty() && joined_command.contains(needle))
                .unwrap_or(false);
            if !matches {
                continue;
            }

            let mut patch = profile.clone();
            if let Value::Object(map) = &mut patch {
                map.remove("tools");
                map.remove("match");
            }
            globals = deep_merge(globals, patch);

            if let Some(tools) = profile.get("tools") {
                collect_tools(tools, &mut active_tools);
            }
            // Only one profile is active at a time; the first substring
            // match wins (document order of the `servers` table).
            break;
        }
    }

    let proxy: ProxySection = serde_json::from_value(
        globals
            .get("proxy")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
    )
    .map_err(|e| ProxyError::InvalidConfig(format!("proxy section: {e}")))?;

    let optimizations: OptimizationsConfig = serde_json::from_value(
        globals
            .get("optimizations")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
    )
    .map_err(|e| ProxyError::InvalidConfig(format!("optimizations section: {e}")))?;

    validate(&optimizations)?;

    Ok(ResolvedConfig {
        proxy,
        optimizations,
        tool_overrides: active_tools,
    })
}

fn collect_tools(tools: &Value, out: &mut BTreeMap<String, Value>) {
    if let Value::Object(map) = tools {
        for (name, patch) in map {
            out.entry(name.clone())
                .and_modify(|existing| {
                    *existing = deep_merge(existing.clone(), patch.clone());
                })
                .or_insert_with(|| patch.clone());
        }
    }
}

/// Rejects keys the merged document carries that don't exist in
/// `document::defaults()`'s shape, under `--strict-config`/`strict_config:
/// true`. `servers` is exempt at the top level (profile names and tool
/// names are inherently open-ended); everything under `proxy` and
/// `optimizations` must match the known schema.
fn check_strict_config(doc: &Value) -> Result<(), ProxyError> {
    let template = document::defaults();
    if let Value::Object(doc_map) = doc {
        for key in doc_map.keys() {
            if key != "servers" && template.get(key).is_none() {
                return Err(ProxyError::InvalidConfig(format!(
                    "unknown configuration key `{key}` (strict_config is enabled)"
                )));
            }
        }
    }
    if let Some(proxy_doc) = doc.get("proxy") {
        check_known_keys("proxy", proxy_doc, &template["proxy"])?;
    }
    if let Some(opt_doc) = doc.get("optimizations") {
        check_known_keys("optimizations", opt_doc, &template["optimizations"])?;
    }
    Ok(())
}

fn check_known_keys(path: &str, doc: &Value, template: &Value) -> Result<(), ProxyError> {
    let (Value::Object(doc_map), Value::Object(template_map)) = (doc, template) else {
        return Ok(());
    };
    for (key, value) in doc_map {
        if !template_map.contains_key(key) {
            return Err(ProxyError::InvalidConfig(format!(
                "unknown configuration key `{path}.{key}` (strict_config is enabled)"
            )));
        }
        check_known_keys(&format!("{path}.{key}"), value, &template_map[key])?;
    }
    Ok(())
}

fn validate(opt: &OptimizationsConfig) -> Result<(), ProxyError> {
    if !matches!(
        opt.tools_hash_sync.algorithm.as_str(),
        "sha256"
    ) {
        return Err(ProxyError::InvalidConfig(
            "tools_hash_sync.algorithm must be sha256".into(),
        ));
    }
    if opt.caching.ttl_max < opt.caching.ttl_min {
        return Err(ProxyError::InvalidConfig(
            "caching.ttl_max must be >= caching.ttl_min".into(),
        ));
    }
    Ok(())
}

/// Parses `ULTRA_LEAN_MCP_PROXY_<UPPER_SNAKE>` environment variables into a
/// nested JSON patch. Double underscores (`__`) descend a level, e.g.
/// `ULTRA_LEAN_MCP_PROXY_OPTIMIZATIONS__CACHING__TTL_SECONDS=30` becomes
/// `optimizations.caching.ttl_seconds = 30`.
fn env_patch() -> Value {
    let mut root = Value::Object(serde_json::Map::new());
    for (key, value) in env::vars() {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = rest.split("__").map(|p| p.to_lowercase()).collect();
        if path.iter().any(|segment| segment.is_empty()) {
            continue;
        }
        set_path(&mut root, &path, parse_env_value(&value));
    }
    root
}

fn parse_env_value(raw: &str) -> Value {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => return Value::Bool(true),
        "0" | "false" | "no" | "off" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(raw.to_string())
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        return;
    }
    if !root.is_object() {
        *root = Value::Object(serde_json::Map::new());
    }
    let map = root.as_object_mut().expect("just ensured object");
    if path.len() == 1 {
        map.insert(path[0].clone(), value);
        return;
    }
    let child = map
        .entry(path[0].clone())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_path(child, &path[1..], value);
}

/// Applies a parsed `FlagState` to a boolean-shaped patch slot: `Unset`
/// leaves the slot untouched (so a lower-precedence source still wins).
pub fn apply_flag(map: &mut serde_json::Map<String, Value>, key: &str, state: FlagState) {
    match state {
        FlagState::Enabled => {
            map.insert(key.to_string(), Value::Bool(true));
        }
        FlagState::Disabled => {
            map.insert(key.to_string(), Value::Bool(false));
        }
        FlagState::Unset => {}
    }
}
