use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// `proxy` top-level section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    pub session_id: String,
    pub stats: bool,
    pub trace_rpc: bool,
    pub verbose: bool,
    pub strict_config: bool,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            session_id: "default".to_string(),
            stats: false,
            trace_rpc: false,
            verbose: false,
            strict_config: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LazyMode {
    Off,
    Minimal,
    Catalog,
    SearchOnly,
}

impl Default for LazyMode {
    fn default() -> Self {
        LazyMode::Off
    }
}

impl std::str::FromStr for LazyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(LazyMode::Off),
            "minimal" => Ok(LazyMode::Minimal),
            "catalog" => Ok(LazyMode::Catalog),
            "search_only" => Ok(LazyMode::SearchOnly),
            other => Err(format!("invalid lazy_mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultCompressionMode {
    Off,
    Balanced,
    Aggressive,
}

impl Default for ResultCompressionMode {
    fn default() -> Self {
        ResultCompressionMode::Balanced
    }
}

impl std::str::FromStr for ResultCompressionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ResultCompressionMode::Off),
            "balanced" => Ok(ResultCompressionMode::Balanced),
            "aggressive" => Ok(ResultCompressionMode::Aggressive),
            other => Err(format!("invalid result_compression_mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionCompressionConfig {
    pub enabled: bool,
}

impl Default for DefinitionCompressionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultCompressionConfig {
    pub enabled: bool,
    pub mode: ResultCompressionMode,
    pub min_payload_bytes: usize,
    pub min_compressibility: f64,
    pub columnar_min_rows: usize,
    pub columnar_min_fields: usize,
    pub min_token_savings_abs: usize,
    pub min_token_savings_ratio: f64,
    pub shared_key_dictionary: bool,
    pub key_bootstrap_interval: u64,
}

impl Default for ResultCompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ResultCompressionMode::Balanced,
            min_payload_bytes: 512,
            min_compressibility: 0.3,
            columnar_min_rows: 3,
            columnar_min_fields: 2,
            min_token_savings_abs: 20,
            min_token_savings_ratio: 0.1,
            shared_key_dictionary: true,
            key_bootstrap_interval: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaResponsesConfig {
    pub enabled: bool,
    pub max_patch_bytes: usize,
    pub min_savings_ratio: f64,
    pub max_patch_ratio: f64,
    pub snapshot_interval: u64,
}

impl Default for DeltaResponsesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_patch_bytes: 4096,
            min_savings_ratio: 0.2,
            max_patch_ratio: 0.7,
            snapshot_interval: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LazyLoadingConfig {
    pub enabled: bool,
    pub lazy_mode: LazyMode,
    pub min_tools: usize,
    pub min_tokens: usize,
    pub search_top_k: usize,
    pub min_confidence_score: f64,
    pub fallback_full_on_low_confidence: bool,
}

impl Default for LazyLoadingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lazy_mode: LazyMode::Off,
            min_tools: 20,
            min_tokens: 4000,
            search_top_k: 5,
            min_confidence_score: 2.0,
            fallback_full_on_low_confidence: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsHashSyncConfig {
    pub enabled: bool,
    pub algorithm: String,
    pub refresh_interval: u64,
    pub bind_server_fingerprint: bool,
}

impl Default for ToolsHashSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: "sha256".to_string(),
            refresh_interval: 50,
            bind_server_fingerprint: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachingConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub ttl_min: u64,
    pub ttl_max: u64,
    pub max_entries: usize,
    pub cache_mutating_tools: bool,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 60,
            ttl_min: 15,
            ttl_max: 300,
            max_entries: 500,
            cache_mutating_tools: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDisableConfig {
    pub enabled: bool,
    pub threshold: u32,
    pub cooldown_requests: u32,
}

impl Default for AutoDisableConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 3,
            cooldown_requests: 20,
        }
    }
}

/// `optimizations` top-level section, deep-merged from defaults ← file ←
/// env ← CLI and further specialized per-tool in `ResolvedConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OptimizationsConfig {
    pub definition_compression: DefinitionCompressionConfig,
    pub result_compression: ResultCompressionConfig,
    pub delta_responses: DeltaResponsesConfig,
    pub lazy_loading: LazyLoadingConfig,
    pub tools_hash_sync: ToolsHashSyncConfig,
    pub caching: CachingConfig,
    pub auto_disable: AutoDisableConfig,
}

/// The fully assembled typed view, used only as a convenience alias; the
/// crate mostly works with [`super::ResolvedConfig`] which wraps this plus
/// per-tool overrides.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub proxy: ProxySection,
    pub optimizations: OptimizationsConfig,
}

pub(super) fn defaults() -> Value {
    json!({
        "proxy": {
            "session_id": "default",
            "stats": false,
            "trace_rpc": false,
            "verbose": false,
            "strict_config": false,
        },
        "optimizations": {
            "definition_compression": {"enabled": true},
            "result_compression": {
                "enabled": true,
                "mode": "balanced",
                "min_payload_bytes": 512,
                "min_compressibility": 0.3,
                "columnar_min_rows": 3,
                "columnar_min_fields": 2,
                "min_token_savings_abs": 20,
                "min_token_savings_ratio": 0.1,
                "shared_key_dictionary": true,
                "key_bootstrap_interval": 50,
            },
            "delta_responses": {
                "enabled": true,
                "max_patch_bytes": 4096,
                "min_savings_ratio": 0.2,
                "max_patch_ratio": 0.7,
                "snapshot_interval": 20,
            },
            "lazy_loading": {
                "enabled": false,
                "lazy_mode": "off",
                "min_tools": 20,
                "min_tokens": 4000,
                "search_top_k": 5,
                "min_confidence_score": 2.0,
                "fallback_full_on_low_confidence": false,
            },
            "tools_hash_sync": {
                "enabled": true,
                "algorithm": "sha256",
                "refresh_interval": 50,
                "bind_server_fingerprint": false,
            },
            "caching": {
                "enabled": true,
                "ttl_seconds": 60,
                "ttl_min": 15,
                "ttl_max": 300,
                "max_entries": 500,
                "cache_mutating_tools": false,
            },
            "auto_disable": {
                "enabled": true,
                "threshold": 3,
                "cooldown_requests": 20,
            },
        },
        "servers": {},
    })
}
