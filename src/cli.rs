//! Command-line surface, in the teacher's derive-`clap` style: a small set
//! of global flags plus `--enable-X`/`--disable-X` pairs per optimization,
//! collected into a tri-state [`FlagState`] so "not passed" can be told
//! apart from "explicitly turned off" when folding into the config layers.

use std::path::PathBuf;

use clap::Parser;
use serde_json::{Map, Value};

use crate::config::apply_flag;

/// Transparent line-delimited JSON-RPC proxy in front of an MCP stdio server.
#[derive(Debug, Parser)]
#[command(name = "ultra-lean-mcp-proxy", version, about)]
pub struct Cli {
    /// Path to a JSON config file (see README for the schema).
    #[arg(long, env = "ULTRA_LEAN_MCP_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session id used to namespace cache/history/catalog state.
    #[arg(long)]
    pub session_id: Option<String>,

    /// Print per-request optimization stats to stderr on exit.
    #[arg(long)]
    pub stats: bool,

    /// Raise the default log filter to debug for the proxy's own target.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Log every JSON-RPC message (both directions) at trace level.
    #[arg(long)]
    pub trace_rpc: bool,

    /// Reject unrecognized configuration keys instead of ignoring them.
    #[arg(long)]
    pub strict_config: bool,

    /// Resolve configuration, print it, and exit without spawning the upstream.
    #[arg(long)]
    pub dump_effective_config: bool,

    #[arg(long = "enable-result-compression", conflicts_with = "disable_result_compression")]
    pub enable_result_compression: bool,
    #[arg(long = "disable-result-compression")]
    pub disable_result_compression: bool,

    #[arg(long = "enable-delta-responses", conflicts_with = "disable_delta_responses")]
    pub enable_delta_responses: bool,
    #[arg(long = "disable-delta-responses")]
    pub disable_delta_responses: bool,

    #[arg(long = "enable-lazy-loading", conflicts_with = "disable_lazy_loading")]
    pub enable_lazy_loading: bool,
    #[arg(long = "disable-lazy-loading")]
    pub disable_lazy_loading: bool,

    #[arg(long = "enable-tools-hash-sync", conflicts_with = "disable_tools_hash_sync")]
    pub enable_tools_hash_sync: bool,
    #[arg(long = "disable-tools-hash-sync")]
    pub disable_tools_hash_sync: bool,

    #[arg(long = "enable-caching", conflicts_with = "disable_caching")]
    pub enable_caching: bool,
    #[arg(long = "disable-caching")]
    pub disable_caching: bool,

    /// Lazy tool visibility mode: off|minimal|catalog|search_only.
    #[arg(long)]
    pub lazy_mode: Option<String>,

    /// Overrides `optimizations.caching.ttl_seconds`.
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Overrides `optimizations.delta_responses.min_savings_ratio`.
    #[arg(long)]
    pub delta_min_savings: Option<f64>,

    /// Overrides `optimizations.tools_hash_sync.refresh_interval`.
    #[arg(long)]
    pub tools_hash_refresh_interval: Option<u64>,

    /// Overrides `optimizations.lazy_loading.search_top_k`.
    #[arg(long)]
    pub search_top_k: Option<usize>,

    /// Overrides `optimizations.result_compression.mode`: off|balanced|aggressive.
    #[arg(long)]
    pub result_compression_mode: Option<String>,

    /// The upstream MCP server command to spawn, e.g. `-- npx some-mcp-server`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub upstream: Vec<String>,
}

/// Tri-state read of an `--enable-X`/`--disable-X` style flag: `Unset` means
/// "not passed on this command line", distinct from an explicit `Disabled`,
/// so a lower-precedence config-file or env value isn't clobbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagState {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

fn flag_state(enable: bool, disable: bool) -> FlagState {
    if enable {
        FlagState::Enabled
    } else if disable {
        FlagState::Disabled
    } else {
        FlagState::Unset
    }
}

/// The subset of [`Cli`] that feeds into config resolution, pulled out so
/// the config resolver's unit tests can build overrides without going
/// through `clap`'s argument parser.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub session_id: Option<String>,
    pub stats: bool,
    pub verbose: bool,
    pub trace_rpc: bool,
    pub strict_config: bool,
    pub result_compression: FlagState,
    pub delta_responses: FlagState,
    pub lazy_loading: FlagState,
    pub caching: FlagState,
    pub tools_hash_sync: FlagState,
    pub lazy_mode: Option<String>,
    pub cache_ttl: Option<u64>,
    pub delta_min_savings: Option<f64>,
    pub tools_hash_refresh_interval: Option<u64>,
    pub search_top_k: Option<usize>,
    pub result_compression_mode: Option<String>,
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            session_id: cli.session_id.clone(),
            stats: cli.stats,
            verbose: cli.verbose,
            trace_rpc: cli.trace_rpc,
            strict_config: cli.strict_config,
            result_compression: flag_state(cli.enable_result_compression, cli.disable_result_compression),
            delta_responses: flag_state(cli.enable_delta_responses, cli.disable_delta_responses),
            lazy_loading: flag_state(cli.enable_lazy_loading, cli.disable_lazy_loading),
            caching: flag_state(cli.enable_caching, cli.disable_caching),
            tools_hash_sync: flag_state(cli.enable_tools_hash_sync, cli.disable_tools_hash_sync),
            lazy_mode: cli.lazy_mode.clone(),
            cache_ttl: cli.cache_ttl,
            delta_min_savings: cli.delta_min_savings,
            tools_hash_refresh_interval: cli.tools_hash_refresh_interval,
            search_top_k: cli.search_top_k,
            result_compression_mode: cli.result_compression_mode.clone(),
        }
    }
}

impl CliOverrides {
    /// Builds the JSON patch this command line contributes, applied as the
    /// highest-precedence layer in [`crate::config::resolve`].
    pub fn to_patch(&self) -> Value {
        let mut proxy = Map::new();
        if let Some(session_id) = &self.session_id {
            proxy.insert("session_id".into(), Value::String(session_id.clone()));
        }
        if self.stats {
            proxy.insert("stats".into(), Value::Bool(true));
        }
        if self.trace_rpc {
            proxy.insert("trace_rpc".into(), Value::Bool(true));
        }
        if self.verbose {
            proxy.insert("verbose".into(), Value::Bool(true));
        }
        if self.strict_config {
            proxy.insert("strict_config".into(), Value::Bool(true));
        }

        let mut optimizations = Map::new();

        let mut result_compression = Map::new();
        apply_flag(&mut result_compression, "enabled", self.result_compression);
        if let Some(mode) = &self.result_compression_mode {
            result_compression.insert("mode".into(), Value::String(mode.clone()));
            if mode == "off" {
                result_compression.insert("enabled".into(), Value::Bool(false));
            }
        }
        if !result_compression.is_empty() {
            optimizations.insert("result_compression".into(), Value::Object(result_compression));
        }

        let mut delta_responses = Map::new();
        apply_flag(&mut delta_responses, "enabled", self.delta_responses);
        if let Some(ratio) = self.delta_min_savings {
            delta_responses.insert("min_savings_ratio".into(), Value::from(ratio));
        }
        if !delta_responses.is_empty() {
            optimizations.insert("delta_responses".into(), Value::Object(delta_responses));
        }

        let mut tools_hash_sync = Map::new();
        apply_flag(&mut tools_hash_sync, "enabled", self.tools_hash_sync);
        if let Some(interval) = self.tools_hash_refresh_interval {
            tools_hash_sync.insert("refresh_interval".into(), Value::from(interval));
        }
        if !tools_hash_sync.is_empty() {
            optimizations.insert("tools_hash_sync".into(), Value::Object(tools_hash_sync));
        }

        let mut caching = Map::new();
        apply_flag(&mut caching, "enabled", self.caching);
        if let Some(ttl) = self.cache_ttl {
            caching.insert("ttl_seconds".into(), Value::from(ttl));
        }
        if !caching.is_empty() {
            optimizations.insert("caching".into(), Value::Object(caching));
        }

        let mut lazy_loading = Map::new();
        apply_flag(&mut lazy_loading, "enabled", self.lazy_loading);
        if let Some(top_k) = self.search_top_k {
            lazy_loading.insert("search_top_k".into(), Value::from(top_k as u64));
        }
        if let Some(mode) = &self.lazy_mode {
            lazy_loading.insert("lazy_mode".into(), Value::String(mode.clone()));
            if mode != "off" {
                lazy_loading.insert("enabled".into(), Value::Bool(true));
            }
        }
        if !lazy_loading.is_empty() {
            optimizations.insert("lazy_loading".into(), Value::Object(lazy_loading));
        }

        let mut root = Map::new();
        if !proxy.is_empty() {
            root.insert("proxy".into(), Value::Object(proxy));
        }
        if !optimizations.is_empty() {
            root.insert("optimizations".into(), Value::Object(optimizations));
        }
        Value::Object(root)
    }
}
