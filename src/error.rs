use std::path::PathBuf;

use thiserror::Error;

/// Errors that can surface from the proxy runtime.
///
/// Per the fail-open design, only transport/spawn/config errors ever reach
/// `main` and cause a non-zero exit; optimization-stage failures are caught
/// inside the interception pipeline and degrade to forwarding the original
/// payload (see `pipeline::on_tools_call_response`).
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream command `{command}` could not be spawned: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upstream process transport error: {0}")]
    Transport(String),
    #[error("failed to read config file `{path}`: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}` as JSON: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
