//! The three payload-shrinking engines: definition compression (tool/schema
//! descriptions), result compression (`lapc-json-v1`), and delta responses
//! (`lapc-delta-v1`).

mod definitions;
mod delta;
mod result;

pub use definitions::DefinitionCompressor;
pub use delta::{apply_delta, create_delta, DeltaCounters, DeltaOutcome};
pub use result::{
    compress_result, dedupe_redundant_content, decompress_result, CompressionStats, KeyDictionary,
    ResultCompressionOutcome,
};
