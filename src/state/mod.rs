//! In-memory session state: response cache, history, tools-hash scopes,
//! the current tool catalog, and per-feature health tracking.
//!
//! Per spec.md §5, a single mutex around one [`Store`] is sufficient —
//! the two read loops mutate disjoint slices of state most of the time,
//! and nothing here blocks indefinitely.

mod cache;
mod catalog;
mod health;
mod history;
mod tools_hash;

pub use cache::{CacheEntry, ResponseCache};
pub use catalog::ToolCatalog;
pub use health::{HealthOutcome, HealthTracker};
pub use history::HistoryStore;
pub use tools_hash::{ToolsHashScope, ToolsHashStore};

use crate::compress::{DeltaCounters, KeyDictionary};

/// All mutable session state, guarded by one `tokio::sync::Mutex` at the
/// call site (see [`crate::session::Session`]).
#[derive(Default)]
pub struct Store {
    pub cache: ResponseCache,
    pub history: HistoryStore,
    pub tools_hash: ToolsHashStore,
    pub catalog: ToolCatalog,
    pub health: HealthTracker,
    pub key_dictionary: KeyDictionary,
    pub delta_counters: DeltaCounters,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }
}
