//! Tracks client requests that have been forwarded upstream and are waiting
//! on a response, so the pipeline can reassemble the context (tool name,
//! arguments, cache key) a bare JSON-RPC response doesn't carry on its own.
//!
//! Grounded on the teacher's `PendingRequests` map in `mcp::jsonrpc`, but
//! keyed on the wire [`RequestId`] rather than a oneshot sender: the proxy
//! doesn't hand the response to a waiting future, it folds it back through
//! [`crate::pipeline`] on the same reader loop that drives everything else.

use std::{
    collections::HashMap,
    time::Instant,
};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::protocol::RequestId;

#[derive(Debug, Clone)]
pub enum PendingKind {
    /// The one and only `initialize` call: the sole response that may carry
    /// the `tools_hash_sync` negotiation marker. Kept distinct from `Other`
    /// so passthrough methods never pick it up by accident.
    Initialize,
    ToolsList,
    ToolsCall {
        tool_name: String,
        arguments: Value,
        cache_key: String,
    },
    Other,
}

#[derive(Debug, Clone)]
pub struct PendingCall {
    pub kind: PendingKind,
    pub started_at: Instant,
}

#[derive(Default)]
pub struct PendingMap {
    inner: Mutex<HashMap<RequestId, PendingCall>>,
}

impl PendingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: RequestId, kind: PendingKind) {
        self.inner.lock().await.insert(
            id,
            PendingCall {
                kind,
                started_at: Instant::now(),
            },
        );
    }

    pub async fn take(&self, id: &RequestId) -> Option<PendingCall> {
        self.inner.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_take_round_trips() {
        let map = PendingMap::new();
        let id = RequestId::Number(1);
        map.insert(id.clone(), PendingKind::ToolsList).await;
        assert_eq!(map.len().await, 1);
        let call = map.take(&id).await.unwrap();
        assert!(matches!(call.kind, PendingKind::ToolsList));
        assert_eq!(map.len().await, 0);
    }

    #[tokio::test]
    async fn take_missing_id_returns_none() {
        let map = PendingMap::new();
        assert!(map.take(&RequestId::Number(99)).await.is_none());
    }
}
