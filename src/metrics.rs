//! Runtime statistics surfaced under `_ultra_lean_mcp_proxy.runtime_metrics`
//! when `--stats` is set, and printed to stderr on exit.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

#[derive(Default)]
pub struct RuntimeMetrics {
    upstream_requests: AtomicU64,
    upstream_responses: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl RuntimeMetrics {
    pub fn record_upstream_request(&self, bytes: usize) {
        self.upstream_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_upstream_response(&self, bytes: usize) {
        self.upstream_responses.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Prints the snapshot to stderr, one line of compact JSON. Called at
    /// shutdown when `--stats` is set.
    pub fn print_to_stderr(&self) {
        eprintln!("{}", self.snapshot());
    }

    /// A point-in-time snapshot, suitable for attaching to a response
    /// envelope or printing at shutdown.
    pub fn snapshot(&self) -> serde_json::Value {
        let bytes_sent = self.bytes_sent.load(Ordering::Relaxed);
        let bytes_received = self.bytes_received.load(Ordering::Relaxed);
        json!({
            "upstreamRequests": self.upstream_requests.load(Ordering::Relaxed),
            "upstreamResponses": self.upstream_responses.load(Ordering::Relaxed),
            "bytesSent": bytes_sent,
            "bytesReceived": bytes_received,
            "estimatedTokensSent": (bytes_sent / 4).max(1),
            "estimatedTokensReceived": (bytes_received / 4).max(1),
            "cacheHits": self.cache_hits.load(Ordering::Relaxed),
            "cacheMisses": self.cache_misses.load(Ordering::Relaxed),
        })
    }
}
