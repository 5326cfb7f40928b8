//! Content memory budget
//!
//! Tracks resident file content across all trees in LRU order with byte-level
//! accounting. The hydration manager consults it after every hydration and
//! evicts the least-recently-used files when the budget is exceeded.
//!
//! Thread-safe via interior mutability using parking_lot::Mutex.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::id::NodeId;

/// Default memory budget (256 MB)
pub const DEFAULT_MEMORY_BUDGET: usize = 256 * 1024 * 1024;

/// Resident file, keyed by tree name and node id.
pub type ContentKey = (String, NodeId);

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    /// Reads of content that was already resident
    pub hits: u64,
    /// Reads that needed a fetch
    pub misses: u64,
    /// Number of files evicted to stay within budget
    pub evictions: u64,
    /// Total bytes evicted
    pub bytes_evicted: usize,
}

impl CacheMetrics {
    /// Get hit rate as a fraction (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct BudgetState {
    current_bytes: usize,
    /// Most recently used files are at the front
    resident: LruCache<ContentKey, usize>,
    metrics: CacheMetrics,
}

/// Byte budget over hydrated content with LRU eviction order.
pub struct ContentBudget {
    max_bytes: usize,
    state: Mutex<BudgetState>,
}

impl ContentBudget {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(BudgetState {
                current_bytes: 0,
                // Eviction is driven by bytes, not entry count
                resident: LruCache::unbounded(),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn current_bytes(&self) -> usize {
        self.state.lock().current_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ContentKey) -> bool {
        self.state.lock().resident.contains(key)
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn record_miss(&self) {
        self.state.lock().metrics.misses += 1;
    }

    /// Mark a file as used. Returns whether it was tracked.
    pub fn touch(&self, key: &ContentKey) -> bool {
        let mut state = self.state.lock();
        if state.resident.get(key).is_some() {
            state.metrics.hits += 1;
            true
        } else {
            false
        }
    }

    /// Track newly resident content as the most recently used entry.
    pub fn record_loaded(&self, key: ContentKey, bytes: usize) {
        let mut state = self.state.lock();
        if let Some(previous) = state.resident.put(key, bytes) {
            state.current_bytes -= previous;
        }
        state.current_bytes += bytes;
    }

    /// Stop tracking a file that was evicted to stay within budget.
    pub fn record_evicted(&self, key: &ContentKey) -> Option<usize> {
        let mut state = self.state.lock();
        let bytes = state.resident.pop(key)?;
        state.current_bytes -= bytes;
        state.metrics.evictions += 1;
        state.metrics.bytes_evicted += bytes;
        Some(bytes)
    }

    /// Stop tracking a file without counting an eviction.
    pub fn forget(&self, key: &ContentKey) -> Option<usize> {
        let mut state = self.state.lock();
        let bytes = state.resident.pop(key)?;
        state.current_bytes -= bytes;
        Some(bytes)
    }

    /// Stop tracking every file of `tree`.
    pub fn forget_tree(&self, tree: &str) {
        let mut state = self.state.lock();
        let keys: Vec<ContentKey> = state
            .resident
            .iter()
            .filter(|((name, _), _)| name == tree)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(bytes) = state.resident.pop(&key) {
                state.current_bytes -= bytes;
            }
        }
    }

    pub fn is_over_budget(&self) -> bool {
        self.state.lock().current_bytes > self.max_bytes
    }

    /// Files to evict to get back within budget, least recently used first.
    ///
    /// `keep` is never a candidate, so content that was just hydrated stays
    /// resident even when it alone exceeds the budget.
    pub fn eviction_candidates(&self, keep: &ContentKey) -> Vec<ContentKey> {
        let state = self.state.lock();
        let mut projected = state.current_bytes;
        let mut candidates = Vec::new();

        // LruCache::iter() yields MRU first, so .rev() gives LRU first
        for (key, bytes) in state.resident.iter().rev() {
            if projected <= self.max_bytes {
                break;
            }
            if key == keep {
                continue;
            }
            candidates.push(key.clone());
            projected = projected.saturating_sub(*bytes);
        }
        candidates
    }
}

impl Default for ContentBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_BUDGET)
    }
}
