//! Per-source fetch outcome history.
//!
//! The [`MetricStore`] keeps a bounded, append-only history of
//! [`OutcomeRecord`]s per feed source. Histories are created lazily on the
//! first recorded outcome and live for the life of the process; the bound
//! evicts the oldest record once a source exceeds [`MAX_HISTORY`] entries.
//!
//! The store is purely observational: it never rejects an outcome, and it
//! has no opinion about what the outcomes mean. Scoring ([`crate::scoring`])
//! and admission gating ([`crate::breaker`]) are layered on top.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Maximum number of outcome records retained per source.
pub const MAX_HISTORY: usize = 50;

/// One recorded fetch attempt against a source. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Response latency in milliseconds.
    pub latency_ms: u64,

    /// Whether the attempt succeeded.
    pub success: bool,

    /// Optional content-quality estimate (0-100), when the fetcher could
    /// judge the payload. Absent quality is simply excluded from averaging.
    pub quality: Option<f64>,

    /// Optional error description for failed attempts.
    pub error: Option<String>,

    /// Wall-clock time the outcome was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    /// Build a record for a successful attempt.
    pub fn success(latency_ms: u64, quality: Option<f64>) -> Self {
        Self {
            latency_ms,
            success: true,
            quality,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    /// Build a record for a failed attempt.
    pub fn failure(latency_ms: u64, error: Option<String>) -> Self {
        Self {
            latency_ms,
            success: false,
            quality: None,
            error,
            recorded_at: Utc::now(),
        }
    }
}

/// Bounded per-source outcome histories, keyed by source id.
///
/// Thread-safe: the map is protected by a mutex. Concurrent `record` calls
/// for the same source serialize on the lock, which keeps insertion order
/// (and therefore "most recent N" queries) consistent.
pub struct MetricStore {
    histories: Mutex<HashMap<String, VecDeque<OutcomeRecord>>>,
}

impl MetricStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
        }
    }

    /// Append an outcome to a source's history, evicting the oldest record
    /// if the history exceeds [`MAX_HISTORY`]. Always succeeds; a source
    /// with no prior history is initialized lazily.
    pub fn record(&self, source_id: &str, record: OutcomeRecord) {
        let mut histories = self.histories.lock();
        let history = histories.entry(source_id.to_string()).or_default();

        history.push_back(record);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    /// Clone the most recent `n` records for a source, oldest first.
    ///
    /// Returns an empty vec for a never-seen source.
    pub fn recent(&self, source_id: &str, n: usize) -> Vec<OutcomeRecord> {
        let histories = self.histories.lock();
        match histories.get(source_id) {
            Some(history) => {
                let skip = history.len().saturating_sub(n);
                history.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Clone a source's full retained history, oldest first.
    pub fn full_history(&self, source_id: &str) -> Vec<OutcomeRecord> {
        self.recent(source_id, MAX_HISTORY)
    }

    /// Number of retained records for a source.
    pub fn len(&self, source_id: &str) -> usize {
        self.histories
            .lock()
            .get(source_id)
            .map_or(0, VecDeque::len)
    }

    /// Whether a source has no retained history.
    pub fn is_empty(&self, source_id: &str) -> bool {
        self.len(source_id) == 0
    }

    /// Ids of all sources with at least one recorded outcome.
    pub fn sources(&self) -> Vec<String> {
        self.histories.lock().keys().cloned().collect()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}
