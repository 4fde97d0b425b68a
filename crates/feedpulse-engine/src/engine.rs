//! The engine facade wiring history, breakers, scoring, and the cache.
//!
//! [`FeedEngine`] is an explicit object with defined construction: no
//! process-wide singletons, so tests (and embedders running several
//! pipelines) can create isolated instances. The fetch orchestrator asks
//! admission questions before attempting a source and reports one outcome
//! per attempt afterwards; everything else is derived on demand.

use std::time::{Duration, Instant};

use metrics::counter;

use crate::admission::{self, CandidateSource, ScoredCandidate};
use crate::breaker::{BreakerConfig, BreakerRegistry, BreakerSnapshot, BreakerState};
use crate::cache::{keys, ttl, ByteCache, CacheConfig};
use crate::history::{MetricStore, OutcomeRecord};
use crate::scoring::{self, PerformanceSummary, SCORE_WINDOW};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Circuit breaker settings shared by all sources.
    pub breaker: BreakerConfig,
    /// Byte cache settings.
    pub cache: CacheConfig,
}

/// Feed reliability and resource-governance engine.
///
/// All operations are fast, synchronous, lock-protected critical sections;
/// the engine performs no I/O of its own and hands advisory values
/// (admission verdicts, fetch order, timeouts) back to the orchestrator.
pub struct FeedEngine {
    store: MetricStore,
    breakers: BreakerRegistry,
    cache: ByteCache,
}

impl FeedEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: MetricStore::new(),
            breakers: BreakerRegistry::new(config.breaker),
            cache: ByteCache::new(config.cache),
        }
    }

    /// Report one fetch attempt's outcome for a source.
    ///
    /// Appends to the source's history, drives its circuit breaker, and
    /// writes a best-effort snapshot of the serialized history into the
    /// cache under `perf:<source_id>` with a 60-minute TTL. Always
    /// succeeds; outcomes are final and accepted even for a source whose
    /// breaker is open.
    pub fn record(
        &self,
        source_id: &str,
        latency_ms: u64,
        success: bool,
        quality: Option<f64>,
        error: Option<String>,
    ) {
        self.record_at(source_id, latency_ms, success, quality, error, Instant::now());
    }

    /// [`record`](Self::record) with an explicit observation time, for
    /// deterministic breaker-recovery tests.
    pub fn record_at(
        &self,
        source_id: &str,
        latency_ms: u64,
        success: bool,
        quality: Option<f64>,
        error: Option<String>,
        now: Instant,
    ) {
        let result = if success { "success" } else { "failure" };
        counter!("feed_outcomes_total", "result" => result).increment(1);

        let record = if success {
            OutcomeRecord::success(latency_ms, quality)
        } else {
            OutcomeRecord::failure(latency_ms, error)
        };
        self.store.record(source_id, record);
        self.breakers.record_outcome(source_id, success, now);

        // Best-effort snapshot; a serialization failure is logged, never
        // surfaced, because the store remains authoritative in-process.
        let history = self.store.full_history(source_id);
        match serde_json::to_vec(&history) {
            Ok(bytes) => {
                self.cache
                    .set_at(&keys::perf(source_id), &bytes, ttl::PERF_SNAPSHOT, now);
            }
            Err(e) => {
                tracing::warn!(source = %source_id, error = %e, "failed to snapshot history");
            }
        }
    }

    /// Whether a fetch attempt against this source is currently permitted.
    ///
    /// Transition-on-read: see [`crate::breaker`]. This check can move an
    /// `Open` breaker past its retry deadline into `HalfOpen`.
    pub fn is_allowed(&self, source_id: &str) -> bool {
        self.breakers.is_allowed(source_id)
    }

    /// [`is_allowed`](Self::is_allowed) with an explicit check time.
    pub fn is_allowed_at(&self, source_id: &str, now: Instant) -> bool {
        self.breakers.is_allowed_at(source_id, now)
    }

    /// Current breaker state for a source (`Closed` if never seen).
    pub fn breaker_state(&self, source_id: &str) -> BreakerState {
        self.breakers.state(source_id)
    }

    /// Reporting snapshot of a source's breaker (`None` if never seen).
    pub fn breaker_snapshot(&self, source_id: &str) -> Option<BreakerSnapshot> {
        self.breakers.snapshot(source_id)
    }

    /// Derived performance summary over the source's recent history.
    ///
    /// A never-seen source gets the documented defaults rather than an
    /// error, so admission remains answerable before any history exists.
    pub fn reliability_summary(&self, source_id: &str) -> PerformanceSummary {
        scoring::summarize(&self.store.recent(source_id, SCORE_WINDOW))
    }

    /// Advisory per-attempt timeout for the orchestrator's own network
    /// call. Always within 4-12 seconds; not enforced by the engine.
    pub fn adaptive_timeout(&self, source_id: &str) -> Duration {
        scoring::adaptive_timeout(&self.reliability_summary(source_id))
    }

    /// Filter and order candidates for fetching.
    ///
    /// Disabled candidates and candidates whose breaker blocks them are
    /// dropped; the rest are ordered by the diversity-aware comparator in
    /// [`crate::admission`].
    pub fn ordered_sources(&self, candidates: &[CandidateSource]) -> Vec<CandidateSource> {
        self.ordered_sources_at(candidates, Instant::now())
    }

    /// [`ordered_sources`](Self::ordered_sources) with an explicit
    /// admission-check time.
    pub fn ordered_sources_at(
        &self,
        candidates: &[CandidateSource],
        now: Instant,
    ) -> Vec<CandidateSource> {
        let scored = self.admitted(candidates, now);
        admission::order(scored).into_iter().map(|c| c.source).collect()
    }

    /// Select up to `max` recommended sources at or above `min_reliability`,
    /// ranked by reliability with the quality multiplier applied.
    pub fn recommended_sources(
        &self,
        candidates: &[CandidateSource],
        max: usize,
        min_reliability: f64,
    ) -> Vec<CandidateSource> {
        self.recommended_sources_at(candidates, max, min_reliability, Instant::now())
    }

    /// [`recommended_sources`](Self::recommended_sources) with an explicit
    /// admission-check time.
    pub fn recommended_sources_at(
        &self,
        candidates: &[CandidateSource],
        max: usize,
        min_reliability: f64,
        now: Instant,
    ) -> Vec<CandidateSource> {
        let scored = self.admitted(candidates, now);
        admission::recommend(scored, max, min_reliability)
            .into_iter()
            .map(|c| c.source)
            .collect()
    }

    /// The engine's byte cache, shared by all consumers. Keys are
    /// namespaced strings (see [`crate::cache::keys`]).
    pub fn cache(&self) -> &ByteCache {
        &self.cache
    }

    /// The raw outcome store, for downstream reporting.
    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    fn admitted(&self, candidates: &[CandidateSource], now: Instant) -> Vec<ScoredCandidate> {
        candidates
            .iter()
            .filter(|c| c.enabled)
            .filter(|c| self.breakers.is_allowed_at(&c.id, now))
            .map(|c| ScoredCandidate {
                source: c.clone(),
                reliability: self.reliability_summary(&c.id).reliability,
            })
            .collect()
    }
}

impl Default for FeedEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
