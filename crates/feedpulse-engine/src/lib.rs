//! Feed reliability and resource-governance engine for Feedpulse.
//!
//! This crate is the reliability layer between the newsletter product's
//! fetch orchestrator and its many independently-unreliable external feed
//! sources. It ingests per-attempt outcome metrics, maintains a
//! failure/recovery state machine per source, converts raw history into a
//! trust score driving admission control and fetch ordering, and backs all
//! of it with a size- and TTL-bounded byte cache.
//!
//! # Modules
//!
//! - [`history`] - Bounded per-source outcome histories
//! - [`breaker`] - Per-source circuit breakers with transition-on-read recovery
//! - [`scoring`] - Pure reliability scoring and adaptive timeouts
//! - [`admission`] - Diversity-aware ordering and recommended-set selection
//! - [`cache`] - TTL + capacity bounded byte cache with gzip compression
//! - [`engine`] - The [`FeedEngine`] facade wiring the above
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ Fetch orchestrator   │  (out of scope: HTTP, parsing, persistence)
//! └───────┬──────────────┘
//!         │ is_allowed / ordered_sources / adaptive_timeout
//!         ▼
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │  BreakerRegistry     │◄────│     MetricStore      │  record(outcome)
//! └──────────────────────┘     └──────────┬───────────┘
//!                                         │ recent(20)
//!                                         ▼
//!                              ┌──────────────────────┐
//!                              │   scoring (pure)     │
//!                              └──────────────────────┘
//! ┌──────────────────────┐
//! │      ByteCache       │  rss:/ai:/perf: namespaces
//! └──────────────────────┘
//! ```
//!
//! The engine is single-process and best-effort: no persistence across
//! restarts, no cross-process state, no delivery guarantees for metrics.
//! It performs no I/O itself; every operation is a fast, synchronous,
//! lock-protected critical section, so the crate is usable from both sync
//! and async callers without an async runtime of its own.

pub mod admission;
pub mod breaker;
pub mod cache;
pub mod engine;
pub mod error;
pub mod history;
pub mod scoring;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use admission::{CandidateSource, ScoredCandidate};
pub use breaker::{BreakerConfig, BreakerRegistry, BreakerSnapshot, BreakerState};
pub use cache::{ByteCache, CacheConfig, CacheStats};
pub use engine::{EngineConfig, FeedEngine};
pub use history::{MetricStore, OutcomeRecord, MAX_HISTORY};
pub use scoring::{PerformanceSummary, SCORE_WINDOW};
