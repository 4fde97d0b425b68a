//! Per-source circuit breakers.
//!
//! Each feed source gets its own three-state breaker gating whether further
//! fetch attempts are permitted:
//!
//! ```text
//! Closed → Open:       failure_threshold consecutive failures
//! Open → Half-Open:    recovery timeout elapsed (transition-on-read)
//! Half-Open → Closed:  success_threshold consecutive successes
//! Half-Open → Open:    any failure
//! ```
//!
//! # Transition-on-read
//!
//! There is no timer driving `Open → HalfOpen`. The transition happens as a
//! side effect of [`BreakerRegistry::is_allowed_at`]: the first admission
//! check after the retry deadline moves the breaker to `HalfOpen` and
//! returns `true`. Callers must understand that checking admission can
//! itself advance the state machine; this is the contract, not a quirk.
//!
//! Outcomes are always accepted, even for a source whose breaker is `Open` —
//! a reported outcome is final, and the orchestrator may have had a fetch in
//! flight when the breaker tripped. While the breaker is still blocked such
//! an outcome is absorbed as a no-op; at or after the retry deadline it acts
//! as the recovery probe.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;

/// Configuration for per-source circuit breakers.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures (while `Closed`) before the breaker opens.
    pub failure_threshold: u32,

    /// Consecutive successes (while `HalfOpen`) before the breaker closes.
    pub success_threshold: u32,

    /// How long an `Open` breaker blocks attempts before permitting a probe.
    pub recovery_timeout: Duration,

    /// Advisory window for counting failures.
    ///
    /// Kept for compatibility with the upstream configuration surface, but
    /// not enforced: the breaker counts *consecutive* failures without
    /// pruning by elapsed time. A single success resets the count either way.
    pub failure_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(15 * 60),
            failure_window: Duration::from_secs(30 * 60),
        }
    }
}

/// Current state of one source's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation; attempts pass through.
    Closed,
    /// Source assumed down; attempts are blocked until the retry deadline.
    Open,
    /// Probing recovery; a limited run of attempts decides the next state.
    HalfOpen,
}

/// Point-in-time view of one source's breaker, for downstream reporting.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures observed.
    pub failure_count: u32,
    /// Consecutive probe successes; meaningful only while `HalfOpen`.
    pub success_count: u32,
    /// When the most recent failure was recorded.
    pub last_failure_at: Option<Instant>,
    /// When an `Open` breaker next permits a probe.
    pub next_retry_at: Option<Instant>,
}

/// Per-source breaker record.
#[derive(Debug)]
struct Breaker {
    state: BreakerState,
    failure_count: u32,
    /// Consecutive probe successes; meaningful only while `HalfOpen`.
    success_count: u32,
    last_failure_at: Option<Instant>,
    /// Set only on entering `Open`, always `now + recovery_timeout`.
    next_retry_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            next_retry_at: None,
        }
    }
}

/// Registry of circuit breakers, one per source id.
///
/// Breakers are created lazily on first use and live for the life of the
/// process. All state is behind a mutex; every operation is a short
/// synchronous critical section.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry with the given configuration.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Feed one outcome into a source's breaker.
    ///
    /// Total over its inputs: never fails, lazily creating the breaker for
    /// an unknown source. `now` is the observation time used for retry
    /// deadlines; production callers pass `Instant::now()`.
    pub fn record_outcome(&self, source_id: &str, success: bool, now: Instant) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers
            .entry(source_id.to_string())
            .or_insert_with(Breaker::new);

        // An outcome arriving after the retry deadline counts as a probe:
        // move to HalfOpen first, then apply it below.
        if breaker.state == BreakerState::Open {
            match breaker.next_retry_at {
                Some(deadline) if now >= deadline => {
                    breaker.state = BreakerState::HalfOpen;
                    breaker.success_count = 0;
                    counter!("feed_breaker_transitions_total", "to" => "half_open").increment(1);
                }
                _ => {
                    // Still blocked: a straggling outcome is absorbed as a
                    // no-op until a probe is permitted.
                    return;
                }
            }
        }

        match breaker.state {
            BreakerState::Closed => {
                if success {
                    breaker.failure_count = 0;
                } else {
                    breaker.failure_count += 1;
                    breaker.last_failure_at = Some(now);
                    if breaker.failure_count >= self.config.failure_threshold {
                        self.trip_open(source_id, breaker, now);
                    }
                }
            }
            BreakerState::HalfOpen => {
                if success {
                    breaker.success_count += 1;
                    if breaker.success_count >= self.config.success_threshold {
                        breaker.state = BreakerState::Closed;
                        breaker.failure_count = 0;
                        breaker.success_count = 0;
                        counter!("feed_breaker_transitions_total", "to" => "closed").increment(1);
                        tracing::info!(source = %source_id, "circuit breaker closed after recovery");
                    }
                } else {
                    // One failed probe is enough to re-open.
                    breaker.failure_count += 1;
                    breaker.success_count = 0;
                    breaker.last_failure_at = Some(now);
                    self.trip_open(source_id, breaker, now);
                }
            }
            BreakerState::Open => unreachable!("Open handled above"),
        }
    }

    /// Whether a fetch attempt against this source is currently permitted.
    ///
    /// `Closed` and `HalfOpen` are always permitted; `Open` is blocked until
    /// the retry deadline, at which point this check itself performs the
    /// `Open → HalfOpen` transition and permits the attempt (see the module
    /// docs on transition-on-read). An unknown source is permitted.
    pub fn is_allowed_at(&self, source_id: &str, now: Instant) -> bool {
        let mut breakers = self.breakers.lock();
        let Some(breaker) = breakers.get_mut(source_id) else {
            return true;
        };

        match breaker.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => match breaker.next_retry_at {
                Some(deadline) if now >= deadline => {
                    breaker.state = BreakerState::HalfOpen;
                    breaker.success_count = 0;
                    counter!("feed_breaker_transitions_total", "to" => "half_open").increment(1);
                    tracing::debug!(source = %source_id, "circuit breaker half-open, permitting probe");
                    true
                }
                _ => false,
            },
        }
    }

    /// Convenience wrapper over [`is_allowed_at`](Self::is_allowed_at) using
    /// the current time.
    pub fn is_allowed(&self, source_id: &str) -> bool {
        self.is_allowed_at(source_id, Instant::now())
    }

    /// Current state of a source's breaker. Unknown sources report `Closed`.
    pub fn state(&self, source_id: &str) -> BreakerState {
        self.breakers
            .lock()
            .get(source_id)
            .map_or(BreakerState::Closed, |b| b.state)
    }

    /// Snapshot a source's breaker for reporting. `None` for a never-seen
    /// source (which is equivalent to a fresh `Closed` breaker).
    pub fn snapshot(&self, source_id: &str) -> Option<BreakerSnapshot> {
        self.breakers.lock().get(source_id).map(|b| BreakerSnapshot {
            state: b.state,
            failure_count: b.failure_count,
            success_count: b.success_count,
            last_failure_at: b.last_failure_at,
            next_retry_at: b.next_retry_at,
        })
    }

    fn trip_open(&self, source_id: &str, breaker: &mut Breaker, now: Instant) {
        breaker.state = BreakerState::Open;
        breaker.next_retry_at = Some(now + self.config.recovery_timeout);
        counter!("feed_breaker_transitions_total", "to" => "open").increment(1);
        tracing::warn!(
            source = %source_id,
            consecutive_failures = breaker.failure_count,
            retry_in_secs = self.config.recovery_timeout.as_secs(),
            "circuit breaker opened"
        );
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
