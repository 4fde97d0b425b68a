//! Source reliability scoring.
//!
//! This module turns a source's recent outcome history into a composite
//! 0-100 reliability score blending:
//! - Response latency (successful attempts only)
//! - Success rate over the scoring window
//! - Content quality, when fetchers report it
//!
//! Everything here is a pure, total function: a never-seen source gets
//! documented defaults rather than an error, because admission decisions
//! must be answerable before any history exists.

use std::time::Duration;

use serde::Serialize;

use crate::history::OutcomeRecord;

/// Number of most-recent outcomes considered when scoring.
pub const SCORE_WINDOW: usize = 20;

/// Weight for the latency component in the composite score (0.0 - 1.0).
const LATENCY_WEIGHT: f64 = 0.3;

/// Weight for the success-rate component in the composite score (0.0 - 1.0).
const SUCCESS_WEIGHT: f64 = 0.5;

/// Weight for the content-quality component in the composite score (0.0 - 1.0).
const QUALITY_WEIGHT: f64 = 0.2;

/// Assumed average latency (ms) for a source with no history.
const DEFAULT_LATENCY_MS: f64 = 5000.0;

/// Penalty latency (ms) when the window contains no successful attempt.
const NO_SUCCESS_LATENCY_MS: f64 = 10_000.0;

/// Assumed success rate for a source with no history.
const DEFAULT_SUCCESS_RATE: f64 = 0.8;

/// Assumed content quality when no successful record reported one.
const DEFAULT_QUALITY: f64 = 70.0;

/// Reliability assigned to a source with no history.
const DEFAULT_RELIABILITY: f64 = 70.0;

/// Base adaptive timeout (ms).
const TIMEOUT_BASE_MS: u64 = 6000;

/// Timeout (ms) for sources averaging slower than [`TIMEOUT_SLOW_LATENCY_MS`].
const TIMEOUT_SLOW_MS: u64 = 10_000;

/// Timeout (ms) for sources averaging faster than [`TIMEOUT_FAST_LATENCY_MS`].
const TIMEOUT_FAST_MS: u64 = 4000;

/// Average latency (ms) above which the slow timeout applies.
const TIMEOUT_SLOW_LATENCY_MS: f64 = 8000.0;

/// Average latency (ms) below which the fast timeout applies.
const TIMEOUT_FAST_LATENCY_MS: f64 = 3000.0;

/// Extra headroom (ms) granted to low-reliability sources.
const TIMEOUT_UNRELIABLE_BONUS_MS: u64 = 2000;

/// Hard ceiling (ms) on the adaptive timeout.
const TIMEOUT_MAX_MS: u64 = 12_000;

/// Reliability below which the unreliable-source headroom applies.
const UNRELIABLE_THRESHOLD: f64 = 50.0;

/// Derived performance view of one source. Recomputed on demand from the
/// outcome history; never stored independently of the byte cache snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    /// Mean latency (ms) of successful attempts in the window.
    pub average_response_time_ms: f64,
    /// Successes / attempts over the window, rounded to 2 decimals.
    pub success_rate: f64,
    /// Mean reported content quality of successful attempts (0-100).
    pub content_quality: f64,
    /// Composite reliability score in [0, 100].
    pub reliability: f64,
}

impl Default for PerformanceSummary {
    /// Defaults reported for a source with no recorded history.
    fn default() -> Self {
        Self {
            average_response_time_ms: DEFAULT_LATENCY_MS,
            success_rate: DEFAULT_SUCCESS_RATE,
            content_quality: DEFAULT_QUALITY,
            reliability: DEFAULT_RELIABILITY,
        }
    }
}

/// Summarize the most recent [`SCORE_WINDOW`] records of a history slice
/// (oldest first). An empty slice yields [`PerformanceSummary::default`].
pub fn summarize(records: &[OutcomeRecord]) -> PerformanceSummary {
    if records.is_empty() {
        return PerformanceSummary::default();
    }

    let skip = records.len().saturating_sub(SCORE_WINDOW);
    let window = &records[skip..];

    let successes: Vec<&OutcomeRecord> = window.iter().filter(|r| r.success).collect();

    let average_response_time_ms = if successes.is_empty() {
        NO_SUCCESS_LATENCY_MS
    } else {
        successes.iter().map(|r| r.latency_ms as f64).sum::<f64>() / successes.len() as f64
    };

    let raw_rate = successes.len() as f64 / window.len() as f64;
    let success_rate = (raw_rate * 100.0).round() / 100.0;

    let qualities: Vec<f64> = successes.iter().filter_map(|r| r.quality).collect();
    let content_quality = if qualities.is_empty() {
        DEFAULT_QUALITY
    } else {
        qualities.iter().sum::<f64>() / qualities.len() as f64
    };

    let latency_component = (100.0 - average_response_time_ms / 100.0).max(0.0);
    let raw_score = LATENCY_WEIGHT * latency_component
        + SUCCESS_WEIGHT * success_rate * 100.0
        + QUALITY_WEIGHT * content_quality.min(100.0);

    PerformanceSummary {
        average_response_time_ms,
        success_rate,
        content_quality,
        reliability: raw_score.round().clamp(0.0, 100.0),
    }
}

/// Advisory per-attempt timeout for a source, derived from its summary.
///
/// Slow sources get more headroom, proven-fast sources less, and
/// low-reliability sources a little extra so one marginal timeout doesn't
/// push them into the breaker. Always within 4-12 seconds; the engine hands
/// this back to the orchestrator and does not enforce it itself.
pub fn adaptive_timeout(summary: &PerformanceSummary) -> Duration {
    let mut timeout_ms = if summary.average_response_time_ms > TIMEOUT_SLOW_LATENCY_MS {
        TIMEOUT_SLOW_MS
    } else if summary.average_response_time_ms < TIMEOUT_FAST_LATENCY_MS {
        TIMEOUT_FAST_MS
    } else {
        TIMEOUT_BASE_MS
    };

    if summary.reliability < UNRELIABLE_THRESHOLD {
        timeout_ms = (timeout_ms + TIMEOUT_UNRELIABLE_BONUS_MS).min(TIMEOUT_MAX_MS);
    }

    Duration::from_millis(timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(latency_ms: u64, quality: Option<f64>) -> OutcomeRecord {
        OutcomeRecord::success(latency_ms, quality)
    }

    fn failure(latency_ms: u64) -> OutcomeRecord {
        OutcomeRecord::failure(latency_ms, Some("connect timeout".into()))
    }

    #[test]
    fn test_empty_history_returns_defaults() {
        let summary = summarize(&[]);
        assert!((summary.average_response_time_ms - 5000.0).abs() < f64::EPSILON);
        assert!((summary.success_rate - 0.8).abs() < f64::EPSILON);
        assert!((summary.content_quality - 70.0).abs() < f64::EPSILON);
        assert!((summary.reliability - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_success_fast_feed() {
        let records: Vec<_> = (0..10).map(|_| success(1000, Some(90.0))).collect();
        let summary = summarize(&records);

        assert!((summary.average_response_time_ms - 1000.0).abs() < 0.001);
        assert!((summary.success_rate - 1.0).abs() < 0.001);
        assert!((summary.content_quality - 90.0).abs() < 0.001);
        // 0.3 * (100 - 10) + 0.5 * 100 + 0.2 * 90 = 27 + 50 + 18 = 95
        assert!((summary.reliability - 95.0).abs() < 0.001);
    }

    #[test]
    fn test_no_success_in_window() {
        let records: Vec<_> = (0..5).map(|_| failure(2000)).collect();
        let summary = summarize(&records);

        assert!((summary.average_response_time_ms - 10_000.0).abs() < 0.001);
        assert!((summary.success_rate - 0.0).abs() < 0.001);
        // No successful record carries a quality, so the default applies.
        assert!((summary.content_quality - 70.0).abs() < 0.001);
        // 0.3 * 0 + 0.5 * 0 + 0.2 * 70 = 14
        assert!((summary.reliability - 14.0).abs() < 0.001);
    }

    #[test]
    fn test_only_last_window_considered() {
        // 30 failures followed by 20 successes: the 20-record window sees
        // only successes.
        let mut records: Vec<_> = (0..30).map(|_| failure(1000)).collect();
        records.extend((0..20).map(|_| success(1000, None)));

        let summary = summarize(&records);
        assert!((summary.success_rate - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_quality_less_successes_use_default() {
        let records = vec![success(1000, None), success(1000, None)];
        let summary = summarize(&records);
        assert!((summary.content_quality - 70.0).abs() < 0.001);
    }

    #[test]
    fn test_success_rate_rounded_to_two_decimals() {
        // 1 success out of 3 = 0.333... -> 0.33
        let records = vec![success(1000, None), failure(1000), failure(1000)];
        let summary = summarize(&records);
        assert!((summary.success_rate - 0.33).abs() < 0.001);
    }

    #[test]
    fn test_reliability_bounded_for_adverse_histories() {
        // Extremely slow successes with quality over-reporting.
        let slow: Vec<_> = (0..20).map(|_| success(60_000, Some(500.0))).collect();
        let summary = summarize(&slow);
        assert!(summary.reliability >= 0.0 && summary.reliability <= 100.0);

        // Mixed pathological history.
        let mixed: Vec<_> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    success(0, Some(0.0))
                } else {
                    failure(u64::MAX / 1_000_000)
                }
            })
            .collect();
        let summary = summarize(&mixed);
        assert!(summary.reliability >= 0.0 && summary.reliability <= 100.0);
    }

    #[test]
    fn test_adaptive_timeout_tiers() {
        let fast = summarize(&(0..5).map(|_| success(1000, None)).collect::<Vec<_>>());
        assert_eq!(adaptive_timeout(&fast), Duration::from_millis(4000));

        let medium = summarize(&(0..5).map(|_| success(5000, None)).collect::<Vec<_>>());
        assert_eq!(adaptive_timeout(&medium), Duration::from_millis(6000));

        let slow = summarize(&(0..5).map(|_| success(9000, None)).collect::<Vec<_>>());
        assert!(slow.reliability >= 50.0);
        assert_eq!(adaptive_timeout(&slow), Duration::from_millis(10_000));
    }

    #[test]
    fn test_adaptive_timeout_unreliable_bonus() {
        // All failures: penalty latency 10000 -> slow tier, low reliability.
        let failing = summarize(&(0..5).map(|_| failure(1000)).collect::<Vec<_>>());
        assert_eq!(adaptive_timeout(&failing), Duration::from_millis(12_000));
    }

    #[test]
    fn test_adaptive_timeout_always_in_bounds() {
        let histories: Vec<Vec<OutcomeRecord>> = vec![
            vec![],
            (0..20).map(|_| failure(100)).collect(),
            (0..20).map(|_| success(100, Some(100.0))).collect(),
            (0..20).map(|_| success(50_000, Some(0.0))).collect(),
            (0..20)
                .map(|i| {
                    if i % 3 == 0 {
                        success(7000, None)
                    } else {
                        failure(12_000)
                    }
                })
                .collect(),
        ];

        for history in &histories {
            let timeout = adaptive_timeout(&summarize(history));
            assert!(timeout >= Duration::from_millis(4000));
            assert!(timeout <= Duration::from_millis(12_000));
        }
    }
}
