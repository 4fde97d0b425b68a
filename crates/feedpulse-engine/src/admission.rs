//! Fetch ordering and recommended-set selection.
//!
//! Given candidate sources that already passed admission (enabled, breaker
//! permitting), this module decides the order they should be attempted in
//! and which subset to recommend for a content slot.
//!
//! # Why the ordering is not plain greedy
//!
//! Ranking purely by reliability lets one excellent source win every slot
//! and starves category diversity. The comparator therefore runs in three
//! tiers, each falling through to the next on a tie:
//!
//! 1. Reliability capped at [`RELIABILITY_CAP`]; only a gap wider than
//!    [`DOMINANCE_MARGIN`] points decides the order (capped, descending).
//! 2. Static configured priority, ascending (lower number first).
//! 3. *Uncapped* reliability, ascending — a deliberate inversion that gives
//!    slightly less-proven sources a chance once priority and reliability
//!    tier are tied.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Reliability ceiling applied before tier-1 comparison. Prevents one
/// excellent source from dominating every slot.
const RELIABILITY_CAP: f64 = 85.0;

/// Capped-reliability gap (points) required for tier 1 to decide the order.
const DOMINANCE_MARGIN: f64 = 15.0;

/// Reliability above which the recommendation multiplier boosts a source.
const BOOST_THRESHOLD: f64 = 80.0;

/// Reliability below which the recommendation multiplier penalizes a source.
const PENALTY_THRESHOLD: f64 = 50.0;

/// Recommendation multiplier for high-reliability sources.
const BOOST_MULTIPLIER: f64 = 1.2;

/// Recommendation multiplier for low-reliability sources.
const PENALTY_MULTIPLIER: f64 = 0.8;

/// A candidate source as supplied by the fetch orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSource {
    /// Stable source identifier.
    pub id: String,
    /// Static configured priority; lower sorts earlier.
    pub priority: u32,
    /// Disabled sources are dropped before ordering.
    pub enabled: bool,
}

/// A candidate paired with its current reliability score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// The candidate as supplied by the orchestrator.
    pub source: CandidateSource,
    /// Composite reliability in [0, 100] (see [`crate::scoring`]).
    pub reliability: f64,
}

/// Order candidates for fetching with the three-tier diversity comparator.
///
/// The dominance margin makes the comparator non-transitive (a can tie b
/// into the priority tier while a-vs-c is decided by reliability), so this
/// must not go through `sort_by`, which requires a strict weak order and
/// panics when it detects a violation. Insertion sort only ever acts on the
/// direct pairwise verdict, and the comparator is antisymmetric, so every
/// adjacent pair of the result respects it.
pub fn order(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    for i in 1..candidates.len() {
        let mut j = i;
        while j > 0 && compare(&candidates[j - 1], &candidates[j]) == Ordering::Greater {
            candidates.swap(j - 1, j);
            j -= 1;
        }
    }
    candidates
}

/// Select up to `max` recommended sources: drop candidates below
/// `min_reliability`, rank by reliability times the quality multiplier
/// (descending), and take the top of the list.
pub fn recommend(
    candidates: Vec<ScoredCandidate>,
    max: usize,
    min_reliability: f64,
) -> Vec<ScoredCandidate> {
    let mut eligible: Vec<ScoredCandidate> = candidates
        .into_iter()
        .filter(|c| c.reliability >= min_reliability)
        .collect();

    eligible.sort_by(|a, b| {
        let a_rank = a.reliability * quality_multiplier(a.reliability);
        let b_rank = b.reliability * quality_multiplier(b.reliability);
        b_rank.partial_cmp(&a_rank).unwrap_or(Ordering::Equal)
    });

    eligible.truncate(max);
    eligible
}

/// Three-tier comparator; see the module docs.
fn compare(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    let a_capped = a.reliability.min(RELIABILITY_CAP);
    let b_capped = b.reliability.min(RELIABILITY_CAP);

    if (a_capped - b_capped).abs() > DOMINANCE_MARGIN {
        // Tier 1: capped reliability, descending.
        return b_capped.partial_cmp(&a_capped).unwrap_or(Ordering::Equal);
    }

    match a.source.priority.cmp(&b.source.priority) {
        // Tier 3: uncapped reliability, ascending.
        Ordering::Equal => a
            .reliability
            .partial_cmp(&b.reliability)
            .unwrap_or(Ordering::Equal),
        // Tier 2: priority, ascending.
        other => other,
    }
}

fn quality_multiplier(reliability: f64) -> f64 {
    if reliability > BOOST_THRESHOLD {
        BOOST_MULTIPLIER
    } else if reliability < PENALTY_THRESHOLD {
        PENALTY_MULTIPLIER
    } else {
        1.0
    }
}
