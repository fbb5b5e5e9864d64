//! Composite "quantum-inspired" priority scoring and the two rank orderings.
//!
//! The label is heuristic branding: the score is an ordinary weighted
//! combination of rarity, seriousness, recency, and volume, with additive
//! interaction boosts and a tunneling bonus for near-miss signals. Divergence
//! between `quantum_rank` and `classical_rank` is the primary
//! interpretability output: a pair ranked high here but low by raw count is
//! an emerging or rare pattern frequency ranking would miss.

use chrono::NaiveDate;
use serde::Serialize;

use crate::cases::CasePool;
use crate::config::{InteractionThresholds, ScoreWeights};
use crate::signals::Signal;

/// Boost magnitudes are fixed; the thresholds that trigger them are
/// configuration.
const BOOST_RARITY_SERIOUSNESS: f64 = 0.15;
const BOOST_RARITY_RECENCY: f64 = 0.10;
const BOOST_SERIOUSNESS_RECENCY: f64 = 0.10;
const BOOST_ALL_THREE: f64 = 0.20;
const BOOST_TUNNELING: f64 = 0.05;

/// Recency decay floor for old cases.
const RECENCY_FLOOR: f64 = 0.1;
/// Cases inside this window carry full recency weight.
const FULL_WEIGHT_DAYS: i64 = 365;

/// Normalised inputs to the composite score.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreComponents {
    pub rarity: f64,
    pub seriousness: f64,
    pub recency: f64,
    pub volume: f64,
}

/// Derive score components for a pair's exposed-with-event cases.
///
/// `reference` anchors the recency decay; the pool's latest report date is
/// used so repeated runs over an unchanged pool stay byte-identical.
pub fn components(
    pool: &CasePool,
    case_ordinals: &[usize],
    total_cases: usize,
    reference: NaiveDate,
    half_life_days: u32,
) -> ScoreComponents {
    let count = case_ordinals.len();
    let rarity = if total_cases == 0 {
        0.0
    } else {
        1.0 - count as f64 / total_cases as f64
    };

    let mut serious = 0usize;
    let mut recency_sum = 0.0;
    for &idx in case_ordinals {
        let case = &pool.case(idx).case;
        if case.is_serious() {
            serious += 1;
        }
        recency_sum += recency_weight(case.report_date, reference, half_life_days);
    }
    let seriousness = if count == 0 {
        0.0
    } else {
        serious as f64 / count as f64
    };
    let recency = if count == 0 {
        0.0
    } else {
        recency_sum / count as f64
    };
    let volume = (count as f64 / 10.0).min(1.0);

    ScoreComponents {
        rarity,
        seriousness,
        recency,
        volume,
    }
}

/// Time-decayed weight for one case: full inside the last year, half-life
/// decay toward a floor beyond it.
pub fn recency_weight(report_date: NaiveDate, reference: NaiveDate, half_life_days: u32) -> f64 {
    let age_days = (reference - report_date).num_days();
    if age_days <= FULL_WEIGHT_DAYS {
        return 1.0;
    }
    let beyond = (age_days - FULL_WEIGHT_DAYS) as f64;
    let decayed = 0.5_f64.powf(beyond / half_life_days as f64);
    decayed.max(RECENCY_FLOOR)
}

/// Weighted base score plus interaction boosts, clamped to `[0, 1]`.
pub fn quantum_score(
    components: &ScoreComponents,
    weights: &ScoreWeights,
    thresholds: &InteractionThresholds,
) -> f64 {
    let base = (weights.rarity * components.rarity
        + weights.seriousness * components.seriousness
        + weights.recency * components.recency
        + weights.volume * components.volume)
        / weights.sum();

    let rarity_high = components.rarity >= thresholds.rarity_high;
    let seriousness_high = components.seriousness >= thresholds.seriousness_high;
    let recency_high = components.recency >= thresholds.recency_high;

    let mut score = base;
    if rarity_high && seriousness_high {
        score += BOOST_RARITY_SERIOUSNESS;
    }
    if rarity_high && recency_high {
        score += BOOST_RARITY_RECENCY;
    }
    if seriousness_high && recency_high {
        score += BOOST_SERIOUSNESS_RECENCY;
    }
    if rarity_high && seriousness_high && recency_high {
        score += BOOST_ALL_THREE;
    }
    if near_miss(components, thresholds) {
        score += BOOST_TUNNELING;
    }
    score.clamp(0.0, 1.0)
}

/// Tunneling: a component within the margin below its threshold still earns
/// a small bonus instead of being discarded at the hard cutoff.
fn near_miss(components: &ScoreComponents, thresholds: &InteractionThresholds) -> bool {
    let margin = thresholds.tunneling_margin;
    let close = |value: f64, threshold: f64| value < threshold && value + margin >= threshold;
    close(components.rarity, thresholds.rarity_high)
        || close(components.seriousness, thresholds.seriousness_high)
        || close(components.recency, thresholds.recency_high)
}

/// Assign both rank orderings in place and sort by `quantum_rank`.
///
/// Tie-break for both orderings: higher count, then drug name, then reaction
/// term, so repeated runs produce identical output.
pub fn assign_ranks(signals: &mut Vec<Signal>) {
    signals.sort_by(|left, right| {
        right
            .quantum_score
            .total_cmp(&left.quantum_score)
            .then(right.count.cmp(&left.count))
            .then_with(|| left.drug.cmp(&right.drug))
            .then_with(|| left.reaction.cmp(&right.reaction))
    });
    for (idx, signal) in signals.iter_mut().enumerate() {
        signal.quantum_rank = idx + 1;
    }

    let mut by_count: Vec<(usize, u64, String, String)> = signals
        .iter()
        .enumerate()
        .map(|(idx, s)| (idx, s.count, s.drug.clone(), s.reaction.clone()))
        .collect();
    by_count.sort_by(|left, right| {
        right
            .1
            .cmp(&left.1)
            .then_with(|| left.2.cmp(&right.2))
            .then_with(|| left.3.cmp(&right.3))
    });
    for (rank, (idx, _, _, _)) in by_count.into_iter().enumerate() {
        signals[idx].classical_rank = rank + 1;
    }
}
