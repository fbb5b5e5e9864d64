//! Monthly reporting anomalies from rolling z-statistics plus curvature.

use chrono::Datelike;
use indexmap::IndexMap;
use serde::Serialize;

use crate::cases::CasePool;

/// How many anomalous periods are reported at most.
const MAX_REPORTED_PERIODS: usize = 10;
/// Curvature contribution to the combined score.
const CURVATURE_WEIGHT: f64 = 0.5;

/// One reporting period flagged as anomalous.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyPeriod {
    pub year: i32,
    pub month: u32,
    pub count: u64,
    /// Z-score of the period count against the trailing distribution.
    pub z: f64,
    /// Normalised second difference; positive when reporting accelerates.
    pub curvature: f64,
    pub anomaly_score: f64,
}

/// Monthly exposed-with-event counts for a signal, gap-filled with zeros so
/// second differences stay honest.
pub fn monthly_counts(pool: &CasePool, case_ordinals: &[usize]) -> Vec<((i32, u32), u64)> {
    let mut counts: IndexMap<(i32, u32), u64> = IndexMap::new();
    for &idx in case_ordinals {
        let date = pool.case(idx).case.report_date;
        *counts.entry((date.year(), date.month())).or_insert(0) += 1;
    }
    if counts.is_empty() {
        return Vec::new();
    }
    counts.sort_keys();
    let (&first, _) = counts.first().expect("nonempty");
    let (&last, _) = counts.last().expect("nonempty");

    let mut filled = Vec::new();
    let (mut year, mut month) = first;
    loop {
        let count = counts.get(&(year, month)).copied().unwrap_or(0);
        filled.push(((year, month), count));
        if (year, month) == last {
            break;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    filled
}

/// Z-score of the latest value against all values before it.
pub fn rolling_z(history: &[f64]) -> f64 {
    if history.len() < 3 {
        return 0.0;
    }
    let trailing = &history[..history.len() - 1];
    let mean = trailing.iter().sum::<f64>() / trailing.len() as f64;
    let variance = trailing
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / trailing.len() as f64;
    if variance <= 1e-9 {
        return 0.0;
    }
    let latest = *history.last().expect("len checked above");
    (latest - mean) / variance.sqrt()
}

/// Second difference at the latest point, normalised by the trailing mean so
/// acceleration in a small series does not drown a large one.
pub fn curvature(history: &[f64]) -> f64 {
    if history.len() < 3 {
        return 0.0;
    }
    let n = history.len();
    let second_diff = history[n - 1] - 2.0 * history[n - 2] + history[n - 3];
    let trailing_mean = history[..n - 1].iter().sum::<f64>() / (n - 1) as f64;
    second_diff / trailing_mean.max(1.0)
}

/// Score every period and return those at or above `threshold`, sorted by
/// score descending, capped at the top ten.
pub fn score_anomalies(
    counts: &[((i32, u32), u64)],
    threshold: f64,
) -> Vec<AnomalyPeriod> {
    let mut periods = Vec::new();
    let mut history: Vec<f64> = Vec::with_capacity(counts.len());
    for &((year, month), count) in counts {
        history.push(count as f64);
        let z = rolling_z(&history);
        let curve = curvature(&history);
        let anomaly_score = z + CURVATURE_WEIGHT * curve;
        if anomaly_score >= threshold {
            periods.push(AnomalyPeriod {
                year,
                month,
                count,
                z,
                curvature: curve,
                anomaly_score,
            });
        }
    }
    periods.sort_by(|left, right| {
        right
            .anomaly_score
            .total_cmp(&left.anomaly_score)
            .then_with(|| (left.year, left.month).cmp(&(right.year, right.month)))
    });
    periods.truncate(MAX_REPORTED_PERIODS);
    periods
}
