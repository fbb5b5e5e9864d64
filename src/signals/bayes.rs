//! Bayesian disproportionality: information component and empirical-Bayes
//! shrinkage of the relative reporting ratio.

use serde::Serialize;

use crate::signals::contingency::ContingencyTable;

/// Prior constant added to the observed and expected counts for the IC.
const IC_GAMMA: f64 = 0.5;

/// Information component with its credibility interval.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IcEstimate {
    pub ic: f64,
    pub ic025: f64,
    pub ic975: f64,
}

/// BCPNN information component: `log2((a + γ) / (E + γ))` with `E` the
/// expected count under independence. The credibility interval uses Norén's
/// closed-form approximation.
pub fn information_component(table: &ContingencyTable) -> IcEstimate {
    let n = table.total() as f64;
    let a = table.a as f64;
    if n == 0.0 {
        return IcEstimate {
            ic: 0.0,
            ic025: 0.0,
            ic975: 0.0,
        };
    }
    let expected = (table.a + table.b) as f64 * (table.a + table.c) as f64 / n;
    let ic = ((a + IC_GAMMA) / (expected + IC_GAMMA)).log2();
    let spread = a + IC_GAMMA;
    let ic025 = ic - 3.3 * spread.powf(-0.5) - 2.0 * spread.powf(-1.5);
    let ic975 = ic + 2.4 * spread.powf(-0.5) - 0.5 * spread.powf(-1.5);
    IcEstimate { ic, ic025, ic975 }
}

/// Gaussian prior over log relative reporting ratios, estimated per scan.
#[derive(Debug, Clone, Copy)]
pub struct Prior {
    pub mean: f64,
    pub var: f64,
}

impl Prior {
    /// Null prior used when a scan has too few pairs to estimate one.
    pub fn null() -> Self {
        Self {
            mean: 0.0,
            var: 0.25,
        }
    }
}

/// Estimate a Gaussian prior from the scan's observed log ratios.
pub fn estimate_prior(samples: &[f64]) -> Prior {
    if samples.len() < 2 {
        return Prior::null();
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let var = samples
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / samples.len() as f64;
    Prior {
        mean,
        var: var.max(1e-6),
    }
}

/// Log relative reporting ratio `ln(a / E)` and its approximate variance,
/// continuity-corrected alongside the rest of the table.
pub fn log_rrr(table: &ContingencyTable) -> (f64, f64) {
    let (a, b, c, _d) = table.corrected_cells();
    let n = table.total() as f64 + if table.has_zero_cell() { 2.0 } else { 0.0 };
    let expected = (a + b) * (a + c) / n;
    let log_ratio = (a / expected).ln();
    // Poisson approximation to the variance of ln(a/E).
    let variance = 1.0 / a;
    (log_ratio, variance)
}

/// Empirical Bayes geometric mean: the observed log ratio shrunk toward the
/// scan prior, exponentiated. Sparse cells pull hard toward the prior mean.
pub fn ebgm(table: &ContingencyTable, prior: Prior) -> f64 {
    let (log_ratio, variance) = log_rrr(table);
    let weight = prior.var / (prior.var + variance);
    let shrunk = weight * log_ratio + (1.0 - weight) * prior.mean;
    shrunk.exp()
}
