//! Frequentist disproportionality measures.
//!
//! PRR and ROR with 95% confidence intervals, a Yates-corrected chi-square
//! p-value, and a two-sided conditional Fisher's exact test. Zero cells go
//! through the table's continuity correction and flag the estimate
//! `low_confidence` instead of producing NaN or infinity.

use once_cell::sync::Lazy;
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::gamma::ln_gamma;

use crate::signals::contingency::ContingencyTable;

static CHI_SQUARED_1DF: Lazy<ChiSquared> =
    Lazy::new(|| ChiSquared::new(1.0).expect("one degree of freedom is valid"));

/// A ratio estimate with its 95% confidence interval.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RatioEstimate {
    pub value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Set when the table needed a continuity correction.
    pub low_confidence: bool,
}

/// Proportional reporting ratio: `(a/(a+b)) / (c/(c+d))`.
pub fn prr_with_ci(table: &ContingencyTable) -> RatioEstimate {
    let (a, b, c, d) = table.corrected_cells();
    let prr = (a / (a + b)) / (c / (c + d));
    let se = (1.0 / a - 1.0 / (a + b) + 1.0 / c - 1.0 / (c + d))
        .max(0.0)
        .sqrt();
    interval(prr, se, table.has_zero_cell())
}

/// Reporting odds ratio: `(a*d)/(b*c)`.
pub fn ror_with_ci(table: &ContingencyTable) -> RatioEstimate {
    let (a, b, c, d) = table.corrected_cells();
    let ror = (a * d) / (b * c);
    let se = (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt();
    interval(ror, se, table.has_zero_cell())
}

fn interval(value: f64, se: f64, corrected: bool) -> RatioEstimate {
    let log_value = value.ln();
    RatioEstimate {
        value,
        ci_low: (log_value - 1.96 * se).exp(),
        ci_high: (log_value + 1.96 * se).exp(),
        low_confidence: corrected,
    }
}

/// Yates-corrected chi-square p-value on one degree of freedom.
pub fn chi_square_p(table: &ContingencyTable) -> f64 {
    let (a, b, c, d) = (
        table.a as f64,
        table.b as f64,
        table.c as f64,
        table.d as f64,
    );
    let n = a + b + c + d;
    let denominator = (a + b) * (c + d) * (a + c) * (b + d);
    if n == 0.0 || denominator == 0.0 {
        return 1.0;
    }
    let deviation = ((a * d - b * c).abs() - n / 2.0).max(0.0);
    let chi2 = n * deviation * deviation / denominator;
    (1.0 - CHI_SQUARED_1DF.cdf(chi2)).clamp(0.0, 1.0)
}

/// Two-sided Fisher's exact test, summing every hypergeometric outcome no
/// more probable than the observed table.
pub fn fisher_exact_p(table: &ContingencyTable) -> f64 {
    let r1 = table.a + table.b;
    let r2 = table.c + table.d;
    let c1 = table.a + table.c;
    let n = r1 + r2;
    if n == 0 {
        return 1.0;
    }
    let k_min = c1.saturating_sub(r2);
    let k_max = r1.min(c1);
    let ln_observed = ln_hypergeometric(table.a, r1, r2, c1);

    let mut p = 0.0;
    for k in k_min..=k_max {
        let ln_p = ln_hypergeometric(k, r1, r2, c1);
        if ln_p <= ln_observed + 1e-9 {
            p += ln_p.exp();
        }
    }
    p.clamp(0.0, 1.0)
}

/// p-value used in ranked output: Fisher's exact when any cell is below 5,
/// chi-square otherwise.
pub fn association_p(table: &ContingencyTable) -> f64 {
    if [table.a, table.b, table.c, table.d]
        .iter()
        .any(|&cell| cell < 5)
    {
        fisher_exact_p(table)
    } else {
        chi_square_p(table)
    }
}

fn ln_hypergeometric(k: u64, r1: u64, r2: u64, c1: u64) -> f64 {
    ln_choose(r1, k) + ln_choose(r2, c1 - k) - ln_choose(r1 + r2, c1)
}

fn ln_choose(n: u64, k: u64) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    ln_gamma(n as f64 + 1.0) - ln_gamma(k as f64 + 1.0) - ln_gamma((n - k) as f64 + 1.0)
}
