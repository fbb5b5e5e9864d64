//! Runtime configuration for the signal engine.
//!
//! Configuration is the only fatal error surface: [`EngineConfig::validate`]
//! runs before any scan and rejects impossible weights, thresholds, or
//! budgets up front.

use std::env;

use serde::Deserialize;

use crate::error::EngineError;

/// Weights applied to the composite score components. Must each be positive;
/// they are normalised against their sum, so `0.40/0.35/0.20/0.05` is the
/// documented default rather than a hard requirement.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScoreWeights {
    pub rarity: f64,
    pub seriousness: f64,
    pub recency: f64,
    pub volume: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            rarity: 0.40,
            seriousness: 0.35,
            recency: 0.20,
            volume: 0.05,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.rarity + self.seriousness + self.recency + self.volume
    }
}

/// High-threshold cutoffs for the interaction boosts, plus the tunneling
/// margin that rewards near-miss signals instead of discarding them at a
/// hard cutoff. The boost magnitudes themselves are fixed; the cutoffs are
/// configuration because the source material leaves them open.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InteractionThresholds {
    pub rarity_high: f64,
    pub seriousness_high: f64,
    pub recency_high: f64,
    pub tunneling_margin: f64,
}

impl Default for InteractionThresholds {
    fn default() -> Self {
        Self {
            rarity_high: 0.85,
            seriousness_high: 0.60,
            recency_high: 0.70,
            tunneling_margin: 0.05,
        }
    }
}

/// Duplicate-detection tuning. Pairs scoring at or above `merge_threshold`
/// merge; pairs inside `[ambiguity_floor, merge_threshold)` are left
/// unmerged with a recorded reason.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DedupSettings {
    pub date_window_days: i64,
    pub merge_threshold: f64,
    pub ambiguity_floor: f64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            date_window_days: 7,
            merge_threshold: 0.90,
            ambiguity_floor: 0.75,
        }
    }
}

/// Reference case set against which disproportionality is measured.
#[derive(Debug, Clone, Default, Deserialize)]
pub enum ComparatorPool {
    /// Compare against every case in the canonical pool.
    #[default]
    WholeDataset,
    /// Compare against an explicit subset of case identifiers.
    CustomSubset { case_ids: Vec<String> },
}

/// Engine configuration resolved from the environment and defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Pairs below this count are excluded from ranking entirely.
    pub min_case_count: usize,
    pub comparator_pool: ComparatorPool,
    /// Half-life of the recency decay applied beyond the first year.
    pub recency_half_life_days: u32,
    pub score_weights: ScoreWeights,
    pub interaction_thresholds: InteractionThresholds,
    /// Per-drug scan budget; an overrun isolates the drug, not the batch.
    pub scan_timeout_ms: u64,
    /// Bounded fan-out width for the watchlist driver.
    pub worker_pool_size: usize,
    pub dedup: DedupSettings,
    /// Minimum exposed-with-event count for a stratum to be reported.
    pub min_stratum_cases: usize,
    /// Periods scoring at or above this are reported as anomalous.
    pub anomaly_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_case_count: 5,
            comparator_pool: ComparatorPool::WholeDataset,
            recency_half_life_days: 180,
            score_weights: ScoreWeights::default(),
            interaction_thresholds: InteractionThresholds::default(),
            scan_timeout_ms: 30_000,
            worker_pool_size: default_pool_size(),
            dedup: DedupSettings::default(),
            min_stratum_cases: 3,
            anomaly_threshold: 2.0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment with reasonable defaults.
    pub fn load() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();
        let mut config = Self {
            min_case_count: env_parse("MIN_CASE_COUNT", 5),
            recency_half_life_days: env_parse("RECENCY_HALF_LIFE_DAYS", 180),
            scan_timeout_ms: env_parse("SCAN_TIMEOUT_MS", 30_000),
            worker_pool_size: env_parse("WORKER_POOL_SIZE", default_pool_size()),
            anomaly_threshold: env_parse("ANOMALY_THRESHOLD", 2.0),
            ..Self::default()
        };
        config.dedup.date_window_days = env_parse("DEDUP_DATE_WINDOW_DAYS", 7);
        config.validate()?;
        Ok(config)
    }

    /// Reject impossible configurations before any scan runs.
    pub fn validate(&self) -> Result<(), EngineError> {
        let w = &self.score_weights;
        for (name, value) in [
            ("rarity", w.rarity),
            ("seriousness", w.seriousness),
            ("recency", w.recency),
            ("volume", w.volume),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::config(format!(
                    "score weight `{name}` must be positive, got {value}"
                )));
            }
        }
        let t = &self.interaction_thresholds;
        for (name, value) in [
            ("rarity_high", t.rarity_high),
            ("seriousness_high", t.seriousness_high),
            ("recency_high", t.recency_high),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::config(format!(
                    "threshold `{name}` must lie in [0, 1], got {value}"
                )));
            }
        }
        if !(0.0..=0.5).contains(&t.tunneling_margin) {
            return Err(EngineError::config(format!(
                "tunneling margin must lie in [0, 0.5], got {}",
                t.tunneling_margin
            )));
        }
        if self.worker_pool_size == 0 {
            return Err(EngineError::config("worker pool size must be nonzero"));
        }
        if self.scan_timeout_ms == 0 {
            return Err(EngineError::config("scan timeout must be nonzero"));
        }
        if self.recency_half_life_days == 0 {
            return Err(EngineError::config("recency half-life must be nonzero"));
        }
        let d = &self.dedup;
        if d.date_window_days < 0 {
            return Err(EngineError::config("dedup date window must be nonnegative"));
        }
        if !(0.0..=1.0).contains(&d.merge_threshold) || !(0.0..=1.0).contains(&d.ambiguity_floor) {
            return Err(EngineError::config(
                "dedup thresholds must lie in [0, 1]",
            ));
        }
        if d.ambiguity_floor >= d.merge_threshold {
            return Err(EngineError::config(format!(
                "dedup ambiguity floor {} must be below merge threshold {}",
                d.ambiguity_floor, d.merge_threshold
            )));
        }
        Ok(())
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
