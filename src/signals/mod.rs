//! Signal computation and ranking layer.

pub mod bayes;
pub mod cluster;
pub mod contingency;
pub mod quantum;
pub mod stats;
pub mod subgroup;
pub mod trend;

use serde::Serialize;
use tracing::{debug, info};

use crate::cases::CasePool;
use crate::config::{ComparatorPool, EngineConfig};
use crate::error::EngineError;

use self::contingency::{Comparator, ContingencyTable};

/// Confidence intervals attached to a signal.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SignalCis {
    pub prr: (f64, f64),
    pub ror: (f64, f64),
    pub ic: (f64, f64),
}

/// A (drug, reaction) pair enriched with statistics and priority ranks.
///
/// Derived and read-only; regenerated whenever the pool or filters change.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub drug: String,
    pub reaction: String,
    pub count: u64,
    pub table: ContingencyTable,
    pub prr: f64,
    pub ror: f64,
    pub ic: f64,
    pub ebgm: f64,
    pub chi2_p: f64,
    pub fisher_p: f64,
    pub cis: SignalCis,
    /// Set when any statistic needed a continuity correction.
    pub low_confidence: bool,
    pub components: quantum::ScoreComponents,
    pub quantum_score: f64,
    /// 1-based; assigned after global aggregation.
    pub quantum_rank: usize,
    pub classical_rank: usize,
}

/// On-demand refinements attached to a signal when requested.
#[derive(Debug, Clone, Serialize)]
pub struct SignalDetail {
    pub signal: Signal,
    pub subgroups: subgroup::SubgroupFindings,
    pub clusters: cluster::ClusterOutcome,
    pub anomalies: Vec<trend::AnomalyPeriod>,
}

/// Enumerate and score every reaction paired with `drug` that meets the
/// minimum count floor. Pairs below the floor are excluded entirely, not
/// zero-scored. Ranks stay unassigned until global aggregation.
pub fn scan_drug(
    pool: &CasePool,
    drug: &str,
    config: &EngineConfig,
) -> Result<Vec<Signal>, EngineError> {
    config.validate()?;
    let comparator = resolve_comparator(pool, &config.comparator_pool);
    let reference = pool
        .latest_report_date()
        .ok_or_else(|| EngineError::data("case pool is empty"))?;

    let mut pairs = Vec::new();
    for (reaction, ordinals) in pool.reactions_for_drug(drug) {
        if ordinals.len() < config.min_case_count {
            continue;
        }
        let table = ContingencyTable::from_pool(pool, drug, &reaction, &comparator);
        pairs.push((reaction, ordinals, table));
    }
    if pairs.is_empty() {
        debug!(%drug, "no pairs met the count floor");
        return Ok(Vec::new());
    }

    // Empirical-Bayes prior over this scan's observed log ratios.
    let log_ratios: Vec<f64> = pairs
        .iter()
        .map(|(_, _, table)| bayes::log_rrr(table).0)
        .collect();
    let prior = bayes::estimate_prior(&log_ratios);

    let mut signals = Vec::with_capacity(pairs.len());
    for (reaction, ordinals, table) in pairs {
        let prr = stats::prr_with_ci(&table);
        let ror = stats::ror_with_ci(&table);
        let ic = bayes::information_component(&table);
        let ebgm = bayes::ebgm(&table, prior);
        let chi2_p = stats::chi_square_p(&table);
        let fisher_p = stats::fisher_exact_p(&table);

        let components = quantum::components(
            pool,
            &ordinals,
            pool.len(),
            reference,
            config.recency_half_life_days,
        );
        let quantum_score = quantum::quantum_score(
            &components,
            &config.score_weights,
            &config.interaction_thresholds,
        );

        signals.push(Signal {
            drug: drug.to_string(),
            reaction,
            count: table.a,
            table,
            prr: prr.value,
            ror: ror.value,
            ic: ic.ic,
            ebgm,
            chi2_p,
            fisher_p,
            cis: SignalCis {
                prr: (prr.ci_low, prr.ci_high),
                ror: (ror.ci_low, ror.ci_high),
                ic: (ic.ic025, ic.ic975),
            },
            low_confidence: prr.low_confidence || ror.low_confidence,
            components,
            quantum_score,
            quantum_rank: 0,
            classical_rank: 0,
        });
    }
    info!(%drug, signals = signals.len(), "scanned drug");
    Ok(signals)
}

/// Assign both rank orderings across an aggregated signal set and return it
/// sorted by `quantum_rank`.
pub fn rank_signals(mut signals: Vec<Signal>) -> Vec<Signal> {
    quantum::assign_ranks(&mut signals);
    signals
}

/// Attach the optional refinements to a ranked signal.
pub fn refine_signal(pool: &CasePool, signal: &Signal, config: &EngineConfig) -> SignalDetail {
    let ordinals = pair_ordinals(pool, &signal.drug, &signal.reaction);
    SignalDetail {
        signal: signal.clone(),
        subgroups: subgroup::discover(pool, &signal.drug, &signal.reaction, config),
        clusters: cluster::cluster_cases(pool, &ordinals),
        anomalies: trend::score_anomalies(
            &trend::monthly_counts(pool, &ordinals),
            config.anomaly_threshold,
        ),
    }
}

/// Ordinals of cases mentioning both the drug and the reaction.
pub fn pair_ordinals(pool: &CasePool, drug: &str, reaction: &str) -> Vec<usize> {
    let with_reaction: std::collections::HashSet<usize> =
        pool.cases_with_reaction(reaction).iter().copied().collect();
    pool.cases_with_drug(drug)
        .iter()
        .copied()
        .filter(|idx| with_reaction.contains(idx))
        .collect()
}

fn resolve_comparator(pool: &CasePool, configured: &ComparatorPool) -> Comparator {
    match configured {
        ComparatorPool::WholeDataset => Comparator::WholeDataset,
        ComparatorPool::CustomSubset { case_ids } => {
            Comparator::Subset(pool.resolve_ids(case_ids))
        }
    }
}
