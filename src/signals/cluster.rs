//! Unsupervised clustering of a signal's cases.
//!
//! K-means over weighted demographic and seriousness features, seeded for
//! reproducibility. Fewer than [`MIN_CLUSTER_CASES`] cases skips clustering
//! outright; a skip is an outcome, not an error.

use linfa::prelude::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cases::{CasePool, Sex};

/// Clustering floor: below this many cases a partition is noise.
pub const MIN_CLUSTER_CASES: usize = 20;
/// At most this many clusters are produced.
pub const MAX_CLUSTERS: usize = 3;

/// Feature weights: age and seriousness drive the distance, sex softens it.
const WEIGHT_AGE: f64 = 1.0;
const WEIGHT_SERIOUS: f64 = 1.0;
const WEIGHT_SEX: f64 = 0.5;

const KMEANS_SEED: u64 = 0x5164;

/// Demographic and risk summary of one cluster.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub cluster_id: usize,
    pub size: usize,
    pub mean_age: f64,
    pub pct_serious: f64,
    pub pct_male: f64,
    pub pct_female: f64,
}

/// Clustering result for a signal.
#[derive(Debug, Clone, Serialize)]
pub enum ClusterOutcome {
    Clustered {
        clusters: Vec<Cluster>,
        /// `cluster_id` of the highest `pct_serious` cluster; the one
        /// warranting closest review.
        highest_risk: usize,
    },
    Skipped {
        reason: String,
    },
}

/// Cluster the exposed-with-event cases of a signal.
pub fn cluster_cases(pool: &CasePool, case_ordinals: &[usize]) -> ClusterOutcome {
    if case_ordinals.len() < MIN_CLUSTER_CASES {
        return ClusterOutcome::Skipped {
            reason: format!(
                "{} cases below clustering floor of {MIN_CLUSTER_CASES}",
                case_ordinals.len()
            ),
        };
    }

    let features = feature_matrix(pool, case_ordinals);
    let dataset = DatasetBase::from(features);
    let rng = StdRng::seed_from_u64(KMEANS_SEED);
    let model = match KMeans::params_with_rng(MAX_CLUSTERS, rng)
        .max_n_iterations(200)
        .tolerance(1e-4)
        .fit(&dataset)
    {
        Ok(model) => model,
        Err(err) => {
            warn!(%err, "k-means failed; skipping clustering");
            return ClusterOutcome::Skipped {
                reason: format!("k-means did not converge: {err}"),
            };
        }
    };
    let labels = model.predict(&dataset);

    let mut clusters = summarise(pool, case_ordinals, labels.iter().copied());
    clusters.retain(|c| c.size > 0);
    clusters.sort_by_key(|c| c.cluster_id);
    let highest_risk = clusters
        .iter()
        .max_by(|x, y| x.pct_serious.total_cmp(&y.pct_serious))
        .map(|c| c.cluster_id)
        .unwrap_or(0);
    debug!(
        clusters = clusters.len(),
        highest_risk, "clustered signal cases"
    );
    ClusterOutcome::Clustered {
        clusters,
        highest_risk,
    }
}

/// Weighted feature rows: normalised age, seriousness flag, encoded sex.
fn feature_matrix(pool: &CasePool, case_ordinals: &[usize]) -> Array2<f64> {
    let ages: Vec<Option<f64>> = case_ordinals
        .iter()
        .map(|&idx| pool.case(idx).case.age)
        .collect();
    let known: Vec<f64> = ages.iter().flatten().copied().collect();
    let mean_age = if known.is_empty() {
        50.0
    } else {
        known.iter().sum::<f64>() / known.len() as f64
    };

    let mut rows = Vec::with_capacity(case_ordinals.len() * 3);
    for (&idx, age) in case_ordinals.iter().zip(&ages) {
        let case = &pool.case(idx).case;
        rows.push(WEIGHT_AGE * age.unwrap_or(mean_age) / 100.0);
        rows.push(WEIGHT_SERIOUS * if case.is_serious() { 1.0 } else { 0.0 });
        rows.push(WEIGHT_SEX * sex_encoding(case.sex));
    }
    Array2::from_shape_vec((case_ordinals.len(), 3), rows)
        .expect("row count times three elements")
}

fn sex_encoding(sex: Sex) -> f64 {
    match sex {
        Sex::Male => 0.0,
        Sex::Female => 1.0,
        Sex::Unknown => 0.5,
    }
}

fn summarise(
    pool: &CasePool,
    case_ordinals: &[usize],
    labels: impl Iterator<Item = usize>,
) -> Vec<Cluster> {
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); MAX_CLUSTERS];
    for (&idx, label) in case_ordinals.iter().zip(labels) {
        buckets[label].push(idx);
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(cluster_id, members)| {
            let size = members.len();
            let mut age_sum = 0.0;
            let mut age_known = 0usize;
            let mut serious = 0usize;
            let mut male = 0usize;
            let mut female = 0usize;
            for &idx in &members {
                let case = &pool.case(idx).case;
                if let Some(age) = case.age {
                    age_sum += age;
                    age_known += 1;
                }
                if case.is_serious() {
                    serious += 1;
                }
                match case.sex {
                    Sex::Male => male += 1,
                    Sex::Female => female += 1,
                    Sex::Unknown => {}
                }
            }
            let denom = size.max(1) as f64;
            Cluster {
                cluster_id,
                size,
                mean_age: if age_known == 0 {
                    0.0
                } else {
                    age_sum / age_known as f64
                },
                pct_serious: serious as f64 / denom,
                pct_male: male as f64 / denom,
                pct_female: female as f64 / denom,
            }
        })
        .collect()
}
