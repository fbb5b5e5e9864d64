//! Subgroup discovery: re-stratify a signal's cases by age band, sex, and
//! country, recomputing the 2x2 and PRR/ROR inside each stratum.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::cases::{CasePool, Sex};
use crate::config::EngineConfig;
use crate::signals::contingency::ContingencyTable;
use crate::signals::stats::{self, RatioEstimate};

/// Dimension a stratum was cut along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StratumDimension {
    Age,
    Sex,
    Country,
}

/// One significant stratum of a signal.
#[derive(Debug, Clone, Serialize)]
pub struct Subgroup {
    pub dimension: StratumDimension,
    pub value: String,
    pub table: ContingencyTable,
    pub prr: RatioEstimate,
    pub ror: RatioEstimate,
    pub case_count: u64,
}

/// Either the strata worth reviewing, or an explicit "nothing significant".
#[derive(Debug, Clone, Serialize)]
pub enum SubgroupFindings {
    Strata(Vec<Subgroup>),
    NoneSignificant,
}

/// Stratify the pool along all three dimensions for `(drug, reaction)`.
///
/// A stratum is emitted only when its PRR exceeds 1.0 and it holds at least
/// `min_stratum_cases` exposed-with-event cases; otherwise the caller gets
/// `NoneSignificant` rather than empty rows.
pub fn discover(
    pool: &CasePool,
    drug: &str,
    reaction: &str,
    config: &EngineConfig,
) -> SubgroupFindings {
    let mut strata = Vec::new();
    for dimension in [
        StratumDimension::Age,
        StratumDimension::Sex,
        StratumDimension::Country,
    ] {
        for (value, ordinals) in partition(pool, dimension) {
            let table = ContingencyTable::from_ordinals(pool, drug, reaction, &ordinals);
            if table.a < config.min_stratum_cases as u64 {
                continue;
            }
            let prr = stats::prr_with_ci(&table);
            if prr.value <= 1.0 {
                continue;
            }
            let ror = stats::ror_with_ci(&table);
            debug!(
                ?dimension,
                %value,
                a = table.a,
                prr = prr.value,
                "significant stratum"
            );
            strata.push(Subgroup {
                dimension,
                value,
                table,
                prr,
                ror,
                case_count: table.a,
            });
        }
    }
    if strata.is_empty() {
        SubgroupFindings::NoneSignificant
    } else {
        SubgroupFindings::Strata(strata)
    }
}

/// Partition the whole pool along one dimension. Cases missing the dimension
/// value are excluded from that dimension's strata rather than pooled into a
/// synthetic "unknown" comparator.
fn partition(pool: &CasePool, dimension: StratumDimension) -> IndexMap<String, Vec<usize>> {
    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (idx, canonical) in pool.cases().iter().enumerate() {
        let case = &canonical.case;
        let key = match dimension {
            StratumDimension::Age => case.age.map(age_band).map(str::to_string),
            StratumDimension::Sex => match case.sex {
                Sex::Male => Some("male".to_string()),
                Sex::Female => Some("female".to_string()),
                Sex::Unknown => None,
            },
            StratumDimension::Country => case.country.clone(),
        };
        if let Some(key) = key {
            groups.entry(key).or_default().push(idx);
        }
    }
    groups.sort_keys();
    groups
}

/// Age bands used for stratification.
pub fn age_band(age: f64) -> &'static str {
    if age < 18.0 {
        "pediatric"
    } else if age < 35.0 {
        "young-adult"
    } else if age < 50.0 {
        "adult"
    } else if age < 65.0 {
        "middle-aged"
    } else {
        "elderly"
    }
}
