//! Case records and the immutable canonical pool.
//!
//! The pool is an arena of deduplicated cases plus by-drug and by-reaction
//! inverted indexes built once per scan. Nothing here mutates after
//! construction, so parallel per-drug scans share the pool freely.

pub mod dedup;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::EngineError;

/// Reported patient sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

/// Worst reported outcome for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Death,
    Hospitalization,
    Disability,
    Other,
    None,
}

/// Reporting channel the case arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Regulatory,
    Social,
    Literature,
}

/// A normalized adverse-event case as delivered by the ingestion collaborator.
///
/// Drug and reaction names arrive pre-normalized (lowercase, collapsed
/// whitespace); this engine matches them exactly and never mutates a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: Option<String>,
    pub drugs: Vec<String>,
    pub reactions: Vec<String>,
    pub age: Option<f64>,
    pub sex: Sex,
    pub country: Option<String>,
    pub serious: bool,
    pub outcome: Outcome,
    pub onset_date: Option<NaiveDate>,
    pub report_date: NaiveDate,
    pub source: Source,
}

impl Case {
    /// Whether the case counts toward the seriousness component: flagged
    /// serious, or an outcome of death, hospitalization, or disability.
    pub fn is_serious(&self) -> bool {
        self.serious
            || matches!(
                self.outcome,
                Outcome::Death | Outcome::Hospitalization | Outcome::Disability
            )
    }

    /// Reject malformed records at the ingestion boundary.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.drugs.is_empty() {
            return Err(EngineError::data(format!(
                "case {} has no drug entries",
                self.identity()
            )));
        }
        if let Some(age) = self.age {
            if !age.is_finite() || age < 0.0 || age > 130.0 {
                return Err(EngineError::data(format!(
                    "case {} has implausible age {age}",
                    self.identity()
                )));
            }
        }
        if let Some(onset) = self.onset_date {
            if onset > self.report_date {
                return Err(EngineError::data(format!(
                    "case {} reports onset {onset} after report date {}",
                    self.identity(),
                    self.report_date
                )));
            }
        }
        Ok(())
    }

    /// Stable identity for logging and fingerprinting: the upstream id when
    /// present, a digest of the record otherwise.
    pub fn identity(&self) -> String {
        if let Some(id) = &self.case_id {
            return id.clone();
        }
        let mut hasher = Sha256::new();
        for drug in &self.drugs {
            hasher.update(drug.as_bytes());
            hasher.update(b"|");
        }
        for reaction in &self.reactions {
            hasher.update(reaction.as_bytes());
            hasher.update(b"|");
        }
        hasher.update(self.report_date.to_string().as_bytes());
        format!("anon:{:x}", hasher.finalize())[..21].to_string()
    }
}

/// A deduplicated case with merge provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCase {
    pub case: Case,
    /// Identities of the raw records collapsed into this one, sorted.
    pub merged_from: Vec<String>,
    /// 1.0 for exact-id merges and singletons, the fuzzy score otherwise.
    pub merge_confidence: f64,
    /// How field conflicts between duplicates were resolved.
    pub resolution_notes: Vec<String>,
}

impl CanonicalCase {
    /// Wrap a case that matched nothing else.
    pub fn singleton(case: Case) -> Self {
        let identity = case.identity();
        Self {
            case,
            merged_from: vec![identity],
            merge_confidence: 1.0,
            resolution_notes: Vec::new(),
        }
    }
}

/// Read-only arena of canonical cases with per-scan index structures.
#[derive(Debug, Clone)]
pub struct CasePool {
    cases: Vec<CanonicalCase>,
    by_drug: IndexMap<String, Vec<usize>>,
    by_reaction: IndexMap<String, Vec<usize>>,
    latest_report: Option<NaiveDate>,
    fingerprint: String,
}

impl CasePool {
    /// Build the arena and its inverted indexes from a canonical case set.
    pub fn build(cases: Vec<CanonicalCase>) -> Self {
        let mut by_drug: IndexMap<String, Vec<usize>> = IndexMap::new();
        let mut by_reaction: IndexMap<String, Vec<usize>> = IndexMap::new();
        let mut latest_report = None;

        for (idx, canonical) in cases.iter().enumerate() {
            for drug in &canonical.case.drugs {
                let slot = by_drug.entry(drug.clone()).or_default();
                if slot.last() != Some(&idx) {
                    slot.push(idx);
                }
            }
            for reaction in &canonical.case.reactions {
                let slot = by_reaction.entry(reaction.clone()).or_default();
                if slot.last() != Some(&idx) {
                    slot.push(idx);
                }
            }
            if latest_report.map_or(true, |latest| canonical.case.report_date > latest) {
                latest_report = Some(canonical.case.report_date);
            }
        }
        by_drug.sort_keys();
        by_reaction.sort_keys();

        let fingerprint = fingerprint_cases(&cases);
        info!(
            cases = cases.len(),
            drugs = by_drug.len(),
            reactions = by_reaction.len(),
            %fingerprint,
            "built case pool"
        );
        Self {
            cases,
            by_drug,
            by_reaction,
            latest_report,
            fingerprint,
        }
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn cases(&self) -> &[CanonicalCase] {
        &self.cases
    }

    pub fn case(&self, idx: usize) -> &CanonicalCase {
        &self.cases[idx]
    }

    /// Ordinals of cases mentioning `drug`, in arena order.
    pub fn cases_with_drug(&self, drug: &str) -> &[usize] {
        self.by_drug.get(drug).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ordinals of cases mentioning `reaction`, in arena order.
    pub fn cases_with_reaction(&self, reaction: &str) -> &[usize] {
        self.by_reaction
            .get(reaction)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drug names present in the pool, sorted.
    pub fn drugs(&self) -> impl Iterator<Item = &str> {
        self.by_drug.keys().map(String::as_str)
    }

    /// Reactions co-reported with `drug` and the ordinals of the co-reporting
    /// cases, sorted by reaction name.
    pub fn reactions_for_drug(&self, drug: &str) -> IndexMap<String, Vec<usize>> {
        let mut out: IndexMap<String, Vec<usize>> = IndexMap::new();
        for &idx in self.cases_with_drug(drug) {
            for reaction in &self.cases[idx].case.reactions {
                out.entry(reaction.clone()).or_default().push(idx);
            }
        }
        out.sort_keys();
        out
    }

    /// Latest report date in the pool; the deterministic recency reference.
    pub fn latest_report_date(&self) -> Option<NaiveDate> {
        self.latest_report
    }

    /// SHA-256 digest over the sorted case identities; the cache key
    /// component that changes whenever the underlying pool changes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Resolve a set of case ids to arena ordinals, for custom comparator
    /// subsets. Unknown ids are ignored.
    pub fn resolve_ids(&self, ids: &[String]) -> Vec<usize> {
        let wanted: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.cases
            .iter()
            .enumerate()
            .filter(|(_, c)| wanted.contains(c.case.identity().as_str()))
            .map(|(idx, _)| idx)
            .collect()
    }
}

fn fingerprint_cases(cases: &[CanonicalCase]) -> String {
    let mut identities: Vec<String> = cases
        .iter()
        .map(|c| {
            let mut parts = c.merged_from.clone();
            parts.sort();
            parts.join("+")
        })
        .collect();
    identities.sort();
    let mut hasher = Sha256::new();
    for identity in &identities {
        hasher.update(identity.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
