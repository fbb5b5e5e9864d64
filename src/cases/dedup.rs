//! Cross-source duplicate detection and merge.
//!
//! Records with the same upstream `case_id` always merge. Id-less records go
//! through a fuzzy pass blocked by sex and a report-date window, scored with
//! Jaro-Winkler similarity over the drug and reaction lists plus an age
//! proximity term. Pairs inside the ambiguity band are left unmerged with a
//! recorded reason: precision over recall.

use indexmap::IndexMap;
use serde::Serialize;
use strsim::jaro_winkler;
use tracing::{debug, info, warn};

use crate::cases::{CanonicalCase, Case};
use crate::config::DedupSettings;

/// Outcome of considering one candidate duplicate pair.
#[derive(Debug, Clone, Serialize)]
pub enum MergeDecision {
    /// The pair merged into a canonical case.
    Merged { confidence: f64 },
    /// The pair landed in the ambiguity band and was left unmerged.
    LeftUnmerged { reason: String },
}

/// A pair the deduplicator declined to merge, with the score that put it in
/// the ambiguity band.
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousPair {
    pub left: String,
    pub right: String,
    pub score: f64,
    pub reason: String,
}

/// A raw record rejected at validation, with why.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedCase {
    pub identity: String,
    pub reason: String,
}

/// Full deduplication output: the canonical pool plus every annotation the
/// batch report needs.
#[derive(Debug, Clone)]
pub struct DedupReport {
    pub canonical: Vec<CanonicalCase>,
    pub merged_groups: usize,
    pub ambiguous: Vec<AmbiguousPair>,
    pub rejected: Vec<RejectedCase>,
}

/// Collapse raw cases into canonical ones.
///
/// Idempotent: feeding the canonical output back through produces the same
/// pool, since exact-id groups collapse to one record and fuzzy scores are
/// unchanged by the merge's field resolution.
pub fn deduplicate(cases: Vec<Case>, settings: &DedupSettings) -> DedupReport {
    let mut rejected = Vec::new();
    let mut valid = Vec::new();
    for case in cases {
        match case.validate() {
            Ok(()) => valid.push(case),
            Err(err) => {
                let identity = case.identity();
                warn!(%identity, %err, "rejected case");
                rejected.push(RejectedCase {
                    identity,
                    reason: err.to_string(),
                });
            }
        }
    }

    let (mut canonical, exact_merges) = merge_exact(valid);
    let (canonical_fuzzy, fuzzy_merges, ambiguous) = merge_fuzzy(&mut canonical, settings);

    info!(
        canonical = canonical_fuzzy.len(),
        exact_merges,
        fuzzy_merges,
        ambiguous = ambiguous.len(),
        rejected = rejected.len(),
        "deduplication complete"
    );
    DedupReport {
        canonical: canonical_fuzzy,
        merged_groups: exact_merges + fuzzy_merges,
        ambiguous,
        rejected,
    }
}

/// Group by upstream id; id-less cases pass through untouched.
fn merge_exact(cases: Vec<Case>) -> (Vec<CanonicalCase>, usize) {
    let mut by_id: IndexMap<String, Vec<Case>> = IndexMap::new();
    let mut id_less = Vec::new();
    for case in cases {
        match &case.case_id {
            Some(id) if !id.is_empty() => by_id.entry(id.clone()).or_default().push(case),
            _ => id_less.push(case),
        }
    }

    let mut canonical = Vec::new();
    let mut merges = 0;
    for (id, group) in by_id {
        if group.len() > 1 {
            debug!(%id, records = group.len(), "merging exact id group");
            merges += 1;
            canonical.push(merge_group(group, 1.0));
        } else {
            canonical.extend(group.into_iter().map(CanonicalCase::singleton));
        }
    }
    canonical.extend(id_less.into_iter().map(CanonicalCase::singleton));
    (canonical, merges)
}

/// Fuzzy pass over id-less canonicals. Blocked by sex and report-date window;
/// greedy best-match within the block.
fn merge_fuzzy(
    canonical: &mut Vec<CanonicalCase>,
    settings: &DedupSettings,
) -> (Vec<CanonicalCase>, usize, Vec<AmbiguousPair>) {
    let mut out: Vec<CanonicalCase> = Vec::new();
    let mut ambiguous = Vec::new();
    let mut merges = 0;

    for candidate in canonical.drain(..) {
        if candidate.case.case_id.is_some() {
            out.push(candidate);
            continue;
        }
        let mut matched = None;
        let mut near_miss: Option<(f64, String, String)> = None;
        for (idx, existing) in out.iter().enumerate() {
            if existing.case.case_id.is_some() {
                continue;
            }
            if !in_block(&candidate.case, &existing.case, settings.date_window_days) {
                continue;
            }
            let score = similarity(&candidate.case, &existing.case);
            match decide(score, settings) {
                Some(MergeDecision::Merged { confidence }) => {
                    matched = Some((idx, confidence));
                    break;
                }
                Some(MergeDecision::LeftUnmerged { reason }) => {
                    if near_miss.as_ref().map_or(true, |(best, _, _)| score > *best) {
                        near_miss = Some((score, existing.case.identity(), reason));
                    }
                }
                None => {}
            }
        }

        match matched {
            Some((idx, score)) => {
                merges += 1;
                let existing = out.swap_remove(idx);
                let group = vec![existing.case.clone(), candidate.case.clone()];
                let mut merged = merge_group(group, score);
                merged.merged_from = union_provenance(&existing, &candidate);
                merged.merge_confidence = score.min(existing.merge_confidence);
                merged
                    .resolution_notes
                    .extend(existing.resolution_notes.iter().cloned());
                out.push(merged);
            }
            None => {
                if let Some((score, other, reason)) = near_miss {
                    debug!(
                        left = %candidate.case.identity(),
                        right = %other,
                        score,
                        "ambiguous duplicate left unmerged"
                    );
                    ambiguous.push(AmbiguousPair {
                        left: candidate.case.identity(),
                        right: other,
                        score,
                        reason,
                    });
                }
                out.push(candidate);
            }
        }
    }
    (out, merges, ambiguous)
}

/// Turn a similarity score into a merge decision: merge at or above the
/// threshold, an explicit unmerged-with-reason inside the ambiguity band,
/// nothing below it.
fn decide(score: f64, settings: &DedupSettings) -> Option<MergeDecision> {
    if score >= settings.merge_threshold {
        Some(MergeDecision::Merged { confidence: score })
    } else if score >= settings.ambiguity_floor {
        Some(MergeDecision::LeftUnmerged {
            reason: format!(
                "similarity {:.3} below merge threshold {:.2}; left unmerged",
                score, settings.merge_threshold
            ),
        })
    } else {
        None
    }
}

fn in_block(a: &Case, b: &Case, window_days: i64) -> bool {
    if a.sex != b.sex {
        return false;
    }
    let gap = (a.report_date - b.report_date).num_days().abs();
    gap <= window_days
}

/// Similarity over sorted drug and reaction lists plus age proximity.
/// Weighted 45/35/20; lists dominate because they carry the most identity.
pub fn similarity(a: &Case, b: &Case) -> f64 {
    let drugs = jaro_winkler(&joined(&a.drugs), &joined(&b.drugs));
    let reactions = jaro_winkler(&joined(&a.reactions), &joined(&b.reactions));
    let age = match (a.age, b.age) {
        (Some(x), Some(y)) => (1.0 - (x - y).abs() / 10.0).max(0.0),
        (None, None) => 1.0,
        _ => 0.5,
    };
    0.45 * drugs + 0.35 * reactions + 0.20 * age
}

fn joined(values: &[String]) -> String {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(" ")
}

/// Merge a duplicate group. The base record is the most complete one,
/// tie-broken by most recent report date; missing fields fill in from the
/// rest and every conflicting value gets a resolution note.
fn merge_group(mut group: Vec<Case>, confidence: f64) -> CanonicalCase {
    group.sort_by(|a, b| {
        completeness(b)
            .cmp(&completeness(a))
            .then(b.report_date.cmp(&a.report_date))
    });
    let mut provenance: Vec<String> = group.iter().map(Case::identity).collect();
    provenance.sort();
    provenance.dedup();

    let mut notes = Vec::new();
    let mut base = group.remove(0);
    for other in &group {
        fill_age(&mut base, other, &mut notes);
        fill_country(&mut base, other, &mut notes);
        fill_onset(&mut base, other, &mut notes);
        for drug in &other.drugs {
            if !base.drugs.contains(drug) {
                base.drugs.push(drug.clone());
                notes.push(format!("drug `{drug}` added from {}", other.identity()));
            }
        }
        for reaction in &other.reactions {
            if !base.reactions.contains(reaction) {
                base.reactions.push(reaction.clone());
                notes.push(format!(
                    "reaction `{reaction}` added from {}",
                    other.identity()
                ));
            }
        }
        if other.is_serious() && !base.is_serious() {
            base.serious = true;
            notes.push(format!("serious flag taken from {}", other.identity()));
        }
    }
    base.drugs.sort_unstable();
    base.reactions.sort_unstable();

    CanonicalCase {
        case: base,
        merged_from: provenance,
        merge_confidence: confidence,
        resolution_notes: notes,
    }
}

fn fill_age(base: &mut Case, other: &Case, notes: &mut Vec<String>) {
    match (base.age, other.age) {
        (None, Some(age)) => {
            base.age = Some(age);
            notes.push(format!("age {age} taken from {}", other.identity()));
        }
        (Some(kept), Some(dropped)) if (kept - dropped).abs() > f64::EPSILON => {
            notes.push(format!(
                "age {kept} preferred over {dropped} from {}",
                other.identity()
            ));
        }
        _ => {}
    }
}

fn fill_country(base: &mut Case, other: &Case, notes: &mut Vec<String>) {
    match (&base.country, &other.country) {
        (None, Some(country)) => {
            notes.push(format!(
                "country `{country}` taken from {}",
                other.identity()
            ));
            base.country = Some(country.clone());
        }
        (Some(kept), Some(dropped)) if kept != dropped => {
            notes.push(format!(
                "country `{kept}` preferred over `{dropped}` from {}",
                other.identity()
            ));
        }
        _ => {}
    }
}

fn fill_onset(base: &mut Case, other: &Case, notes: &mut Vec<String>) {
    if base.onset_date.is_none() {
        if let Some(onset) = other.onset_date {
            base.onset_date = Some(onset);
            notes.push(format!("onset {onset} taken from {}", other.identity()));
        }
    }
}

/// Count of populated optional fields; used to pick the merge base.
fn completeness(case: &Case) -> usize {
    let mut score = 0;
    if case.age.is_some() {
        score += 1;
    }
    if case.country.is_some() {
        score += 1;
    }
    if case.onset_date.is_some() {
        score += 1;
    }
    score + case.drugs.len() + case.reactions.len()
}

fn union_provenance(a: &CanonicalCase, b: &CanonicalCase) -> Vec<String> {
    let mut provenance: Vec<String> = a
        .merged_from
        .iter()
        .chain(b.merged_from.iter())
        .cloned()
        .collect();
    provenance.sort();
    provenance.dedup();
    provenance
}
