//! Flat export of ranked signals for dashboards and report collaborators.
//!
//! The engine owns no file formats; it serialises rows to any writer as
//! delimited text, or hands back structured records for the caller to
//! persist however it likes.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::signals::{Signal, SignalDetail};

/// The flat column set promised to downstream consumers.
#[derive(Debug, Clone, Serialize)]
pub struct SignalRow {
    pub source_drug: String,
    pub reaction: String,
    pub count: u64,
    pub quantum_score: f64,
    pub quantum_rank: usize,
    pub classical_rank: usize,
    pub prr: f64,
    pub ror: f64,
    pub ic: f64,
    pub ebgm: f64,
    pub chi2_p: f64,
    pub fisher_p: f64,
}

impl From<&Signal> for SignalRow {
    fn from(signal: &Signal) -> Self {
        Self {
            source_drug: signal.drug.clone(),
            reaction: signal.reaction.clone(),
            count: signal.count,
            quantum_score: signal.quantum_score,
            quantum_rank: signal.quantum_rank,
            classical_rank: signal.classical_rank,
            prr: signal.prr,
            ror: signal.ror,
            ic: signal.ic,
            ebgm: signal.ebgm,
            chi2_p: signal.chi2_p,
            fisher_p: signal.fisher_p,
        }
    }
}

/// Flatten signals into export rows, preserving rank order.
pub fn to_rows(signals: &[Signal]) -> Vec<SignalRow> {
    signals.iter().map(SignalRow::from).collect()
}

/// Write signals as delimited text through any writer.
pub fn write_delimited<W: Write>(signals: &[Signal], writer: W, delimiter: u8) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    for row in to_rows(signals) {
        csv_writer
            .serialize(row)
            .context("serialising signal row")?;
    }
    csv_writer.flush().context("flushing delimited output")?;
    info!(rows = signals.len(), "wrote ranked signals");
    Ok(())
}

/// Structured JSON export, with optional nested refinements per signal.
pub fn to_json(details: &[SignalDetail]) -> Result<String> {
    serde_json::to_string_pretty(details).context("serialising signal details")
}
