//! Engine error taxonomy.
//!
//! Only configuration errors are fatal; data and timeout errors are recovered
//! locally and surfaced as annotations on the output. Statistical degradation
//! (zero cells) and ambiguous merges are not errors at all: the former yields
//! a `low_confidence` flag, the latter a [`MergeDecision`] variant carrying
//! the reason.
//!
//! [`MergeDecision`]: crate::cases::dedup::MergeDecision

use thiserror::Error;

/// Errors produced by the signal engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration, rejected before any scan runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A malformed case record; the case is rejected, the batch continues.
    #[error("malformed case record: {0}")]
    Data(String),

    /// A per-drug scan exceeded its budget; the drug is isolated, the batch
    /// continues.
    #[error("scan for {drug} exceeded {budget_ms} ms")]
    Timeout { drug: String, budget_ms: u64 },
}

impl EngineError {
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
