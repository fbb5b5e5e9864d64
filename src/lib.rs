//! Signal detection and ranking engine for pharmacovigilance case reports.
//!
//! The crate ingests normalized adverse-event cases, collapses cross-source
//! duplicates into a canonical pool, and produces ranked drug–event safety
//! signals: disproportionality statistics, a composite priority score, and
//! on-demand subgroup, clustering, and time-series refinements. File parsing,
//! query translation, rendering, and persistence are owned by callers.

pub mod batch;
pub mod cases;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod signals;

pub use batch::{DrugOutcome, DrugScanStatus, ScanState, WatchlistDriver, WatchlistReport};
pub use cases::{Case, CanonicalCase, CasePool, Outcome, Sex, Source};
pub use config::EngineConfig;
pub use error::EngineError;
pub use signals::Signal;
