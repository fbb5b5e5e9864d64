//! Watchlist batch driver.
//!
//! Fans one scan task per watched drug across a bounded worker pool, applies
//! the mandatory per-scan timeout, fans results back in, and assigns the
//! global rank orderings. A single drug's failure or overrun is isolated and
//! annotated; it never aborts the batch. The report always distinguishes "no
//! signal found" from "could not evaluate".

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::cases::CasePool;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::signals::{self, Signal};

/// Ranked report rows are truncated to this many signals; the untruncated
/// set stays available for export.
const REPORT_TOP_N: usize = 50;

/// Driver lifecycle. `Failed` is reachable from any state on unrecoverable
/// error; per-drug trouble never reaches it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScanState {
    Idle,
    Scanning { completed: usize, total: usize },
    Aggregating,
    Ranked,
    Done,
    Failed { reason: String },
}

/// How one watched drug's scan ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DrugScanStatus {
    /// Ran cleanly and produced signals.
    Completed,
    /// Ran cleanly; nothing met the count floor. Not an error.
    NoSignal,
    /// Scan budget exceeded; the drug is omitted from ranking.
    TimedOut,
    /// Unrecoverable per-drug error, isolated from the batch.
    Failed { reason: String },
}

/// Per-drug annotation carried on the report.
#[derive(Debug, Clone, Serialize)]
pub struct DrugOutcome {
    pub drug: String,
    pub status: DrugScanStatus,
    pub signal_count: usize,
}

/// Output of one watchlist run.
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistReport {
    /// Fingerprint of the pool the report was computed from.
    pub fingerprint: String,
    /// Ranked signals truncated to the top fifty for review.
    pub top_signals: Vec<Signal>,
    /// The full ranked set, for export.
    pub all_signals: Vec<Signal>,
    pub drug_outcomes: Vec<DrugOutcome>,
}

impl WatchlistReport {
    /// Drugs that ran cleanly but produced nothing above threshold.
    pub fn drugs_without_signal(&self) -> impl Iterator<Item = &str> {
        self.drug_outcomes
            .iter()
            .filter(|o| o.status == DrugScanStatus::NoSignal)
            .map(|o| o.drug.as_str())
    }

    /// Drugs the batch could not evaluate, with why. Never conflated with
    /// a clean below-threshold run.
    pub fn drugs_not_evaluated(&self) -> impl Iterator<Item = &DrugOutcome> {
        self.drug_outcomes.iter().filter(|o| {
            matches!(
                o.status,
                DrugScanStatus::TimedOut | DrugScanStatus::Failed { .. }
            )
        })
    }
}

type CacheKey = (String, String, &'static str);

/// Orchestrates watchlist scans over an immutable case pool.
pub struct WatchlistDriver {
    config: EngineConfig,
    state: Mutex<ScanState>,
    cache: Mutex<HashMap<CacheKey, Arc<WatchlistReport>>>,
}

impl WatchlistDriver {
    /// Validate configuration up front; this is the fail-fast boundary.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(ScanState::Idle),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.state.lock().expect("state mutex").clone()
    }

    /// Drop every cached report. Cache entries are keyed by pool fingerprint,
    /// so a changed pool already misses; this is for explicit resets.
    pub fn invalidate_cache(&self) {
        self.cache.lock().expect("cache mutex").clear();
    }

    /// Run the watchlist scan and produce a ranked report.
    ///
    /// The pool is read-only for the duration, so per-drug tasks run without
    /// locks; fan-out width and the per-scan budget come from configuration.
    #[instrument(skip(self, pool, watchlist), fields(drugs = watchlist.len()))]
    pub async fn run(
        &self,
        pool: Arc<CasePool>,
        watchlist: &[String],
    ) -> Result<WatchlistReport> {
        let cache_key: CacheKey = (
            pool.fingerprint().to_string(),
            watchlist.join("\u{1f}"),
            "watchlist",
        );
        if let Some(cached) = self.cache.lock().expect("cache mutex").get(&cache_key) {
            info!(fingerprint = %cache_key.0, "watchlist report served from cache");
            self.set_state(ScanState::Done);
            return Ok(cached.as_ref().clone());
        }

        self.set_state(ScanState::Scanning {
            completed: 0,
            total: watchlist.len(),
        });

        let budget = Duration::from_millis(self.config.scan_timeout_ms);
        let outcomes: Vec<(String, DrugScanStatus, Vec<Signal>)> =
            stream::iter(watchlist.iter().cloned())
                .map(|drug| {
                    let pool = pool.clone();
                    let config = self.config.clone();
                    async move {
                        let result = timeout(
                            budget,
                            tokio::task::spawn_blocking({
                                let pool = pool.clone();
                                let drug = drug.clone();
                                let config = config.clone();
                                move || signals::scan_drug(&pool, &drug, &config)
                            }),
                        )
                        .await;
                        let outcome = match result {
                            Err(_) => {
                                let err = EngineError::Timeout {
                                    drug: drug.clone(),
                                    budget_ms: budget.as_millis() as u64,
                                };
                                warn!(%err, "scan aborted");
                                (DrugScanStatus::TimedOut, Vec::new())
                            }
                            Ok(Err(join_err)) => (
                                DrugScanStatus::Failed {
                                    reason: format!("scan task aborted: {join_err}"),
                                },
                                Vec::new(),
                            ),
                            Ok(Ok(Err(engine_err))) => {
                                warn!(%drug, %engine_err, "scan failed");
                                (
                                    DrugScanStatus::Failed {
                                        reason: engine_err.to_string(),
                                    },
                                    Vec::new(),
                                )
                            }
                            Ok(Ok(Ok(found))) if found.is_empty() => {
                                (DrugScanStatus::NoSignal, Vec::new())
                            }
                            Ok(Ok(Ok(found))) => (DrugScanStatus::Completed, found),
                        };
                        (drug, outcome.0, outcome.1)
                    }
                })
                .buffer_unordered(self.config.worker_pool_size.max(1))
                .collect()
                .await;

        self.set_state(ScanState::Aggregating);

        // Fan-in lands unordered; restore watchlist order for determinism.
        let mut by_drug: HashMap<String, (DrugScanStatus, Vec<Signal>)> = outcomes
            .into_iter()
            .map(|(drug, status, found)| (drug, (status, found)))
            .collect();

        let mut all_signals = Vec::new();
        let mut drug_outcomes = Vec::with_capacity(watchlist.len());
        for drug in watchlist {
            let Some((status, found)) = by_drug.remove(drug) else {
                let reason = format!("missing scan outcome for {drug}");
                self.set_state(ScanState::Failed {
                    reason: reason.clone(),
                });
                return Err(anyhow::anyhow!(reason)).context("aggregating watchlist outcomes");
            };
            drug_outcomes.push(DrugOutcome {
                drug: drug.clone(),
                status,
                signal_count: found.len(),
            });
            all_signals.extend(found);
        }

        let all_signals = signals::rank_signals(all_signals);
        self.set_state(ScanState::Ranked);

        let top_signals: Vec<Signal> =
            all_signals.iter().take(REPORT_TOP_N).cloned().collect();
        let report = WatchlistReport {
            fingerprint: pool.fingerprint().to_string(),
            top_signals,
            all_signals,
            drug_outcomes,
        };
        info!(
            signals = report.all_signals.len(),
            reported = report.top_signals.len(),
            not_evaluated = report.drugs_not_evaluated().count(),
            "watchlist scan complete"
        );

        self.cache
            .lock()
            .expect("cache mutex")
            .insert(cache_key, Arc::new(report.clone()));
        self.set_state(ScanState::Done);
        Ok(report)
    }

    fn set_state(&self, next: ScanState) {
        *self.state.lock().expect("state mutex") = next;
    }
}
