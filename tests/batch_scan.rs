use std::sync::Arc;

use chrono::NaiveDate;
use signal_kernel::batch::{DrugScanStatus, ScanState, WatchlistDriver};
use signal_kernel::cases::{Case, CanonicalCase, CasePool, Outcome, Sex, Source};
use signal_kernel::config::EngineConfig;

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn case(id: usize, drug: &str, reactions: &[&str], serious: bool) -> CanonicalCase {
    CanonicalCase::singleton(Case {
        case_id: Some(format!("B-{id}")),
        drugs: vec![drug.to_string()],
        reactions: reactions.iter().map(|s| s.to_string()).collect(),
        age: Some(60.0),
        sex: Sex::Male,
        country: Some("de".into()),
        serious,
        outcome: Outcome::Other,
        onset_date: None,
        report_date: day(2026, 4, 1),
        source: Source::Regulatory,
    })
}

fn watchlist_pool() -> Arc<CasePool> {
    let mut cases = Vec::new();
    let mut id = 0;
    for _ in 0..30 {
        cases.push(case(id, "alpha", &["hepatitis"], true));
        id += 1;
    }
    for _ in 0..25 {
        cases.push(case(id, "beta", &["rash"], false));
        id += 1;
    }
    // Gamma never clears the count floor.
    for _ in 0..2 {
        cases.push(case(id, "gamma", &["dizziness"], false));
        id += 1;
    }
    for _ in 0..500 {
        cases.push(case(id, "background", &["nausea"], false));
        id += 1;
    }
    Arc::new(CasePool::build(cases))
}

#[tokio::test]
async fn batch_isolates_outcomes_per_drug() {
    let pool = watchlist_pool();
    let driver = WatchlistDriver::new(EngineConfig::default()).expect("valid config");
    let watchlist = vec![
        "alpha".to_string(),
        "beta".to_string(),
        "gamma".to_string(),
        "unheard-of".to_string(),
    ];

    let report = driver.run(pool, &watchlist).await.expect("batch runs");
    assert_eq!(driver.state(), ScanState::Done);
    assert_eq!(report.drug_outcomes.len(), 4);

    let status_of = |drug: &str| {
        report
            .drug_outcomes
            .iter()
            .find(|o| o.drug == drug)
            .map(|o| o.status.clone())
            .expect("outcome present")
    };
    assert_eq!(status_of("alpha"), DrugScanStatus::Completed);
    assert_eq!(status_of("beta"), DrugScanStatus::Completed);
    // Below the floor is "no signal found", never "could not evaluate".
    assert_eq!(status_of("gamma"), DrugScanStatus::NoSignal);
    assert_eq!(status_of("unheard-of"), DrugScanStatus::NoSignal);
    assert_eq!(report.drugs_not_evaluated().count(), 0);
}

#[tokio::test]
async fn parallel_and_sequential_runs_agree() {
    let pool = watchlist_pool();
    let watchlist = vec!["alpha".to_string(), "beta".to_string()];

    let mut sequential_config = EngineConfig::default();
    sequential_config.worker_pool_size = 1;
    let mut parallel_config = EngineConfig::default();
    parallel_config.worker_pool_size = 8;

    let sequential = WatchlistDriver::new(sequential_config)
        .expect("valid config")
        .run(pool.clone(), &watchlist)
        .await
        .expect("sequential batch runs");
    let parallel = WatchlistDriver::new(parallel_config)
        .expect("valid config")
        .run(pool, &watchlist)
        .await
        .expect("parallel batch runs");

    let left = serde_json::to_string(&sequential).expect("serialisable");
    let right = serde_json::to_string(&parallel).expect("serialisable");
    assert_eq!(left, right);
}

#[tokio::test]
async fn unchanged_pool_hits_the_cache() {
    let pool = watchlist_pool();
    let driver = WatchlistDriver::new(EngineConfig::default()).expect("valid config");
    let watchlist = vec!["alpha".to_string()];

    let first = driver
        .run(pool.clone(), &watchlist)
        .await
        .expect("first run");
    let second = driver.run(pool, &watchlist).await.expect("cached run");
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn changed_pool_regenerates_the_report() {
    let driver = WatchlistDriver::new(EngineConfig::default()).expect("valid config");
    let watchlist = vec!["alpha".to_string()];

    let first = driver
        .run(watchlist_pool(), &watchlist)
        .await
        .expect("first run");

    let mut cases: Vec<CanonicalCase> = watchlist_pool().cases().to_vec();
    let next_id = cases.len();
    for offset in 0..10 {
        cases.push(case(next_id + offset, "alpha", &["hepatitis"], true));
    }
    let grown = Arc::new(CasePool::build(cases));
    let second = driver.run(grown, &watchlist).await.expect("second run");

    assert_ne!(first.fingerprint, second.fingerprint);
    let count_of = |report: &signal_kernel::batch::WatchlistReport| {
        report
            .all_signals
            .iter()
            .find(|s| s.reaction == "hepatitis")
            .map(|s| s.count)
    };
    assert_eq!(count_of(&first), Some(30));
    assert_eq!(count_of(&second), Some(40));
}

#[test]
fn invalid_configuration_fails_fast() {
    let mut config = EngineConfig::default();
    config.score_weights.rarity = -1.0;
    assert!(WatchlistDriver::new(config).is_err());

    let mut config = EngineConfig::default();
    config.dedup.ambiguity_floor = 0.95;
    assert!(WatchlistDriver::new(config).is_err());

    let mut config = EngineConfig::default();
    config.worker_pool_size = 0;
    assert!(WatchlistDriver::new(config).is_err());
}
