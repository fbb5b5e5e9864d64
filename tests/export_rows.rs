use std::sync::Arc;

use chrono::NaiveDate;
use signal_kernel::batch::WatchlistDriver;
use signal_kernel::cases::{Case, CanonicalCase, CasePool, Outcome, Sex, Source};
use signal_kernel::config::EngineConfig;
use signal_kernel::{export, signals};

fn pool() -> Arc<CasePool> {
    let mut cases = Vec::new();
    for id in 0..40 {
        cases.push(CanonicalCase::singleton(Case {
            case_id: Some(format!("E-{id}")),
            drugs: vec!["alpha".into()],
            reactions: vec![if id < 12 { "hepatitis" } else { "rash" }.into()],
            age: Some(45.0),
            sex: Sex::Female,
            country: Some("fr".into()),
            serious: id < 12,
            outcome: Outcome::Other,
            onset_date: None,
            report_date: NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date"),
            source: Source::Regulatory,
        }));
    }
    for id in 40..400 {
        cases.push(CanonicalCase::singleton(Case {
            case_id: Some(format!("E-{id}")),
            drugs: vec!["background".into()],
            reactions: vec!["nausea".into()],
            age: Some(45.0),
            sex: Sex::Male,
            country: Some("fr".into()),
            serious: false,
            outcome: Outcome::None,
            onset_date: None,
            report_date: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
            source: Source::Regulatory,
        }));
    }
    Arc::new(CasePool::build(cases))
}

#[tokio::test]
async fn delimited_export_carries_the_flat_column_set() {
    let pool = pool();
    let driver = WatchlistDriver::new(EngineConfig::default()).expect("valid config");
    let report = driver
        .run(pool, &["alpha".to_string()])
        .await
        .expect("batch runs");

    let mut buffer = Vec::new();
    export::write_delimited(&report.all_signals, &mut buffer, b',').expect("export succeeds");
    let text = String::from_utf8(buffer).expect("utf8 output");
    let mut lines = text.lines();

    let header = lines.next().expect("header row");
    assert_eq!(
        header,
        "source_drug,reaction,count,quantum_score,quantum_rank,classical_rank,\
         prr,ror,ic,ebgm,chi2_p,fisher_p"
    );
    assert_eq!(lines.count(), report.all_signals.len());
    assert!(text.contains("alpha,hepatitis,12,"));
}

#[test]
fn json_export_nests_requested_refinements() {
    let pool = pool();
    let config = EngineConfig::default();
    let ranked = signals::rank_signals(
        signals::scan_drug(&pool, "alpha", &config).expect("scan succeeds"),
    );
    let details: Vec<_> = ranked
        .iter()
        .map(|signal| signals::refine_signal(&pool, signal, &config))
        .collect();

    let payload = export::to_json(&details).expect("serialisable");
    let parsed: serde_json::Value = serde_json::from_str(&payload).expect("valid json");
    let first = &parsed.as_array().expect("array")[0];
    assert!(first.get("signal").is_some());
    assert!(first.get("subgroups").is_some());
    assert!(first.get("clusters").is_some());
    assert!(first.get("anomalies").is_some());
}
