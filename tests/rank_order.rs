use chrono::NaiveDate;
use signal_kernel::cases::{Case, CanonicalCase, CasePool, Outcome, Sex, Source};
use signal_kernel::config::EngineConfig;
use signal_kernel::signals;

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn case(id: usize, drugs: &[&str], reactions: &[&str], serious: bool, date: NaiveDate) -> CanonicalCase {
    CanonicalCase::singleton(Case {
        case_id: Some(format!("CASE-{id}")),
        drugs: drugs.iter().map(|s| s.to_string()).collect(),
        reactions: reactions.iter().map(|s| s.to_string()).collect(),
        age: Some(55.0),
        sex: Sex::Female,
        country: Some("us".into()),
        serious,
        outcome: if serious {
            Outcome::Hospitalization
        } else {
            Outcome::None
        },
        onset_date: None,
        report_date: date,
        source: Source::Regulatory,
    })
}

/// 10,000-case comparator pool: 100 cases of drug a, 8 of which report the
/// rare reaction; nothing else does.
fn rare_signal_pool() -> CasePool {
    let mut cases = Vec::new();
    for idx in 0..8 {
        cases.push(case(
            idx,
            &["drug a"],
            &["torsade de pointes", "nausea"],
            true,
            day(2026, 6, 1),
        ));
    }
    for idx in 8..100 {
        cases.push(case(idx, &["drug a"], &["nausea"], false, day(2024, 1, 15)));
    }
    for idx in 100..10_000 {
        cases.push(case(
            idx,
            &["background drug"],
            &["nausea"],
            false,
            day(2024, 1, 15),
        ));
    }
    CasePool::build(cases)
}

#[test]
fn rare_serious_pair_surfaces_at_quantum_rank_one() {
    let pool = rare_signal_pool();
    let config = EngineConfig::default();

    let found = signals::scan_drug(&pool, "drug a", &config).expect("scan succeeds");
    let ranked = signals::rank_signals(found);
    assert!(ranked.len() >= 2);

    let top = &ranked[0];
    assert_eq!(top.quantum_rank, 1);
    assert_eq!(top.reaction, "torsade de pointes");
    assert_eq!(top.count, 8);
    // No comparator case reports the reaction, so PRR is corrected and huge.
    assert!(top.prr > 100.0);
    assert!(top.low_confidence);
    // Classical ranking by raw count tells the opposite story.
    assert!(top.classical_rank > 1);

    let nausea = ranked
        .iter()
        .find(|s| s.reaction == "nausea")
        .expect("nausea signal present");
    assert_eq!(nausea.classical_rank, 1);
}

#[test]
fn pairs_below_count_floor_are_excluded_not_zero_scored() {
    let mut cases = Vec::new();
    for idx in 0..4 {
        cases.push(case(idx, &["drug b"], &["rash"], false, day(2026, 1, 1)));
    }
    for idx in 4..40 {
        cases.push(case(idx, &["drug b"], &["headache"], false, day(2026, 1, 1)));
    }
    let pool = CasePool::build(cases);
    let config = EngineConfig::default();

    let found = signals::scan_drug(&pool, "drug b", &config).expect("scan succeeds");
    assert!(found.iter().all(|s| s.reaction != "rash"));
    assert!(found.iter().any(|s| s.reaction == "headache"));
}

#[test]
fn scores_stay_in_unit_interval() {
    let pool = rare_signal_pool();
    let config = EngineConfig::default();
    let ranked = signals::rank_signals(
        signals::scan_drug(&pool, "drug a", &config).expect("scan succeeds"),
    );
    for signal in &ranked {
        assert!((0.0..=1.0).contains(&signal.quantum_score), "score {}", signal.quantum_score);
    }
}

#[test]
fn ranking_is_deterministic_across_runs() {
    let pool = rare_signal_pool();
    let config = EngineConfig::default();
    let first = signals::rank_signals(
        signals::scan_drug(&pool, "drug a", &config).expect("scan succeeds"),
    );
    let second = signals::rank_signals(
        signals::scan_drug(&pool, "drug a", &config).expect("scan succeeds"),
    );
    let left = serde_json::to_string(&first).expect("serialisable");
    let right = serde_json::to_string(&second).expect("serialisable");
    assert_eq!(left, right);
}

#[test]
fn tie_break_orders_by_count_then_name() {
    let mut cases = Vec::new();
    // Two pairs with identical statistics; only the names differ.
    for idx in 0..10 {
        cases.push(case(idx, &["drug x"], &["anemia"], false, day(2026, 1, 1)));
    }
    for idx in 10..20 {
        cases.push(case(idx, &["drug x"], &["zoster"], false, day(2026, 1, 1)));
    }
    for idx in 20..200 {
        cases.push(case(idx, &["filler"], &["fatigue"], false, day(2026, 1, 1)));
    }
    let pool = CasePool::build(cases);
    let config = EngineConfig::default();
    let ranked = signals::rank_signals(
        signals::scan_drug(&pool, "drug x", &config).expect("scan succeeds"),
    );
    let anemia = ranked.iter().position(|s| s.reaction == "anemia").unwrap();
    let zoster = ranked.iter().position(|s| s.reaction == "zoster").unwrap();
    assert!(anemia < zoster);
}
