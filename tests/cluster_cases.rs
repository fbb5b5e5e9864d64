use chrono::NaiveDate;
use signal_kernel::cases::{Case, CanonicalCase, CasePool, Outcome, Sex, Source};
use signal_kernel::signals::cluster::{self, ClusterOutcome, MIN_CLUSTER_CASES};

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn case(id: usize, age: f64, sex: Sex, serious: bool) -> CanonicalCase {
    CanonicalCase::singleton(Case {
        case_id: Some(format!("K-{id}")),
        drugs: vec!["suspect drug".into()],
        reactions: vec!["rash".into()],
        age: Some(age),
        sex,
        country: None,
        serious,
        outcome: Outcome::Other,
        onset_date: None,
        report_date: day(2026, 3, 1),
        source: Source::Regulatory,
    })
}

#[test]
fn too_few_cases_skips_clustering() {
    let cases: Vec<CanonicalCase> = (0..MIN_CLUSTER_CASES - 1)
        .map(|id| case(id, 40.0, Sex::Female, false))
        .collect();
    let pool = CasePool::build(cases);
    let ordinals: Vec<usize> = (0..pool.len()).collect();

    match cluster::cluster_cases(&pool, &ordinals) {
        ClusterOutcome::Skipped { reason } => {
            assert!(reason.contains("below clustering floor"));
        }
        ClusterOutcome::Clustered { .. } => panic!("must skip below the floor"),
    }
}

#[test]
fn distinct_populations_separate_and_flag_the_risky_one() {
    let mut cases = Vec::new();
    // Elderly serious cluster, younger benign cluster, pediatric benign.
    for id in 0..12 {
        cases.push(case(id, 80.0 + (id % 3) as f64, Sex::Male, true));
    }
    for id in 12..24 {
        cases.push(case(id, 35.0 + (id % 4) as f64, Sex::Female, false));
    }
    for id in 24..34 {
        cases.push(case(id, 8.0 + (id % 4) as f64, Sex::Female, false));
    }
    let pool = CasePool::build(cases);
    let ordinals: Vec<usize> = (0..pool.len()).collect();

    let (clusters, highest_risk) = match cluster::cluster_cases(&pool, &ordinals) {
        ClusterOutcome::Clustered {
            clusters,
            highest_risk,
        } => (clusters, highest_risk),
        ClusterOutcome::Skipped { reason } => panic!("unexpected skip: {reason}"),
    };

    assert!(!clusters.is_empty());
    assert!(clusters.len() <= 3);
    let total: usize = clusters.iter().map(|c| c.size).sum();
    assert_eq!(total, pool.len());

    let risky = clusters
        .iter()
        .find(|c| c.cluster_id == highest_risk)
        .expect("highest-risk cluster exists");
    for cluster in &clusters {
        assert!(risky.pct_serious >= cluster.pct_serious);
    }
    // The serious cases are the elderly male block.
    assert!(risky.mean_age > 60.0);
    assert!(risky.pct_male > risky.pct_female);
}

#[test]
fn clustering_is_deterministic() {
    let cases: Vec<CanonicalCase> = (0..30)
        .map(|id| {
            case(
                id,
                20.0 + (id * 2) as f64,
                if id % 2 == 0 { Sex::Male } else { Sex::Female },
                id % 5 == 0,
            )
        })
        .collect();
    let pool = CasePool::build(cases);
    let ordinals: Vec<usize> = (0..pool.len()).collect();

    let first = serde_json::to_string(&cluster::cluster_cases(&pool, &ordinals)).unwrap();
    let second = serde_json::to_string(&cluster::cluster_cases(&pool, &ordinals)).unwrap();
    assert_eq!(first, second);
}
