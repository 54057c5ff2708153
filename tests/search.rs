use ah_strategy_lab::analyzer::BetSide;
use ah_strategy_lab::factor::{FactorCatalogue, FactorDef, FactorEvaluator};
use ah_strategy_lab::record::MatchRecord;
use ah_strategy_lab::search::{
    Bucket, BucketGates, CancelToken, SearchConfig, SearchReport, binomial, run_search,
};
use ah_strategy_lab::synthetic::SyntheticSeason;

fn season() -> Vec<MatchRecord> {
    SyntheticSeason {
        teams: 12,
        seed: 42,
        ..SyntheticSeason::default()
    }
    .generate()
}

fn catalogue() -> FactorCatalogue {
    let wanted = ["odds", "handicap", "calendar"].map(String::from);
    FactorCatalogue::builtin()
        .expect("built-in factors compile")
        .select_categories(&wanted)
}

fn search(records: &[MatchRecord], cat: &FactorCatalogue, cfg: &SearchConfig) -> SearchReport {
    let evaluator = FactorEvaluator::new();
    run_search(records, cat, &evaluator, cfg, &CancelToken::new()).expect("search should run")
}

#[test]
fn sweep_accounts_for_every_combination() {
    let records = season();
    let cat = catalogue();
    let cfg = SearchConfig {
        max_size: 3,
        ..SearchConfig::default()
    };
    let report = search(&records, &cat, &cfg);
    let n = cat.len();
    assert_eq!(
        report.combinations_total,
        binomial(n, 1) + binomial(n, 2) + binomial(n, 3)
    );
    assert_eq!(report.evaluated + report.pruned, report.combinations_total);
    assert_eq!(report.completed_sizes, 3);
    assert!(!report.cancelled);
    assert!(report.best().is_some());
}

#[test]
fn buckets_respect_thresholds_gates_and_order() {
    let records = season();
    let cat = catalogue();
    let cfg = SearchConfig {
        max_size: 2,
        top_n: 5,
        bet_sides: BetSide::ALL.to_vec(),
        ..SearchConfig::default()
    };
    let report = search(&records, &cat, &cfg);
    for bucket in Bucket::ALL {
        let rows = report.bucket(bucket);
        assert!(rows.len() <= cfg.top_n);
        for row in rows {
            assert_eq!(cfg.thresholds.classify(row.matched_records), bucket);
            assert!(row.total_bets >= cfg.min_bets.for_bucket(bucket));
            assert!(row.total_bets <= row.matched_records);
            assert!((row.roi - row.total_profit / row.total_staked * 100.0).abs() < 1e-9);
        }
        for pair in rows.windows(2) {
            assert!(pair[0].roi >= pair[1].roi);
        }
    }
}

#[test]
fn contradictory_factors_prune_supersets() {
    let records = season();
    let def = |name: &str, expression: &str| FactorDef {
        name: name.into(),
        category: "t".into(),
        expression: expression.into(),
        threshold: None,
    };
    let cat = FactorCatalogue::from_defs(&[
        def("home_fav", "home_odds < away_odds"),
        def("away_fav", "away_odds < home_odds"),
        def("early", "week <= 4"),
        def("late", "week >= 12"),
    ])
    .expect("catalogue");
    let cfg = SearchConfig {
        max_size: 4,
        min_bets: BucketGates::uniform(1),
        ..SearchConfig::default()
    };
    let report = search(&records, &cat, &cfg);
    // Both "fav" pairs and "early & late" match nothing, so every triple and
    // the quadruple contain a dead pair.
    assert_eq!(report.pruned, binomial(4, 3) + binomial(4, 4));
    assert_eq!(report.evaluated, 4 + 6);
    for row in report.buckets.values().flatten() {
        let f = &row.factors;
        assert!(!(f.contains(&"t.home_fav".to_string()) && f.contains(&"t.away_fav".to_string())));
    }
}

#[test]
fn parallel_sweep_matches_sequential() {
    let records = season();
    let cat = catalogue();
    let cfg = SearchConfig {
        max_size: 3,
        ..SearchConfig::default()
    };
    let seq = search(&records, &cat, &cfg);
    let par = search(
        &records,
        &cat,
        &SearchConfig {
            parallel: true,
            ..cfg.clone()
        },
    );
    assert_eq!(seq.buckets, par.buckets);
    assert_eq!(seq.evaluated, par.evaluated);
    assert_eq!(seq.pruned, par.pruned);
}

#[test]
fn cancelled_search_reports_partial_state() {
    let records = season();
    let cat = catalogue();
    let evaluator = FactorEvaluator::new();
    let token = CancelToken::new();
    token.cancel();
    let report = run_search(&records, &cat, &evaluator, &SearchConfig::default(), &token)
        .expect("cancellation is not an error");
    assert!(report.cancelled);
    assert_eq!(report.evaluated, 0);
    assert_eq!(report.completed_sizes, 0);
    assert!(report.buckets.values().all(Vec::is_empty));
}

#[test]
fn budget_stops_mid_sweep_with_partial_rankings() {
    let records = season();
    let cat = catalogue();
    let n = cat.len() as u64;
    let cfg = SearchConfig {
        max_size: 3,
        top_n: 100_000,
        bet_sides: BetSide::ALL.to_vec(),
        min_bets: BucketGates::uniform(1),
        max_evaluations: Some(n + 5),
        ..SearchConfig::default()
    };
    let seq = search(&records, &cat, &cfg);
    let par = search(
        &records,
        &cat,
        &SearchConfig {
            parallel: true,
            ..cfg.clone()
        },
    );
    for report in [&seq, &par] {
        assert!(report.cancelled);
        assert_eq!(report.completed_sizes, 1);
        assert_eq!(report.evaluated, n + 5);
        assert!(report.buckets.values().any(|rows| !rows.is_empty()));
    }
    assert_eq!(seq.buckets, par.buckets);
    assert_eq!(seq.pruned, par.pruned);

    let full = search(
        &records,
        &cat,
        &SearchConfig {
            max_size: 2,
            max_evaluations: None,
            ..cfg.clone()
        },
    );
    assert!(!full.cancelled);
    let full_rows: Vec<_> = full.buckets.values().flatten().collect();
    let partial_rows: Vec<_> = seq.buckets.values().flatten().collect();
    for row in &partial_rows {
        assert!(full_rows.contains(row), "{:?} missing from full sweep", row.factors);
        assert!(row.factors.len() <= 2);
    }
    // The first size finished, so every single-factor row is present.
    for row in full_rows.iter().filter(|r| r.factors.len() == 1) {
        assert!(partial_rows.contains(row), "{:?} dropped", row.factors);
    }
}

#[test]
fn budget_equal_to_the_work_completes() {
    let records = season();
    let cat = catalogue();
    let cfg = SearchConfig {
        max_size: 2,
        ..SearchConfig::default()
    };
    let full = search(&records, &cat, &cfg);
    let exact = search(
        &records,
        &cat,
        &SearchConfig {
            max_evaluations: Some(full.evaluated),
            ..cfg.clone()
        },
    );
    assert!(!exact.cancelled);
    assert_eq!(exact.completed_sizes, 2);
    assert_eq!(exact.buckets, full.buckets);

    let short = search(
        &records,
        &cat,
        &SearchConfig {
            max_evaluations: Some(full.evaluated - 1),
            ..cfg
        },
    );
    assert!(short.cancelled);
    assert_eq!(short.completed_sizes, 1);
    assert_eq!(short.evaluated, full.evaluated - 1);
}

#[test]
fn oversized_combination_request_is_rejected() {
    let records = season();
    let cat = catalogue();
    let cfg = SearchConfig {
        max_size: 7,
        ..SearchConfig::default()
    };
    let evaluator = FactorEvaluator::new();
    assert!(run_search(&records, &cat, &evaluator, &cfg, &CancelToken::new()).is_err());
}

#[test]
fn report_serialises_with_camel_case_keys() {
    let records = season();
    let cat = catalogue();
    let cfg = SearchConfig {
        max_size: 1,
        ..SearchConfig::default()
    };
    let value = serde_json::to_value(search(&records, &cat, &cfg)).expect("json");
    for key in ["generatedAt", "combinationsTotal", "evaluated", "pruned", "cancelled"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert!(value["buckets"].get("too_broad").is_some());
}
