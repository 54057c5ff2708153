use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use ah_strategy_lab::analyzer::{BetSide, DEFAULT_MIN_COVERAGE, analyze};
use ah_strategy_lab::expr::{Expr, Value};
use ah_strategy_lab::factor::{FactorCatalogue, FactorEvaluator};
use ah_strategy_lab::filter::RecordFilter;
use ah_strategy_lab::handicap::parse_handicap;
use ah_strategy_lab::record::{MatchRecord, parse_season_json};
use ah_strategy_lab::search::{CancelToken, SearchConfig, run_search};
use ah_strategy_lab::staking::{StakingPolicy, StepStaking};
use ah_strategy_lab::synthetic::SyntheticSeason;

fn season() -> Vec<MatchRecord> {
    SyntheticSeason::default().generate()
}

fn bench_handicap_parse(c: &mut Criterion) {
    let lines = ["0", "-0.5", "0/-0.5", "+1/+1.5", "-0.75", "2.25"];
    c.bench_function("handicap_parse", |b| {
        b.iter(|| {
            for line in lines {
                black_box(parse_handicap(black_box(line)).ok());
            }
        })
    });
}

fn bench_expression_eval(c: &mut Criterion) {
    let records = season();
    let expr =
        Expr::parse("home_played >= 3 && (home_form - away_form) >= 4 || abs(odds_gap) < 0.1")
            .expect("valid expression");
    c.bench_function("expression_eval", |b| {
        b.iter(|| {
            let hits = records
                .iter()
                .filter(|r| matches!(expr.eval(r), Some(Value::Bool(true))))
                .count();
            black_box(hits);
        })
    });
}

fn bench_analyze_step_staking(c: &mut Criterion) {
    let records = season();
    let policy = StakingPolicy::step(StepStaking::default());
    c.bench_function("analyze_step_staking", |b| {
        b.iter(|| {
            let s = analyze(&records, BetSide::LowerOdds, &policy, DEFAULT_MIN_COVERAGE);
            black_box(s.roi);
        })
    });
}

fn bench_filter_pairs(c: &mut Criterion) {
    let records = season();
    let catalogue = FactorCatalogue::builtin().expect("built-in factors compile");
    let keys = catalogue.keys();
    let evaluator = FactorEvaluator::new();
    // Warm the factor cache so this measures combination narrowing.
    RecordFilter::new(&records, &catalogue, &evaluator)
        .filter(&keys[..1])
        .expect("known key");
    c.bench_function("filter_pairs_cold_combination_cache", |b| {
        b.iter(|| {
            let mut filter = RecordFilter::new(&records, &catalogue, &evaluator);
            let mut total = 0usize;
            for i in 0..keys.len() {
                for j in i + 1..keys.len() {
                    total += filter.filter(&[&keys[i], &keys[j]]).expect("known keys").len();
                }
            }
            black_box(total);
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let records = season();
    let catalogue = FactorCatalogue::builtin().expect("built-in factors compile");
    let cfg = SearchConfig {
        max_size: 2,
        ..SearchConfig::default()
    };
    let mut group = c.benchmark_group("search_k2");
    group.sample_size(10);
    for parallel in [false, true] {
        let cfg = SearchConfig {
            parallel,
            ..cfg.clone()
        };
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| {
                let evaluator = FactorEvaluator::new();
                let report =
                    run_search(&records, &catalogue, &evaluator, &cfg, &CancelToken::new())
                        .expect("search");
                black_box(report.evaluated);
            })
        });
    }
    group.finish();
}

fn bench_season_parse(c: &mut Criterion) {
    let raw = serde_json::to_string(&season()).expect("serialise season");
    c.bench_function("season_json_parse", |b| {
        b.iter(|| {
            let records = parse_season_json(black_box(&raw)).expect("valid season json");
            black_box(records.len());
        })
    });
}

criterion_group!(
    perf,
    bench_handicap_parse,
    bench_expression_eval,
    bench_analyze_step_staking,
    bench_filter_pairs,
    bench_search,
    bench_season_parse
);
criterion_main!(perf);
