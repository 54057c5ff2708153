use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};

use ah_strategy_lab::analyzer::{self, BetSide};
use ah_strategy_lab::config::{EngineConfig, parse_bet_sides};
use ah_strategy_lab::factor::{FactorCatalogue, FactorEvaluator};
use ah_strategy_lab::filter::RecordFilter;
use ah_strategy_lab::history::annotate_history;
use ah_strategy_lab::record::{MatchRecord, load_season_file};
use ah_strategy_lab::search::{Bucket, BucketGates, CancelToken, SearchReport, run_search};
use ah_strategy_lab::synthetic::SyntheticSeason;

const VALUE_FLAGS: &[&str] = &[
    "--factors",
    "--categories",
    "--max-size",
    "--top",
    "--min-bets",
    "--sides",
    "--budget-secs",
    "--max-evaluations",
    "--out",
    "--teams",
    "--seed",
];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = EngineConfig::from_env().context("load configuration")?;
    apply_cli_overrides(&mut cfg)?;

    let records = load_records()?;
    if records.is_empty() {
        return Err(anyhow!("no match records; pass season json files or --synthetic"));
    }

    let factor_file = parse_str_arg("--factors")
        .map(PathBuf::from)
        .or_else(|| cfg.factor_file.clone());
    let mut catalogue = match factor_file {
        Some(path) => FactorCatalogue::load(&path)?,
        None => FactorCatalogue::builtin()?,
    };
    if let Some(raw) = parse_str_arg("--categories") {
        let wanted: Vec<String> = raw.split(',').map(|c| c.trim().to_string()).collect();
        catalogue = catalogue.select_categories(&wanted);
    }
    if catalogue.is_empty() {
        return Err(anyhow!("factor catalogue is empty"));
    }

    let cancel = CancelToken::new();
    if let Some(secs) = parse_f64_arg("--budget-secs").filter(|s| s.is_finite() && *s > 0.0) {
        cancel.cancel_after(Duration::from_secs_f64(secs));
    }

    let started = Instant::now();
    let report = run_search(
        &records,
        &catalogue,
        FactorEvaluator::global(),
        &cfg.search,
        &cancel,
    )
    .context("combination search")?;
    let stats = FactorEvaluator::global().stats();
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        cache_entries = stats.entries,
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        "search done"
    );

    let json = serde_json::to_string_pretty(&report).context("serialise report")?;
    match parse_str_arg("--out") {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("write report {path}"))?;
            print_report(&report);
            println!("report written to {path}");
        }
        None => println!("{json}"),
    }

    if has_flag("--details")
        && let Some(best) = report.best()
    {
        print_details(&records, &catalogue, &cfg, &best.factors, best.bet_side)?;
    }
    Ok(())
}

fn apply_cli_overrides(cfg: &mut EngineConfig) -> Result<()> {
    let search = &mut cfg.search;
    if let Some(k) = parse_usize_arg("--max-size") {
        search.max_size = k;
    }
    if let Some(n) = parse_usize_arg("--top") {
        search.top_n = n;
    }
    if let Some(n) = parse_usize_arg("--min-bets") {
        search.min_bets = BucketGates::uniform(n);
    }
    if let Some(raw) = parse_str_arg("--sides") {
        search.bet_sides = parse_bet_sides(&raw)?;
    }
    if let Some(n) = parse_usize_arg("--max-evaluations") {
        search.max_evaluations = Some(n as u64);
    }
    if has_flag("--parallel") {
        search.parallel = true;
    }
    search.validate().context("invalid command line options")
}

fn load_records() -> Result<Vec<MatchRecord>> {
    if has_flag("--synthetic") {
        let defaults = SyntheticSeason::default();
        let season = SyntheticSeason {
            teams: parse_usize_arg("--teams").unwrap_or(defaults.teams).max(2),
            seed: parse_usize_arg("--seed").map_or(defaults.seed, |s| s as u64),
            ..defaults
        };
        return Ok(season.generate());
    }

    let mut records = Vec::new();
    for path in positional_args() {
        let mut season = load_season_file(&path)?;
        tracing::info!(path = %path.display(), records = season.len(), "season loaded");
        records.append(&mut season);
    }
    annotate_history(&mut records);
    Ok(records)
}

fn print_report(report: &SearchReport) {
    println!(
        "evaluated={} pruned={} total={} completed_sizes={} cancelled={}",
        report.evaluated,
        report.pruned,
        report.combinations_total,
        report.completed_sizes,
        report.cancelled
    );
    for bucket in Bucket::ALL {
        let rows = report.bucket(bucket);
        if rows.is_empty() {
            continue;
        }
        println!("{}:", bucket.label());
        for row in rows {
            println!(
                "  roi={:>7.2}% profit={:>10.2} bets={:>4} win_rate={:>5.1}% side={:<11} {}{}",
                row.roi,
                row.total_profit,
                row.total_bets,
                row.win_rate,
                row.bet_side.label(),
                row.factors.join(" & "),
                if row.low_coverage { " (low coverage)" } else { "" }
            );
        }
    }
}

fn print_details(
    records: &[MatchRecord],
    catalogue: &FactorCatalogue,
    cfg: &EngineConfig,
    factors: &[String],
    side: BetSide,
) -> Result<()> {
    let mut filter = RecordFilter::new(records, catalogue, FactorEvaluator::global());
    let matched = filter.filter_records(factors)?;
    let (summary, details) = analyzer::analyze_with_details(
        matched,
        side,
        &cfg.search.staking,
        cfg.search.min_coverage,
    );
    println!(
        "best: {} ({}) bets={} roi={:.2}%",
        factors.join(" & "),
        side.label(),
        summary.total_bets,
        summary.roi
    );
    for d in details {
        println!(
            "  {} {} v {} {:>5} {:<4} {:>8} @{:.2} stake={:.0} {:<9} {:+.2}",
            d.date,
            d.home_team,
            d.away_team,
            d.score,
            d.bet_side.label(),
            d.handicap,
            d.odds,
            d.stake,
            d.outcome.label(),
            d.profit
        );
    }
    Ok(())
}

fn positional_args() -> Vec<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            out.push(PathBuf::from(arg));
        }
    }
    out
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    parse_str_arg(name).and_then(|v| v.parse::<f64>().ok())
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    parse_str_arg(name).and_then(|v| v.parse::<usize>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
