use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};

use ah_strategy_lab::config::EngineConfig;
use ah_strategy_lab::determinism::verify_pipeline;
use ah_strategy_lab::error::DeterminismError;
use ah_strategy_lab::factor::FactorCatalogue;
use ah_strategy_lab::history::annotate_history;
use ah_strategy_lab::record::{MatchRecord, load_season_file};
use ah_strategy_lab::synthetic::SyntheticSeason;

const DEFAULT_RUNS: usize = 3;
const MAX_PRINTED_PATHS: usize = 20;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(diff) = err.downcast_ref::<DeterminismError>() {
                eprintln!("{diff}");
                eprintln!("  expected {}", diff.expected_digest);
                eprintln!("  actual   {}", diff.actual_digest);
                for path in diff.paths.iter().take(MAX_PRINTED_PATHS) {
                    eprintln!("  {path}");
                }
                if diff.paths.len() > MAX_PRINTED_PATHS {
                    eprintln!("  ... {} more", diff.paths.len() - MAX_PRINTED_PATHS);
                }
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cfg = EngineConfig::from_env().context("load configuration")?;
    let runs = parse_usize_arg("--runs").unwrap_or(DEFAULT_RUNS);

    let records = if has_flag("--synthetic") {
        SyntheticSeason::default().generate()
    } else {
        load_seasons()?
    };
    if records.is_empty() {
        return Err(anyhow!("no match records; pass season json files or --synthetic"));
    }
    let catalogue = match &cfg.factor_file {
        Some(path) => FactorCatalogue::load(path)?,
        None => FactorCatalogue::builtin()?,
    };

    let report = verify_pipeline(
        &records,
        &catalogue,
        &cfg.search,
        runs,
        has_flag("--alternate-modes"),
    )?;
    println!("deterministic over {} runs: sha256={}", report.runs, report.digest);
    Ok(())
}

fn load_seasons() -> Result<Vec<MatchRecord>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut records = Vec::new();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--runs" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        records.append(&mut load_season_file(&PathBuf::from(arg))?);
    }
    annotate_history(&mut records);
    Ok(records)
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
