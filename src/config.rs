use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::analyzer::{BetSide, DEFAULT_MIN_COVERAGE};
use crate::search::{DEFAULT_COMBINATION_SIZE, DEFAULT_TOP_N, MAX_COMBINATION_SIZE, SearchConfig};
use crate::staking::{
    DEFAULT_BASE_ODDS, DEFAULT_BASE_STAKE, DEFAULT_FIXED_STAKE, DEFAULT_MAX_STAKE,
    DEFAULT_STAKE_INCREMENT, StakingPolicy, StepStaking,
};

const MAX_TOP_N: usize = 1_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub factor_file: Option<PathBuf>,
}

impl EngineConfig {
    /// Reads `AH_*` variables, after loading `.env` if one is present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let num = |key: &str, default: f64| -> Result<f64> {
            match text(key) {
                Some(raw) => raw
                    .parse::<f64>()
                    .with_context(|| format!("{key} is not a number: {raw}")),
                None => Ok(default),
            }
        };
        let count = |key: &str, default: usize| -> Result<usize> {
            match text(key) {
                Some(raw) => raw
                    .parse::<usize>()
                    .with_context(|| format!("{key} is not a count: {raw}")),
                None => Ok(default),
            }
        };

        let staking = match text("AH_STAKING")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("fixed") => {
                StakingPolicy::fixed(num("AH_FIXED_STAKE", DEFAULT_FIXED_STAKE)?)
            }
            Some("step") => StakingPolicy::step(StepStaking {
                base_odds: num("AH_BASE_ODDS", DEFAULT_BASE_ODDS)?,
                base_stake: num("AH_BASE_STAKE", DEFAULT_BASE_STAKE)?,
                increment: num("AH_STAKE_INCREMENT", DEFAULT_STAKE_INCREMENT)?,
                max_stake: num("AH_MAX_STAKE", DEFAULT_MAX_STAKE)?,
            }),
            Some(other) => return Err(anyhow!("AH_STAKING must be fixed or step, got {other}")),
        };

        let bet_sides = match text("AH_BET_SIDES") {
            Some(raw) => parse_bet_sides(&raw)?,
            None => SearchConfig::default().bet_sides,
        };

        let max_evaluations = match text("AH_MAX_EVALUATIONS") {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("AH_MAX_EVALUATIONS is not a count: {raw}"))?,
            ),
            None => None,
        };

        let search = SearchConfig {
            max_size: count("AH_MAX_COMBINATION_SIZE", DEFAULT_COMBINATION_SIZE)?
                .clamp(1, MAX_COMBINATION_SIZE),
            top_n: count("AH_TOP_N", DEFAULT_TOP_N)?.clamp(1, MAX_TOP_N),
            min_coverage: num("AH_MIN_COVERAGE", DEFAULT_MIN_COVERAGE)?.clamp(0.0, 1.0),
            parallel: text("AH_PARALLEL").is_some_and(|v| truthy(&v)),
            bet_sides,
            staking,
            max_evaluations,
            ..SearchConfig::default()
        };
        search.validate().context("invalid search configuration")?;

        Ok(Self {
            search,
            factor_file: text("AH_FACTOR_FILE").map(PathBuf::from),
        })
    }
}

pub fn parse_bet_sides(raw: &str) -> Result<Vec<BetSide>> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.eq_ignore_ascii_case("all") {
            return Ok(BetSide::ALL.to_vec());
        }
        let side = BetSide::parse(part).ok_or_else(|| anyhow!("unknown bet side: {part}"))?;
        if !out.contains(&side) {
            out.push(side);
        }
    }
    if out.is_empty() {
        return Err(anyhow!("no bet sides in {raw:?}"));
    }
    Ok(out)
}

fn truthy(v: &str) -> bool {
    let t = v.to_ascii_lowercase();
    !(t == "0" || t == "false" || t == "off" || t == "no")
}
