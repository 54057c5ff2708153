use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FIXED_STAKE: f64 = 100.0;
pub const DEFAULT_BASE_ODDS: f64 = 1.91;
pub const DEFAULT_BASE_STAKE: f64 = 200.0;
pub const DEFAULT_STAKE_INCREMENT: f64 = 150.0;
pub const DEFAULT_MAX_STAKE: f64 = 10_000.0;

// Guards floor() against (1.95 - 1.91) * 100 = 3.9999999.
const STEP_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepStaking {
    pub base_odds: f64,
    pub base_stake: f64,
    pub increment: f64,
    pub max_stake: f64,
}

impl Default for StepStaking {
    fn default() -> Self {
        Self {
            base_odds: DEFAULT_BASE_ODDS,
            base_stake: DEFAULT_BASE_STAKE,
            increment: DEFAULT_STAKE_INCREMENT,
            max_stake: DEFAULT_MAX_STAKE,
        }
    }
}

impl StepStaking {
    pub fn stake(&self, odds: f64) -> f64 {
        if odds <= self.base_odds {
            return self.base_stake.min(self.max_stake);
        }
        let steps = ((odds - self.base_odds) * 100.0 + STEP_EPS).floor();
        (self.base_stake + steps * self.increment).min(self.max_stake)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StakingPolicy {
    Fixed { stake: f64 },
    Step(StepStaking),
}

impl Default for StakingPolicy {
    fn default() -> Self {
        StakingPolicy::Fixed {
            stake: DEFAULT_FIXED_STAKE,
        }
    }
}

impl StakingPolicy {
    pub fn fixed(stake: f64) -> Self {
        StakingPolicy::Fixed { stake }
    }

    pub fn step(params: StepStaking) -> Self {
        StakingPolicy::Step(params)
    }

    pub fn stake(&self, odds: f64) -> f64 {
        match self {
            StakingPolicy::Fixed { stake } => *stake,
            StakingPolicy::Step(step) => step.stake(odds),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            StakingPolicy::Fixed { stake } => {
                if !stake.is_finite() || *stake <= 0.0 {
                    return Err(anyhow!("fixed stake must be positive, got {stake}"));
                }
            }
            StakingPolicy::Step(s) => {
                let all_finite = [s.base_odds, s.base_stake, s.increment, s.max_stake]
                    .iter()
                    .all(|v| v.is_finite());
                if !all_finite {
                    return Err(anyhow!("step staking parameters must be finite"));
                }
                if s.base_odds <= 1.0 {
                    return Err(anyhow!("base odds must exceed 1.0, got {}", s.base_odds));
                }
                if s.base_stake <= 0.0 || s.increment < 0.0 {
                    return Err(anyhow!(
                        "base stake must be positive and increment non-negative"
                    ));
                }
                if s.max_stake < s.base_stake {
                    return Err(anyhow!(
                        "max stake {} is below base stake {}",
                        s.max_stake,
                        s.base_stake
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        match self {
            StakingPolicy::Fixed { stake } => format!("fixed({stake})"),
            StakingPolicy::Step(s) => format!(
                "step(base_odds={}, base_stake={}, increment={}, max={})",
                s.base_odds, s.base_stake, s.increment, s.max_stake
            ),
        }
    }
}
