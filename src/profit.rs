use serde::Serialize;

use crate::error::BetError;
use crate::handicap::{BetOutcome, HandicapLine, Side, parse_handicap, settle_outcome};
use crate::record::MatchRecord;
use crate::staking::StakingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSettlement {
    pub profit: f64,
    pub outcome: BetOutcome,
    pub stake: f64,
    pub odds: f64,
}

pub fn profit_for(outcome: BetOutcome, stake: f64, odds: f64) -> f64 {
    match outcome {
        BetOutcome::Win => stake * (odds - 1.0),
        BetOutcome::HalfWin => stake * (odds - 1.0) / 2.0,
        BetOutcome::Push => 0.0,
        BetOutcome::HalfLoss => -stake / 2.0,
        BetOutcome::Loss => -stake,
    }
}

pub fn settle(
    home_score: u32,
    away_score: u32,
    line: &HandicapLine,
    side: Side,
    odds: f64,
    staking: &StakingPolicy,
) -> Result<BetSettlement, BetError> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(BetError::MissingOdds);
    }
    let stake = staking.stake(odds);
    let outcome = settle_outcome(home_score, away_score, line, side)?;
    Ok(BetSettlement {
        profit: profit_for(outcome, stake, odds),
        outcome,
        stake,
        odds,
    })
}

/// Settles a bet on `side` using the record's own odds and handicap.
pub fn settle_record(
    record: &MatchRecord,
    side: Side,
    staking: &StakingPolicy,
) -> Result<BetSettlement, BetError> {
    let raw = record
        .handicap_line
        .as_deref()
        .ok_or(BetError::MissingHandicap)?;
    let line = parse_handicap(raw)?;
    let odds = record.odds_for(side).ok_or(BetError::MissingOdds)?;
    let (Some(home), Some(away)) = (record.home_score, record.away_score) else {
        return Err(BetError::MissingScore);
    };
    settle(home, away, &line, side, odds, staking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::StepStaking;

    fn line(raw: &str) -> HandicapLine {
        parse_handicap(raw).unwrap()
    }

    #[test]
    fn quarter_line_full_win() {
        let s = settle(2, 1, &line("0/-0.5"), Side::Home, 1.90, &StakingPolicy::fixed(100.0))
            .unwrap();
        assert_eq!(s.outcome, BetOutcome::Win);
        assert!((s.profit - 90.0).abs() < 1e-9);
    }

    #[test]
    fn level_line_push() {
        let s = settle(1, 1, &line("0"), Side::Home, 2.0, &StakingPolicy::fixed(100.0)).unwrap();
        assert_eq!(s.outcome, BetOutcome::Push);
        assert_eq!(s.profit, 0.0);
    }

    #[test]
    fn quarter_line_losses() {
        let fixed = StakingPolicy::fixed(100.0);
        let s = settle(0, 1, &line("0/-0.5"), Side::Home, 2.0, &fixed).unwrap();
        assert_eq!(s.outcome, BetOutcome::Loss);
        assert_eq!(s.profit, -100.0);
        let s = settle(1, 1, &line("0/-0.5"), Side::Home, 2.0, &fixed).unwrap();
        assert_eq!(s.outcome, BetOutcome::HalfLoss);
        assert_eq!(s.profit, -50.0);
        let s = settle(1, 1, &line("-0.5/-1"), Side::Home, 2.0, &fixed).unwrap();
        assert_eq!(s.outcome, BetOutcome::Loss);
    }

    #[test]
    fn half_win_pays_half() {
        let s = settle(1, 1, &line("0/+0.5"), Side::Home, 2.2, &StakingPolicy::fixed(100.0))
            .unwrap();
        assert_eq!(s.outcome, BetOutcome::HalfWin);
        assert!((s.profit - 60.0).abs() < 1e-9);
    }

    #[test]
    fn profit_signs_follow_outcome() {
        for stake in [1.0, 100.0, 2_500.0] {
            for odds in [1.01, 1.91, 3.5] {
                assert!(profit_for(BetOutcome::Win, stake, odds) > 0.0);
                assert!(profit_for(BetOutcome::HalfWin, stake, odds) > 0.0);
                assert_eq!(profit_for(BetOutcome::Push, stake, odds), 0.0);
                assert!(profit_for(BetOutcome::HalfLoss, stake, odds) < 0.0);
                assert!(profit_for(BetOutcome::Loss, stake, odds) < 0.0);
            }
        }
    }

    #[test]
    fn variable_stake_flows_into_profit() {
        let step = StakingPolicy::step(StepStaking::default());
        let s = settle(3, 0, &line("-1"), Side::Home, 2.00, &step).unwrap();
        assert_eq!(s.stake, 1_550.0);
        assert!((s.profit - 1_550.0).abs() < 1e-9);
    }

    #[test]
    fn bad_odds_are_not_a_bet() {
        let r = settle(1, 0, &line("0"), Side::Home, 1.0, &StakingPolicy::default());
        assert_eq!(r.unwrap_err(), BetError::MissingOdds);
    }
}
