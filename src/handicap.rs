use serde::{Deserialize, Serialize};

use crate::error::{BetError, HandicapParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

/// Home-relative handicap: one offset for whole/half lines, two adjacent
/// half-lines for quarter lines (each carrying half the stake).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandicapLine {
    Single(f64),
    Split(f64, f64),
}

impl HandicapLine {
    /// Average offset, i.e. the decimal quarter value of a split line.
    pub fn mean(&self) -> f64 {
        match *self {
            HandicapLine::Single(v) => v,
            HandicapLine::Split(a, b) => (a + b) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubResult {
    Win,
    Push,
    Lose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetOutcome {
    Win,
    HalfWin,
    Push,
    HalfLoss,
    Loss,
}

impl BetOutcome {
    pub fn complement(self) -> Self {
        match self {
            BetOutcome::Win => BetOutcome::Loss,
            BetOutcome::HalfWin => BetOutcome::HalfLoss,
            BetOutcome::Push => BetOutcome::Push,
            BetOutcome::HalfLoss => BetOutcome::HalfWin,
            BetOutcome::Loss => BetOutcome::Win,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BetOutcome::Win => "win",
            BetOutcome::HalfWin => "half_win",
            BetOutcome::Push => "push",
            BetOutcome::HalfLoss => "half_loss",
            BetOutcome::Loss => "loss",
        }
    }
}

const GRID_EPS: f64 = 1e-9;

pub fn parse_handicap(raw: &str) -> Result<HandicapLine, HandicapParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HandicapParseError::Empty);
    }

    if trimmed.contains('/') {
        let parts: Vec<&str> = trimmed.split('/').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(HandicapParseError::TooManyParts(trimmed.to_string()));
        }
        let first = parse_offset(parts[0], trimmed)?;
        let second = parse_offset(parts[1], trimmed)?;
        if !on_grid(first, 0.5) || !on_grid(second, 0.5) {
            return Err(HandicapParseError::OffGrid(trimmed.to_string()));
        }
        if ((first - second).abs() - 0.5).abs() > GRID_EPS {
            return Err(HandicapParseError::NotAdjacent(trimmed.to_string()));
        }
        return Ok(HandicapLine::Split(first, second));
    }

    let value = parse_offset(trimmed, trimmed)?;
    if on_grid(value, 0.5) {
        return Ok(HandicapLine::Single(value));
    }
    if !on_grid(value, 0.25) {
        return Err(HandicapParseError::OffGrid(trimmed.to_string()));
    }
    // Decimal quarter notation: -0.25 is the same market as 0/-0.5.
    let toward_zero = value - 0.25 * value.signum();
    let away_from_zero = value + 0.25 * value.signum();
    Ok(HandicapLine::Split(toward_zero, away_from_zero))
}

fn parse_offset(part: &str, whole: &str) -> Result<f64, HandicapParseError> {
    if part.is_empty() {
        return Err(HandicapParseError::NotNumeric(whole.to_string()));
    }
    let value = part
        .parse::<f64>()
        .map_err(|_| HandicapParseError::NotNumeric(whole.to_string()))?;
    if !value.is_finite() {
        return Err(HandicapParseError::NotNumeric(whole.to_string()));
    }
    // Normalise -0.0 so Display and equality stay stable.
    Ok(if value == 0.0 { 0.0 } else { value })
}

fn on_grid(value: f64, step: f64) -> bool {
    let scaled = value / step;
    (scaled - scaled.round()).abs() < GRID_EPS
}

pub fn sub_result(home_score: u32, away_score: u32, offset: f64, side: Side) -> SubResult {
    let diff = home_score as f64 - away_score as f64;
    let adjusted = match side {
        Side::Home => diff + offset,
        Side::Away => -diff - offset,
    };
    if adjusted.abs() < GRID_EPS {
        SubResult::Push
    } else if adjusted > 0.0 {
        SubResult::Win
    } else {
        SubResult::Lose
    }
}

pub fn settle_outcome(
    home_score: u32,
    away_score: u32,
    line: &HandicapLine,
    side: Side,
) -> Result<BetOutcome, BetError> {
    match *line {
        HandicapLine::Single(v) => Ok(match sub_result(home_score, away_score, v, side) {
            SubResult::Win => BetOutcome::Win,
            SubResult::Push => BetOutcome::Push,
            SubResult::Lose => BetOutcome::Loss,
        }),
        HandicapLine::Split(a, b) => combine(
            sub_result(home_score, away_score, a, side),
            sub_result(home_score, away_score, b, side),
        ),
    }
}

fn combine(first: SubResult, second: SubResult) -> Result<BetOutcome, BetError> {
    use SubResult::*;
    match (first, second) {
        (Win, Win) => Ok(BetOutcome::Win),
        (Lose, Lose) => Ok(BetOutcome::Loss),
        (Push, Push) => Ok(BetOutcome::Push),
        (Win, Push) | (Push, Win) => Ok(BetOutcome::HalfWin),
        (Lose, Push) | (Push, Lose) => Ok(BetOutcome::HalfLoss),
        (Win, Lose) | (Lose, Win) => Err(BetError::InconsistentSplit { first, second }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_formats() {
        assert_eq!(parse_handicap("0").unwrap(), HandicapLine::Single(0.0));
        assert_eq!(parse_handicap("-0.5").unwrap(), HandicapLine::Single(-0.5));
        assert_eq!(parse_handicap("+1.5").unwrap(), HandicapLine::Single(1.5));
        assert_eq!(
            parse_handicap("0/-0.5").unwrap(),
            HandicapLine::Split(0.0, -0.5)
        );
        assert_eq!(
            parse_handicap(" -0.5 / -1 ").unwrap(),
            HandicapLine::Split(-0.5, -1.0)
        );
    }

    #[test]
    fn decimal_quarter_lines_split_into_half_lines() {
        assert_eq!(
            parse_handicap("-0.25").unwrap(),
            HandicapLine::Split(0.0, -0.5)
        );
        assert_eq!(
            parse_handicap("+0.75").unwrap(),
            HandicapLine::Split(0.5, 1.0)
        );
        assert!((parse_handicap("-1.25").unwrap().mean() + 1.25).abs() < 1e-12);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(parse_handicap(""), Err(HandicapParseError::Empty));
        assert!(matches!(
            parse_handicap("abc"),
            Err(HandicapParseError::NotNumeric(_))
        ));
        assert!(matches!(
            parse_handicap("1/2/3"),
            Err(HandicapParseError::TooManyParts(_))
        ));
        assert!(matches!(
            parse_handicap("0/-1"),
            Err(HandicapParseError::NotAdjacent(_))
        ));
        assert!(matches!(
            parse_handicap("-0.3"),
            Err(HandicapParseError::OffGrid(_))
        ));
        assert!(parse_handicap("0/").is_err());
        assert!(parse_handicap("NaN").is_err());
    }

    #[test]
    fn quarter_line_settlement() {
        let line = parse_handicap("0/-0.5").unwrap();
        assert_eq!(settle_outcome(2, 1, &line, Side::Home).unwrap(), BetOutcome::Win);
        assert_eq!(
            settle_outcome(1, 1, &line, Side::Home).unwrap(),
            BetOutcome::HalfLoss
        );
        assert_eq!(
            settle_outcome(1, 1, &line, Side::Away).unwrap(),
            BetOutcome::HalfWin
        );
        assert_eq!(settle_outcome(0, 1, &line, Side::Home).unwrap(), BetOutcome::Loss);
    }

    #[test]
    fn whole_line_pushes() {
        let line = parse_handicap("-1").unwrap();
        assert_eq!(settle_outcome(2, 1, &line, Side::Home).unwrap(), BetOutcome::Push);
        assert_eq!(settle_outcome(2, 1, &line, Side::Away).unwrap(), BetOutcome::Push);
    }

    #[test]
    fn sides_are_complementary() {
        let lines = ["0", "-0.5", "+0.5", "-1", "0/-0.5", "-0.5/-1", "+1/+1.5", "-2.25", "+3"];
        for raw in lines {
            let line = parse_handicap(raw).unwrap();
            for home in 0..6 {
                for away in 0..6 {
                    let h = settle_outcome(home, away, &line, Side::Home).unwrap();
                    let a = settle_outcome(home, away, &line, Side::Away).unwrap();
                    assert_eq!(h.complement(), a, "{raw} {home}-{away}");
                }
            }
        }
    }

    #[test]
    fn win_plus_lose_is_an_error() {
        let err = combine(SubResult::Win, SubResult::Lose).unwrap_err();
        assert!(err.is_inconsistent());
    }
}
