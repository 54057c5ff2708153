use serde::{Deserialize, Serialize};

use crate::handicap::{BetOutcome, Side};
use crate::profit::{BetSettlement, settle_record};
use crate::record::MatchRecord;
use crate::staking::StakingPolicy;

pub const DEFAULT_MIN_COVERAGE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetSide {
    Home,
    Away,
    HigherOdds,
    LowerOdds,
}

impl BetSide {
    pub const ALL: [BetSide; 4] = [
        BetSide::Home,
        BetSide::Away,
        BetSide::HigherOdds,
        BetSide::LowerOdds,
    ];

    /// Dynamic sides need both prices; equal prices resolve to home.
    pub fn resolve(self, record: &MatchRecord) -> Option<Side> {
        match self {
            BetSide::Home => Some(Side::Home),
            BetSide::Away => Some(Side::Away),
            BetSide::HigherOdds | BetSide::LowerOdds => {
                let home = record.odds_for(Side::Home)?;
                let away = record.odds_for(Side::Away)?;
                let home_higher = home >= away;
                let home_lower = home <= away;
                Some(match (self, home_higher, home_lower) {
                    (BetSide::HigherOdds, true, _) | (BetSide::LowerOdds, _, true) => Side::Home,
                    _ => Side::Away,
                })
            }
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "home" => Some(BetSide::Home),
            "away" => Some(BetSide::Away),
            "higher_odds" | "higher" | "underdog" => Some(BetSide::HigherOdds),
            "lower_odds" | "lower" | "favourite" | "favorite" => Some(BetSide::LowerOdds),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BetSide::Home => "home",
            BetSide::Away => "away",
            BetSide::HigherOdds => "higher_odds",
            BetSide::LowerOdds => "lower_odds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub matched_records: usize,
    pub total_bets: usize,
    pub wins: usize,
    pub half_wins: usize,
    pub pushes: usize,
    pub half_losses: usize,
    pub losses: usize,
    pub invalid_bets: usize,
    pub inconsistent_bets: usize,
    pub total_staked: f64,
    pub total_profit: f64,
    // Percent of valid bets that won fully or half.
    pub win_rate: f64,
    // Percent of actual amount staked.
    pub roi: f64,
    pub average_profit: f64,
    pub low_coverage: bool,
}

impl StrategySummary {
    pub fn skipped_records(&self) -> usize {
        self.invalid_bets + self.inconsistent_bets
    }

    pub fn coverage(&self) -> f64 {
        if self.matched_records == 0 {
            return 0.0;
        }
        self.total_bets as f64 / self.matched_records as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetDetail {
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub score: String,
    pub bet_side: Side,
    pub handicap: String,
    pub odds: f64,
    pub stake: f64,
    pub outcome: BetOutcome,
    pub profit: f64,
}

#[derive(Debug, Default)]
struct Tally {
    summary: StrategySummary,
}

impl Tally {
    fn record(&mut self, s: &BetSettlement) {
        let sum = &mut self.summary;
        sum.total_bets += 1;
        sum.total_staked += s.stake;
        sum.total_profit += s.profit;
        match s.outcome {
            BetOutcome::Win => sum.wins += 1,
            BetOutcome::HalfWin => sum.half_wins += 1,
            BetOutcome::Push => sum.pushes += 1,
            BetOutcome::HalfLoss => sum.half_losses += 1,
            BetOutcome::Loss => sum.losses += 1,
        }
    }

    fn finish(mut self, min_coverage: f64) -> StrategySummary {
        let s = &mut self.summary;
        if s.total_bets > 0 {
            let n = s.total_bets as f64;
            s.win_rate = (s.wins + s.half_wins) as f64 / n * 100.0;
            s.average_profit = s.total_profit / n;
        }
        if s.total_staked > 0.0 {
            s.roi = s.total_profit / s.total_staked * 100.0;
        }
        s.low_coverage = s.matched_records > 0 && s.coverage() < min_coverage;
        self.summary
    }
}

pub fn analyze<'r, I>(
    records: I,
    side: BetSide,
    staking: &StakingPolicy,
    min_coverage: f64,
) -> StrategySummary
where
    I: IntoIterator<Item = &'r MatchRecord>,
{
    run(records, side, staking, min_coverage, |_, _, _| {})
}

pub fn analyze_with_details<'r, I>(
    records: I,
    side: BetSide,
    staking: &StakingPolicy,
    min_coverage: f64,
) -> (StrategySummary, Vec<BetDetail>)
where
    I: IntoIterator<Item = &'r MatchRecord>,
{
    let mut details = Vec::new();
    let summary = run(records, side, staking, min_coverage, |record, bet_side, s| {
        details.push(BetDetail {
            date: record.date.clone(),
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            score: record.score_label().unwrap_or_default(),
            bet_side,
            handicap: record.handicap_line.clone().unwrap_or_default(),
            odds: s.odds,
            stake: s.stake,
            outcome: s.outcome,
            profit: s.profit,
        });
    });
    (summary, details)
}

fn run<'r, I, F>(
    records: I,
    side: BetSide,
    staking: &StakingPolicy,
    min_coverage: f64,
    mut on_bet: F,
) -> StrategySummary
where
    I: IntoIterator<Item = &'r MatchRecord>,
    F: FnMut(&MatchRecord, Side, &BetSettlement),
{
    let mut tally = Tally::default();
    for record in records {
        tally.summary.matched_records += 1;
        let Some(bet_side) = side.resolve(record) else {
            tally.summary.invalid_bets += 1;
            continue;
        };
        match settle_record(record, bet_side, staking) {
            Ok(settlement) => {
                tally.record(&settlement);
                on_bet(record, bet_side, &settlement);
            }
            Err(err) if err.is_inconsistent() => {
                tracing::warn!(
                    home = %record.home_team,
                    away = %record.away_team,
                    date = %record.date,
                    handicap = record.handicap_line.as_deref().unwrap_or(""),
                    score = %record.score_label().unwrap_or_default(),
                    side = bet_side.label(),
                    error = %err,
                    "bet excluded"
                );
                tally.summary.inconsistent_bets += 1;
            }
            Err(_) => tally.summary.invalid_bets += 1,
        }
    }
    tally.finish(min_coverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_season_json;
    use crate::staking::StepStaking;

    fn records() -> Vec<MatchRecord> {
        parse_season_json(
            r#"[
            {"homeTeam":"A","awayTeam":"B","date":"2024-01-01","homeScore":2,"awayScore":1,"homeOdds":1.90,"awayOdds":2.00,"handicapLine":"0/-0.5"},
            {"homeTeam":"C","awayTeam":"D","date":"2024-01-01","homeScore":1,"awayScore":1,"homeOdds":2.00,"awayOdds":1.85,"handicapLine":"0"},
            {"homeTeam":"E","awayTeam":"F","date":"2024-01-02","homeScore":1,"awayScore":1,"homeOdds":2.00,"awayOdds":1.90,"handicapLine":"0/-0.5"},
            {"homeTeam":"G","awayTeam":"H","date":"2024-01-02","homeScore":0,"awayScore":3,"homeOdds":2.40,"awayOdds":1.60,"handicapLine":"+0.5"},
            {"homeTeam":"I","awayTeam":"J","date":"2024-01-03","homeScore":1,"awayScore":0,"homeOdds":1.95,"awayOdds":1.95,"handicapLine":"bogus"},
            {"homeTeam":"K","awayTeam":"L","date":"2024-01-03","homeScore":1,"awayScore":0,"awayOdds":1.95,"handicapLine":"0"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn home_summary_counts_every_bucket() {
        let recs = records();
        let s = analyze(&recs, BetSide::Home, &StakingPolicy::fixed(100.0), DEFAULT_MIN_COVERAGE);
        assert_eq!(s.matched_records, 6);
        assert_eq!(s.total_bets, 4);
        assert_eq!(s.invalid_bets, 2);
        assert_eq!((s.wins, s.pushes, s.half_losses, s.losses), (1, 1, 1, 1));
        // 90 + 0 - 50 - 100
        assert!((s.total_profit + 60.0).abs() < 1e-9);
        assert!((s.total_staked - 400.0).abs() < 1e-9);
        assert!((s.roi + 15.0).abs() < 1e-9);
        assert!((s.win_rate - 25.0).abs() < 1e-9);
        assert!(s.low_coverage);
        assert_eq!(s.skipped_records(), 2);
    }

    #[test]
    fn roi_uses_actual_stake_under_step_staking() {
        let recs = records();
        let policy = StakingPolicy::step(StepStaking::default());
        let s = analyze(&recs, BetSide::Home, &policy, DEFAULT_MIN_COVERAGE);
        // Stakes: 1.90 -> 200, 2.00 -> 1550, 2.00 -> 1550, 2.40 -> 7550.
        assert!((s.total_staked - 10_850.0).abs() < 1e-6);
        let expected_profit = 200.0 * 0.90 + 0.0 - 1_550.0 / 2.0 - 7_550.0;
        assert!((s.total_profit - expected_profit).abs() < 1e-6);
        assert_eq!(s.roi, s.total_profit / s.total_staked * 100.0);
    }

    #[test]
    fn dynamic_sides_pick_by_price() {
        let recs = records();
        assert_eq!(BetSide::HigherOdds.resolve(&recs[0]), Some(Side::Away));
        assert_eq!(BetSide::LowerOdds.resolve(&recs[0]), Some(Side::Home));
        assert_eq!(BetSide::HigherOdds.resolve(&recs[4]), Some(Side::Home));
        assert_eq!(BetSide::LowerOdds.resolve(&recs[4]), Some(Side::Home));
        assert_eq!(BetSide::HigherOdds.resolve(&recs[5]), None);
    }

    #[test]
    fn details_mirror_summary() {
        let recs = records();
        let (s, details) = analyze_with_details(
            &recs,
            BetSide::LowerOdds,
            &StakingPolicy::fixed(100.0),
            DEFAULT_MIN_COVERAGE,
        );
        assert_eq!(details.len(), s.total_bets);
        let total: f64 = details.iter().map(|d| d.profit).sum();
        assert!((total - s.total_profit).abs() < 1e-9);
        assert_eq!(details[0].score, "2-1");
    }

    #[test]
    fn empty_input_is_zeroed() {
        let s = analyze(
            std::iter::empty(),
            BetSide::Home,
            &StakingPolicy::default(),
            DEFAULT_MIN_COVERAGE,
        );
        assert_eq!(s.total_bets, 0);
        assert_eq!(s.roi, 0.0);
        assert!(!s.low_coverage);
    }

    #[test]
    fn parses_side_names() {
        assert_eq!(BetSide::parse("Higher-Odds"), Some(BetSide::HigherOdds));
        assert_eq!(BetSide::parse("favourite"), Some(BetSide::LowerOdds));
        assert_eq!(BetSide::parse("draw"), None);
    }
}
