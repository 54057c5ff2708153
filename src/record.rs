use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::handicap::{HandicapLine, Side, parse_handicap};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Arc<str>);

impl RecordId {
    pub fn new(season: &str, home_team: &str, away_team: &str, date: &str) -> Self {
        Self(Arc::from(format!("{season}|{home_team}|{away_team}|{date}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregates built only from matches played strictly before this one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideHistory {
    pub played: u32,
    pub points: u32,
    pub goal_diff: i32,
    // Points from the last five league games.
    pub form_points: u32,
    // Positive for a winning run, negative for a losing run, 0 after a draw.
    pub streak: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    #[serde(default)]
    pub season: String,
    pub home_team: String,
    pub away_team: String,
    pub date: String,
    #[serde(default)]
    pub week: Option<u32>,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
    #[serde(default)]
    pub home_odds: Option<f64>,
    #[serde(default)]
    pub away_odds: Option<f64>,
    #[serde(default)]
    pub handicap_line: Option<String>,
    #[serde(default)]
    pub home_position: Option<u32>,
    #[serde(default)]
    pub away_position: Option<u32>,
    #[serde(default)]
    pub home_history: Option<SideHistory>,
    #[serde(default)]
    pub away_history: Option<SideHistory>,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

/// Pre-match field vocabulary available to factor expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    HomeOdds,
    AwayOdds,
    OddsGap,
    Handicap,
    Week,
    HomePosition,
    AwayPosition,
    PositionGap,
    HomePlayed,
    AwayPlayed,
    HomePoints,
    AwayPoints,
    HomeGoalDiff,
    AwayGoalDiff,
    HomeForm,
    AwayForm,
    HomeStreak,
    AwayStreak,
    Feature(String),
}

const FEATURE_PREFIX: &str = "feature.";

const POST_MATCH_FIELDS: &[&str] = &[
    "home_score",
    "away_score",
    "score",
    "goal_diff",
    "result",
    "total_goals",
];

pub enum FieldLookup {
    Known(Field),
    PostMatch,
    Unknown,
}

impl Field {
    pub fn lookup(name: &str) -> FieldLookup {
        let field = match name {
            "home_odds" => Field::HomeOdds,
            "away_odds" => Field::AwayOdds,
            "odds_gap" => Field::OddsGap,
            "handicap" => Field::Handicap,
            "week" => Field::Week,
            "home_position" => Field::HomePosition,
            "away_position" => Field::AwayPosition,
            "position_gap" => Field::PositionGap,
            "home_played" => Field::HomePlayed,
            "away_played" => Field::AwayPlayed,
            "home_points" => Field::HomePoints,
            "away_points" => Field::AwayPoints,
            "home_goal_diff" => Field::HomeGoalDiff,
            "away_goal_diff" => Field::AwayGoalDiff,
            "home_form" => Field::HomeForm,
            "away_form" => Field::AwayForm,
            "home_streak" => Field::HomeStreak,
            "away_streak" => Field::AwayStreak,
            other => {
                if let Some(rest) = other.strip_prefix(FEATURE_PREFIX) {
                    if !rest.is_empty() {
                        return FieldLookup::Known(Field::Feature(rest.to_string()));
                    }
                }
                if POST_MATCH_FIELDS.contains(&other) {
                    return FieldLookup::PostMatch;
                }
                return FieldLookup::Unknown;
            }
        };
        FieldLookup::Known(field)
    }

    pub fn name(&self) -> String {
        match self {
            Field::HomeOdds => "home_odds".into(),
            Field::AwayOdds => "away_odds".into(),
            Field::OddsGap => "odds_gap".into(),
            Field::Handicap => "handicap".into(),
            Field::Week => "week".into(),
            Field::HomePosition => "home_position".into(),
            Field::AwayPosition => "away_position".into(),
            Field::PositionGap => "position_gap".into(),
            Field::HomePlayed => "home_played".into(),
            Field::AwayPlayed => "away_played".into(),
            Field::HomePoints => "home_points".into(),
            Field::AwayPoints => "away_points".into(),
            Field::HomeGoalDiff => "home_goal_diff".into(),
            Field::AwayGoalDiff => "away_goal_diff".into(),
            Field::HomeForm => "home_form".into(),
            Field::AwayForm => "away_form".into(),
            Field::HomeStreak => "home_streak".into(),
            Field::AwayStreak => "away_streak".into(),
            Field::Feature(name) => format!("{FEATURE_PREFIX}{name}"),
        }
    }
}

impl MatchRecord {
    pub fn id(&self) -> RecordId {
        RecordId::new(&self.season, &self.home_team, &self.away_team, &self.date)
    }

    pub fn parsed_handicap(&self) -> Option<HandicapLine> {
        parse_handicap(self.handicap_line.as_deref()?).ok()
    }

    pub fn odds_for(&self, side: Side) -> Option<f64> {
        let odds = match side {
            Side::Home => self.home_odds,
            Side::Away => self.away_odds,
        }?;
        (odds.is_finite() && odds > 1.0).then_some(odds)
    }

    pub fn score_label(&self) -> Option<String> {
        Some(format!("{}-{}", self.home_score?, self.away_score?))
    }

    /// Numeric view of a pre-match field; `None` when the record lacks it.
    pub fn field(&self, field: &Field) -> Option<f64> {
        match field {
            Field::HomeOdds => self.odds_for(Side::Home),
            Field::AwayOdds => self.odds_for(Side::Away),
            Field::OddsGap => Some(self.odds_for(Side::Away)? - self.odds_for(Side::Home)?),
            Field::Handicap => self.parsed_handicap().map(|l| l.mean()),
            Field::Week => self.week.map(f64::from),
            Field::HomePosition => self.home_position.map(f64::from),
            Field::AwayPosition => self.away_position.map(f64::from),
            Field::PositionGap => {
                Some(f64::from(self.home_position?) - f64::from(self.away_position?))
            }
            Field::HomePlayed => self.home_history.map(|h| f64::from(h.played)),
            Field::AwayPlayed => self.away_history.map(|h| f64::from(h.played)),
            Field::HomePoints => self.home_history.map(|h| f64::from(h.points)),
            Field::AwayPoints => self.away_history.map(|h| f64::from(h.points)),
            Field::HomeGoalDiff => self.home_history.map(|h| f64::from(h.goal_diff)),
            Field::AwayGoalDiff => self.away_history.map(|h| f64::from(h.goal_diff)),
            Field::HomeForm => self.home_history.map(|h| f64::from(h.form_points)),
            Field::AwayForm => self.away_history.map(|h| f64::from(h.form_points)),
            Field::HomeStreak => self.home_history.map(|h| f64::from(h.streak)),
            Field::AwayStreak => self.away_history.map(|h| f64::from(h.streak)),
            Field::Feature(name) => self.features.get(name).copied().filter(|v| v.is_finite()),
        }
    }
}

pub fn parse_season_json(raw: &str) -> Result<Vec<MatchRecord>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).context("invalid season json")
}

/// Loads one season file; records without a `season` value inherit the file stem.
pub fn load_season_file(path: &Path) -> Result<Vec<MatchRecord>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read season file {}", path.display()))?;
    let mut records =
        parse_season_json(&raw).with_context(|| format!("parse season file {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    for record in records.iter_mut().filter(|r| r.season.is_empty()) {
        record.season = stem.clone();
    }
    Ok(records)
}
