use crate::handicap::SubResult;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandicapParseError {
    #[error("empty handicap line")]
    Empty,

    #[error("handicap line {0:?} is not numeric")]
    NotNumeric(String),

    #[error("handicap line {0:?} has more than two parts")]
    TooManyParts(String),

    #[error("handicap line {0:?} is not on a quarter-goal grid")]
    OffGrid(String),

    #[error("split handicap line {0:?} halves are not 0.5 apart")]
    NotAdjacent(String),
}

/// Reasons a record does not produce a valid bet.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BetError {
    #[error("invalid handicap: {0}")]
    Handicap(#[from] HandicapParseError),

    #[error("missing handicap line")]
    MissingHandicap,

    #[error("missing or invalid odds")]
    MissingOdds,

    #[error("missing final score")]
    MissingScore,

    #[error("inconsistent split settlement: {first:?} + {second:?}")]
    InconsistentSplit { first: SubResult, second: SubResult },
}

impl BetError {
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, BetError::InconsistentSplit { .. })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {found:?} at {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("field {0:?} is only known after kick-off")]
    PostMatchField(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("function {name} expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch: {0}")]
    Type(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogueError {
    #[error("factor {key}: {source}")]
    Expression { key: String, source: ExprError },

    #[error("duplicate factor key {0}")]
    Duplicate(String),

    #[error("factor name and category must be non-empty and must not contain '.': {0:?}")]
    InvalidName(String),

    #[error("unknown factor key {0}")]
    UnknownFactor(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("run {run} differs from the first run at {} path(s)", .paths.len())]
pub struct DeterminismError {
    pub run: usize,
    pub paths: Vec<String>,
    pub expected_digest: String,
    pub actual_digest: String,
}
