use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::CatalogueError;
use crate::expr::{Expr, ExprType, Value};
use crate::record::{MatchRecord, RecordId};

/// On-disk / configuration form of a factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDef {
    pub name: String,
    pub category: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Factor {
    pub name: String,
    pub category: String,
    pub threshold: Option<f64>,
    key: String,
    expr: Expr,
    kind: ExprType,
    // Canonical rendering of `expr`, shared with cache keys.
    canonical: Arc<str>,
}

impl Factor {
    pub fn compile(def: &FactorDef) -> Result<Self, CatalogueError> {
        let valid = |s: &str| !s.trim().is_empty() && !s.contains('.');
        if !valid(&def.name) || !valid(&def.category) {
            return Err(CatalogueError::InvalidName(format!(
                "{}.{}",
                def.category, def.name
            )));
        }
        let key = format!("{}.{}", def.category, def.name);
        let expr = Expr::parse(&def.expression).map_err(|source| CatalogueError::Expression {
            key: key.clone(),
            source,
        })?;
        let kind = expr.check().map_err(|source| CatalogueError::Expression {
            key: key.clone(),
            source,
        })?;
        let canonical = match (kind, def.threshold) {
            (ExprType::Number, Some(t)) => format!("{expr} >= {t}"),
            (ExprType::Number, None) => format!("{expr} > 0"),
            (ExprType::Boolean, _) => expr.to_string(),
        };
        Ok(Self {
            name: def.name.clone(),
            category: def.category.clone(),
            threshold: def.threshold,
            key,
            expr,
            kind,
            canonical: Arc::from(canonical),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Uncached evaluation. Missing data is `false`.
    pub fn evaluate(&self, record: &MatchRecord) -> bool {
        match self.expr.eval(record) {
            Some(Value::Bool(b)) => b,
            Some(Value::Num(v)) => match self.threshold {
                Some(t) => v >= t,
                None => v > 0.0,
            },
            None => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ExprType::Number
    }
}

#[derive(Debug, Clone, Default)]
pub struct FactorCatalogue {
    factors: Vec<Factor>,
    index: HashMap<String, usize>,
}

impl FactorCatalogue {
    pub fn from_defs(defs: &[FactorDef]) -> Result<Self, CatalogueError> {
        let mut out = Self::default();
        for def in defs {
            let factor = Factor::compile(def)?;
            if out.index.contains_key(factor.key()) {
                return Err(CatalogueError::Duplicate(factor.key().to_string()));
            }
            out.index.insert(factor.key().to_string(), out.factors.len());
            out.factors.push(factor);
        }
        Ok(out)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let defs: Vec<FactorDef> = serde_json::from_str(raw).context("invalid factor json")?;
        Ok(Self::from_defs(&defs)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read factor file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load factor file {}", path.display()))
    }

    pub fn builtin() -> Result<Self, CatalogueError> {
        Self::from_table(BUILTIN_FACTORS)
    }

    fn from_table(table: &[(&str, &str, &str)]) -> Result<Self, CatalogueError> {
        let defs: Vec<FactorDef> = table
            .iter()
            .map(|(category, name, expression)| FactorDef {
                name: (*name).to_string(),
                category: (*category).to_string(),
                expression: (*expression).to_string(),
                threshold: None,
            })
            .collect();
        Self::from_defs(&defs)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn get(&self, key: &str) -> Option<&Factor> {
        self.index.get(key).map(|&i| &self.factors[i])
    }

    pub fn keys(&self) -> Vec<String> {
        self.factors.iter().map(|f| f.key().to_string()).collect()
    }

    /// Restricts the catalogue to the given categories, keeping catalogue order.
    pub fn select_categories(&self, categories: &[String]) -> Self {
        let mut out = Self::default();
        for f in self
            .factors
            .iter()
            .filter(|f| categories.iter().any(|c| c == &f.category))
        {
            out.index.insert(f.key().to_string(), out.factors.len());
            out.factors.push(f.clone());
        }
        out
    }
}

const BUILTIN_FACTORS: &[(&str, &str, &str)] = &[
    ("odds", "home_favourite", "home_odds < away_odds"),
    ("odds", "away_favourite", "away_odds < home_odds"),
    ("odds", "home_short", "home_odds <= 1.80"),
    ("odds", "away_short", "away_odds <= 1.80"),
    ("odds", "home_long", "home_odds >= 2.10"),
    ("odds", "away_long", "away_odds >= 2.10"),
    ("odds", "balanced", "abs(odds_gap) <= 0.10"),
    ("handicap", "level", "handicap == 0"),
    ("handicap", "home_gives_quarter", "handicap == -0.25"),
    ("handicap", "home_gives_half", "handicap == -0.5"),
    ("handicap", "home_gives_big", "handicap <= -1"),
    ("handicap", "home_receives", "handicap > 0"),
    ("position", "home_top_four", "home_position <= 4"),
    ("position", "away_top_four", "away_position <= 4"),
    ("position", "home_bottom_three", "home_position >= 18"),
    ("position", "away_bottom_three", "away_position >= 18"),
    ("position", "home_higher", "home_position < away_position"),
    ("position", "gap_ten_plus", "abs(position_gap) >= 10"),
    // Positive only for teams near the drop zone; position 1 yields zero.
    ("pressure", "home_relegation", "max(0, home_position - 15)"),
    ("pressure", "away_relegation", "max(0, away_position - 15)"),
    ("pressure", "home_title_race", "max(0, 5 - home_position)"),
    ("pressure", "away_title_race", "max(0, 5 - away_position)"),
    ("form", "home_hot", "home_form >= 10"),
    ("form", "away_hot", "away_form >= 10"),
    ("form", "home_cold", "home_played >= 3 && home_form <= 3"),
    ("form", "away_cold", "away_played >= 3 && away_form <= 3"),
    ("form", "home_winning_run", "home_streak >= 3"),
    ("form", "away_losing_run", "away_streak <= -3"),
    ("goals", "home_positive_gd", "home_goal_diff > 0"),
    ("goals", "away_negative_gd", "away_goal_diff < 0"),
    ("calendar", "early_season", "week <= 6"),
    ("calendar", "run_in", "week >= 30"),
];

type CacheKey = (RecordId, Arc<str>);

/// Memoises factor results per `(record, canonical expression)`.
/// There is no automatic invalidation: call [`FactorEvaluator::clear_cache`]
/// whenever factor definitions change.
#[derive(Debug, Default)]
pub struct FactorEvaluator {
    cache: RwLock<HashMap<CacheKey, bool>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

static GLOBAL: Lazy<FactorEvaluator> = Lazy::new(FactorEvaluator::default);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl FactorEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide evaluator shared by every search in this process.
    pub fn global() -> &'static FactorEvaluator {
        &GLOBAL
    }

    pub fn evaluate(&self, factor: &Factor, record: &MatchRecord) -> bool {
        self.evaluate_with_id(factor, record, &record.id())
    }

    pub fn evaluate_with_id(&self, factor: &Factor, record: &MatchRecord, id: &RecordId) -> bool {
        let key: CacheKey = (id.clone(), factor.canonical.clone());
        {
            let guard = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(&hit) = guard.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return hit;
            }
        }
        let value = factor.evaluate(record);
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
        value
    }

    pub fn clear_cache(&self) {
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let dropped = guard.len();
        guard.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        tracing::debug!(dropped, "factor cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.read().unwrap_or_else(|e| e.into_inner()).len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

pub fn clear_cache() {
    FactorEvaluator::global().clear_cache();
}
