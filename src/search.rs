use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analyzer::{self, BetSide, DEFAULT_MIN_COVERAGE, StrategySummary};
use crate::factor::{FactorCatalogue, FactorEvaluator};
use crate::filter::RecordFilter;
use crate::record::MatchRecord;
use crate::staking::StakingPolicy;

pub const MAX_COMBINATION_SIZE: usize = 6;
pub const DEFAULT_COMBINATION_SIZE: usize = 3;
pub const DEFAULT_TOP_N: usize = 10;

const BATCH_SIZE: usize = 4_096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    SingleExact,
    SmallGroup,
    Aggregate,
    TooBroad,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::SingleExact,
        Bucket::SmallGroup,
        Bucket::Aggregate,
        Bucket::TooBroad,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Bucket::SingleExact => "single_exact",
            Bucket::SmallGroup => "small_group",
            Bucket::Aggregate => "aggregate",
            Bucket::TooBroad => "too_broad",
        }
    }
}

/// Upper bounds (inclusive) on matched records per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketThresholds {
    pub single_exact: usize,
    pub small_group: usize,
    pub aggregate: usize,
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            single_exact: 1,
            small_group: 10,
            aggregate: 100,
        }
    }
}

impl BucketThresholds {
    pub fn classify(&self, matched: usize) -> Bucket {
        if matched <= self.single_exact {
            Bucket::SingleExact
        } else if matched <= self.small_group {
            Bucket::SmallGroup
        } else if matched <= self.aggregate {
            Bucket::Aggregate
        } else {
            Bucket::TooBroad
        }
    }
}

/// Minimum valid bets for a result to be ranked in each bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketGates {
    pub single_exact: usize,
    pub small_group: usize,
    pub aggregate: usize,
    pub too_broad: usize,
}

impl Default for BucketGates {
    fn default() -> Self {
        Self {
            single_exact: 1,
            small_group: 5,
            aggregate: 20,
            too_broad: 20,
        }
    }
}

impl BucketGates {
    pub fn uniform(min_bets: usize) -> Self {
        Self {
            single_exact: min_bets,
            small_group: min_bets,
            aggregate: min_bets,
            too_broad: min_bets,
        }
    }

    pub fn for_bucket(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::SingleExact => self.single_exact,
            Bucket::SmallGroup => self.small_group,
            Bucket::Aggregate => self.aggregate,
            Bucket::TooBroad => self.too_broad,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    pub max_size: usize,
    pub thresholds: BucketThresholds,
    pub min_bets: BucketGates,
    pub top_n: usize,
    pub bet_sides: Vec<BetSide>,
    pub staking: StakingPolicy,
    pub min_coverage: f64,
    pub parallel: bool,
    /// Stop after this many evaluated combinations and report what was ranked.
    pub max_evaluations: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_COMBINATION_SIZE,
            thresholds: BucketThresholds::default(),
            min_bets: BucketGates::default(),
            top_n: DEFAULT_TOP_N,
            bet_sides: vec![BetSide::Home, BetSide::Away],
            staking: StakingPolicy::default(),
            min_coverage: DEFAULT_MIN_COVERAGE,
            parallel: false,
            max_evaluations: None,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 || self.max_size > MAX_COMBINATION_SIZE {
            return Err(anyhow!(
                "combination size must be within 1..={MAX_COMBINATION_SIZE}, got {}",
                self.max_size
            ));
        }
        let t = &self.thresholds;
        if !(t.single_exact < t.small_group && t.small_group < t.aggregate) {
            return Err(anyhow!(
                "bucket thresholds must increase: {} < {} < {}",
                t.single_exact,
                t.small_group,
                t.aggregate
            ));
        }
        if self.top_n == 0 {
            return Err(anyhow!("top_n must be at least 1"));
        }
        if self.bet_sides.is_empty() {
            return Err(anyhow!("at least one bet side is required"));
        }
        if self.max_evaluations == Some(0) {
            return Err(anyhow!("evaluation budget must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(anyhow!("min coverage must be within 0..=1"));
        }
        self.staking.validate().context("invalid staking policy")
    }
}

/// Cooperative cancellation, checked between combinations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Cancels after `budget` of wall-clock time from a detached timer thread.
    pub fn cancel_after(&self, budget: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(budget);
            token.cancel();
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResult {
    pub factors: Vec<String>,
    pub bet_side: BetSide,
    pub bucket: Bucket,
    pub matched_records: usize,
    pub total_bets: usize,
    pub total_profit: f64,
    pub total_staked: f64,
    pub roi: f64,
    pub win_rate: f64,
    pub invalid_bets: usize,
    pub inconsistent_bets: usize,
    pub low_coverage: bool,
}

impl StrategyResult {
    fn from_summary(
        factors: Vec<String>,
        bet_side: BetSide,
        bucket: Bucket,
        s: &StrategySummary,
    ) -> Self {
        Self {
            factors,
            bet_side,
            bucket,
            matched_records: s.matched_records,
            total_bets: s.total_bets,
            total_profit: s.total_profit,
            total_staked: s.total_staked,
            roi: s.roi,
            win_rate: s.win_rate,
            invalid_bets: s.invalid_bets,
            inconsistent_bets: s.inconsistent_bets,
            low_coverage: s.low_coverage,
        }
    }
}

fn rank(a: &StrategyResult, b: &StrategyResult) -> std::cmp::Ordering {
    b.roi
        .total_cmp(&a.roi)
        .then(b.total_profit.total_cmp(&a.total_profit))
        .then(a.factors.cmp(&b.factors))
        .then(a.bet_side.cmp(&b.bet_side))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReport {
    pub generated_at: String,
    pub records: usize,
    pub factor_count: usize,
    pub max_size: usize,
    pub staking: String,
    pub bet_sides: Vec<BetSide>,
    pub combinations_total: u64,
    pub evaluated: u64,
    pub pruned: u64,
    pub below_gate: u64,
    pub completed_sizes: usize,
    pub cancelled: bool,
    pub buckets: BTreeMap<Bucket, Vec<StrategyResult>>,
}

impl SearchReport {
    pub fn bucket(&self, bucket: Bucket) -> &[StrategyResult] {
        self.buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn best(&self) -> Option<&StrategyResult> {
        self.buckets.values().flatten().min_by(|a, b| rank(a, b))
    }
}

/// Lexicographic k-subsets of `0..n`, generated iteratively.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    idx: Vec<usize>,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            idx: (0..k).collect(),
            done: k == 0 || k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let out = self.idx.clone();
        let k = self.idx.len();
        // Rightmost slot that can still advance.
        match (0..k).rev().find(|&i| self.idx[i] < self.n - k + i) {
            Some(i) => {
                self.idx[i] += 1;
                for j in i + 1..k {
                    self.idx[j] = self.idx[j - 1] + 1;
                }
            }
            None => self.done = true,
        }
        Some(out)
    }
}

pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
    }
    u64::try_from(acc).unwrap_or(u64::MAX)
}

struct ComboEval {
    combo: Vec<usize>,
    matched: usize,
    rows: Vec<StrategyResult>,
    below_gate: u64,
}

fn evaluate_combination(
    filter: &mut RecordFilter<'_>,
    keys: &[String],
    combo: Vec<usize>,
    cfg: &SearchConfig,
) -> Result<ComboEval> {
    let names: Vec<String> = combo.iter().map(|&i| keys[i].clone()).collect();
    let matched = filter.filter(&names)?;
    let mut out = ComboEval {
        combo,
        matched: matched.len(),
        rows: Vec::new(),
        below_gate: 0,
    };
    if matched.is_empty() {
        return Ok(out);
    }
    let records = filter.records();
    let bucket = cfg.thresholds.classify(matched.len());
    let gate = cfg.min_bets.for_bucket(bucket);
    for &side in &cfg.bet_sides {
        let summary = analyzer::analyze(
            matched.iter().map(|&i| &records[i]),
            side,
            &cfg.staking,
            cfg.min_coverage,
        );
        if summary.total_bets == 0 || summary.total_bets < gate {
            out.below_gate += 1;
            continue;
        }
        out.rows
            .push(StrategyResult::from_summary(names.clone(), side, bucket, &summary));
    }
    Ok(out)
}

/// True when some non-empty proper subset of `combo` matched nothing.
fn is_pruned(combo: &[usize], dead: &HashSet<Vec<usize>>) -> bool {
    let k = combo.len();
    if k < 2 || dead.is_empty() {
        return false;
    }
    let mut sub = Vec::with_capacity(k);
    (1..(1u32 << k) - 1).any(|mask| {
        sub.clear();
        sub.extend(
            combo
                .iter()
                .enumerate()
                .filter(|&(i, _)| mask & (1 << i) != 0)
                .map(|(_, &v)| v),
        );
        dead.contains(&sub)
    })
}

/// Evaluates a batch in order. A shorter result means cancellation cut it.
fn evaluate_batch(
    filter: &mut RecordFilter<'_>,
    keys: &[String],
    batch: Vec<Vec<usize>>,
    cfg: &SearchConfig,
    cancel: &CancelToken,
) -> Result<Vec<ComboEval>> {
    if cfg.parallel {
        let base: &RecordFilter<'_> = filter;
        let evals = batch
            .into_par_iter()
            .map_init(
                || base.fork(),
                |worker, combo| {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    evaluate_combination(worker, keys, combo, cfg).map(Some)
                },
            )
            .collect::<Result<Vec<_>>>()?;
        return Ok(evals.into_iter().flatten().collect());
    }
    let mut out = Vec::with_capacity(batch.len());
    for combo in batch {
        if cancel.is_cancelled() {
            break;
        }
        out.push(evaluate_combination(filter, keys, combo, cfg)?);
    }
    Ok(out)
}

struct Leaderboard {
    top_n: usize,
    buckets: BTreeMap<Bucket, Vec<StrategyResult>>,
}

impl Leaderboard {
    fn new(top_n: usize) -> Self {
        Self {
            top_n,
            buckets: Bucket::ALL.iter().map(|&b| (b, Vec::new())).collect(),
        }
    }

    fn offer(&mut self, row: StrategyResult) {
        let list = self.buckets.entry(row.bucket).or_default();
        if list.len() >= self.top_n {
            if let Some(last) = list.last() {
                if rank(&row, last) != std::cmp::Ordering::Less {
                    return;
                }
            }
        }
        let pos = list.partition_point(|r| rank(r, &row) == std::cmp::Ordering::Less);
        list.insert(pos, row);
        list.truncate(self.top_n);
    }
}

/// Exhaustive sweep of factor combinations of size `1..=cfg.max_size`.
///
/// A combination with a sub-combination that matched nothing is skipped
/// (conjunction can only narrow). Combinations are drawn lazily in batches.
/// Cancellation and the evaluation budget are honoured between combinations;
/// everything ranked up to that point stays in the report.
pub fn run_search(
    records: &[MatchRecord],
    catalogue: &FactorCatalogue,
    evaluator: &FactorEvaluator,
    cfg: &SearchConfig,
    cancel: &CancelToken,
) -> Result<SearchReport> {
    cfg.validate()?;
    let keys = catalogue.keys();
    let n = keys.len();
    let max_size = cfg.max_size.min(n);

    let mut report = SearchReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        records: records.len(),
        factor_count: n,
        max_size,
        staking: cfg.staking.label(),
        bet_sides: cfg.bet_sides.clone(),
        combinations_total: (1..=max_size).map(|k| binomial(n, k)).sum(),
        evaluated: 0,
        pruned: 0,
        below_gate: 0,
        completed_sizes: 0,
        cancelled: false,
        buckets: BTreeMap::new(),
    };
    let mut board = Leaderboard::new(cfg.top_n);
    let mut filter = RecordFilter::new(records, catalogue, evaluator);
    // Only evaluated combinations that matched nothing; supersets of these
    // are pruned without being stored.
    let mut dead: HashSet<Vec<usize>> = HashSet::new();
    let mut budget_left = cfg.max_evaluations;

    tracing::info!(
        records = records.len(),
        factors = n,
        max_size,
        total = report.combinations_total,
        parallel = cfg.parallel,
        budget = cfg.max_evaluations,
        "combination search started"
    );

    for size in 1..=max_size {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        // Size k only narrows from cached (k-1)-prefixes.
        filter.retain_sizes(size.saturating_sub(1)..);
        let last_level = size == max_size;

        let mut combos = Combinations::new(n, size).peekable();
        let mut level_dead = Vec::new();
        let mut exhausted = false;
        let mut interrupted = false;
        while !exhausted && !cancel.is_cancelled() {
            let cap = budget_left.map_or(BATCH_SIZE, |left| {
                usize::try_from(left).unwrap_or(usize::MAX).min(BATCH_SIZE)
            });
            let mut batch = Vec::with_capacity(cap);
            while !cancel.is_cancelled() {
                let Some(combo) = combos.peek() else {
                    exhausted = true;
                    break;
                };
                if is_pruned(combo, &dead) {
                    report.pruned += 1;
                    combos.next();
                    continue;
                }
                if batch.len() == cap {
                    break;
                }
                batch.extend(combos.next());
            }
            if batch.is_empty() {
                break;
            }

            let drawn = batch.len();
            let evals = evaluate_batch(&mut filter, &keys, batch, cfg, cancel)?;
            interrupted = evals.len() < drawn;
            let spent = evals.len() as u64;
            for eval in evals {
                report.below_gate += eval.below_gate;
                if eval.matched == 0 {
                    level_dead.push(eval.combo);
                    continue;
                }
                for row in eval.rows {
                    board.offer(row);
                }
            }
            report.evaluated += spent;
            if let Some(left) = budget_left.as_mut() {
                *left = left.saturating_sub(spent);
            }
            if last_level {
                filter.retain_sizes(..size);
            }
            if interrupted {
                break;
            }
        }
        dead.extend(level_dead);

        if !exhausted || interrupted {
            report.cancelled = true;
            tracing::warn!(
                size,
                evaluated = report.evaluated,
                budget_spent = (budget_left == Some(0)),
                "combination search stopped early"
            );
            break;
        }
        report.completed_sizes = size;
        tracing::debug!(
            size,
            evaluated = report.evaluated,
            pruned = report.pruned,
            dead = dead.len(),
            cached = filter.cached_combinations(),
            "combination size complete"
        );
    }

    report.buckets = board.buckets;
    tracing::info!(
        evaluated = report.evaluated,
        pruned = report.pruned,
        cancelled = report.cancelled,
        "combination search finished"
    );
    Ok(report)
}
