use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::DeterminismError;
use crate::factor::{FactorCatalogue, FactorEvaluator};
use crate::record::MatchRecord;
use crate::search::{CancelToken, SearchConfig, SearchReport, run_search};

/// Fields that legitimately change between runs.
const VOLATILE_FIELDS: &[&str] = &["generatedAt"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterminismReport {
    pub runs: usize,
    pub digest: String,
}

pub fn canonical_value(report: &SearchReport) -> Result<Value> {
    let mut value = serde_json::to_value(report).context("serialise search report")?;
    if let Value::Object(map) = &mut value {
        for field in VOLATILE_FIELDS {
            map.remove(*field);
        }
    }
    Ok(value)
}

/// SHA-256 over the compact JSON encoding, base64 encoded. Object keys are
/// sorted by `serde_json::Map`, so equal values hash equally.
pub fn digest(value: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(value).context("encode canonical report")?;
    Ok(STANDARD.encode(Sha256::digest(&bytes)))
}

pub fn diff_paths(expected: &Value, actual: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk("$", expected, actual, &mut out);
    out
}

fn walk(path: &str, a: &Value, b: &Value, out: &mut Vec<String>) {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            let mut keys: Vec<&String> = x.keys().chain(y.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let child = format!("{path}.{key}");
                match (x.get(key), y.get(key)) {
                    (Some(l), Some(r)) => walk(&child, l, r, out),
                    _ => out.push(child),
                }
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            for (i, (l, r)) in x.iter().zip(y).enumerate() {
                walk(&format!("{path}[{i}]"), l, r, out);
            }
            for i in x.len().min(y.len())..x.len().max(y.len()) {
                out.push(format!("{path}[{i}]"));
            }
        }
        _ if a != b => out.push(path.to_string()),
        _ => {}
    }
}

/// Runs `run` `runs` times and requires every canonical report to match the
/// first one. Halts on the first differing run.
pub fn verify_determinism<F>(runs: usize, mut run: F) -> Result<DeterminismReport>
where
    F: FnMut(usize) -> Result<SearchReport>,
{
    if runs < 2 {
        return Err(anyhow!("determinism check needs at least two runs, got {runs}"));
    }
    let first = canonical_value(&run(0).context("run 0")?)?;
    let expected_digest = digest(&first)?;
    tracing::debug!(run = 0, digest = %expected_digest, "baseline report");

    for i in 1..runs {
        let value = canonical_value(&run(i).with_context(|| format!("run {i}"))?)?;
        let actual_digest = digest(&value)?;
        if actual_digest != expected_digest {
            let paths = diff_paths(&first, &value);
            tracing::warn!(run = i, differing = paths.len(), "report differs from baseline");
            return Err(DeterminismError {
                run: i,
                paths,
                expected_digest,
                actual_digest,
            }
            .into());
        }
        tracing::debug!(run = i, "report matches baseline");
    }

    tracing::info!(runs, digest = %expected_digest, "search output is deterministic");
    Ok(DeterminismReport {
        runs,
        digest: expected_digest,
    })
}

/// Re-runs the full search with a fresh factor cache each time. With
/// `alternate_modes` odd runs flip between sequential and parallel sweeps.
pub fn verify_pipeline(
    records: &[MatchRecord],
    catalogue: &FactorCatalogue,
    cfg: &SearchConfig,
    runs: usize,
    alternate_modes: bool,
) -> Result<DeterminismReport> {
    verify_determinism(runs, |i| {
        let evaluator = FactorEvaluator::new();
        let mut run_cfg = cfg.clone();
        if alternate_modes && i % 2 == 1 {
            run_cfg.parallel = !cfg.parallel;
        }
        run_search(records, catalogue, &evaluator, &run_cfg, &CancelToken::new())
    })
}
