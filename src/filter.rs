use std::collections::HashMap;
use std::ops::RangeBounds;
use std::sync::Arc;

use crate::error::CatalogueError;
use crate::factor::{FactorCatalogue, FactorEvaluator};
use crate::record::{MatchRecord, RecordId};

/// Sorted, deduplicated factor keys; conjunction is commutative so this is
/// the identity of a combination.
pub fn combination_key<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut out: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
    out.sort();
    out.dedup();
    out
}

/// AND-filter over a fixed record slice. Results are indices into that
/// slice, in slice order, memoised per combination key.
pub struct RecordFilter<'a> {
    records: &'a [MatchRecord],
    ids: Arc<[RecordId]>,
    catalogue: &'a FactorCatalogue,
    evaluator: &'a FactorEvaluator,
    cache: HashMap<Vec<String>, Arc<[usize]>>,
    all: Arc<[usize]>,
}

impl<'a> RecordFilter<'a> {
    pub fn new(
        records: &'a [MatchRecord],
        catalogue: &'a FactorCatalogue,
        evaluator: &'a FactorEvaluator,
    ) -> Self {
        let ids: Arc<[RecordId]> = records.iter().map(MatchRecord::id).collect();
        Self {
            records,
            ids,
            catalogue,
            evaluator,
            cache: HashMap::new(),
            all: (0..records.len()).collect(),
        }
    }

    /// Same records and evaluator, empty combination cache.
    pub fn fork(&self) -> Self {
        Self {
            records: self.records,
            ids: self.ids.clone(),
            catalogue: self.catalogue,
            evaluator: self.evaluator,
            cache: HashMap::new(),
            all: self.all.clone(),
        }
    }

    pub fn records(&self) -> &'a [MatchRecord] {
        self.records
    }

    pub fn filter<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<Arc<[usize]>, CatalogueError> {
        let key = combination_key(keys);
        for k in &key {
            if self.catalogue.get(k).is_none() {
                return Err(CatalogueError::UnknownFactor(k.clone()));
            }
        }
        Ok(self.filter_sorted(&key))
    }

    pub fn filter_records<S: AsRef<str>>(
        &mut self,
        keys: &[S],
    ) -> Result<Vec<&'a MatchRecord>, CatalogueError> {
        let records = self.records;
        Ok(self.filter(keys)?.iter().map(|&i| &records[i]).collect())
    }

    fn filter_sorted(&mut self, key: &[String]) -> Arc<[usize]> {
        let Some((last, prefix)) = key.split_last() else {
            return self.all.clone();
        };
        if let Some(hit) = self.cache.get(key) {
            return hit.clone();
        }
        // Narrow the cached prefix instead of rescanning every record.
        let base = self.filter_sorted(prefix);
        let out: Arc<[usize]> = match self.catalogue.get(last) {
            Some(factor) => base
                .iter()
                .copied()
                .filter(|&i| {
                    self.evaluator
                        .evaluate_with_id(factor, &self.records[i], &self.ids[i])
                })
                .collect(),
            None => Arc::from(Vec::new()),
        };
        self.cache.insert(key.to_vec(), out.clone());
        out
    }

    pub fn cached_combinations(&self) -> usize {
        self.cache.len()
    }

    /// Keeps only cached combinations whose factor count is in `sizes`.
    pub fn retain_sizes<R: RangeBounds<usize>>(&mut self, sizes: R) {
        self.cache.retain(|key, _| sizes.contains(&key.len()));
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
