//! Combination Batcher: lazily slices the admissible, not-yet-done
//! combinations into fixed-size columnar batches.
//!
//! Filtering order per combination: flag-forbidden filter, then the
//! exclusion set, then slicing. Every call to `iter()` starts from zero.

use std::collections::HashSet;
use std::sync::Arc;

use super::expand::{passes_flag_filter, CombinationIter};
use super::{CombinationKey, ExpandedParams, ParamError, ParamValue};

/// One batch of combinations stored column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamBatch {
    names: Arc<[String]>,
    columns: Vec<Vec<ParamValue>>,
    len: usize,
}

impl ParamBatch {
    /// Build a batch from row keys. Each key must have one value per name.
    pub fn from_keys(names: &[String], keys: &[CombinationKey]) -> Result<Self, ParamError> {
        Self::from_keys_shared(names.into(), keys)
    }

    fn from_keys_shared(names: Arc<[String]>, keys: &[CombinationKey]) -> Result<Self, ParamError> {
        let mut columns: Vec<Vec<ParamValue>> = (0..names.len())
            .map(|_| Vec::with_capacity(keys.len()))
            .collect();
        for key in keys {
            if key.len() != names.len() {
                return Err(ParamError::KeyWidth {
                    expected: names.len(),
                    got: key.len(),
                });
            }
            for (column, value) in columns.iter_mut().zip(key.values()) {
                column.push(value.clone());
            }
        }
        Ok(Self {
            names,
            columns,
            len: keys.len(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of combinations (columns of the signal matrices).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All values of parameter `name`, one per combination.
    pub fn column(&self, name: &str) -> Option<&[ParamValue]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn value(&self, index: usize, name: &str) -> Option<&ParamValue> {
        self.column(name).and_then(|c| c.get(index))
    }

    /// The key of combination `index`.
    pub fn key(&self, index: usize) -> CombinationKey {
        CombinationKey(self.columns.iter().map(|c| c[index].clone()).collect())
    }

    pub fn keys(&self) -> Vec<CombinationKey> {
        (0..self.len).map(|i| self.key(i)).collect()
    }
}

/// Resumable batch source over one expanded parameter space.
#[derive(Debug, Clone)]
pub struct Batcher {
    expanded: ExpandedParams,
    names: Arc<[String]>,
    batch_size: usize,
    flag_positions: Vec<usize>,
    exclude: HashSet<CombinationKey>,
}

impl Batcher {
    pub fn new(
        expanded: ExpandedParams,
        batch_size: usize,
        flag_forbidden: bool,
        exclude: Option<HashSet<CombinationKey>>,
    ) -> Result<Self, ParamError> {
        if batch_size == 0 {
            return Err(ParamError::ZeroBatchSize);
        }
        let flag_positions = if flag_forbidden {
            expanded.flag_positions()
        } else {
            Vec::new()
        };
        let names: Arc<[String]> = expanded.names().into();
        Ok(Self {
            expanded,
            names,
            batch_size,
            flag_positions,
            exclude: exclude.unwrap_or_default(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn excluded(&self) -> usize {
        self.exclude.len()
    }

    fn admits(&self, key: &CombinationKey) -> bool {
        passes_flag_filter(key.values(), &self.flag_positions) && !self.exclude.contains(key)
    }

    /// Fresh lazy iterator over the remaining batches.
    pub fn iter(&self) -> Batches<'_> {
        Batches {
            batcher: self,
            combos: self.expanded.combinations(),
        }
    }
}

impl<'a> IntoIterator for &'a Batcher {
    type Item = ParamBatch;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [`Batcher::iter`].
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    batcher: &'a Batcher,
    combos: CombinationIter<'a>,
}

impl Iterator for Batches<'_> {
    type Item = ParamBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let batcher = self.batcher;
        let keys: Vec<CombinationKey> = self
            .combos
            .by_ref()
            .filter(|k| batcher.admits(k))
            .take(batcher.batch_size)
            .collect();
        if keys.is_empty() {
            return None;
        }
        // Keys always match the expanded width.
        ParamBatch::from_keys_shared(batcher.names.clone(), &keys).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{expand, NumRange, ParamDef, ParamSpec};

    fn space() -> ExpandedParams {
        let spec = ParamSpec::new()
            .with(
                "len",
                ParamDef::Range(NumRange::Int {
                    min: 1,
                    max: 5,
                    step: 1,
                }),
            )
            .with("flag_a", ParamDef::Flag(true))
            .with("flag_b", ParamDef::Flag(true));
        expand(&spec).unwrap()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            Batcher::new(space(), 0, false, None),
            Err(ParamError::ZeroBatchSize)
        ));
    }

    #[test]
    fn batches_cover_everything_and_only_last_is_short() {
        let batcher = Batcher::new(space(), 3, false, None).unwrap();
        let batches: Vec<ParamBatch> = batcher.iter().collect();
        let sizes: Vec<usize> = batches.iter().map(ParamBatch::len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 20);
        assert!(sizes[..sizes.len() - 1].iter().all(|&s| s == 3));
        assert_eq!(*sizes.last().unwrap(), 2);
    }

    #[test]
    fn flag_forbidden_drops_all_false_tuples() {
        let batcher = Batcher::new(space(), 4, true, None).unwrap();
        let mut count = 0;
        for batch in &batcher {
            let a = batch.column("flag_a").unwrap();
            let b = batch.column("flag_b").unwrap();
            for i in 0..batch.len() {
                assert!(a[i].is_truthy() || b[i].is_truthy());
                count += 1;
            }
        }
        assert_eq!(count, 15);
    }

    #[test]
    fn exclusion_removes_done_keys() {
        let all: Vec<CombinationKey> = space().combinations().collect();
        let done: HashSet<CombinationKey> = all[..7].iter().cloned().collect();
        let batcher = Batcher::new(space(), 100, false, Some(done.clone())).unwrap();
        let remaining: Vec<CombinationKey> = batcher.iter().flat_map(|b| b.keys()).collect();
        assert_eq!(remaining.len(), 13);
        assert!(remaining.iter().all(|k| !done.contains(k)));
    }

    #[test]
    fn everything_excluded_yields_empty_stream() {
        let all: HashSet<CombinationKey> = space().combinations().collect();
        let batcher = Batcher::new(space(), 5, false, Some(all)).unwrap();
        assert_eq!(batcher.iter().count(), 0);
    }

    #[test]
    fn iteration_restarts_from_zero() {
        let batcher = Batcher::new(space(), 6, false, None).unwrap();
        let first: Vec<ParamBatch> = batcher.iter().take(1).collect();
        let again: Vec<ParamBatch> = batcher.iter().take(1).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn batch_is_columnar() {
        let batcher = Batcher::new(space(), 4, false, None).unwrap();
        let batch = batcher.iter().next().unwrap();
        assert_eq!(batch.names(), ["len", "flag_a", "flag_b"]);
        assert_eq!(batch.column("len").unwrap().len(), 4);
        assert_eq!(batch.value(0, "len"), Some(&ParamValue::Int(1)));
        assert_eq!(
            batch.key(1),
            CombinationKey(vec![
                ParamValue::Int(1),
                ParamValue::Bool(true),
                ParamValue::Bool(false)
            ])
        );
    }
}
