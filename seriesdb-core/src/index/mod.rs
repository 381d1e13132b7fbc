//! Label index
//!
//! Inverted index from (label key, label value) to the keys of the series
//! carrying that label. The engine owns one instance; series register on
//! creation or load and unregister on deletion.

mod filter;

pub use filter::LabelFilter;

use crate::{Label, Result, SeriesError};
use std::collections::{BTreeSet, HashMap};

/// Inverted index for label-based discovery
#[derive(Debug, Default)]
pub struct LabelIndex {
    /// label key → label value → series keys
    postings: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl LabelIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every label of a series
    pub fn index_series(&mut self, series_key: &str, labels: &[Label]) {
        for label in labels {
            self.postings
                .entry(label.key.clone())
                .or_default()
                .entry(label.value.clone())
                .or_default()
                .insert(series_key.to_string());
        }
    }

    /// Unregister every label of a series
    pub fn remove_series(&mut self, series_key: &str, labels: &[Label]) {
        for label in labels {
            let Some(values) = self.postings.get_mut(&label.key) else {
                continue;
            };
            if let Some(keys) = values.get_mut(&label.value) {
                keys.remove(series_key);
                if keys.is_empty() {
                    values.remove(&label.value);
                }
            }
            if values.is_empty() {
                self.postings.remove(&label.key);
            }
        }
    }

    /// Series carrying `key=value`
    pub fn lookup(&self, key: &str, value: &str) -> BTreeSet<String> {
        self.postings
            .get(key)
            .and_then(|values| values.get(value))
            .cloned()
            .unwrap_or_default()
    }

    /// Series carrying `key` with any value
    pub fn with_key(&self, key: &str) -> BTreeSet<String> {
        self.postings
            .get(key)
            .map(|values| values.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Series keys matching all filters, in key order.
    ///
    /// At least one `key=value` filter is required to seed the candidates.
    pub fn query(&self, filters: &[LabelFilter]) -> Result<Vec<String>> {
        if !filters.iter().any(LabelFilter::is_positive) {
            return Err(SeriesError::InvalidFilter(
                "at least one key=value filter is required".into(),
            ));
        }

        let mut candidates: Option<BTreeSet<String>> = None;
        for filter in filters {
            if let LabelFilter::Equal { key, value } = filter {
                let matching = self.lookup(key, value);
                candidates = Some(match candidates {
                    Some(current) => current.intersection(&matching).cloned().collect(),
                    None => matching,
                });
            }
        }
        let mut candidates = candidates.unwrap_or_default();

        for filter in filters {
            match filter {
                LabelFilter::Equal { .. } => {}
                LabelFilter::NotEqual { key, value } => {
                    let excluded = self.lookup(key, value);
                    candidates.retain(|k| !excluded.contains(k));
                }
                LabelFilter::Absent { key } => {
                    let excluded = self.with_key(key);
                    candidates.retain(|k| !excluded.contains(k));
                }
                LabelFilter::Present { key } => {
                    let required = self.with_key(key);
                    candidates.retain(|k| required.contains(k));
                }
            }
        }

        Ok(candidates.into_iter().collect())
    }

    /// All label keys
    pub fn label_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.postings.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Check if nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}
