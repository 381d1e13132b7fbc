//! Storage engine - top-level coordinator

use super::EngineConfig;
use crate::codec::{self, DecodedSeries, LoadReport};
use crate::compaction::{CompactionRule, Emission};
use crate::index::{LabelFilter, LabelIndex};
use crate::query::{aggregate_range, SeriesIter};
use crate::series::{Series, SeriesInfo};
use crate::{AggregationType, Labels, Result, Sample, SeriesError, Timestamp};
use bytes::Bytes;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// SeriesDB storage engine
///
/// All mutations go through `&mut self`; the host serializes writers.
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    series: HashMap<String, Series>,
    index: LabelIndex,
}

/// One series' answer to a multi-series range query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeResult {
    pub key: String,
    pub labels: Labels,
    pub samples: Vec<Sample>,
}

impl Engine {
    /// Create an empty engine
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            series: HashMap::new(),
            index: LabelIndex::new(),
        }
    }

    /// Open an engine from a snapshot file, or empty if the file is missing
    pub fn open(config: EngineConfig, path: &Path) -> Result<Self> {
        let mut engine = Self::new(config);
        if !path.exists() {
            info!("No snapshot at {:?}, starting empty", path);
            return Ok(engine);
        }

        let data = std::fs::read(path)?;
        engine.load_snapshot(&data)?;
        info!("Loaded {} series from {:?}", engine.len(), path);
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &LabelIndex {
        &self.index
    }

    /// Get a series by key
    pub fn get(&self, key: &str) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.series.contains_key(key)
    }

    /// All series keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.series.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Create a new series and index its labels
    pub fn create_series(
        &mut self,
        key: &str,
        labels: Labels,
        retention_secs: u64,
        max_samples_per_chunk: usize,
    ) -> Result<&Series> {
        if self.series.contains_key(key) {
            return Err(SeriesError::AlreadyExists(key.to_string()));
        }
        let series = Series::new(key, labels, retention_secs, max_samples_per_chunk)?;
        info!(
            "Created series: {} (retention {}s, chunk size {})",
            key, retention_secs, max_samples_per_chunk
        );
        Ok(self.insert(series))
    }

    /// Create a series using the configured retention and chunk size
    pub fn create_series_with_defaults(&mut self, key: &str, labels: Labels) -> Result<&Series> {
        let retention = self.config.retention_secs;
        let capacity = self.config.max_samples_per_chunk;
        self.create_series(key, labels, retention, capacity)
    }

    /// Delete a series, releasing its chunks, rules and index entries
    pub fn delete_series(&mut self, key: &str) -> Result<Series> {
        let series = self
            .series
            .remove(key)
            .ok_or_else(|| SeriesError::NotExists(key.to_string()))?;
        self.index.remove_series(key, series.labels());
        info!("Deleted series: {}", key);
        Ok(series)
    }

    /// Add a sample and propagate it through the rule graph.
    ///
    /// The source and every destination are only written once the whole
    /// propagation has succeeded; on error no series changes.
    pub fn add_sample(&mut self, key: &str, timestamp: Timestamp, value: f64) -> Result<()> {
        let series = self
            .series
            .get(key)
            .ok_or_else(|| SeriesError::NotExists(key.to_string()))?;
        let mut pending = series.prepare_sample(timestamp, value)?;

        let mut staged = HashMap::new();
        let emissions = std::mem::take(&mut pending.emissions);
        self.stage(key, emissions, &HashSet::new(), &mut staged)?;

        if let Some(series) = self.series.get_mut(key) {
            series.commit_sample(pending);
        }
        self.commit(staged);
        Ok(())
    }

    /// Add a sample, creating the series first if the key is missing.
    ///
    /// `labels` and `retention_secs` only apply to a newly created series;
    /// a missing retention falls back to the configured default.
    pub fn add_sample_or_create(
        &mut self,
        key: &str,
        timestamp: Timestamp,
        value: f64,
        labels: Labels,
        retention_secs: Option<u64>,
    ) -> Result<()> {
        if self.series.contains_key(key) {
            return self.add_sample(key, timestamp, value);
        }

        let retention_secs = retention_secs.unwrap_or(self.config.retention_secs);
        let mut series = Series::new(key, labels, retention_secs, self.config.max_samples_per_chunk)?;
        series.append_sample(timestamp, value)?;
        self.insert(series);
        info!(
            "Created series on first sample: {} (retention {}s)",
            key, retention_secs
        );
        Ok(())
    }

    /// Add a sample stamped with the current wall-clock second
    pub fn add_sample_now(&mut self, key: &str, value: f64) -> Result<Timestamp> {
        let timestamp = now_secs();
        self.add_sample(key, timestamp, value)?;
        Ok(timestamp)
    }

    /// Add `delta` to the newest value of a counter series.
    ///
    /// With `reset_bucket`, the timestamp is aligned down to the bucket and
    /// the counter restarts from zero in each new bucket. Updates landing on
    /// the newest sample's timestamp overwrite it in place without feeding
    /// the rules again.
    pub fn incr_by(
        &mut self,
        key: &str,
        delta: f64,
        reset_bucket: Option<u64>,
        timestamp: Option<Timestamp>,
    ) -> Result<Sample> {
        if reset_bucket == Some(0) {
            return Err(SeriesError::InvalidArgument(
                "Reset bucket must be greater than zero".into(),
            ));
        }
        let now = timestamp.unwrap_or_else(now_secs);
        let ts = match reset_bucket {
            Some(bucket) => now - now % bucket,
            None => now,
        };

        let series = self
            .series
            .get_mut(key)
            .ok_or_else(|| SeriesError::NotExists(key.to_string()))?;
        let last = series.last_sample();
        let base = match (last, reset_bucket) {
            (None, _) => 0.0,
            (Some(last), Some(_)) if last.timestamp < ts => 0.0,
            (Some(last), _) => last.value,
        };
        let sample = Sample::new(ts, base + delta);

        if last.map_or(false, |last| last.timestamp == ts) {
            series.update_last_value(sample.value)?;
            return Ok(sample);
        }
        self.add_sample(key, sample.timestamp, sample.value)?;
        Ok(sample)
    }

    /// Subtract `delta` from the newest value of a counter series
    pub fn decr_by(
        &mut self,
        key: &str,
        delta: f64,
        reset_bucket: Option<u64>,
        timestamp: Option<Timestamp>,
    ) -> Result<Sample> {
        self.incr_by(key, -delta, reset_bucket, timestamp)
    }

    /// Attach a compaction rule from `source` to `dest`
    pub fn create_rule(
        &mut self,
        source: &str,
        dest: &str,
        bucket_secs: u64,
        agg: AggregationType,
    ) -> Result<()> {
        if !self.series.contains_key(source) {
            return Err(SeriesError::NotExists(source.to_string()));
        }
        if !self.series.contains_key(dest) {
            return Err(SeriesError::NotExists(dest.to_string()));
        }
        if source == dest || self.feeds_into(dest, source) {
            return Err(SeriesError::RuleCycle(format!(
                "{} already feeds {}",
                dest, source
            )));
        }

        let rule = CompactionRule::new(dest, agg, bucket_secs)?;
        let series = self
            .series
            .get_mut(source)
            .ok_or_else(|| SeriesError::NotExists(source.to_string()))?;
        series.add_rule(rule)?;
        info!(
            "Created compaction rule: {} -> {} ({} every {}s)",
            source, dest, agg, bucket_secs
        );
        Ok(())
    }

    /// Remove the rule from `source` to `dest`
    pub fn delete_rule(&mut self, source: &str, dest: &str) -> Result<()> {
        let series = self
            .series
            .get_mut(source)
            .ok_or_else(|| SeriesError::NotExists(source.to_string()))?;
        series.remove_rule(dest)?;
        info!("Deleted compaction rule: {} -> {}", source, dest);
        Ok(())
    }

    /// Snapshot iterator over `[start, end]` of one series
    pub fn query(&self, key: &str, start: Timestamp, end: Timestamp) -> Result<SeriesIter> {
        self.series
            .get(key)
            .ok_or_else(|| SeriesError::NotExists(key.to_string()))?
            .query(start, end)
    }

    /// Range query grouped into aggregated buckets
    pub fn query_aggregated(
        &self,
        key: &str,
        start: Timestamp,
        end: Timestamp,
        agg: AggregationType,
        bucket_secs: u64,
    ) -> Result<Vec<Sample>> {
        let iter = self.query(key, start, end)?;
        aggregate_range(iter, agg, bucket_secs)
    }

    /// Keys of series whose labels match all filters
    pub fn query_index(&self, filters: &[LabelFilter]) -> Result<Vec<String>> {
        self.index.query(filters)
    }

    /// Range query over every series matching the filters
    pub fn mrange(
        &self,
        start: Timestamp,
        end: Timestamp,
        filters: &[LabelFilter],
        aggregation: Option<(AggregationType, u64)>,
    ) -> Result<Vec<RangeResult>> {
        let keys = self.query_index(filters)?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(series) = self.series.get(&key) else {
                continue;
            };
            let iter = series.query(start, end)?;
            let samples = match aggregation {
                Some((agg, bucket_secs)) => aggregate_range(iter, agg, bucket_secs)?,
                None => iter.collect(),
            };
            results.push(RangeResult {
                labels: series.labels().clone(),
                key,
                samples,
            });
        }
        Ok(results)
    }

    /// Summary of one series
    pub fn info(&self, key: &str) -> Result<SeriesInfo> {
        self.series
            .get(key)
            .map(Series::info)
            .ok_or_else(|| SeriesError::NotExists(key.to_string()))
    }

    /// Serialize one series
    pub fn save_series(&self, key: &str) -> Result<Bytes> {
        self.series
            .get(key)
            .map(codec::encode_series)
            .ok_or_else(|| SeriesError::NotExists(key.to_string()))
    }

    /// Restore one series from its record and index it
    pub fn load_series(&mut self, data: &[u8]) -> Result<LoadReport> {
        let decoded = codec::decode_series(data, self.config.replay_policy)?;
        if self.series.contains_key(decoded.series.key()) {
            return Err(SeriesError::AlreadyExists(decoded.series.key().to_string()));
        }
        let report = self.restore(decoded)?;
        Ok(report)
    }

    /// Serialize every series, in key order
    pub fn save_snapshot(&self) -> Bytes {
        let mut all: Vec<&Series> = self.series.values().collect();
        all.sort_by(|a, b| a.key().cmp(b.key()));
        codec::encode_snapshot(all)
    }

    /// Restore every series of a snapshot.
    ///
    /// Nothing changes unless every record decodes, no key collides and all
    /// replayed emissions propagate. Under [`ReplayPolicy::Propagate`] a
    /// series restored by this snapshot keeps its own persisted samples;
    /// replayed emissions only reach destinations outside the snapshot.
    ///
    /// [`ReplayPolicy::Propagate`]: crate::codec::ReplayPolicy::Propagate
    pub fn load_snapshot(&mut self, data: &[u8]) -> Result<Vec<(String, LoadReport)>> {
        let mut decoded = codec::decode_snapshot(data, self.config.replay_policy)?;

        let mut restored = HashSet::new();
        for entry in &decoded {
            let key = entry.series.key();
            if self.series.contains_key(key) || !restored.insert(key.to_string()) {
                return Err(SeriesError::AlreadyExists(key.to_string()));
            }
        }

        let mut staged = HashMap::new();
        for entry in &mut decoded {
            let emissions = std::mem::take(&mut entry.emissions);
            self.stage(entry.series.key(), emissions, &restored, &mut staged)?;
        }

        let mut reports = Vec::with_capacity(decoded.len());
        for entry in decoded {
            reports.push((entry.series.key().to_string(), entry.report));
            self.insert(entry.series);
        }
        self.commit(staged);

        info!("Restored {} series from snapshot", reports.len());
        Ok(reports)
    }

    /// Write a snapshot file, replacing it atomically
    pub fn persist(&self, path: &Path) -> Result<()> {
        let data = self.save_snapshot();
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &data)?;
        std::fs::rename(&tmp, path)?;
        info!(
            "Persisted {} series ({} bytes) to {:?}",
            self.series.len(),
            data.len(),
            path
        );
        Ok(())
    }

    fn insert(&mut self, series: Series) -> &Series {
        let key = series.key().to_string();
        self.index.index_series(&key, series.labels());
        self.series.entry(key).or_insert(series)
    }

    fn restore(&mut self, decoded: DecodedSeries) -> Result<LoadReport> {
        let key = decoded.series.key().to_string();
        let mut staged = HashMap::new();
        self.stage(&key, decoded.emissions, &HashSet::new(), &mut staged)?;

        self.insert(decoded.series);
        self.commit(staged);
        info!(
            "Loaded series: {} ({} samples, {} skipped)",
            key,
            decoded.report.loaded_samples,
            decoded.report.skipped_samples.len()
        );
        Ok(decoded.report)
    }

    /// Check if samples written to `from` reach `to` through rules
    fn feeds_into(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(key) = stack.pop() {
            if key == to {
                return true;
            }
            if !visited.insert(key) {
                continue;
            }
            if let Some(series) = self.series.get(key) {
                stack.extend(series.rules().iter().map(CompactionRule::dest_key));
            }
        }
        false
    }

    /// Deliver emissions breadth-first into staged copies of their
    /// destinations.
    ///
    /// Each queued emission carries the chain of series it passed through,
    /// so a destination already on that chain is a cycle. Emissions bound
    /// for a key in `restored` are skipped. The engine is not modified; the
    /// staged series replace the live ones in [`Engine::commit`].
    fn stage(
        &self,
        source: &str,
        emissions: Vec<Emission>,
        restored: &HashSet<String>,
        staged: &mut HashMap<String, Series>,
    ) -> Result<()> {
        let mut queue: VecDeque<(Emission, Vec<String>)> = emissions
            .into_iter()
            .map(|emission| (emission, vec![source.to_string()]))
            .collect();

        while let Some((emission, path)) = queue.pop_front() {
            let dest_key = emission.dest_key;
            if path.contains(&dest_key) {
                error!(
                    "Compaction cycle detected: {} -> {}",
                    path.join(" -> "),
                    dest_key
                );
                return Err(SeriesError::RuleCycle(format!(
                    "{} -> {}",
                    path.join(" -> "),
                    dest_key
                )));
            }
            if path.len() > self.config.max_propagation_depth {
                error!(
                    "Compaction propagation from {} exceeded {} hops",
                    source, self.config.max_propagation_depth
                );
                return Err(SeriesError::Internal(format!(
                    "propagation depth exceeded at {}",
                    dest_key
                )));
            }
            if restored.contains(&dest_key) {
                debug!(
                    "Skipping replayed sample at {} for {}: restored from its own record",
                    emission.sample.timestamp, dest_key
                );
                continue;
            }

            let dest = match staged.entry(dest_key.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match self.series.get(entry.key()) {
                    Some(series) => entry.insert(series.clone()),
                    None => {
                        warn!(
                            "Dropping compacted sample at {}: destination {} does not exist",
                            emission.sample.timestamp, dest_key
                        );
                        continue;
                    }
                },
            };

            match dest.add_sample(emission.sample.timestamp, emission.sample.value) {
                Ok(next) => {
                    debug!(
                        "Delivered compacted sample {} {} to {}",
                        emission.sample.timestamp, emission.sample.value, dest_key
                    );
                    if next.is_empty() {
                        continue;
                    }
                    let mut next_path = path;
                    next_path.push(dest_key);
                    for emission in next {
                        queue.push_back((emission, next_path.clone()));
                    }
                }
                Err(e) => {
                    warn!(
                        "Dropping compacted sample at {} for {}: {}",
                        emission.sample.timestamp, dest_key, e
                    );
                }
            }
        }
        Ok(())
    }

    /// Replace live series with their staged copies
    fn commit(&mut self, staged: HashMap<String, Series>) {
        for (key, series) in staged {
            self.series.insert(key, series);
        }
    }
}

/// Current wall-clock time in seconds
fn now_secs() -> Timestamp {
    chrono::Utc::now().timestamp().max(0) as Timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ReplayPolicy;
    use crate::Label;
    use tempfile::TempDir;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    fn values(engine: &Engine, key: &str) -> Vec<(u64, f64)> {
        engine
            .query(key, 0, u64::MAX)
            .unwrap()
            .map(|s| (s.timestamp, s.value))
            .collect()
    }

    #[test]
    fn test_create_and_delete_series() {
        let mut engine = engine();
        engine
            .create_series("tester", vec![Label::new("name", "bob")], 0, 360)
            .unwrap();
        assert!(matches!(
            engine.create_series_with_defaults("tester", Vec::new()),
            Err(SeriesError::AlreadyExists(_))
        ));

        engine.delete_series("tester").unwrap();
        assert!(engine.index().is_empty());
        assert!(matches!(
            engine.delete_series("tester"),
            Err(SeriesError::NotExists(_))
        ));
        assert!(matches!(
            engine.add_sample("tester", 1, 1.0),
            Err(SeriesError::NotExists(_))
        ));
    }

    #[test]
    fn test_rule_validation() {
        let mut engine = engine();
        engine.create_series_with_defaults("a", Vec::new()).unwrap();
        engine.create_series_with_defaults("b", Vec::new()).unwrap();
        engine.create_series_with_defaults("c", Vec::new()).unwrap();

        assert!(matches!(
            engine.create_rule("a", "missing", 10, AggregationType::Max),
            Err(SeriesError::NotExists(_))
        ));
        assert!(matches!(
            engine.create_rule("a", "a", 10, AggregationType::Max),
            Err(SeriesError::RuleCycle(_))
        ));

        engine.create_rule("a", "b", 10, AggregationType::Max).unwrap();
        assert!(matches!(
            engine.create_rule("a", "b", 10, AggregationType::Max),
            Err(SeriesError::RuleExists { .. })
        ));

        engine.create_rule("b", "c", 60, AggregationType::Avg).unwrap();
        assert!(matches!(
            engine.create_rule("c", "a", 10, AggregationType::Avg),
            Err(SeriesError::RuleCycle(_))
        ));
        assert!(matches!(
            engine.create_rule("a", "c", 0, AggregationType::Avg),
            Err(SeriesError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_delete_rule() {
        let mut engine = engine();
        engine.create_series_with_defaults("tester", Vec::new()).unwrap();
        engine.create_series_with_defaults("tester_avg_10", Vec::new()).unwrap();
        engine
            .create_rule("tester", "tester_avg_10", 10, AggregationType::Avg)
            .unwrap();

        assert!(matches!(
            engine.delete_rule("tester", "non_existent"),
            Err(SeriesError::NotExists(_))
        ));
        assert_eq!(engine.info("tester").unwrap().rules.len(), 1);

        engine.delete_rule("tester", "tester_avg_10").unwrap();
        assert!(engine.info("tester").unwrap().rules.is_empty());
    }

    #[test]
    fn test_deleted_destination_drops_emissions() {
        let mut engine = engine();
        engine.create_series_with_defaults("tester", Vec::new()).unwrap();
        engine.create_series_with_defaults("tester_avg_10", Vec::new()).unwrap();
        engine
            .create_rule("tester", "tester_avg_10", 10, AggregationType::Avg)
            .unwrap();
        engine.delete_series("tester_avg_10").unwrap();

        for ts in 0..100 {
            engine.add_sample("tester", ts, 5.0).unwrap();
        }
        assert_eq!(engine.info("tester").unwrap().total_samples, 100);
    }

    #[test]
    fn test_destination_rejection_does_not_fail_source() {
        let mut engine = engine();
        engine.create_series_with_defaults("src", Vec::new()).unwrap();
        engine.create_series_with_defaults("dst", Vec::new()).unwrap();
        engine.create_rule("src", "dst", 10, AggregationType::Sum).unwrap();
        engine.add_sample("dst", 1000, 1.0).unwrap();

        engine.add_sample("src", 1, 1.0).unwrap();
        engine.add_sample("src", 15, 1.0).unwrap();
        assert_eq!(values(&engine, "dst"), vec![(1000, 1.0)]);
        assert_eq!(values(&engine, "src").len(), 2);
    }

    #[test]
    fn test_runtime_cycle_detection() {
        // cycles can only come from restored state, rule creation rejects them
        let mut engine = engine();
        let mut a = Series::new("a", Vec::new(), 0, 16).unwrap();
        a.add_rule(CompactionRule::new("b", AggregationType::Last, 1).unwrap())
            .unwrap();
        let mut b = Series::new("b", Vec::new(), 0, 16).unwrap();
        b.add_rule(CompactionRule::new("a", AggregationType::Last, 1).unwrap())
            .unwrap();
        engine.insert(a);
        engine.insert(b);

        engine.add_sample("b", 0, 1.0).unwrap();
        engine.add_sample("a", 1, 1.0).unwrap();
        // a closes bucket 1 into b, which closes bucket 0 back into a
        let err = engine.add_sample("a", 2, 1.0).unwrap_err();
        assert!(matches!(err, SeriesError::RuleCycle(_)));

        assert_eq!(values(&engine, "a"), vec![(1, 1.0)]);
        assert_eq!(values(&engine, "b"), vec![(0, 1.0)]);
        assert_eq!(engine.get("a").unwrap().rules()[0].bucket_start(), Some(1));
    }

    #[test]
    fn test_propagation_depth_limit() {
        let config = EngineConfig {
            max_propagation_depth: 2,
            ..Default::default()
        };
        let mut engine = Engine::new(config);
        for key in ["s0", "s1", "s2", "s3"] {
            engine.create_series_with_defaults(key, Vec::new()).unwrap();
        }
        engine.create_rule("s0", "s1", 1, AggregationType::Last).unwrap();
        engine.create_rule("s1", "s2", 1, AggregationType::Last).unwrap();
        engine.create_rule("s2", "s3", 1, AggregationType::Last).unwrap();

        for ts in 0..3 {
            engine.add_sample("s0", ts, 1.0).unwrap();
        }
        let counts = |engine: &Engine| -> Vec<u64> {
            ["s0", "s1", "s2", "s3"]
                .iter()
                .map(|key| engine.info(key).unwrap().total_samples)
                .collect()
        };
        assert_eq!(counts(&engine), vec![3, 2, 1, 0]);

        // the fourth sample pushes a bucket three hops down the chain
        let err = engine.add_sample("s0", 3, 1.0).unwrap_err();
        assert!(matches!(err, SeriesError::Internal(_)));
        assert_eq!(counts(&engine), vec![3, 2, 1, 0]);
        assert_eq!(engine.get("s0").unwrap().last_timestamp(), 2);

        // the chain keeps working for writes that stay within the limit
        engine.delete_rule("s2", "s3").unwrap();
        engine.add_sample("s0", 3, 1.0).unwrap();
        assert_eq!(counts(&engine), vec![4, 3, 2, 0]);
    }

    #[test]
    fn test_rejected_source_sample_changes_nothing() {
        let mut engine = engine();
        engine.create_series_with_defaults("src", Vec::new()).unwrap();
        engine.create_series_with_defaults("dst", Vec::new()).unwrap();
        engine.create_rule("src", "dst", 10, AggregationType::Sum).unwrap();
        engine.add_sample("src", 15, 1.0).unwrap();

        assert!(matches!(
            engine.add_sample("src", 3, 1.0),
            Err(SeriesError::TimestampTooOld { .. })
        ));
        assert_eq!(values(&engine, "src"), vec![(15, 1.0)]);
        assert_eq!(engine.get("src").unwrap().rules()[0].bucket_start(), Some(10));
    }

    #[test]
    fn test_add_sample_or_create() {
        let mut engine = engine();
        engine
            .add_sample_or_create("tester1", 1000, 1.5, vec![Label::new("name", "blabla")], Some(666))
            .unwrap();

        let info = engine.info("tester1").unwrap();
        assert_eq!(info.last_timestamp, 1000);
        assert_eq!(info.retention_secs, 666);
        assert_eq!(info.chunk_count, 1);
        assert_eq!(info.max_samples_per_chunk, 360);
        assert_eq!(info.labels, vec![("name".to_string(), "blabla".to_string())]);
        let filters = LabelFilter::parse_all(&["name=blabla"]).unwrap();
        assert_eq!(engine.query_index(&filters).unwrap(), ["tester1"]);

        // an existing key ignores the creation arguments
        engine
            .add_sample_or_create("tester1", 1001, 2.5, vec![Label::new("name", "other")], Some(1))
            .unwrap();
        let info = engine.info("tester1").unwrap();
        assert_eq!(info.retention_secs, 666);
        assert_eq!(info.total_samples, 2);

        engine
            .add_sample_or_create(
                "tester2",
                1000,
                1.0,
                vec![Label::new("name", "blabla2"), Label::new("location", "earth")],
                None,
            )
            .unwrap();
        assert_eq!(engine.info("tester2").unwrap().retention_secs, 0);

        assert!(matches!(
            engine.add_sample_or_create("tester1", 5, 1.0, Vec::new(), None),
            Err(SeriesError::TimestampTooOld { .. })
        ));
    }

    #[test]
    fn test_incr_by() {
        let mut engine = engine();
        engine.create_series_with_defaults("counter", Vec::new()).unwrap();

        for _ in 0..20 {
            engine.incr_by("counter", 5.0, None, Some(100)).unwrap();
        }
        for _ in 0..20 {
            engine.decr_by("counter", 1.5, None, Some(101)).unwrap();
        }
        assert_eq!(values(&engine, "counter"), vec![(100, 100.0), (101, 70.0)]);
    }

    #[test]
    fn test_incr_by_reset() {
        let mut engine = engine();
        engine.create_series_with_defaults("counter", Vec::new()).unwrap();

        for i in 0..1000 {
            engine
                .incr_by("counter", 1.0, Some(10), Some(1000 + i % 10))
                .unwrap();
        }
        engine.incr_by("counter", 1.0, Some(10), Some(1012)).unwrap();
        assert_eq!(values(&engine, "counter"), vec![(1000, 1000.0), (1010, 1.0)]);

        assert!(engine.incr_by("counter", 1.0, Some(0), None).is_err());
    }

    #[test]
    fn test_add_sample_now() {
        let mut engine = engine();
        engine.create_series_with_defaults("tester", Vec::new()).unwrap();
        let ts = engine.add_sample_now("tester", 1.0).unwrap();
        assert!(ts > 0);
        assert_eq!(values(&engine, "tester"), vec![(ts, 1.0)]);
    }

    #[test]
    fn test_mrange() {
        let mut engine = engine();
        let start_ts = 1511885909;
        for (key, name, value) in [("tester1", "bob", 5.0), ("tester2", "rudy", 15.0)] {
            engine
                .create_series_with_defaults(
                    key,
                    vec![Label::new("name", name), Label::new("generation", "x")],
                )
                .unwrap();
            for i in 0..50 {
                engine.add_sample(key, start_ts + i, value).unwrap();
            }
        }

        let filters = LabelFilter::parse_all(&["name=bob"]).unwrap();
        let result = engine.mrange(start_ts, start_ts + 50, &filters, None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].key, "tester1");
        assert_eq!(result[0].samples.len(), 50);

        let filters = LabelFilter::parse_all(&["generation=x"]).unwrap();
        let result = engine
            .mrange(start_ts, start_ts + 50, &filters, Some((AggregationType::Last, 5)))
            .unwrap();
        assert_eq!(result.len(), 2);
        // 1511885909 % 5 == 4, so 50 samples touch 11 buckets
        assert_eq!(result[1].samples.len(), 11);
        assert!(result[1].samples.iter().all(|s| s.value == 15.0));
    }

    #[test]
    fn test_info_serializes() {
        let mut engine = engine();
        engine
            .create_series_with_defaults("tester", vec![Label::new("name", "brown")])
            .unwrap();
        engine.add_sample("tester", 7, 1.0).unwrap();

        let json = serde_json::to_value(engine.info("tester").unwrap()).unwrap();
        assert_eq!(json["key"], "tester");
        assert_eq!(json["last_timestamp"], 7);
        assert_eq!(json["labels"][0], serde_json::json!(["name", "brown"]));
    }

    #[test]
    fn test_load_conflicts_and_reindex() {
        let mut engine = engine();
        engine
            .create_series_with_defaults("tester", vec![Label::new("region", "us")])
            .unwrap();
        engine.add_sample("tester", 1, 1.0).unwrap();
        let bytes = engine.save_series("tester").unwrap();

        assert!(matches!(
            engine.load_series(&bytes),
            Err(SeriesError::AlreadyExists(_))
        ));

        engine.delete_series("tester").unwrap();
        let filters = LabelFilter::parse_all(&["region=us"]).unwrap();
        assert!(engine.query_index(&filters).unwrap().is_empty());

        let report = engine.load_series(&bytes).unwrap();
        assert!(report.is_clean());
        assert_eq!(engine.query_index(&filters).unwrap(), ["tester"]);
    }

    #[test]
    fn test_snapshot_load_is_all_or_nothing() {
        let mut source = engine();
        source.create_series_with_defaults("a", Vec::new()).unwrap();
        source.create_series_with_defaults("b", Vec::new()).unwrap();
        let snapshot = source.save_snapshot();

        let mut target = engine();
        target.create_series_with_defaults("b", Vec::new()).unwrap();
        assert!(target.load_snapshot(&snapshot).is_err());
        assert_eq!(target.keys(), ["b"]);
    }

    #[test]
    fn test_snapshot_load_rolls_back_failed_propagation() {
        let mut source = engine();
        source.create_series_with_defaults("raw", Vec::new()).unwrap();
        source.create_series_with_defaults("mid", Vec::new()).unwrap();
        source.create_rule("raw", "mid", 1, AggregationType::Last).unwrap();
        for ts in 0..3 {
            source.add_sample("raw", ts, 1.0).unwrap();
        }
        source.delete_series("mid").unwrap();
        let snapshot = source.save_snapshot();

        let config = EngineConfig {
            replay_policy: ReplayPolicy::Propagate,
            max_propagation_depth: 1,
            ..Default::default()
        };
        let mut target = Engine::new(config);
        target.create_series_with_defaults("mid", Vec::new()).unwrap();
        target.create_series_with_defaults("end", Vec::new()).unwrap();
        target.create_rule("mid", "end", 1, AggregationType::Last).unwrap();

        // raw -> mid -> end is two hops, one more than allowed
        assert!(matches!(
            target.load_snapshot(&snapshot),
            Err(SeriesError::Internal(_))
        ));
        assert_eq!(target.keys(), ["end", "mid"]);
        assert!(values(&target, "mid").is_empty());
        assert!(values(&target, "end").is_empty());
    }

    #[test]
    fn test_persist_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.sdb");

        let mut engine = engine();
        engine
            .create_series("tester", vec![Label::new("name", "brown")], 0, 4)
            .unwrap();
        for ts in 0..10 {
            engine.add_sample("tester", ts, ts as f64).unwrap();
        }
        engine.persist(&path).unwrap();

        let reopened = Engine::open(EngineConfig::default(), &path).unwrap();
        assert_eq!(values(&reopened, "tester"), values(&engine, "tester"));
        assert_eq!(reopened.info("tester").unwrap().chunk_count, 3);

        let empty = Engine::open(EngineConfig::default(), &temp_dir.path().join("none")).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_replay_policy_propagate() {
        let mut engine = engine();
        engine.create_series_with_defaults("raw", Vec::new()).unwrap();
        engine.create_series_with_defaults("raw_sum", Vec::new()).unwrap();
        engine.create_rule("raw", "raw_sum", 10, AggregationType::Sum).unwrap();
        for ts in 0..25 {
            engine.add_sample("raw", ts, 1.0).unwrap();
        }
        let raw = engine.save_series("raw").unwrap();

        // only the source is restored, destinations are rebuilt from replay
        let config = EngineConfig {
            replay_policy: ReplayPolicy::Propagate,
            ..Default::default()
        };
        let mut restored = Engine::new(config);
        restored.create_series_with_defaults("raw_sum", Vec::new()).unwrap();
        restored.load_series(&raw).unwrap();

        assert_eq!(values(&restored, "raw_sum"), values(&engine, "raw_sum"));
        assert_eq!(values(&restored, "raw_sum"), vec![(0, 10.0), (10, 10.0)]);
    }
}
