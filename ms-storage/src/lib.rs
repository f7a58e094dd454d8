//! The Local Store: the single-node slice of storage each shard owns. Wraps
//! the on-disk shard index behind the `Appender`/`Querier` traits, runs the
//! sanitizer on the ingress path, and prunes expired shards on a timer.

pub mod sanitize;
pub mod series;
pub mod shard;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use ms_base::Result;
use ms_net::{Batch, Point};

pub use sanitize::{sanitize, sanitize_batch};
pub use series::{MatchOp, Matcher, Querier, Series};
pub use shard::ShardIndex;

/// Default retention: 24 hours.
pub const DEFAULT_RETENTION_NS: i64 = 24 * 60 * 60 * 1_000_000_000;

pub struct LocalStore {
    shards: Arc<ShardIndex>,
    retention_ns: i64,
}

impl LocalStore {
    pub fn open(dir: impl Into<std::path::PathBuf>, retention_ns: i64) -> Result<Self> {
        let shards = ShardIndex::open(dir)?;
        Ok(LocalStore { shards, retention_ns })
    }

    /// Sanitize and persist one already-routed batch. This is the path used
    /// both for points this node owns directly and for points a peer handed
    /// off to it.
    pub fn ingest(&self, mut batch: Batch) -> Result<usize> {
        let dropped = sanitize_batch(&mut batch.points);
        if dropped > 0 {
            metrics::counter!("ms_storage_sanitizer_dropped_total").increment(dropped as u64);
        }
        let kept = batch.points.len();
        self.shards.append(batch.points)?;
        Ok(kept)
    }

    /// Persist a batch the caller has already sanitized (the internode
    /// listener's path: peers only ever forward batches their own ingress
    /// sanitizer already cleaned). Skips re-running the sanitizer.
    pub fn ingest_presanitized(&self, batch: Batch) -> Result<usize> {
        batch.assert_sanitized();
        let kept = batch.points.len();
        self.shards.append(batch.points)?;
        Ok(kept)
    }

    pub fn ingest_point(&self, mut point: Point) -> Result<bool> {
        if !sanitize(&mut point) {
            metrics::counter!("ms_storage_sanitizer_dropped_total").increment(1);
            return Ok(false);
        }
        self.shards.append(vec![point])?;
        Ok(true)
    }

    /// Drop shards that have fully aged out of the retention window as of
    /// `now_ns`. Intended to be called periodically by a background task.
    pub fn prune(&self, now_ns: i64) -> Result<usize> {
        let pruned = self.shards.prune(now_ns, self.retention_ns)?;
        if pruned > 0 {
            metrics::counter!("ms_storage_pruned_shards_total").increment(pruned as u64);
            debug!(pruned, "pruned expired shards");
        }
        Ok(pruned)
    }

    fn series(&self, matchers: &[Matcher]) -> Result<Vec<Series>> {
        let points = self.shards.all_points()?;
        let mut by_key: std::collections::BTreeMap<Vec<(String, String)>, Series> = std::collections::BTreeMap::new();
        for point in points {
            if !series::point_matches(&point, matchers)? {
                continue;
            }
            let mut labels = point.labels.clone();
            labels.insert("__name__".to_string(), point.name.clone());
            let key: Vec<(String, String)> = labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let entry = by_key.entry(key).or_insert_with(|| Series {
                labels,
                samples: Vec::new(),
            });
            entry.samples.push((point.timestamp_ns, point.value));
        }
        let mut out: Vec<Series> = by_key.into_values().collect();
        for series in &mut out {
            series.samples.sort_unstable_by_key(|(ts, _)| *ts);
        }
        Ok(out)
    }
}

impl Querier for LocalStore {
    fn select(&self, matchers: &[Matcher]) -> Result<Vec<Series>> {
        self.series(matchers)
    }

    fn label_names(&self) -> Result<Vec<String>> {
        let points = self.shards.all_points()?;
        let mut names = std::collections::BTreeSet::new();
        names.insert("__name__".to_string());
        for point in &points {
            names.extend(point.labels.keys().cloned());
        }
        Ok(names.into_iter().collect())
    }

    fn label_values(&self, name: &str) -> Result<Vec<String>> {
        let points = self.shards.all_points()?;
        let mut values = std::collections::BTreeSet::new();
        for point in &points {
            if name == "__name__" {
                values.insert(point.name.clone());
            } else if let Some(v) = point.labels.get(name) {
                values.insert(v.clone());
            }
        }
        Ok(values.into_iter().collect())
    }
}

pub struct LocalAppender {
    store: Arc<LocalStore>,
    pending: Batch,
}

impl LocalAppender {
    pub fn new(store: Arc<LocalStore>) -> Self {
        LocalAppender {
            store,
            pending: Batch::new(),
        }
    }
}

impl series::Appender for LocalAppender {
    fn add(&mut self, point: Point) -> Result<()> {
        self.pending.push(point);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.pending);
        if !batch.is_empty() {
            self.store.ingest(batch)?;
        }
        Ok(())
    }
}

/// Run `store.prune` on a fixed interval until the process shuts down,
/// reporting its own progress through `tracing` and `metrics` rather than a
/// return value.
pub async fn run_retention_pruner(store: Arc<LocalStore>, interval: Duration, now_ns: impl Fn() -> i64 + Send + 'static) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match store.prune(now_ns()) {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, "retention pruner ran"),
            Err(err) => tracing::error!(%err, "retention pruner failed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use series::Appender as _;

    fn ns(seconds: i64) -> i64 {
        seconds * 1_000_000_000
    }

    #[test]
    fn ingest_sanitizes_and_is_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), DEFAULT_RETENTION_NS).unwrap();
        let mut batch = Batch::new();
        batch.push(Point::new("http.requests", ns(1), 1.0).with_label("code", "200"));
        batch.push(Point::new("bad", ns(1), f64::NAN));
        let kept = store.ingest(batch).unwrap();
        assert_eq!(kept, 1);

        let series = store.select(&[Matcher::equal("__name__", "http_requests")]).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].samples, vec![(ns(1), 1.0)]);
    }

    #[test]
    fn appender_buffers_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path(), DEFAULT_RETENTION_NS).unwrap());
        let mut appender = LocalAppender::new(Arc::clone(&store));
        appender.add(Point::new("m", ns(1), 1.0)).unwrap();
        assert!(store.select(&[Matcher::equal("__name__", "m")]).unwrap().is_empty());
        appender.commit().unwrap();
        assert_eq!(store.select(&[Matcher::equal("__name__", "m")]).unwrap().len(), 1);
    }

    #[test]
    fn retention_hides_points_older_than_window_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path(), ns(24 * 60 * 60)).unwrap();
            let mut batch = Batch::new();
            batch.push(Point::new("old", ns(0), 1.0));
            batch.push(Point::new("fresh", ns(30 * 24 * 60 * 60), 1.0));
            store.ingest(batch).unwrap();
        }
        let store = LocalStore::open(dir.path(), ns(24 * 60 * 60)).unwrap();
        let pruned = store.prune(ns(30 * 24 * 60 * 60)).unwrap();
        assert!(pruned > 0);
        assert!(store.select(&[Matcher::equal("__name__", "old")]).unwrap().is_empty());
        assert_eq!(store.select(&[Matcher::equal("__name__", "fresh")]).unwrap().len(), 1);
    }

    #[test]
    fn label_names_and_values_cover_dunder_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), DEFAULT_RETENTION_NS).unwrap();
        let mut batch = Batch::new();
        batch.push(Point::new("m", ns(1), 1.0).with_label("env", "prod"));
        store.ingest(batch).unwrap();
        let names = store.label_names().unwrap();
        assert!(names.contains(&"__name__".to_string()));
        assert!(names.contains(&"env".to_string()));
        assert_eq!(store.label_values("__name__").unwrap(), vec!["m".to_string()]);
    }
}
