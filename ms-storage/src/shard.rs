//! A minimal on-disk time-partitioned store standing in for the embedded
//! TSDB, treated as an opaque black box behind `Appender` and `Querier`.
//! Samples are grouped into fixed-width time buckets ("shards");
//! each shard is one file, rewritten atomically (write-temp-then-rename, the
//! same discipline the rule manager uses for its YAML files). This is enough
//! to make retention pruning and restart-durability real, observable
//! behaviors without pulling in a full columnar engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use ms_base::Result;
use ms_net::Point;

/// One hour per shard: coarse enough that a day of retention spans ~24
/// shards, fine enough that pruning has observable granularity in tests.
pub const SHARD_WIDTH_NS: i64 = 60 * 60 * 1_000_000_000;

fn bucket_of(timestamp_ns: i64) -> i64 {
    timestamp_ns.div_euclid(SHARD_WIDTH_NS)
}

fn shard_end_ns(bucket: i64) -> i64 {
    bucket * SHARD_WIDTH_NS + SHARD_WIDTH_NS - 1
}

fn shard_path(dir: &Path, bucket: i64) -> PathBuf {
    dir.join(format!("shard-{bucket:020}.msgpack"))
}

#[derive(Serialize, Deserialize, Default)]
struct ShardFile {
    points: Vec<Point>,
}

/// Known shards, keyed by bucket id, so pruning doesn't need to read every
/// shard file's contents to know its time range.
pub struct ShardIndex {
    dir: PathBuf,
    buckets: Mutex<BTreeMap<i64, ()>>,
}

impl ShardIndex {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut buckets = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(bucket) = parse_shard_filename(&entry.file_name().to_string_lossy()) {
                buckets.insert(bucket, ());
            }
        }
        Ok(Arc::new(ShardIndex {
            dir,
            buckets: Mutex::new(buckets),
        }))
    }

    pub fn append(&self, points: Vec<Point>) -> Result<()> {
        let mut by_bucket: BTreeMap<i64, Vec<Point>> = BTreeMap::new();
        for p in points {
            by_bucket.entry(bucket_of(p.timestamp_ns)).or_default().push(p);
        }
        for (bucket, mut new_points) in by_bucket {
            let path = shard_path(&self.dir, bucket);
            let mut existing = if path.exists() {
                let bytes = fs::read(&path)?;
                rmp_serde::from_slice::<ShardFile>(&bytes).unwrap_or_default().points
            } else {
                Vec::new()
            };
            existing.append(&mut new_points);
            let tmp = path.with_extension("msgpack.tmp");
            fs::write(&tmp, rmp_serde::to_vec(&ShardFile { points: existing })?)?;
            fs::rename(&tmp, &path)?;
            self.buckets.lock().unwrap().insert(bucket, ());
        }
        Ok(())
    }

    pub fn all_points(&self) -> Result<Vec<Point>> {
        let buckets: Vec<i64> = self.buckets.lock().unwrap().keys().copied().collect();
        let mut out = Vec::new();
        for bucket in buckets {
            let path = shard_path(&self.dir, bucket);
            if let Ok(bytes) = fs::read(&path) {
                if let Ok(shard) = rmp_serde::from_slice::<ShardFile>(&bytes) {
                    out.extend(shard.points);
                }
            }
        }
        Ok(out)
    }

    /// Drop every shard whose time range ends before `now_ns - retention_ns`.
    /// Returns the number of shards dropped.
    pub fn prune(&self, now_ns: i64, retention_ns: i64) -> Result<usize> {
        let cutoff = now_ns - retention_ns;
        let expired: Vec<i64> = self
            .buckets
            .lock()
            .unwrap()
            .keys()
            .copied()
            .filter(|&b| shard_end_ns(b) < cutoff)
            .collect();
        let mut pruned = 0;
        for bucket in expired {
            let path = shard_path(&self.dir, bucket);
            if path.exists() {
                fs::remove_file(&path)?;
            }
            self.buckets.lock().unwrap().remove(&bucket);
            pruned += 1;
        }
        Ok(pruned)
    }
}

fn parse_shard_filename(name: &str) -> Option<i64> {
    let rest = name.strip_prefix("shard-")?.strip_suffix(".msgpack")?;
    rest.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bucket_math_is_consistent() {
        let b = bucket_of(SHARD_WIDTH_NS * 3 + 5);
        assert_eq!(b, 3);
        assert!(shard_end_ns(b) >= SHARD_WIDTH_NS * 3 + 5);
    }

    #[test]
    fn append_and_prune_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let idx = ShardIndex::open(dir.path()).unwrap();
        idx.append(vec![Point::new("m", 10, 1.0)]).unwrap();
        assert_eq!(idx.all_points().unwrap().len(), 1);

        let pruned = idx.prune(SHARD_WIDTH_NS * 1000, SHARD_WIDTH_NS).unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(idx.all_points().unwrap().len(), 0);
    }

    #[test]
    fn reopening_index_rediscovers_shards_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let idx = ShardIndex::open(dir.path()).unwrap();
            idx.append(vec![Point::new("m", 10, 1.0)]).unwrap();
        }
        let idx = ShardIndex::open(dir.path()).unwrap();
        assert_eq!(idx.all_points().unwrap().len(), 1);
    }
}
