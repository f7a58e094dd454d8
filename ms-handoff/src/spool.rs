//! The durable append-only spool a replicated appender falls back to when a
//! peer can't be reached synchronously. One spool per peer, one file per
//! enqueued batch, written atomically (write-temp-then-rename, same as
//! `ms-storage`'s shards) so a crash mid-write never corrupts an existing
//! record.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ms_base::Result;
use ms_net::Batch;

fn record_path(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("record-{seq:020}.msgpack"))
}

fn parse_seq(name: &str) -> Option<u64> {
    name.strip_prefix("record-")?.strip_suffix(".msgpack")?.parse().ok()
}

/// A single peer's handoff queue on disk. Records are drained in the order
/// they were enqueued (lowest sequence number first); ordering matters
/// because replaying out of order could resurrect a value a later write
/// already superseded.
pub struct PeerSpool {
    dir: PathBuf,
    next_seq: AtomicU64,
    lock: Mutex<()>,
}

impl PeerSpool {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut max_seq = 0u64;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(seq) = parse_seq(&entry.file_name().to_string_lossy()) {
                max_seq = max_seq.max(seq + 1);
            }
        }
        Ok(PeerSpool {
            dir,
            next_seq: AtomicU64::new(max_seq),
            lock: Mutex::new(()),
        })
    }

    pub fn enqueue(&self, batch: &Batch) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let path = record_path(&self.dir, seq);
        let tmp = path.with_extension("msgpack.tmp");
        fs::write(&tmp, rmp_serde::to_vec(batch)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// The oldest undrained record, if any, along with its sequence number.
    pub fn peek_oldest(&self) -> Result<Option<(u64, Batch)>> {
        let mut seqs: Vec<u64> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| parse_seq(&e.file_name().to_string_lossy()))
            .collect();
        seqs.sort_unstable();
        let Some(seq) = seqs.into_iter().next() else {
            return Ok(None);
        };
        let bytes = fs::read(record_path(&self.dir, seq))?;
        Ok(Some((seq, rmp_serde::from_slice(&bytes)?)))
    }

    pub fn remove(&self, seq: u64) -> Result<()> {
        let path = record_path(&self.dir, seq);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(fs::read_dir(&self.dir)?.next().is_none())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ms_net::Point;

    #[test]
    fn enqueue_peek_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let spool = PeerSpool::open(dir.path()).unwrap();
        assert!(spool.is_empty().unwrap());

        let mut batch = Batch::new();
        batch.push(Point::new("m", 0, 1.0));
        spool.enqueue(&batch).unwrap();

        let (seq, read_back) = spool.peek_oldest().unwrap().unwrap();
        assert_eq!(read_back.points.len(), 1);
        spool.remove(seq).unwrap();
        assert!(spool.is_empty().unwrap());
    }

    #[test]
    fn drains_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let spool = PeerSpool::open(dir.path()).unwrap();
        for i in 0..3 {
            let mut batch = Batch::new();
            batch.push(Point::new(format!("m{i}"), 0, 1.0));
            spool.enqueue(&batch).unwrap();
        }
        let (seq0, first) = spool.peek_oldest().unwrap().unwrap();
        assert_eq!(first.points[0].name, "m0");
        spool.remove(seq0).unwrap();
        let (_, second) = spool.peek_oldest().unwrap().unwrap();
        assert_eq!(second.points[0].name, "m1");
    }

    #[test]
    fn reopening_spool_preserves_unread_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let spool = PeerSpool::open(dir.path()).unwrap();
            let mut batch = Batch::new();
            batch.push(Point::new("m", 0, 1.0));
            spool.enqueue(&batch).unwrap();
        }
        let spool = PeerSpool::open(dir.path()).unwrap();
        assert!(!spool.is_empty().unwrap());
    }
}
