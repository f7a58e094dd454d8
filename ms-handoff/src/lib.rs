//! The handoff layer: what a replicated appender falls back to when it can't
//! reach a peer synchronously, and the background workers that drain those
//! queues once the peer comes back.

pub mod spool;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use ms_base::Result;
use ms_net::{send_to_peer, Batch};

pub use spool::PeerSpool;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Owns one durable spool per remote peer. The replicated appender enqueues
/// into this when a direct send fails; `run_drainer` is spawned once per peer
/// at startup and runs for the lifetime of the process.
pub struct HandoffHub {
    spools: HashMap<usize, Arc<PeerSpool>>,
}

impl HandoffHub {
    pub fn open(root_dir: impl Into<PathBuf>, peer_indices: &[usize]) -> Result<Self> {
        let root_dir = root_dir.into();
        let mut spools = HashMap::new();
        for &peer in peer_indices {
            let spool = PeerSpool::open(root_dir.join(format!("peer-{peer}")))?;
            spools.insert(peer, Arc::new(spool));
        }
        Ok(HandoffHub { spools })
    }

    pub fn spool(&self, peer: usize) -> Option<Arc<PeerSpool>> {
        self.spools.get(&peer).cloned()
    }

    pub fn enqueue(&self, peer: usize, batch: &Batch) -> Result<()> {
        match self.spools.get(&peer) {
            Some(spool) => {
                metrics::counter!("ms_handoff_dropped_points_total", "peer" => peer.to_string())
                    .increment(batch.len() as u64);
                spool.enqueue(batch)
            }
            None => Err(ms_base::err(format!("no handoff spool configured for peer {peer}"))),
        }
    }
}

/// Drive one peer's drain loop forever: pop the oldest record, try to send
/// it, and on success remove it and move on immediately (no backoff while
/// the peer is healthy). On failure, back off exponentially up to
/// `MAX_BACKOFF` and retry the same record -- order must be preserved.
pub async fn run_drainer(
    peer: usize,
    spool: Arc<PeerSpool>,
    addr: String,
    tls: TlsConnector,
    tls_server_name: String,
    send_timeout: Duration,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let record = match spool.peek_oldest() {
            Ok(Some(record)) => record,
            Ok(None) => {
                backoff = INITIAL_BACKOFF;
                tokio::time::sleep(INITIAL_BACKOFF).await;
                continue;
            }
            Err(err) => {
                warn!(peer, %err, "handoff spool read failed");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };
        let (seq, batch) = record;
        match send_to_peer(&addr, &tls, &tls_server_name, &batch, send_timeout).await {
            Ok(()) => {
                if let Err(err) = spool.remove(seq) {
                    warn!(peer, %err, "failed to remove drained handoff record");
                }
                metrics::counter!("ms_handoff_egress_points_total", "peer" => peer.to_string())
                    .increment(batch.len() as u64);
                metrics::counter!("ms_handoff_distributed_points_total", "peer" => peer.to_string())
                    .increment(batch.len() as u64);
                debug!(peer, seq, "drained handoff record");
                backoff = INITIAL_BACKOFF;
            }
            Err(err) => {
                warn!(peer, %err, ?backoff, "handoff drain attempt failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hub_opens_one_spool_per_peer() {
        let dir = tempfile::tempdir().unwrap();
        let hub = HandoffHub::open(dir.path(), &[1, 2]).unwrap();
        assert!(hub.spool(1).is_some());
        assert!(hub.spool(2).is_some());
        assert!(hub.spool(3).is_none());
    }

    #[test]
    fn enqueue_to_unknown_peer_errors() {
        let dir = tempfile::tempdir().unwrap();
        let hub = HandoffHub::open(dir.path(), &[1]).unwrap();
        let batch = Batch::new();
        assert!(hub.enqueue(2, &batch).is_err());
    }

    #[test]
    fn enqueue_persists_to_peers_spool() {
        let dir = tempfile::tempdir().unwrap();
        let hub = HandoffHub::open(dir.path(), &[1]).unwrap();
        let mut batch = Batch::new();
        batch.push(ms_net::Point::new("m", 0, 1.0));
        hub.enqueue(1, &batch).unwrap();
        assert!(!hub.spool(1).unwrap().is_empty().unwrap());
    }
}
