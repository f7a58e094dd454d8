//! The replicated appender: the write path that turns one sanitized point
//! into however many replica writes the sharding function calls for, with a
//! durable handoff fallback when a peer can't be reached synchronously.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::TlsConnector;
use tracing::warn;

use ms_base::Result;
use ms_net::{send_to_peer, Batch, Point};
use ms_route::ClusterConfig;
use ms_storage::LocalStore;

use ms_handoff::HandoffHub;

fn host_of(addr: &str) -> &str {
    addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr)
}

/// Buffers `add`ed points by destination, then flushes on `commit`: local
/// writes go straight to the `LocalStore`, remote writes go out over the
/// internode transport or, on failure, into that peer's handoff spool.
pub struct ReplicatedAppender {
    cluster: ClusterConfig,
    local: Arc<LocalStore>,
    handoff: Arc<HandoffHub>,
    tls: TlsConnector,
    send_timeout: Duration,
    local_buf: Vec<Point>,
    remote_bufs: HashMap<usize, Batch>,
}

impl ReplicatedAppender {
    pub fn new(cluster: ClusterConfig, local: Arc<LocalStore>, handoff: Arc<HandoffHub>, tls: TlsConnector, send_timeout: Duration) -> Self {
        ReplicatedAppender {
            cluster,
            local,
            handoff,
            tls,
            send_timeout,
            local_buf: Vec::new(),
            remote_bufs: HashMap::new(),
        }
    }

    pub fn add(&mut self, point: Point) -> Result<()> {
        let replicas = self.cluster.assign(point.fingerprint());
        if self.cluster.is_local(&replicas) {
            self.local_buf.push(point.clone());
        }
        for &replica in &replicas {
            if replica != self.cluster.node_index {
                self.remote_bufs.entry(replica).or_insert_with(Batch::new).push(point.clone());
            }
        }
        Ok(())
    }

    /// Flush everything buffered since the last commit. Always succeeds once
    /// the local write lands and every remote batch is either sent or
    /// durably spooled -- a remote send failure is not a commit failure.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.local_buf.is_empty() {
            let mut batch = Batch::new();
            for point in self.local_buf.drain(..) {
                batch.push(point);
            }
            self.local.ingest(batch)?;
        }

        for (peer, batch) in self.remote_bufs.drain() {
            let addr = self.cluster.internode_addrs[peer].clone();
            let server_name = host_of(&addr).to_string();
            match send_to_peer(&addr, &self.tls, &server_name, &batch, self.send_timeout).await {
                Ok(()) => {
                    metrics::counter!("ms_replicate_distributed_points_total", "peer" => peer.to_string())
                        .increment(batch.len() as u64);
                }
                Err(err) => {
                    warn!(peer, %err, "direct send to peer failed, falling back to handoff");
                    metrics::counter!("ms_replicate_egress_points_total", "peer" => peer.to_string())
                        .increment(batch.len() as u64);
                    metrics::counter!("ms_replicate_dropped_points_total", "peer" => peer.to_string())
                        .increment(batch.len() as u64);
                    self.handoff.enqueue(peer, &batch)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn host_of_strips_port() {
        assert_eq!(host_of("peer-1:9443"), "peer-1");
        assert_eq!(host_of("peer-1"), "peer-1");
    }

    #[test]
    fn add_buffers_local_and_remote_independently() {
        let cluster = ClusterConfig::new(
            0,
            vec!["a:1".into(), "b:1".into(), "c:1".into()],
            vec!["a:2".into(), "b:2".into(), "c:2".into()],
            2,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalStore::open(dir.path(), ms_storage::DEFAULT_RETENTION_NS).unwrap());
        let handoff_dir = tempfile::tempdir().unwrap();
        let handoff = Arc::new(ms_handoff::HandoffHub::open(handoff_dir.path(), &[0, 1, 2]).unwrap());
        let tls = test_tls_connector();
        let mut appender = ReplicatedAppender::new(cluster, local, handoff, tls, Duration::from_millis(50));

        for i in 0..20 {
            appender.add(Point::new(format!("m{i}"), 0, 1.0)).unwrap();
        }
        assert!(!appender.local_buf.is_empty() || !appender.remote_bufs.is_empty());
    }

    fn test_tls_connector() -> TlsConnector {
        // A rustls ClientConfig with no trust roots never completes a real
        // handshake; that's fine for tests that only exercise buffering, not
        // `commit`'s network path.
        let roots = rustls::RootCertStore::empty();
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }
}
