//! The two TCP listeners every node runs: ingress (clients, needs the
//! sanitizer and the replicated appender) and internode (peers, already
//! sanitized, writes straight to the Local Store).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ms_net::{codec, recv_batch, INGRESS_MAX_FRAME_BYTES, INTERNODE_MAX_FRAME_BYTES};
use ms_handoff::HandoffHub;
use ms_replicate::ReplicatedAppender;
use ms_route::ClusterConfig;
use ms_storage::{sanitize_batch, LocalStore};

pub async fn run_ingress_listener(
    addr: SocketAddr,
    tls_acceptor: TlsAcceptor,
    internode_tls: TlsConnector,
    cluster: ClusterConfig,
    local: Arc<LocalStore>,
    handoff: Arc<HandoffHub>,
    send_timeout: Duration,
    shutdown: CancellationToken,
) -> ms_base::Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| ms_base::fatal(format!("binding ingress listener on {addr}: {e}")))?;
    info!(%addr, "ingress listener started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("ingress listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (tcp, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => { warn!(%err, "ingress accept failed"); continue; }
                };
                let tls_acceptor = tls_acceptor.clone();
                let internode_tls = internode_tls.clone();
                let cluster = cluster.clone();
                let local = local.clone();
                let handoff = handoff.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_ingress_connection(tcp, tls_acceptor, internode_tls, cluster, local, handoff, send_timeout).await {
                        warn!(%peer_addr, %err, "ingress connection ended with error");
                    }
                });
            }
        }
    }
}

async fn serve_ingress_connection(
    tcp: tokio::net::TcpStream,
    tls_acceptor: TlsAcceptor,
    internode_tls: TlsConnector,
    cluster: ClusterConfig,
    local: Arc<LocalStore>,
    handoff: Arc<HandoffHub>,
    send_timeout: Duration,
) -> ms_base::Result<()> {
    let stream = tls_acceptor
        .accept(tcp)
        .await
        .map_err(|e| ms_base::transport(format!("ingress TLS handshake failed: {e}")))?;
    let mut framed = Framed::new(stream, codec(INGRESS_MAX_FRAME_BYTES));
    while let Some(mut batch) = recv_batch(&mut framed).await? {
        let dropped = sanitize_batch(&mut batch.points);
        if dropped > 0 {
            metrics::counter!("ms_ingress_sanitizer_dropped_total").increment(dropped as u64);
        }
        let mut appender = ReplicatedAppender::new(cluster.clone(), local.clone(), handoff.clone(), internode_tls.clone(), send_timeout);
        let count = batch.points.len() as u64;
        for point in batch.points {
            if let Err(err) = appender.add(point) {
                warn!(%err, "dropping one point from ingress batch");
            }
        }
        if let Err(err) = appender.commit().await {
            error!(%err, "ingress batch commit failed");
            return Err(err);
        }
        metrics::counter!("ms_ingress_points_total").increment(count);
    }
    Ok(())
}

pub async fn run_internode_listener(
    addr: SocketAddr,
    tls_acceptor: TlsAcceptor,
    local: Arc<LocalStore>,
    shutdown: CancellationToken,
) -> ms_base::Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| ms_base::fatal(format!("binding internode listener on {addr}: {e}")))?;
    info!(%addr, "internode listener started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("internode listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (tcp, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => { warn!(%err, "internode accept failed"); continue; }
                };
                let tls_acceptor = tls_acceptor.clone();
                let local = local.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_internode_connection(tcp, tls_acceptor, local).await {
                        warn!(%peer_addr, %err, "internode connection ended with error");
                    }
                });
            }
        }
    }
}

async fn serve_internode_connection(tcp: tokio::net::TcpStream, tls_acceptor: TlsAcceptor, local: Arc<LocalStore>) -> ms_base::Result<()> {
    let stream = tls_acceptor
        .accept(tcp)
        .await
        .map_err(|e| ms_base::transport(format!("internode TLS handshake failed: {e}")))?;
    let mut framed = Framed::new(stream, codec(INTERNODE_MAX_FRAME_BYTES));
    while let Some(batch) = recv_batch(&mut framed).await? {
        let count = local.ingest_presanitized(batch)?;
        metrics::counter!("ms_internode_points_total").increment(count as u64);
    }
    Ok(())
}

/// The `/metrics` scrape endpoint, mTLS like every other listener. Deliberately
/// doesn't parse the request: a scraper always sends a bare `GET /metrics`
/// with no body, and the response is the same rendered snapshot regardless.
pub async fn run_metrics_listener(
    addr: SocketAddr,
    tls_acceptor: TlsAcceptor,
    metrics_handle: PrometheusHandle,
    shutdown: CancellationToken,
) -> ms_base::Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| ms_base::fatal(format!("binding metrics listener on {addr}: {e}")))?;
    info!(%addr, "metrics listener started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("metrics listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (tcp, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => { warn!(%err, "metrics accept failed"); continue; }
                };
                let tls_acceptor = tls_acceptor.clone();
                let metrics_handle = metrics_handle.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_metrics_connection(tcp, tls_acceptor, metrics_handle).await {
                        warn!(%peer_addr, %err, "metrics connection ended with error");
                    }
                });
            }
        }
    }
}

async fn serve_metrics_connection(tcp: tokio::net::TcpStream, tls_acceptor: TlsAcceptor, metrics_handle: PrometheusHandle) -> ms_base::Result<()> {
    let mut stream = tls_acceptor
        .accept(tcp)
        .await
        .map_err(|e| ms_base::transport(format!("metrics TLS handshake failed: {e}")))?;
    let mut discard = [0u8; 1024];
    let _ = stream.read(&mut discard).await;
    let body = metrics_handle.render();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
