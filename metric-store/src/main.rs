mod listener;

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ms_admin::{cli::Command, Cli, Config, SAMPLE_CONFIG};
use ms_api::{router, AppState, HttpPeerClient};
use ms_handoff::HandoffHub;
use ms_net::tls::{client_connector, server_acceptor, server_rustls_config};
use ms_replicate::ReplicatedQuerier;
use ms_rules::{LocalRuleManager, ReplicatedRuleManager};
use ms_route::ClusterConfig;
use ms_storage::LocalStore;

/// Timeout for one internode send (appender fan-out and handoff replay).
/// Independent of `query_timeout_secs`, which bounds peer HTTP calls instead.
const INTERNODE_SEND_TIMEOUT: Duration = Duration::from_secs(5);

fn bind_addr(http_addr: &str) -> ms_base::Result<SocketAddr> {
    let uri: http::Uri = http_addr
        .parse()
        .map_err(|e| ms_base::validation(format!("invalid http address {http_addr}: {e}")))?;
    let port = uri
        .port_u16()
        .ok_or_else(|| ms_base::validation(format!("http address {http_addr} has no port")))?;
    format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e| ms_base::validation(format!("invalid bind address for {http_addr}: {e}")))
}

/// Peer HTTP calls (replicated querier fan-out, rule-manager replication)
/// land on the other node's HTTP API listener, which is mTLS like every
/// other listener in the cluster (see `server_rustls_config`'s caller in
/// `main`). Build the matching client side: present this node's own
/// `ingress_tls` certificate and trust only the operator's CA, not the
/// public webpki roots `reqwest`'s `rustls-tls` feature defaults to.
fn build_peer_http_client(ingress_tls: &ms_net::TlsDomainConfig, timeout: Duration) -> ms_base::Result<reqwest::Client> {
    let mut identity_pem = fs::read(&ingress_tls.cert_path)
        .map_err(|e| ms_base::fatal(format!("reading peer client cert {}: {e}", ingress_tls.cert_path)))?;
    identity_pem.extend_from_slice(
        &fs::read(&ingress_tls.key_path).map_err(|e| ms_base::fatal(format!("reading peer client key {}: {e}", ingress_tls.key_path)))?,
    );
    let identity = reqwest::Identity::from_pem(&identity_pem).map_err(|e| ms_base::fatal(format!("building peer client identity: {e}")))?;

    let ca_pem = fs::read(&ingress_tls.ca_path).map_err(|e| ms_base::fatal(format!("reading peer CA {}: {e}", ingress_tls.ca_path)))?;
    let ca_cert = reqwest::Certificate::from_pem(&ca_pem).map_err(|e| ms_base::fatal(format!("parsing peer CA cert: {e}")))?;

    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .identity(identity)
        .add_root_certificate(ca_cert)
        .tls_built_in_root_certs(false)
        .build()
        .map_err(|e| ms_base::fatal(format!("building HTTP client: {e}")))
}

/// A node's own listen address is often written as a hostname (`node-0:7000`)
/// so peers can resolve it; the node itself just needs the port, bound on
/// all interfaces.
fn bind_addr_for_port(label: &str, addr: &str) -> ms_base::Result<SocketAddr> {
    let (_, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ms_base::validation(format!("{label} address {addr} is missing a port")))?;
    format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e| ms_base::validation(format!("invalid {label} port in {addr}: {e}")))
}

#[tokio::main]
async fn main() -> ms_base::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::GenerateConfig) => {
            print!("{SAMPLE_CONFIG}");
            return Ok(());
        }
        Some(Command::Version) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        None => {}
    }

    ms_admin::logging::init();
    let metrics_handle = ms_admin::metrics::install()?;

    let config = Config::load(&cli.config)?;
    info!(node_index = config.node_index, cluster_size = config.node_addrs.len(), "starting metric-store");

    let cluster = ClusterConfig::new(
        config.node_index,
        config.node_addrs.clone(),
        config.internode_addrs.clone(),
        config.replication_factor,
    )?;

    let local_store = Arc::new(LocalStore::open(config.storage_path.as_str(), config.retention_ns())?);

    let local_rules = Arc::new(LocalRuleManager::new(format!("{}/rule_managers", config.storage_path))?);
    local_rules.load()?;

    let peer_indices: Vec<usize> = (0..cluster.cluster_size()).filter(|&i| i != cluster.node_index).collect();
    let handoff = Arc::new(HandoffHub::open(config.handoff_storage_path.as_str(), &peer_indices)?);

    let ingress_acceptor = server_acceptor(&config.ingress_tls)?;
    let internode_acceptor = server_acceptor(&config.internode_tls)?;
    let internode_connector = client_connector(&config.internode_tls)?;

    let http_client = build_peer_http_client(&config.ingress_tls, Duration::from_secs(config.query_timeout_secs))?;
    let peer_client = Arc::new(HttpPeerClient::new(http_client, config.http_addrs.clone()));

    let local_querier: Arc<dyn ms_storage::Querier> = local_store.clone();
    let replicated_querier = Arc::new(ReplicatedQuerier::new(cluster.clone(), Some(local_querier), peer_client.clone()));
    let replicated_rules = Arc::new(ReplicatedRuleManager::new(cluster.clone(), local_rules.clone(), peer_client.clone()));

    let app_state = AppState::new(replicated_querier, local_store.clone(), replicated_rules, local_rules.clone());
    let http_router = router(app_state);

    let shutdown = CancellationToken::new();

    // The HTTP API needs real request parsing (routes, JSON bodies), so it's
    // served through axum-server's rustls binder rather than the hand-rolled
    // loop the other mTLS listeners use.
    let http_addr = bind_addr(&config.http_addrs[config.node_index])?;
    let http_tls = RustlsConfig::from_config(server_rustls_config(&config.ingress_tls)?);
    info!(%http_addr, "HTTP API listening");
    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        axum_server::bind_rustls(http_addr, http_tls)
            .handle({
                let handle = axum_server::Handle::new();
                let shutdown_handle = handle.clone();
                tokio::spawn(async move {
                    http_shutdown.cancelled().await;
                    shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
                });
                handle
            })
            .serve(http_router.into_make_service())
            .await
    });

    let metrics_addr: SocketAddr = format!("0.0.0.0:{}", config.health_port)
        .parse()
        .map_err(|e| ms_base::fatal(format!("invalid health_port: {e}")))?;
    let metrics_acceptor = server_acceptor(&config.metrics_tls)?;
    let metrics_shutdown = shutdown.clone();
    let metrics_task = tokio::spawn(listener::run_metrics_listener(metrics_addr, metrics_acceptor, metrics_handle, metrics_shutdown));

    let ingress_addr = bind_addr_for_port("ingress", &config.node_addrs[config.node_index])?;
    let ingress_task = tokio::spawn(listener::run_ingress_listener(
        ingress_addr,
        ingress_acceptor,
        internode_connector.clone(),
        cluster.clone(),
        local_store.clone(),
        handoff.clone(),
        INTERNODE_SEND_TIMEOUT,
        shutdown.clone(),
    ));

    let internode_addr = bind_addr_for_port("internode", &config.internode_addrs[config.node_index])?;
    let internode_task = tokio::spawn(listener::run_internode_listener(internode_addr, internode_acceptor, local_store.clone(), shutdown.clone()));

    let pruner_store = local_store.clone();
    let pruner_task = tokio::spawn(ms_storage::run_retention_pruner(pruner_store, Duration::from_secs(3600), now_ns));

    let mut drain_tasks = Vec::new();
    for &peer in &peer_indices {
        let spool = handoff.spool(peer).expect("handoff spool configured for every peer");
        let addr = config.internode_addrs[peer].clone();
        let server_name = addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(&addr).to_string();
        let tls = internode_connector.clone();
        drain_tasks.push(tokio::spawn(ms_handoff::run_drainer(peer, spool, addr, tls, server_name, INTERNODE_SEND_TIMEOUT)));
    }

    tokio::signal::ctrl_c().await.map_err(|e| ms_base::fatal(format!("waiting for shutdown signal: {e}")))?;
    info!("shutdown signal received");
    shutdown.cancel();
    for task in [ingress_task, internode_task] {
        task.abort();
    }
    pruner_task.abort();
    for task in drain_tasks {
        task.abort();
    }
    if let Err(err) = http_task.await {
        error!(%err, "HTTP server task join error");
    }
    if let Err(err) = metrics_task.await {
        error!(%err, "metrics server task join error");
    }
    Ok(())
}

fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}
