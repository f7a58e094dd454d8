//! mTLS configuration for the three TLS domains the process uses: ingress
//! (client -> node), internode (peer -> peer, both directions), and
//! metrics/egress. Every listener in this crate requires mutual TLS -- there
//! is no plaintext mode.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use serde::{Deserialize, Serialize};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use ms_base::{fatal, Result};

/// CA + leaf certificate + private key paths for one TLS domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsDomainConfig {
    pub ca_path: String,
    pub cert_path: String,
    pub key_path: String,
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| fatal(format!("opening cert file {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| fatal(format!("parsing cert file {path}: {e}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| fatal(format!("opening key file {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| fatal(format!("parsing key file {path}: {e}")))?
        .ok_or_else(|| fatal(format!("no private key found in {path}")))
}

fn load_roots(ca_path: &str) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots
            .add(cert)
            .map_err(|e| fatal(format!("adding CA cert from {ca_path}: {e}")))?;
    }
    Ok(roots)
}

/// Build the raw server-side rustls config requiring a client certificate
/// signed by `ca_path`. Exposed separately from `server_acceptor` so callers
/// that need an `Arc<ServerConfig>` directly (e.g. `axum-server`'s rustls
/// binder) don't have to unwrap a `TlsAcceptor` to get at it.
pub fn server_rustls_config(domain: &TlsDomainConfig) -> Result<Arc<ServerConfig>> {
    let roots = load_roots(&domain.ca_path)?;
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| fatal(format!("building client cert verifier: {e}")))?;

    let certs = load_certs(&domain.cert_path)?;
    let key = load_key(&domain.key_path)?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| fatal(format!("building server TLS config: {e}")))?;

    Ok(Arc::new(config))
}

/// Build a `TlsAcceptor` that requires the peer to present a certificate
/// signed by `ca_path` -- used by both the ingress and internode listeners.
pub fn server_acceptor(domain: &TlsDomainConfig) -> Result<TlsAcceptor> {
    Ok(TlsAcceptor::from(server_rustls_config(domain)?))
}

/// Build a `TlsConnector` presenting a client certificate -- used when this
/// node dials a peer's internode listener.
pub fn client_connector(domain: &TlsDomainConfig) -> Result<TlsConnector> {
    let roots = load_roots(&domain.ca_path)?;
    let certs = load_certs(&domain.cert_path)?;
    let key = load_key(&domain.key_path)?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| fatal(format!("building client TLS config: {e}")))?;

    Ok(TlsConnector::from(Arc::new(config)))
}

pub fn server_name(host: &str) -> Result<rustls::pki_types::ServerName<'static>> {
    rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| fatal(format!("invalid TLS server name {host}: {e}")))
}
