//! Process configuration, loaded from a TOML file named on the command
//! line. Every field the core needs to wire up a node lives here; nothing
//! in this crate reaches into the environment directly (the `cluster-
//! discovery` platform-inventory daemon that would normally populate one of
//! these is out of scope).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ms_base::{validation, Result};
use ms_net::TlsDomainConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub node_index: usize,
    pub node_addrs: Vec<String>,
    pub internode_addrs: Vec<String>,
    pub http_addrs: Vec<String>,
    pub replication_factor: usize,

    pub storage_path: String,
    pub handoff_storage_path: String,
    pub retention_days: u64,

    pub query_timeout_secs: u64,
    pub health_port: u16,

    /// Also secures the HTTP API listener (`http_addrs`) -- both are the
    /// client-facing surface and share one CA.
    pub ingress_tls: TlsDomainConfig,
    pub internode_tls: TlsDomainConfig,
    pub metrics_tls: TlsDomainConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text).map_err(|e| validation(format!("parsing config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.node_addrs.len() != self.internode_addrs.len() || self.node_addrs.len() != self.http_addrs.len() {
            return Err(validation("node_addrs, internode_addrs, and http_addrs must have equal length"));
        }
        if self.node_index >= self.node_addrs.len() {
            return Err(validation("node_index out of range"));
        }
        if self.replication_factor == 0 || self.replication_factor > self.node_addrs.len() {
            return Err(validation("replication_factor must be >= 1 and <= cluster size"));
        }
        Ok(())
    }

    pub fn retention_ns(&self) -> i64 {
        self.retention_days as i64 * 24 * 60 * 60 * 1_000_000_000
    }
}

pub const SAMPLE_CONFIG: &str = r#"# metric-store node configuration

node_index = 0
node_addrs = ["node-0:7000", "node-1:7000", "node-2:7000"]
internode_addrs = ["node-0:7001", "node-1:7001", "node-2:7001"]
http_addrs = ["https://node-0:7002", "https://node-1:7002", "https://node-2:7002"]
replication_factor = 2

storage_path = "/var/lib/metric-store/data"
handoff_storage_path = "/var/lib/metric-store/handoff"
retention_days = 1

query_timeout_secs = 10
health_port = 7003

[ingress_tls]
ca_path = "/etc/metric-store/tls/ingress/ca.pem"
cert_path = "/etc/metric-store/tls/ingress/cert.pem"
key_path = "/etc/metric-store/tls/ingress/key.pem"

[internode_tls]
ca_path = "/etc/metric-store/tls/internode/ca.pem"
cert_path = "/etc/metric-store/tls/internode/cert.pem"
key_path = "/etc/metric-store/tls/internode/key.pem"

[metrics_tls]
ca_path = "/etc/metric-store/tls/metrics/ca.pem"
cert_path = "/etc/metric-store/tls/metrics/cert.pem"
key_path = "/etc/metric-store/tls/metrics/key.pem"
"#;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sample_config_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE_CONFIG).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.node_index, 0);
        assert_eq!(config.replication_factor, 2);
        assert_eq!(config.retention_ns(), 24 * 60 * 60 * 1_000_000_000);
    }

    #[test]
    fn rejects_mismatched_address_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let bad = SAMPLE_CONFIG.replace(r#"node_addrs = ["node-0:7000", "node-1:7000", "node-2:7000"]"#, r#"node_addrs = ["node-0:7000"]"#);
        fs::write(&path, bad).unwrap();
        assert!(Config::load(&path).is_err());
    }
}
