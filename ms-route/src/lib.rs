//! Deterministic sharding. Every node in the cluster must compute the same
//! `assign` result for the same inputs without coordinating with each other --
//! this is the one function the whole replication and query fan-out design
//! rests on.

use ms_base::{validation, Result};
use serde::{Deserialize, Serialize};

/// Immutable per-process cluster configuration. Never changes once the
/// process starts (dynamic membership is a non-goal).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub node_index: usize,
    pub node_addrs: Vec<String>,
    pub internode_addrs: Vec<String>,
    pub replication_factor: usize,
}

impl ClusterConfig {
    pub fn new(
        node_index: usize,
        node_addrs: Vec<String>,
        internode_addrs: Vec<String>,
        replication_factor: usize,
    ) -> Result<Self> {
        if node_addrs.len() != internode_addrs.len() {
            return Err(validation(
                "node_addrs and internode_addrs must have equal length",
            ));
        }
        if node_index >= node_addrs.len() {
            return Err(validation("node_index out of range"));
        }
        if replication_factor == 0 || replication_factor > node_addrs.len() {
            return Err(validation(
                "replication_factor must be >= 1 and <= cluster size",
            ));
        }
        Ok(ClusterConfig {
            node_index,
            node_addrs,
            internode_addrs,
            replication_factor,
        })
    }

    pub fn cluster_size(&self) -> usize {
        self.node_addrs.len()
    }

    /// The replica set for a given fingerprint, using this cluster's size and
    /// replication factor.
    pub fn assign(&self, fingerprint: u64) -> Vec<usize> {
        assign(fingerprint, self.cluster_size(), self.replication_factor)
    }

    pub fn is_local(&self, replicas: &[usize]) -> bool {
        replicas.contains(&self.node_index)
    }
}

/// A 64-bit fingerprint over a point's canonical (sorted, including
/// `__name__`) label set. Collisions are tolerated by the store; this is
/// used only for routing.
pub fn fingerprint(sorted_labels: &[(&str, &str)]) -> u64 {
    let mut buf = Vec::new();
    for (k, v) in sorted_labels {
        buf.extend_from_slice(k.as_bytes());
        buf.push(0);
        buf.extend_from_slice(v.as_bytes());
        buf.push(0);
    }
    rapidhash::rapidhash(&buf)
}

fn hash_position(fp: u64, i: usize) -> u64 {
    let mut buf = [0_u8; 16];
    buf[..8].copy_from_slice(&fp.to_le_bytes());
    buf[8..].copy_from_slice(&(i as u64).to_le_bytes());
    rapidhash::rapidhash(&buf)
}

/// Compute the ordered list of `rf` node indices (out of `[0, n)`) responsible
/// for `fp`. Deterministic and stable across nodes: hash `(fp, i)` for every
/// candidate node `i`, sort ascending by that hash (ties broken by the lower
/// node index), and take the first `rf` entries.
///
/// This makes the result rf-monotone: `assign(fp, n, rf)` is always a prefix
/// of `assign(fp, n, rf + 1)`, because growing `rf` only reveals more of the
/// same sorted order.
pub fn assign(fp: u64, n: usize, rf: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let rf = rf.min(n);
    let mut positions: Vec<(u64, usize)> = (0..n).map(|i| (hash_position(fp, i), i)).collect();
    positions.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    positions.into_iter().take(rf).map(|(_, i)| i).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn assign_is_deterministic() {
        let a = assign(12345, 8, 3);
        let b = assign(12345, 8, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn assign_is_rf_monotone() {
        for fp in [0u64, 1, 42, u64::MAX, 0xdead_beef] {
            let mut prev = assign(fp, 10, 1);
            for rf in 2..=10 {
                let next = assign(fp, 10, rf);
                assert_eq!(&next[..prev.len()], prev.as_slice(), "fp={fp} rf={rf}");
                prev = next;
            }
        }
    }

    #[test]
    fn assign_returns_distinct_indices_in_range() {
        let replicas = assign(999, 16, 5);
        assert_eq!(replicas.len(), 5);
        let mut sorted = replicas.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert!(replicas.iter().all(|&i| i < 16));
    }

    #[test]
    fn assign_is_balanced_in_expectation() {
        let n = 8;
        let rf = 3;
        let mut counts = vec![0u64; n];
        for fp in 0..20_000u64 {
            for idx in assign(fp, n, rf) {
                counts[idx] += 1;
            }
        }
        let total: u64 = counts.iter().sum();
        let mean = total as f64 / n as f64;
        for c in counts {
            let ratio = c as f64 / mean;
            assert!((0.8..1.2).contains(&ratio), "unbalanced shard count: {c} vs mean {mean}");
        }
    }

    #[test]
    fn cluster_config_validates_inputs() {
        assert!(ClusterConfig::new(0, vec!["a".into()], vec!["a".into(), "b".into()], 1).is_err());
        assert!(ClusterConfig::new(5, vec!["a".into()], vec!["a".into()], 1).is_err());
        assert!(ClusterConfig::new(0, vec!["a".into()], vec!["a".into()], 2).is_err());
        assert!(ClusterConfig::new(0, vec!["a".into()], vec!["a".into()], 1).is_ok());
    }
}
