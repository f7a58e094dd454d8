//! The replicated querier: fans `select`/label queries out to whichever
//! shard owns a given metric name, keeping the local/remote split behind the
//! `PeerQuerier` capability so this crate never has to import the HTTP
//! client or router directly (see the store/querier cycle design note).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use ms_base::{validation, Result};
use ms_route::ClusterConfig;
use ms_storage::{MatchOp, Matcher, Querier, Series};

/// Everything the replicated querier needs from a remote peer, reached
/// through that peer's `/private/api/v1/...` surface. Implemented by
/// `ms-api` using its HTTP client; kept as a trait here so `ms-replicate`
/// never depends on the HTTP stack.
#[async_trait]
pub trait PeerQuerier: Send + Sync {
    async fn select(&self, peer: usize, matchers: &[Matcher]) -> Result<Vec<Series>>;
    async fn label_names(&self, peer: usize) -> Result<Vec<String>>;
    async fn label_values(&self, peer: usize, name: &str) -> Result<Vec<String>>;
}

pub const STRICT_EQUALITY_ERROR: &str = "only strict equality is supported for metric names";

fn metric_name(matchers: &[Matcher]) -> Result<&str> {
    match matchers {
        [one] if one.name == "__name__" && one.op == MatchOp::Equal => Ok(one.value.as_str()),
        _ => Err(validation(STRICT_EQUALITY_ERROR)),
    }
}

pub struct ReplicatedQuerier {
    cluster: ClusterConfig,
    /// `None` models a query-only node with no local storage shard; `select`
    /// must route around it rather than panic.
    local: Option<Arc<dyn Querier>>,
    peers: Arc<dyn PeerQuerier>,
    round_robin: AtomicUsize,
}

impl ReplicatedQuerier {
    pub fn new(cluster: ClusterConfig, local: Option<Arc<dyn Querier>>, peers: Arc<dyn PeerQuerier>) -> Self {
        ReplicatedQuerier {
            cluster,
            local,
            peers,
            round_robin: AtomicUsize::new(0),
        }
    }

    fn representative_order(&self, replicas: &[usize]) -> Vec<usize> {
        if replicas.is_empty() {
            return Vec::new();
        }
        let start = self.round_robin.fetch_add(1, Ordering::Relaxed) % replicas.len();
        let mut order = Vec::with_capacity(replicas.len());
        order.extend_from_slice(&replicas[start..]);
        order.extend_from_slice(&replicas[..start]);
        order
    }

    async fn select_from(&self, candidate: usize, matchers: &[Matcher]) -> Result<Option<Vec<Series>>> {
        if candidate == self.cluster.node_index {
            match &self.local {
                Some(local) => Ok(Some(local.select(matchers)?)),
                None => Ok(None),
            }
        } else {
            Ok(Some(self.peers.select(candidate, matchers).await?))
        }
    }

    pub async fn select(&self, matchers: &[Matcher]) -> Result<Vec<Series>> {
        let name = metric_name(matchers)?;
        let fp = ms_route::fingerprint(&[("__name__", name)]);
        let replicas = self.cluster.assign(fp);
        for candidate in self.representative_order(&replicas) {
            if let Some(series) = self.select_from(candidate, matchers).await? {
                return Ok(series);
            }
        }
        Ok(Vec::new())
    }

    pub async fn label_names(&self) -> Result<Vec<String>> {
        let mut names = std::collections::BTreeSet::new();
        for node in 0..self.cluster.cluster_size() {
            let partial = if node == self.cluster.node_index {
                match &self.local {
                    Some(local) => local.label_names()?,
                    None => continue,
                }
            } else {
                self.peers.label_names(node).await?
            };
            names.extend(partial);
        }
        Ok(names.into_iter().collect())
    }

    pub async fn label_values(&self, name: &str) -> Result<Vec<String>> {
        let mut values = std::collections::BTreeSet::new();
        for node in 0..self.cluster.cluster_size() {
            let partial = if node == self.cluster.node_index {
                match &self.local {
                    Some(local) => local.label_values(name)?,
                    None => continue,
                }
            } else {
                self.peers.label_values(node, name).await?
            };
            values.extend(partial);
        }
        Ok(values.into_iter().collect())
    }
}

/// Merge series from multiple sources by label key, in the standard
/// Prometheus k-way-merge sense: samples are combined and sorted by
/// timestamp, and when two sources report the same `(labels, ts)` pair the
/// value from whichever source was merged first wins.
pub fn merge_series(sources: Vec<Vec<Series>>) -> Vec<Series> {
    let mut by_key: std::collections::BTreeMap<Vec<(String, String)>, Series> = std::collections::BTreeMap::new();
    for series_list in sources {
        for series in series_list {
            let key = series.label_key();
            let entry = by_key.entry(key).or_insert_with(|| Series {
                labels: series.labels.clone(),
                samples: Vec::new(),
            });
            for (ts, value) in series.samples {
                if !entry.samples.iter().any(|&(existing_ts, _)| existing_ts == ts) {
                    entry.samples.push((ts, value));
                }
            }
        }
    }
    let mut out: Vec<Series> = by_key.into_values().collect();
    for series in &mut out {
        series.samples.sort_unstable_by_key(|(ts, _)| *ts);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn metric_name_requires_single_strict_equality_matcher() {
        assert!(metric_name(&[Matcher::equal("__name__", "up")]).is_ok());
        assert_eq!(
            metric_name(&[Matcher {
                name: "__name__".into(),
                op: MatchOp::Regexp,
                value: "up.*".into()
            }])
            .unwrap_err()
            .to_string(),
            STRICT_EQUALITY_ERROR
        );
        assert!(metric_name(&[]).is_err());
        assert!(metric_name(&[Matcher::equal("job", "x")]).is_err());
    }

    #[test]
    fn merge_series_dedups_by_timestamp_keeping_first_seen() {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert("__name__".to_string(), "up".to_string());
        let a = Series {
            labels: labels.clone(),
            samples: vec![(1, 10.0), (2, 20.0)],
        };
        let b = Series {
            labels: labels.clone(),
            samples: vec![(2, 999.0), (3, 30.0)],
        };
        let merged = merge_series(vec![vec![a], vec![b]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].samples, vec![(1, 10.0), (2, 20.0), (3, 30.0)]);
    }

    struct NoPeers;
    #[async_trait]
    impl PeerQuerier for NoPeers {
        async fn select(&self, _peer: usize, _matchers: &[Matcher]) -> Result<Vec<Series>> {
            Ok(Vec::new())
        }
        async fn label_names(&self, _peer: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn label_values(&self, _peer: usize, _name: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn select_with_missing_local_querier_does_not_panic() {
        let cluster = ClusterConfig::new(0, vec!["a".into()], vec!["a".into()], 1).unwrap();
        let querier = ReplicatedQuerier::new(cluster, None, Arc::new(NoPeers));
        let result = querier.select(&[Matcher::equal("__name__", "up")]).await.unwrap();
        assert!(result.is_empty());
    }
}
