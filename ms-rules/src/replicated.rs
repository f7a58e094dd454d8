//! The Replicated Rule Manager: fans each CRUD operation out to the
//! `replication_factor` nodes that own a given manager id, and aggregates
//! the per-replica outcomes into one uniform response so a client sees the
//! same result regardless of which node it happened to hit.

use std::sync::Arc;

use async_trait::async_trait;

use ms_base::Result;
use ms_route::ClusterConfig;

use crate::local::{AlertmanagerConfig, CreateOutcome, LocalRuleManager, MutateOutcome, RuleGroup};

/// The remote half of rule-manager CRUD, reached through a peer's
/// `/private/rules/...` surface. Implemented by `ms-api`'s HTTP client.
#[async_trait]
pub trait PeerRuleClient: Send + Sync {
    async fn create_manager(&self, peer: usize, id: &str, alertmanager: AlertmanagerConfig) -> Result<CreateOutcome>;
    async fn upsert_rule_group(&self, peer: usize, id: &str, group: RuleGroup) -> Result<MutateOutcome>;
    async fn delete_manager(&self, peer: usize, id: &str) -> Result<MutateOutcome>;
    async fn list_managers(&self, peer: usize) -> Result<Vec<String>>;
    async fn list_rule_groups(&self, peer: usize, id: &str) -> Result<Vec<RuleGroup>>;
    async fn list_alertmanagers(&self, peer: usize, id: &str) -> Result<AlertmanagerConfig>;
}

pub struct ReplicatedRuleManager {
    cluster: ClusterConfig,
    local: Arc<LocalRuleManager>,
    peers: Arc<dyn PeerRuleClient>,
}

impl ReplicatedRuleManager {
    pub fn new(cluster: ClusterConfig, local: Arc<LocalRuleManager>, peers: Arc<dyn PeerRuleClient>) -> Self {
        ReplicatedRuleManager { cluster, local, peers }
    }

    fn replicas(&self, id: &str) -> Vec<usize> {
        self.cluster.assign(ms_route::fingerprint(&[("id", id)]))
    }

    pub async fn create_manager(&self, id: &str, alertmanager: AlertmanagerConfig) -> Result<CreateOutcome> {
        let replicas = self.replicas(id);
        let mut any_conflict = false;
        for &replica in &replicas {
            let outcome = if replica == self.cluster.node_index {
                self.local.create_manager(id, alertmanager.clone())?
            } else {
                self.peers.create_manager(replica, id, alertmanager.clone()).await?
            };
            if outcome == CreateOutcome::Conflict {
                any_conflict = true;
            }
        }
        Ok(if any_conflict { CreateOutcome::Conflict } else { CreateOutcome::Created })
    }

    pub async fn upsert_rule_group(&self, id: &str, group: RuleGroup) -> Result<MutateOutcome> {
        let replicas = self.replicas(id);
        let mut any_not_found = false;
        for &replica in &replicas {
            let outcome = if replica == self.cluster.node_index {
                self.local.upsert_rule_group(id, group.clone())?
            } else {
                self.peers.upsert_rule_group(replica, id, group.clone()).await?
            };
            if outcome == MutateOutcome::NotFound {
                any_not_found = true;
            }
        }
        Ok(if any_not_found { MutateOutcome::NotFound } else { MutateOutcome::Ok })
    }

    pub async fn delete_manager(&self, id: &str) -> Result<MutateOutcome> {
        let replicas = self.replicas(id);
        let mut any_not_found = false;
        for &replica in &replicas {
            let outcome = if replica == self.cluster.node_index {
                self.local.delete_manager(id)?
            } else {
                self.peers.delete_manager(replica, id).await?
            };
            if outcome == MutateOutcome::NotFound {
                any_not_found = true;
            }
        }
        Ok(if any_not_found { MutateOutcome::NotFound } else { MutateOutcome::Ok })
    }

    pub async fn list_managers(&self) -> Result<Vec<String>> {
        let mut out = std::collections::BTreeSet::new();
        for node in 0..self.cluster.cluster_size() {
            let partial = if node == self.cluster.node_index {
                self.local.list_managers()
            } else {
                self.peers.list_managers(node).await?
            };
            out.extend(partial);
        }
        Ok(out.into_iter().collect())
    }

    pub async fn list_rule_groups(&self, id: &str) -> Result<Vec<RuleGroup>> {
        let replicas = self.replicas(id);
        for &replica in &replicas {
            let result = if replica == self.cluster.node_index {
                self.local.list_rule_groups(id)
            } else {
                self.peers.list_rule_groups(replica, id).await
            };
            if let Ok(groups) = result {
                return Ok(groups);
            }
        }
        Err(ms_base::not_found(format!("no rule manager {id}")))
    }

    pub async fn list_alertmanagers(&self, id: &str) -> Result<AlertmanagerConfig> {
        let replicas = self.replicas(id);
        for &replica in &replicas {
            let result = if replica == self.cluster.node_index {
                self.local.list_alertmanagers(id)
            } else {
                self.peers.list_alertmanagers(replica, id).await
            };
            if let Ok(config) = result {
                return Ok(config);
            }
        }
        Err(ms_base::not_found(format!("no rule manager {id}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct UnreachablePeers;
    #[async_trait]
    impl PeerRuleClient for UnreachablePeers {
        async fn create_manager(&self, _peer: usize, _id: &str, _alertmanager: AlertmanagerConfig) -> Result<CreateOutcome> {
            Ok(CreateOutcome::Created)
        }
        async fn upsert_rule_group(&self, _peer: usize, _id: &str, _group: RuleGroup) -> Result<MutateOutcome> {
            Ok(MutateOutcome::Ok)
        }
        async fn delete_manager(&self, _peer: usize, _id: &str) -> Result<MutateOutcome> {
            Ok(MutateOutcome::Ok)
        }
        async fn list_managers(&self, _peer: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn list_rule_groups(&self, _peer: usize, _id: &str) -> Result<Vec<RuleGroup>> {
            Ok(Vec::new())
        }
        async fn list_alertmanagers(&self, _peer: usize, _id: &str) -> Result<AlertmanagerConfig> {
            Ok(AlertmanagerConfig::default())
        }
    }

    #[tokio::test]
    async fn create_conflict_on_any_replica_reports_uniformly() {
        let cluster = ClusterConfig::new(0, vec!["a".into()], vec!["a".into()], 1).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalRuleManager::new(dir.path()).unwrap());
        local.create_manager("dup", AlertmanagerConfig::default()).unwrap();
        let replicated = ReplicatedRuleManager::new(cluster, local, Arc::new(UnreachablePeers));
        let outcome = replicated.create_manager("dup", AlertmanagerConfig::default()).await.unwrap();
        assert_eq!(outcome, CreateOutcome::Conflict);
    }

    #[tokio::test]
    async fn create_succeeds_when_no_replica_conflicts() {
        let cluster = ClusterConfig::new(0, vec!["a".into()], vec!["a".into()], 1).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalRuleManager::new(dir.path()).unwrap());
        let replicated = ReplicatedRuleManager::new(cluster, local, Arc::new(UnreachablePeers));
        let outcome = replicated.create_manager("fresh", AlertmanagerConfig::default()).await.unwrap();
        assert_eq!(outcome, CreateOutcome::Created);
    }
}
