//! The remote half of the peer capabilities `ms-replicate` and `ms-rules`
//! need: an HTTP client that talks to another node's `/private/...` surface.
//! This is the one place in the workspace that turns a peer index into an
//! actual address and makes a network call on behalf of the replicated
//! querier / rule manager.

use async_trait::async_trait;
use serde_json::json;

use ms_base::{transport, Result};
use ms_replicate::PeerQuerier;
use ms_rules::{AlertmanagerConfig, CreateOutcome, MutateOutcome, PeerRuleClient, RuleGroup};
use ms_storage::{Matcher, Series};

pub struct HttpPeerClient {
    http: reqwest::Client,
    /// `http_addrs[i]` is the base URL (e.g. `https://peer-1:9443`) of node
    /// `i`'s HTTP API, indexed the same way `ClusterConfig` indexes nodes.
    http_addrs: Vec<String>,
}

impl HttpPeerClient {
    pub fn new(http: reqwest::Client, http_addrs: Vec<String>) -> Self {
        HttpPeerClient { http, http_addrs }
    }

    fn base(&self, peer: usize) -> Result<&str> {
        self.http_addrs
            .get(peer)
            .map(String::as_str)
            .ok_or_else(|| transport(format!("no HTTP address configured for peer {peer}")))
    }
}

#[async_trait]
impl PeerQuerier for HttpPeerClient {
    async fn select(&self, peer: usize, matchers: &[Matcher]) -> Result<Vec<Series>> {
        let url = format!("{}/private/api/v1/select", self.base(peer)?);
        self.http
            .post(url)
            .json(&matchers)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} select failed: {e}")))?
            .json::<Vec<Series>>()
            .await
            .map_err(|e| transport(format!("peer {peer} select decode failed: {e}")))
    }

    async fn label_names(&self, peer: usize) -> Result<Vec<String>> {
        let url = format!("{}/private/api/v1/labels", self.base(peer)?);
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} label_names failed: {e}")))?
            .json::<Vec<String>>()
            .await
            .map_err(|e| transport(format!("peer {peer} label_names decode failed: {e}")))
    }

    async fn label_values(&self, peer: usize, name: &str) -> Result<Vec<String>> {
        let url = format!("{}/private/api/v1/label/{name}/values", self.base(peer)?);
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} label_values failed: {e}")))?
            .json::<Vec<String>>()
            .await
            .map_err(|e| transport(format!("peer {peer} label_values decode failed: {e}")))
    }
}

#[async_trait]
impl PeerRuleClient for HttpPeerClient {
    async fn create_manager(&self, peer: usize, id: &str, alertmanager: AlertmanagerConfig) -> Result<CreateOutcome> {
        let url = format!("{}/private/rules/manager", self.base(peer)?);
        let resp = self
            .http
            .post(url)
            .json(&json!({ "id": id, "alertmanager": alertmanager }))
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} create_manager failed: {e}")))?;
        match resp.status().as_u16() {
            201 => Ok(CreateOutcome::Created),
            409 => Ok(CreateOutcome::Conflict),
            code => Err(transport(format!("peer {peer} create_manager returned unexpected status {code}"))),
        }
    }

    async fn upsert_rule_group(&self, peer: usize, id: &str, group: RuleGroup) -> Result<MutateOutcome> {
        let url = format!("{}/private/rules/manager/{id}/group", self.base(peer)?);
        let resp = self
            .http
            .put(url)
            .json(&group)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} upsert_rule_group failed: {e}")))?;
        match resp.status().as_u16() {
            200 => Ok(MutateOutcome::Ok),
            404 => Ok(MutateOutcome::NotFound),
            code => Err(transport(format!("peer {peer} upsert_rule_group returned unexpected status {code}"))),
        }
    }

    async fn delete_manager(&self, peer: usize, id: &str) -> Result<MutateOutcome> {
        let url = format!("{}/private/rules/manager/{id}", self.base(peer)?);
        let resp = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} delete_manager failed: {e}")))?;
        match resp.status().as_u16() {
            200 => Ok(MutateOutcome::Ok),
            404 => Ok(MutateOutcome::NotFound),
            code => Err(transport(format!("peer {peer} delete_manager returned unexpected status {code}"))),
        }
    }

    async fn list_managers(&self, peer: usize) -> Result<Vec<String>> {
        let url = format!("{}/private/rules/managers", self.base(peer)?);
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} list_managers failed: {e}")))?
            .json::<Vec<String>>()
            .await
            .map_err(|e| transport(format!("peer {peer} list_managers decode failed: {e}")))
    }

    async fn list_rule_groups(&self, peer: usize, id: &str) -> Result<Vec<RuleGroup>> {
        let url = format!("{}/private/rules/manager/{id}/group", self.base(peer)?);
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} list_rule_groups failed: {e}")))?
            .json::<Vec<RuleGroup>>()
            .await
            .map_err(|e| transport(format!("peer {peer} list_rule_groups decode failed: {e}")))
    }

    async fn list_alertmanagers(&self, peer: usize, id: &str) -> Result<AlertmanagerConfig> {
        let url = format!("{}/private/rules/manager/{id}/alertmanagers", self.base(peer)?);
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| transport(format!("peer {peer} list_alertmanagers failed: {e}")))?
            .json::<AlertmanagerConfig>()
            .await
            .map_err(|e| transport(format!("peer {peer} list_alertmanagers decode failed: {e}")))
    }
}
