use std::sync::Arc;

use ms_replicate::ReplicatedQuerier;
use ms_rules::{LocalRuleManager, ReplicatedRuleManager};
use ms_storage::LocalStore;

#[derive(Clone)]
pub struct AppState {
    pub replicated_querier: Arc<ReplicatedQuerier>,
    pub local_store: Arc<LocalStore>,
    pub replicated_rules: Arc<ReplicatedRuleManager>,
    pub local_rules: Arc<LocalRuleManager>,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        replicated_querier: Arc<ReplicatedQuerier>,
        local_store: Arc<LocalStore>,
        replicated_rules: Arc<ReplicatedRuleManager>,
        local_rules: Arc<LocalRuleManager>,
    ) -> Self {
        AppState {
            replicated_querier,
            local_store,
            replicated_rules,
            local_rules,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
