use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the full HTTP router: the public surface goes through the
/// replicated querier and rule manager, `/private/*` goes straight to this
/// node's local store and rule manager so peer sub-queries never re-trigger
/// replication.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/query", get(handlers::query).post(handlers::query))
        .route("/api/v1/query_range", get(handlers::query_range).post(handlers::query_range))
        .route("/api/v1/series", get(handlers::series).post(handlers::series))
        .route("/api/v1/labels", get(handlers::labels))
        .route("/api/v1/label/:name/values", get(handlers::label_values))
        .route("/api/v1/rules", get(handlers::rules))
        .route("/api/v1/alertmanagers", get(handlers::alertmanagers))
        .route("/rules/manager", post(handlers::create_manager))
        .route("/rules/manager/:id/group", put(handlers::upsert_rule_group))
        .route("/rules/manager/:id", delete(handlers::delete_manager))
        .route("/private/api/v1/select", post(handlers::private_select))
        .route("/private/api/v1/labels", get(handlers::private_labels))
        .route("/private/api/v1/label/:name/values", get(handlers::private_label_values))
        .route("/private/rules/manager", post(handlers::private_create_manager))
        .route("/private/rules/manager/:id/group", put(handlers::private_upsert_rule_group).get(handlers::private_list_rule_groups))
        .route("/private/rules/manager/:id", delete(handlers::private_delete_manager))
        .route("/private/rules/manager/:id/alertmanagers", get(handlers::private_list_alertmanagers))
        .route("/private/rules/managers", get(handlers::private_list_managers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use ms_base::Result;
    use ms_replicate::{PeerQuerier, ReplicatedQuerier};
    use ms_rules::{AlertmanagerConfig, CreateOutcome, LocalRuleManager, MutateOutcome, PeerRuleClient, ReplicatedRuleManager, RuleGroup};
    use ms_route::ClusterConfig;
    use ms_storage::{LocalStore, Matcher, Series};

    use super::*;

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

    #[async_trait]
    impl PeerRuleClient for NoPeers {
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

    fn test_state() -> AppState {
        let cluster = ClusterConfig::new(0, vec!["a".into()], vec!["a".into()], 1).unwrap();
        let storage_dir = tempfile::tempdir().unwrap();
        let local_store = Arc::new(LocalStore::open(storage_dir.path(), ms_storage::DEFAULT_RETENTION_NS).unwrap());
        let rules_dir = tempfile::tempdir().unwrap();
        let local_rules = Arc::new(LocalRuleManager::new(rules_dir.path()).unwrap());
        let querier = Arc::new(ReplicatedQuerier::new(cluster.clone(), Some(local_store.clone()), Arc::new(NoPeers)));
        let rules = Arc::new(ReplicatedRuleManager::new(cluster, local_rules.clone(), Arc::new(NoPeers)));
        AppState::new(querier, local_store, rules, local_rules)
    }

    #[tokio::test]
    async fn health_returns_version() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn query_on_empty_store_returns_empty_result() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/api/v1/query?name=up").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
