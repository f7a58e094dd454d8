//! Handlers for both the public (`/api/v1`, `/rules`) and private
//! (`/private/api/v1`, `/private/rules`) surfaces. Selector syntax is
//! deliberately just a metric name -- evaluating PromQL expressions is an
//! external engine's job, so these endpoints expose the one selector shape
//! the Replicated Querier actually supports: strict equality on `__name__`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use ms_rules::{validate_manager_id, AlertmanagerConfig, CreateOutcome, MutateOutcome, RuleGroup};
use ms_storage::{Matcher, Querier, Series};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NameParam {
    name: String,
}

fn name_matcher(name: &str) -> Vec<Matcher> {
    vec![Matcher::equal("__name__", name)]
}

fn ok_series(series: Vec<Series>) -> Json<Value> {
    Json(json!({ "status": "success", "data": { "result": series } }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": state.version,
        "sha": option_env!("MS_BUILD_SHA").unwrap_or("unknown"),
    }))
}

pub async fn query(State(state): State<AppState>, Query(params): Query<NameParam>) -> Result<Json<Value>, ApiError> {
    let series = state.replicated_querier.select(&name_matcher(&params.name)).await?;
    Ok(ok_series(series))
}

pub async fn query_range(State(state): State<AppState>, Query(params): Query<NameParam>) -> Result<Json<Value>, ApiError> {
    let series = state.replicated_querier.select(&name_matcher(&params.name)).await?;
    Ok(ok_series(series))
}

pub async fn series(State(state): State<AppState>, Query(params): Query<NameParam>) -> Result<Json<Value>, ApiError> {
    let series = state.replicated_querier.select(&name_matcher(&params.name)).await?;
    let labels: Vec<_> = series.into_iter().map(|s| s.labels).collect();
    Ok(Json(json!({ "status": "success", "data": labels })))
}

pub async fn labels(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let names = state.replicated_querier.label_names().await?;
    Ok(Json(json!({ "status": "success", "data": names })))
}

pub async fn label_values(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let values = state.replicated_querier.label_values(&name).await?;
    Ok(Json(json!({ "status": "success", "data": values })))
}

pub async fn rules(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut groups = Vec::new();
    for id in state.replicated_rules.list_managers().await? {
        groups.extend(state.replicated_rules.list_rule_groups(&id).await.unwrap_or_default());
    }
    Ok(Json(json!({ "status": "success", "data": { "groups": groups } })))
}

pub async fn alertmanagers(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut urls = Vec::new();
    for id in state.replicated_rules.list_managers().await? {
        if let Ok(cfg) = state.replicated_rules.list_alertmanagers(&id).await {
            urls.extend(cfg.urls);
        }
    }
    Ok(Json(json!({ "status": "success", "data": { "activeAlertmanagers": urls } })))
}

#[derive(Deserialize)]
pub struct CreateManagerBody {
    id: String,
    alertmanager: AlertmanagerConfig,
}

pub async fn create_manager(
    State(state): State<AppState>,
    Json(body): Json<CreateManagerBody>,
) -> Result<StatusCode, ApiError> {
    validate_manager_id(&body.id)?;
    match state.replicated_rules.create_manager(&body.id, body.alertmanager).await? {
        CreateOutcome::Created => Ok(StatusCode::CREATED),
        CreateOutcome::Conflict => Ok(StatusCode::CONFLICT),
    }
}

pub async fn upsert_rule_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(group): Json<RuleGroup>,
) -> Result<StatusCode, ApiError> {
    match state.replicated_rules.upsert_rule_group(&id, group).await? {
        MutateOutcome::Ok => Ok(StatusCode::OK),
        MutateOutcome::NotFound => Ok(StatusCode::NOT_FOUND),
    }
}

pub async fn delete_manager(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    match state.replicated_rules.delete_manager(&id).await? {
        MutateOutcome::Ok => Ok(StatusCode::OK),
        MutateOutcome::NotFound => Ok(StatusCode::NOT_FOUND),
    }
}

// --- /private/api/v1 --- backed directly by the Local Store, used by peers
// so a sub-query never triggers another round of replication.

pub async fn private_select(
    State(state): State<AppState>,
    Json(matchers): Json<Vec<Matcher>>,
) -> Result<Json<Vec<Series>>, ApiError> {
    Ok(Json(state.local_store.select(&matchers)?))
}

pub async fn private_labels(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.local_store.label_names()?))
}

pub async fn private_label_values(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.local_store.label_values(&name)?))
}

// --- /private/rules --- backed directly by the Local Rule Manager.

pub async fn private_create_manager(
    State(state): State<AppState>,
    Json(body): Json<CreateManagerBody>,
) -> Result<StatusCode, ApiError> {
    validate_manager_id(&body.id)?;
    match state.local_rules.create_manager(&body.id, body.alertmanager)? {
        CreateOutcome::Created => Ok(StatusCode::CREATED),
        CreateOutcome::Conflict => Ok(StatusCode::CONFLICT),
    }
}

pub async fn private_upsert_rule_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(group): Json<RuleGroup>,
) -> Result<StatusCode, ApiError> {
    match state.local_rules.upsert_rule_group(&id, group)? {
        MutateOutcome::Ok => Ok(StatusCode::OK),
        MutateOutcome::NotFound => Ok(StatusCode::NOT_FOUND),
    }
}

pub async fn private_delete_manager(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    match state.local_rules.delete_manager(&id)? {
        MutateOutcome::Ok => Ok(StatusCode::OK),
        MutateOutcome::NotFound => Ok(StatusCode::NOT_FOUND),
    }
}

pub async fn private_list_managers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.local_rules.list_managers())
}

pub async fn private_list_rule_groups(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RuleGroup>>, ApiError> {
    Ok(Json(state.local_rules.list_rule_groups(&id)?))
}

pub async fn private_list_alertmanagers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AlertmanagerConfig>, ApiError> {
    Ok(Json(state.local_rules.list_alertmanagers(&id)?))
}
