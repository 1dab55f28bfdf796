use std::collections::BTreeMap;
use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::config::BridgeConfig;
use crate::registry::{HostRecord, Registry};
use shared::types::ServiceEntry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub config: Arc<BridgeConfig>,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub domain: String,
    pub types: Vec<String>,
    pub min_srv_records: usize,
    pub filter_text: String,
    pub bind_address: String,
}

#[derive(Serialize)]
pub struct ServiceSetResponse {
    pub service_type: String,
    pub count: usize,
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub fingerprint: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/config", get(get_config))
        .route("/v1/hosts", get(get_hosts))
        .route("/v1/hosts/:name", get(get_host))
        .route("/v1/services", get(get_services))
        .route("/v1/services/:service_type", get(get_service_set))
        .route("/v1/aliases", get(get_aliases))
        .route("/v1/aliases/:name", get(get_alias))
        .route("/v1/snapshot", get(get_snapshot))
        .with_state(state)
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        domain: config.domain.clone(),
        types: config.types.clone(),
        min_srv_records: config.min_srv_records,
        filter_text: config.filter_text.clone(),
        bind_address: config.bind_address.clone(),
    })
}

async fn get_hosts(State(state): State<AppState>) -> Json<BTreeMap<String, HostRecord>> {
    let snapshot = state.registry.snapshot();
    Json(
        snapshot
            .hosts()
            .map(|(name, host)| (name.to_string(), host.clone()))
            .collect(),
    )
}

async fn get_host(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<HostRecord>, StatusCode> {
    state
        .registry
        .read_host(&name.to_ascii_lowercase())
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_services(State(state): State<AppState>) -> Json<Vec<ServiceSetResponse>> {
    let snapshot = state.registry.snapshot();
    let mut sets: Vec<ServiceSetResponse> = snapshot
        .published_services()
        .map(|(service_type, entries)| ServiceSetResponse {
            service_type: service_type.to_string(),
            count: entries.len(),
        })
        .collect();
    sets.sort_by(|a, b| a.service_type.cmp(&b.service_type));
    Json(sets)
}

async fn get_service_set(
    State(state): State<AppState>,
    Path(service_type): Path<String>,
) -> Result<Json<Vec<ServiceEntry>>, StatusCode> {
    state
        .registry
        .read_services(&service_type.to_ascii_lowercase())
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_aliases(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    let snapshot = state.registry.snapshot();
    Json(
        snapshot
            .aliases()
            .map(|(alias, host)| (alias.to_string(), host.to_string()))
            .collect(),
    )
}

async fn get_alias(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, StatusCode> {
    state
        .registry
        .read_alias(&name.to_ascii_lowercase())
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_snapshot(State(state): State<AppState>) -> Json<SnapshotResponse> {
    let snapshot = state.registry.snapshot();
    Json(SnapshotResponse {
        generation: snapshot.generation(),
        refreshed_at: snapshot.refreshed_at(),
        fingerprint: snapshot.fingerprint().to_string(),
    })
}
