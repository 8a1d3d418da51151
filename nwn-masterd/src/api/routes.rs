use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use master_shared::protocol;
use master_shared::types::{GameServer, Heartbeat};
use crate::query::MasterServerApi;
use crate::registry::{hash, IngestOutcome, Registry, StatsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductQuery {
    pub product: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameQuery {
    pub product: String,
    pub server_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressQuery {
    pub product: String,
    pub server_address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeartbeatResponse {
    pub outcome: IngestOutcome,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(protocol::LOOKUP_SERVER_BY_NAME, get(lookup_server_by_name))
        .route(protocol::LOOKUP_SERVER_BY_ADDRESS, get(lookup_server_by_address))
        .route(protocol::GET_ONLINE_SERVER_LIST, get(get_online_server_list))
        .route(protocol::GET_ONLINE_SERVER_LIST_HASH, get(get_online_server_list_hash))
        .route(protocol::HEARTBEAT, post(heartbeat))
        .route(protocol::STATS, get(get_stats))
        .with_state(state)
}

async fn lookup_server_by_name(
    State(state): State<AppState>,
    Query(params): Query<NameQuery>,
) -> Json<Vec<GameServer>> {
    Json(state.registry.lookup_server_by_name(&params.product, &params.server_name))
}

async fn lookup_server_by_address(
    State(state): State<AppState>,
    Query(params): Query<AddressQuery>,
) -> Result<Json<GameServer>, StatusCode> {
    state
        .registry
        .lookup_server_by_address(&params.product, &params.server_address)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_online_server_list(
    State(state): State<AppState>,
    Query(params): Query<ProductQuery>,
) -> Json<Vec<GameServer>> {
    Json(state.registry.get_online_server_list(&params.product))
}

async fn get_online_server_list_hash(
    State(state): State<AppState>,
    Query(params): Query<ProductQuery>,
) -> String {
    hash::compute_hash(&state.registry.get_online_server_list(&params.product))
}

async fn heartbeat(
    State(state): State<AppState>,
    payload: Result<Json<Heartbeat>, JsonRejection>,
) -> Result<Json<HeartbeatResponse>, (StatusCode, String)> {
    // Missing fields are as malformed as a bad address
    let Json(heartbeat) = payload.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;

    state
        .registry
        .ingest(heartbeat, Utc::now())
        .map(|outcome| Json(HeartbeatResponse { outcome }))
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.registry.stats())
}
