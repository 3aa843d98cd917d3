//! Rack endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::db::racks;
use crate::error::{ApiError, ApiResult};
use crate::services::rack_parser::rack_result;
use crate::services::RackResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ParseRackRequest {
    pub modulargrid_url: Option<String>,
}

/// POST /api/parse-rack
pub async fn parse_rack(
    State(state): State<AppState>,
    payload: Result<Json<ParseRackRequest>, JsonRejection>,
) -> ApiResult<Json<RackResult>> {
    let Json(request) = payload?;
    let url = request
        .modulargrid_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing modulargrid_url parameter".to_string()))?;

    let result = state.rack_parser.parse_rack_url(&state.db, url.trim()).await?;
    info!(
        rack_id = result.rack_id,
        modules = result.modules.len(),
        cached = result.cached,
        provenance = %result.provenance,
        "Rack parse complete"
    );
    Ok(Json(result))
}

/// GET /api/racks
pub async fn list_racks(State(state): State<AppState>) -> ApiResult<Json<Vec<RackResult>>> {
    let mut conn = state.db.acquire().await?;
    let stored = racks::list_racks(&mut conn).await?;

    let mut results = Vec::with_capacity(stored.len());
    for rack in stored {
        results.push(rack_result(&mut conn, rack, true).await?);
    }
    Ok(Json(results))
}

/// GET /api/racks/:id
pub async fn get_rack(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<RackResult>> {
    let mut conn = state.db.acquire().await?;
    let rack = racks::get_rack(&mut conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Rack with ID {} not found", id)))?;

    Ok(Json(rack_result(&mut conn, rack, true).await?))
}

/// Build rack routes
pub fn rack_routes() -> Router<AppState> {
    Router::new()
        .route("/api/parse-rack", post(parse_rack))
        .route("/api/racks", get(list_racks))
        .route("/api/racks/:id", get(get_rack))
}
