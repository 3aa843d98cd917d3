//! Module endpoints: catalog, detail refresh, manual and forum knowledge

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use europatch_common::db::{Module, ModuleConnection, ModuleControl};
use serde::{Deserialize, Serialize};

use crate::db::modules;
use crate::error::{ApiError, ApiResult};
use crate::services::knowledge::{ForumView, ManualView};
use crate::services::rack_parser::ModuleRefresh;
use crate::services::ForumKind;
use crate::AppState;

/// Module with its jacks and controls
#[derive(Debug, Serialize)]
pub struct ModuleDetail {
    #[serde(flatten)]
    pub module: Module,
    pub connections: Vec<ModuleConnection>,
    pub controls: Vec<ModuleControl>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ManualQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForumQuery {
    #[serde(default)]
    pub source_type: ForumKind,
    #[serde(default)]
    pub force_refresh: bool,
}

/// GET /api/modules
pub async fn list_modules(State(state): State<AppState>) -> ApiResult<Json<Vec<Module>>> {
    let mut conn = state.db.acquire().await?;
    Ok(Json(modules::list_modules(&mut conn).await?))
}

/// GET /api/modules/:id
pub async fn get_module(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<ModuleDetail>> {
    let mut conn = state.db.acquire().await?;
    let module = modules::get_module(&mut conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Module with ID {} not found", id)))?;
    let connections = modules::connections_for_module(&mut conn, id).await?;
    let controls = modules::controls_for_module(&mut conn, id).await?;

    Ok(Json(ModuleDetail {
        module,
        connections,
        controls,
    }))
}

/// POST /api/modules/:id/refresh
///
/// Re-scrapes the module's detail page. The row is only updated when the
/// page yielded real data.
pub async fn refresh_module(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<ModuleRefresh>> {
    let refreshed = state.rack_parser.refresh_module(&state.db, id).await?;
    Ok(Json(refreshed))
}

/// GET /api/modules/:id/manual
pub async fn get_manual(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ManualQuery>,
) -> ApiResult<Json<ManualView>> {
    let manual = state.knowledge.manual(&state.db, id, query.force_refresh).await?;
    Ok(Json(manual))
}

/// GET /api/modules/:id/forum-data
pub async fn get_forum_data(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ForumQuery>,
) -> ApiResult<Json<ForumView>> {
    let forum = state
        .knowledge
        .forum_data(&state.db, id, query.source_type, query.force_refresh)
        .await?;
    Ok(Json(forum))
}

/// Build module routes
pub fn module_routes() -> Router<AppState> {
    Router::new()
        .route("/api/modules", get(list_modules))
        .route("/api/modules/:id", get(get_module))
        .route("/api/modules/:id/refresh", post(refresh_module))
        .route("/api/modules/:id/manual", get(get_manual))
        .route("/api/modules/:id/forum-data", get(get_forum_data))
}
