//! Patch idea endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use europatch_common::db::PatchIdea;
use serde::Deserialize;

use crate::db::patches::{self, PatchIdeaDetail};
use crate::error::{ApiError, ApiResult};
use crate::services::{generate_patch, ModuleSelection, PatchIdeaView};
use crate::AppState;

/// Module list entry: a bare id or an object carrying one
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ModuleRef {
    Id(i64),
    Object { id: i64 },
}

impl ModuleRef {
    pub fn id(&self) -> i64 {
        match self {
            ModuleRef::Id(id) | ModuleRef::Object { id } => *id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeneratePatchRequest {
    pub rack_id: Option<i64>,
    pub modules: Option<Vec<ModuleRef>>,
    pub prompt: Option<String>,
    pub complexity: Option<i64>,
}

impl GeneratePatchRequest {
    /// Rack wins over an explicit module list
    pub fn selection(&self) -> Result<ModuleSelection, ApiError> {
        match (self.rack_id, &self.modules) {
            (Some(rack_id), _) => Ok(ModuleSelection::Rack(rack_id)),
            (None, Some(modules)) => Ok(ModuleSelection::Modules(modules.iter().map(ModuleRef::id).collect())),
            (None, None) => Err(ApiError::BadRequest("Missing rack_id or modules parameter".to_string())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PatchIdeaQuery {
    pub patch_type: Option<String>,
    pub complexity: Option<i64>,
}

/// POST /api/generate-patch
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GeneratePatchRequest>, JsonRejection>,
) -> ApiResult<Json<PatchIdeaView>> {
    let Json(request) = payload?;
    let selection = request.selection()?;
    let prompt = request
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing prompt parameter".to_string()))?;

    let idea = generate_patch(&state.db, &selection, prompt, request.complexity).await?;
    Ok(Json(idea))
}

/// GET /api/patch-ideas
pub async fn list_patch_ideas(
    State(state): State<AppState>,
    Query(query): Query<PatchIdeaQuery>,
) -> ApiResult<Json<Vec<PatchIdea>>> {
    let mut conn = state.db.acquire().await?;
    let ideas = patches::list_patch_ideas(&mut conn, query.patch_type.as_deref(), query.complexity).await?;
    Ok(Json(ideas))
}

/// GET /api/patch-ideas/:id
pub async fn get_patch_idea(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<PatchIdeaDetail>> {
    let mut conn = state.db.acquire().await?;
    let idea = patches::get_patch_idea(&mut conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Patch idea with ID {} not found", id)))?;
    Ok(Json(idea))
}

/// Build patch idea routes
pub fn patch_routes() -> Router<AppState> {
    Router::new()
        .route("/api/generate-patch", post(generate))
        .route("/api/patch-ideas", get(list_patch_ideas))
        .route("/api/patch-ideas/:id", get(get_patch_idea))
}
