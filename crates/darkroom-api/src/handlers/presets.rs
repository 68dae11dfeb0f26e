//! Preset CRUD handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use darkroom_models::{Preset, PresetMeta, PresetOperation};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListPresetsQuery {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePresetRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    pub operations: Vec<PresetOperation>,
    #[serde(default)]
    pub meta: Option<PresetMeta>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePresetRequest {
    #[serde(default)]
    pub operations: Vec<PresetOperation>,
    #[serde(default)]
    pub meta: Option<PresetMeta>,
}

/// GET /api/presets
///
/// Most recently updated first, optionally filtered by `?category=`.
pub async fn list_presets(
    State(state): State<AppState>,
    Query(query): Query<ListPresetsQuery>,
) -> ApiResult<Json<Vec<Preset>>> {
    let presets = match query.category.as_deref() {
        Some(category) => state.presets.list_by_category(category).await?,
        None => state.presets.list_presets().await?,
    };
    Ok(Json(presets))
}

/// POST /api/presets
///
/// Upserts by name; returns 201 with the stored preset.
pub async fn create_preset(
    State(state): State<AppState>,
    Json(request): Json<CreatePresetRequest>,
) -> ApiResult<(StatusCode, Json<Preset>)> {
    request.validate()?;
    let preset = state
        .presets
        .save_preset(&request.name, request.operations, request.meta)
        .await?;
    info!(preset = %preset.name, "Preset saved");
    Ok((StatusCode::CREATED, Json(preset)))
}

/// GET /api/presets/:name
pub async fn get_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Preset>> {
    state
        .presets
        .get_preset(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("preset {}", name)))
}

/// PUT /api/presets/:name
pub async fn update_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdatePresetRequest>,
) -> ApiResult<Json<Preset>> {
    let preset = state
        .presets
        .save_preset(&name, request.operations, request.meta)
        .await?;
    info!(preset = %preset.name, "Preset updated");
    Ok(Json(preset))
}

/// DELETE /api/presets/:name
pub async fn delete_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    if state.presets.delete_preset(&name).await? {
        info!(preset = %name, "Preset deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("preset {}", name)))
    }
}
