use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use registry_common::pipeline::ExtractRule;
use registry_common::registry::MutationOutcome;

use super::app::{request_context, AppState, EntityPath, PipelinePath};
use super::error::ApiError;

pub async fn create(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
    payload: Result<Json<ExtractRule>, JsonRejection>,
) -> Result<(StatusCode, Json<MutationOutcome>), ApiError> {
    let Path(path) = path?;
    let Json(rule) = payload?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    let outcome = state.registry.create_extract_rule(&ctx, rule).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
) -> Result<Json<Vec<ExtractRule>>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.list_extract_rules(&ctx).await?))
}

pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
) -> Result<Json<ExtractRule>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.get_extract_rule(&ctx, &path.id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
    payload: Result<Json<ExtractRule>, JsonRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Path(path) = path?;
    let Json(rule) = payload?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(
        state
            .registry
            .update_extract_rule(&ctx, &path.id, rule)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.delete_extract_rule(&ctx, &path.id).await?))
}
