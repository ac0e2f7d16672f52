use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use registry_common::pipeline::TransformFunction;
use registry_common::registry::MutationOutcome;

use super::app::{request_context, AppState, EntityPath, PipelinePath};
use super::error::ApiError;

pub async fn create(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
    payload: Result<Json<TransformFunction>, JsonRejection>,
) -> Result<(StatusCode, Json<MutationOutcome>), ApiError> {
    let Path(path) = path?;
    let Json(function) = payload?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    let outcome = state.registry.create_transform_function(&ctx, function).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
) -> Result<Json<Vec<TransformFunction>>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.list_transform_functions(&ctx).await?))
}

pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
) -> Result<Json<TransformFunction>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.get_transform_function(&ctx, &path.id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
    payload: Result<Json<TransformFunction>, JsonRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Path(path) = path?;
    let Json(function) = payload?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(
        state
            .registry
            .update_transform_function(&ctx, &path.id, function)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.delete_transform_function(&ctx, &path.id).await?))
}
