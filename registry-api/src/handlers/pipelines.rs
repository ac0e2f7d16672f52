use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use registry_common::pipeline::Pipeline;

use super::app::{request_context, AppState, PipelinePath};
use super::error::ApiError;

pub async fn create(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
) -> Result<(StatusCode, Json<Pipeline>), ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    let pipeline = state.registry.create_pipeline(&ctx).await?;

    Ok((StatusCode::CREATED, Json(pipeline)))
}

pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
) -> Result<Json<Pipeline>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.get_pipeline(&ctx).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    state.registry.delete_pipeline(&ctx).await?;

    Ok(StatusCode::NO_CONTENT)
}
