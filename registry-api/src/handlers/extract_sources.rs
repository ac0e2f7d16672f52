use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_derive::Deserialize;

use registry_common::pipeline::{ExtractSource, ExtractSourceDetail};
use registry_common::registry::{DeleteMode, MutationOutcome};

use super::app::{request_context, AppState, EntityPath, PipelinePath};
use super::error::ApiError;

#[derive(Deserialize, Debug)]
pub struct DeleteParams {
    /// Also delete the rules and extensions bound to the source.
    #[serde(default)]
    cascade: bool,
}

pub async fn create(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
    payload: Result<Json<ExtractSource>, JsonRejection>,
) -> Result<(StatusCode, Json<MutationOutcome>), ApiError> {
    let Path(path) = path?;
    let Json(source) = payload?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    let outcome = state.registry.create_extract_source(&ctx, source).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list(
    State(state): State<AppState>,
    path: Result<Path<PipelinePath>, PathRejection>,
) -> Result<Json<Vec<ExtractSource>>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.list_extract_sources(&ctx).await?))
}

pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
) -> Result<Json<ExtractSourceDetail>, ApiError> {
    let Path(path) = path?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(state.registry.get_extract_source(&ctx, &path.id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
    payload: Result<Json<ExtractSource>, JsonRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Path(path) = path?;
    let Json(source) = payload?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);

    Ok(Json(
        state
            .registry
            .update_extract_source(&ctx, &path.id, source)
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<EntityPath>, PathRejection>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> Result<Json<MutationOutcome>, ApiError> {
    let Path(path) = path?;
    let Query(params) = params?;
    let (ctx, _guard) = request_context(&path.namespace, &path.name);
    let mode = match params.cascade {
        true => DeleteMode::Cascade,
        false => DeleteMode::Orphan,
    };

    Ok(Json(
        state
            .registry
            .delete_extract_source(&ctx, &path.id, mode)
            .await?,
    ))
}
