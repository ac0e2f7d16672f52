use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing, Router};
use serde_derive::Deserialize;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower::limit::GlobalConcurrencyLimitLayer;

use registry_common::pipeline::PipelineKey;
use registry_common::registry::{Registry, RequestContext};

use super::{extensions, extract_rules, extract_sources, pipelines, transform_functions};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

/// `/pipelines/:namespace/:name`
#[derive(Deserialize, Debug)]
pub struct PipelinePath {
    pub namespace: String,
    pub name: String,
}

/// `/pipelines/:namespace/:name/<entities>/:id`
#[derive(Deserialize, Debug)]
pub struct EntityPath {
    pub namespace: String,
    pub name: String,
    pub id: String,
}

/// Context of a single request. The returned guard cancels the context when dropped, so
/// external calls stop once axum drops a handler whose client went away.
pub fn request_context(namespace: &str, name: &str) -> (RequestContext, DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    (
        RequestContext::new(PipelineKey::new(namespace, name), cancel),
        guard,
    )
}

pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    let registry_routes = Router::new()
        .route(
            "/pipelines/:namespace/:name",
            routing::put(pipelines::create)
                .get(pipelines::get)
                .delete(pipelines::delete),
        )
        .route(
            "/pipelines/:namespace/:name/extract-sources",
            routing::post(extract_sources::create).get(extract_sources::list),
        )
        .route(
            "/pipelines/:namespace/:name/extract-sources/:id",
            routing::get(extract_sources::get)
                .put(extract_sources::update)
                .delete(extract_sources::delete),
        )
        .route(
            "/pipelines/:namespace/:name/extract-rules",
            routing::post(extract_rules::create).get(extract_rules::list),
        )
        .route(
            "/pipelines/:namespace/:name/extract-rules/:id",
            routing::get(extract_rules::get)
                .put(extract_rules::update)
                .delete(extract_rules::delete),
        )
        .route(
            "/pipelines/:namespace/:name/extensions",
            routing::post(extensions::create).get(extensions::list),
        )
        .route(
            "/pipelines/:namespace/:name/extensions/:id",
            routing::get(extensions::get)
                .put(extensions::update)
                .delete(extensions::delete),
        )
        .route(
            "/pipelines/:namespace/:name/transform-functions",
            routing::post(transform_functions::create).get(transform_functions::list),
        )
        .route(
            "/pipelines/:namespace/:name/transform-functions/:id",
            routing::get(transform_functions::get)
                .put(transform_functions::update)
                .delete(transform_functions::delete),
        )
        .layer(GlobalConcurrencyLimitLayer::new(concurrency_limit))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state);

    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No background work to check, axum answering is enough
        .merge(registry_routes)
}

pub async fn index() -> &'static str {
    "pipeline registry"
}
