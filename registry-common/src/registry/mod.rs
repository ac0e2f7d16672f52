//! # Registry
//!
//! CRUD operations over the entities of a pipeline aggregate.
//!
//! Every mutation is a read-modify-write of the whole aggregate: the document is read
//! with its version, changed in memory, and written back on the condition that the
//! version did not move. A conflicting write re-reads and re-applies the change, with
//! validation re-run against the fresh document, up to the attempts allowed by the
//! `RetryPolicy`.
use std::sync::Arc;
use std::time;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::call::{bounded, CallError};
use crate::document::PipelineDocument;
use crate::notifier::{ChangeNotifier, SideEffectError};
use crate::path::PathError;
use crate::pipeline::{Pipeline, PipelineKey};
use crate::retry::RetryPolicy;
use crate::runtime::{MetricsClient, RuntimeClient};
use crate::store::{RegistryStore, StoreError, Version};

mod extensions;
mod extract_rules;
mod extract_sources;
mod transform_functions;

pub use extract_sources::DeleteMode;

/// Tagged error taxonomy of registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    DependencyFailure(String),
    #[error("{0}")]
    Internal(String),
}

impl RegistryError {
    pub(crate) fn missing_field(field: &str) -> Self {
        RegistryError::Validation(format!("{} is required", field))
    }

    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        RegistryError::NotFound {
            kind,
            id: id.to_owned(),
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => RegistryError::NotFound {
                kind: "pipeline",
                id: key.to_string(),
            },
            StoreError::AlreadyExists(_) | StoreError::Conflict { .. } => {
                RegistryError::Conflict(err.to_string())
            }
            StoreError::ConnectionError { .. } | StoreError::QueryError { .. } => {
                RegistryError::DependencyFailure(err.to_string())
            }
            StoreError::SerializationError(_) | StoreError::InvalidVersion(_) => {
                RegistryError::Internal(err.to_string())
            }
        }
    }
}

impl From<CallError<StoreError>> for RegistryError {
    fn from(err: CallError<StoreError>) -> Self {
        match err {
            CallError::Failed(err) => err.into(),
            CallError::TimedOut(_) | CallError::Cancelled => {
                RegistryError::DependencyFailure(format!("store call {}", err))
            }
        }
    }
}

impl From<PathError> for RegistryError {
    fn from(err: PathError) -> Self {
        RegistryError::Validation(err.to_string())
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result of a committed mutation. Side effects that failed after the commit are
/// listed next to the id; the configuration change itself is stored either way.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub side_effect_errors: Vec<SideEffectError>,
}

impl MutationOutcome {
    fn committed(id: String) -> Self {
        Self {
            id,
            side_effect_errors: Vec::new(),
        }
    }
}

/// Pipeline addressed by a request, and the token cancelled when the request is abandoned.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub pipeline: PipelineKey,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(pipeline: PipelineKey, cancel: CancellationToken) -> Self {
        Self { pipeline, cancel }
    }
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub retry_policy: RetryPolicy,
    /// Deadline applied to every call to the store and the external collaborators.
    pub call_timeout: time::Duration,
    /// Require `transformFunctionName` of rules to name an existing transform function.
    pub enforce_transform_function_refs: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            call_timeout: time::Duration::from_secs(5),
            enforce_transform_function_refs: false,
        }
    }
}

pub struct Registry {
    store: Arc<dyn RegistryStore + Send + Sync>,
    runtime: Arc<dyn RuntimeClient + Send + Sync>,
    metrics: Option<Arc<dyn MetricsClient + Send + Sync>>,
    notifier: ChangeNotifier,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(
        store: Arc<dyn RegistryStore + Send + Sync>,
        runtime: Arc<dyn RuntimeClient + Send + Sync>,
        metrics: Option<Arc<dyn MetricsClient + Send + Sync>>,
        config: RegistryConfig,
    ) -> Self {
        let notifier = ChangeNotifier::new(runtime.clone(), config.call_timeout);

        Self {
            store,
            runtime,
            metrics,
            notifier,
            config,
        }
    }

    /// Read the current document of the addressed pipeline.
    async fn load(&self, ctx: &RequestContext) -> RegistryResult<(PipelineDocument, Version)> {
        let loaded = bounded(
            &ctx.cancel,
            self.config.call_timeout,
            self.store.get(&ctx.pipeline),
        )
        .await?;

        Ok(loaded)
    }

    /// Apply `change` to the addressed pipeline with optimistic concurrency.
    ///
    /// `change` may run more than once, each time against a freshly read document.
    /// Errors it returns abort the mutation without writing.
    async fn mutate<T, F>(
        &self,
        ctx: &RequestContext,
        entity: &'static str,
        op: &'static str,
        mut change: F,
    ) -> RegistryResult<T>
    where
        F: FnMut(&mut PipelineDocument) -> RegistryResult<T> + Send,
        T: Send,
    {
        let policy = &self.config.retry_policy;
        let mut attempt: u32 = 1;

        loop {
            let (mut document, version) = self.load(ctx).await?;

            let output = change(&mut document).map_err(|err| {
                debug!(pipeline = %ctx.pipeline, entity, op, "rejected mutation: {}", err);
                err
            })?;

            let written = bounded(
                &ctx.cancel,
                self.config.call_timeout,
                self.store.update(&ctx.pipeline, &document, &version),
            )
            .await;

            match written {
                Ok(_) => {
                    metrics::counter!("registry_mutations_total", "entity" => entity, "op" => op)
                        .increment(1);
                    return Ok(output);
                }
                Err(CallError::Failed(StoreError::Conflict { .. })) if policy.should_retry(attempt) => {
                    metrics::counter!("registry_store_conflicts_total").increment(1);
                    let interval = policy.retry_interval(attempt);
                    warn!(
                        pipeline = %ctx.pipeline,
                        entity,
                        op,
                        attempt,
                        "conflicting write, retrying in {:?}",
                        interval
                    );

                    tokio::select! {
                        _ = ctx.cancel.cancelled() => return Err(CallError::<StoreError>::Cancelled.into()),
                        _ = tokio::time::sleep(interval) => {}
                    }
                    attempt += 1;
                }
                Err(CallError::Failed(StoreError::Conflict { .. })) => {
                    metrics::counter!("registry_store_conflicts_total").increment(1);
                    return Err(RegistryError::Conflict(format!(
                        "pipeline {} kept changing, gave up after {} attempts",
                        ctx.pipeline, attempt
                    )));
                }
                Err(err @ (CallError::TimedOut(_) | CallError::Cancelled)) => {
                    if self.write_landed(ctx, &document).await {
                        debug!(pipeline = %ctx.pipeline, entity, op, "write {} but was committed", err);
                        metrics::counter!("registry_mutations_total", "entity" => entity, "op" => op)
                            .increment(1);
                        return Ok(output);
                    }

                    metrics::counter!("registry_unknown_write_outcomes_total").increment(1);
                    warn!(
                        pipeline = %ctx.pipeline,
                        entity,
                        op,
                        "write {}, outcome unknown",
                        err
                    );
                    return Err(RegistryError::DependencyFailure(format!(
                        "store call {}, the change may or may not have been applied",
                        err
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// After an update whose result was lost, read the pipeline once more and report
    /// whether it holds exactly the document we tried to write. The read ignores the
    /// request token, which may be the reason the result was lost.
    async fn write_landed(&self, ctx: &RequestContext, written: &PipelineDocument) -> bool {
        let reread = bounded(
            &CancellationToken::new(),
            self.config.call_timeout,
            self.store.get(&ctx.pipeline),
        )
        .await;

        match reread {
            Ok((stored, _)) => &stored == written,
            Err(err) => {
                warn!(pipeline = %ctx.pipeline, "could not re-read after a lost write: {}", err);
                false
            }
        }
    }

    /// Store an empty aggregate for a new pipeline.
    pub async fn create_pipeline(&self, ctx: &RequestContext) -> RegistryResult<Pipeline> {
        let version = bounded(
            &ctx.cancel,
            self.config.call_timeout,
            self.store.create(&ctx.pipeline),
        )
        .await?;

        Ok(PipelineDocument::default().into_pipeline(&ctx.pipeline, &version))
    }

    pub async fn get_pipeline(&self, ctx: &RequestContext) -> RegistryResult<Pipeline> {
        let (document, version) = self.load(ctx).await?;

        Ok(document.into_pipeline(&ctx.pipeline, &version))
    }

    /// Remove the aggregate and every entity in it.
    pub async fn delete_pipeline(&self, ctx: &RequestContext) -> RegistryResult<()> {
        bounded(
            &ctx.cancel,
            self.config.call_timeout,
            self.store.delete(&ctx.pipeline),
        )
        .await?;

        Ok(())
    }
}

pub(crate) fn require(field: &str, value: &str) -> RegistryResult<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::missing_field(field));
    }

    Ok(())
}
