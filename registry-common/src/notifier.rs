//! # Notifier
//!
//! Signals the extraction runtime after the extract source list of a pipeline changed.
//! Each signal is a single attempt: failures are reported back to the caller next to
//! the already committed mutation and are never retried here.
use std::fmt;
use std::sync::Arc;
use std::time;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::call::bounded;
use crate::pipeline::PipelineKey;
use crate::runtime::{worker_label_selector, RuntimeClient};

/// An external effect that follows a committed source mutation.
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    RefreshSources,
    TerminateWorkers,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SideEffect::RefreshSources => write!(f, "refresh_sources"),
            SideEffect::TerminateWorkers => write!(f, "terminate_workers"),
        }
    }
}

/// A side effect that failed after the configuration change was stored.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct SideEffectError {
    pub effect: SideEffect,
    pub detail: String,
}

#[derive(Clone)]
pub struct ChangeNotifier {
    runtime: Arc<dyn RuntimeClient + Send + Sync>,
    deadline: time::Duration,
}

impl ChangeNotifier {
    pub fn new(runtime: Arc<dyn RuntimeClient + Send + Sync>, deadline: time::Duration) -> Self {
        Self { runtime, deadline }
    }

    /// Ask the runtime to pick up the current source list.
    pub async fn sources_changed(
        &self,
        pipeline: &PipelineKey,
        cancel: &CancellationToken,
    ) -> Option<SideEffectError> {
        let result = bounded(cancel, self.deadline, self.runtime.refresh_sources(pipeline)).await;

        result
            .err()
            .map(|err| failed(pipeline, SideEffect::RefreshSources, err.to_string()))
    }

    /// Refresh the runtime and stop the in-flight workers of a removed source.
    /// Both calls are attempted regardless of each other.
    pub async fn source_removed(
        &self,
        pipeline: &PipelineKey,
        source_name: &str,
        cancel: &CancellationToken,
    ) -> Vec<SideEffectError> {
        let mut errors: Vec<SideEffectError> =
            self.sources_changed(pipeline, cancel).await.into_iter().collect();

        let selector = worker_label_selector(source_name);
        let terminated = bounded(
            cancel,
            self.deadline,
            self.runtime.terminate_workers(pipeline, &selector),
        )
        .await;

        if let Err(err) = terminated {
            errors.push(failed(pipeline, SideEffect::TerminateWorkers, err.to_string()));
        }

        errors
    }
}

fn failed(pipeline: &PipelineKey, effect: SideEffect, detail: String) -> SideEffectError {
    error!(pipeline = %pipeline, %effect, "side effect failed after commit: {}", detail);
    metrics::counter!("registry_side_effect_failures_total", "effect" => effect.to_string())
        .increment(1);

    SideEffectError { effect, detail }
}
