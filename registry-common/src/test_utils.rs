use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::pipeline::{PipelineKey, SourceMetric};
use crate::runtime::{ClientError, MetricsClient, RuntimeClient};

fn unavailable(url: &str) -> ClientError {
    ClientError::UnexpectedStatus {
        url: url.to_owned(),
        status: StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRuntimeCall {
    RefreshSources(PipelineKey),
    TerminateWorkers(PipelineKey, String),
    WorkerActive(PipelineKey, String),
}

/// A `RuntimeClient` recording its calls. Clones share the recorded calls.
#[derive(Clone, Default)]
pub struct MockRuntimeClient {
    fail_refresh: bool,
    fail_terminate: bool,
    fail_worker_active: bool,
    worker_active_ret: bool,
    delay: Option<time::Duration>,
    calls: Arc<Mutex<Vec<MockRuntimeCall>>>,
}

impl MockRuntimeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_refresh(&mut self) -> Self {
        self.fail_refresh = true;
        self.clone()
    }

    pub fn fail_terminate(&mut self) -> Self {
        self.fail_terminate = true;
        self.clone()
    }

    pub fn fail_worker_active(&mut self) -> Self {
        self.fail_worker_active = true;
        self.clone()
    }

    pub fn worker_active_ret(&mut self, active: bool) -> Self {
        self.worker_active_ret = active;
        self.clone()
    }

    /// Make every call take `delay` before answering.
    pub fn delay(&mut self, delay: time::Duration) -> Self {
        self.delay = Some(delay);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRuntimeCall> {
        lock(&self.calls).clone()
    }

    async fn record(&self, call: MockRuntimeCall) {
        lock(&self.calls).push(call);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RuntimeClient for MockRuntimeClient {
    async fn refresh_sources(&self, pipeline: &PipelineKey) -> Result<(), ClientError> {
        self.record(MockRuntimeCall::RefreshSources(pipeline.clone()))
            .await;

        match self.fail_refresh {
            true => Err(unavailable("mock://refresh")),
            false => Ok(()),
        }
    }

    async fn terminate_workers(
        &self,
        pipeline: &PipelineKey,
        label_selector: &str,
    ) -> Result<(), ClientError> {
        self.record(MockRuntimeCall::TerminateWorkers(
            pipeline.clone(),
            label_selector.to_owned(),
        ))
        .await;

        match self.fail_terminate {
            true => Err(unavailable("mock://workers")),
            false => Ok(()),
        }
    }

    async fn worker_active(
        &self,
        pipeline: &PipelineKey,
        label_selector: &str,
    ) -> Result<bool, ClientError> {
        self.record(MockRuntimeCall::WorkerActive(
            pipeline.clone(),
            label_selector.to_owned(),
        ))
        .await;

        match self.fail_worker_active {
            true => Err(unavailable("mock://workers")),
            false => Ok(self.worker_active_ret),
        }
    }
}

/// A `MetricsClient` answering from a fixed table. Unknown sources have no metrics.
#[derive(Clone, Default)]
pub struct MockMetricsClient {
    metrics_ret: HashMap<String, Vec<SourceMetric>>,
    fail: bool,
}

impl MockMetricsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics_ret(&mut self, source_id: &str, metrics: Vec<SourceMetric>) -> Self {
        self.metrics_ret.insert(source_id.to_owned(), metrics);
        self.clone()
    }

    pub fn fail(&mut self) -> Self {
        self.fail = true;
        self.clone()
    }
}

#[async_trait]
impl MetricsClient for MockMetricsClient {
    async fn extract_source_metrics(&self, source_id: &str) -> Result<Vec<SourceMetric>, ClientError> {
        if self.fail {
            return Err(unavailable("mock://metrics"));
        }

        Ok(self.metrics_ret.get(source_id).cloned().unwrap_or_default())
    }
}
