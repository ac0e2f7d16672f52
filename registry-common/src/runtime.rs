//! # Runtime
//!
//! Clients for the services the registry depends on but does not own: the extraction
//! runtime that executes configured sources, and the metrics collaborator that reports
//! per-source metrics.
use std::time;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::pipeline::{PipelineKey, SourceMetric};

/// Label under which the runtime tracks the workers of an extract source.
pub const EXTRACT_SOURCE_LABEL: &str = "extractsourcename";

/// Label selector matching the runtime workers of the named extract source.
pub fn worker_label_selector(source_name: &str) -> String {
    format!("{}={}", EXTRACT_SOURCE_LABEL, source_name)
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0} cannot be used as a base url")]
    InvalidBaseUrl(String),
    #[error("request to {url} failed: {error}")]
    RequestError { url: String, error: reqwest::Error },
    #[error("{url} responded with unexpected status {status}")]
    UnexpectedStatus { url: String, status: StatusCode },
    #[error("failed to decode response from {url}: {error}")]
    DecodeError { url: String, error: reqwest::Error },
}

#[async_trait]
pub trait RuntimeClient {
    /// Ask the runtime to reload the configured sources of a pipeline.
    async fn refresh_sources(&self, pipeline: &PipelineKey) -> Result<(), ClientError>;

    /// Terminate in-flight workers matching `label_selector`.
    async fn terminate_workers(
        &self,
        pipeline: &PipelineKey,
        label_selector: &str,
    ) -> Result<(), ClientError>;

    /// Whether any worker matching `label_selector` is currently running.
    async fn worker_active(
        &self,
        pipeline: &PipelineKey,
        label_selector: &str,
    ) -> Result<bool, ClientError>;
}

#[async_trait]
pub trait MetricsClient {
    async fn extract_source_metrics(&self, source_id: &str) -> Result<Vec<SourceMetric>, ClientError>;
}

fn build_http_client(request_timeout: time::Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent("pipeline-registry")
        .timeout(request_timeout)
        .build()
}

fn endpoint(base_url: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidBaseUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

async fn send(request: reqwest::RequestBuilder, url: &Url) -> Result<reqwest::Response, ClientError> {
    let response = request
        .send()
        .await
        .map_err(|error| ClientError::RequestError {
            url: url.to_string(),
            error,
        })?;

    if !response.status().is_success() {
        return Err(ClientError::UnexpectedStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    Ok(response)
}

/// `RuntimeClient` talking HTTP to the extraction runtime service.
#[derive(Clone)]
pub struct HttpRuntimeClient {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct WorkerStatus {
    active: bool,
}

impl HttpRuntimeClient {
    pub fn new(base_url: Url, request_timeout: time::Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_http_client(request_timeout)?,
            base_url,
        })
    }

    fn workers_url(&self, pipeline: &PipelineKey, label_selector: &str) -> Result<Url, ClientError> {
        let mut url = endpoint(
            &self.base_url,
            &["pipelines", &pipeline.namespace, &pipeline.name, "workers"],
        )?;
        url.query_pairs_mut()
            .append_pair("labelSelector", label_selector);

        Ok(url)
    }
}

#[async_trait]
impl RuntimeClient for HttpRuntimeClient {
    async fn refresh_sources(&self, pipeline: &PipelineKey) -> Result<(), ClientError> {
        let url = endpoint(
            &self.base_url,
            &["pipelines", &pipeline.namespace, &pipeline.name, "refresh"],
        )?;

        send(self.client.post(url.clone()), &url).await?;

        Ok(())
    }

    async fn terminate_workers(
        &self,
        pipeline: &PipelineKey,
        label_selector: &str,
    ) -> Result<(), ClientError> {
        let url = self.workers_url(pipeline, label_selector)?;

        send(self.client.delete(url.clone()), &url).await?;

        Ok(())
    }

    async fn worker_active(
        &self,
        pipeline: &PipelineKey,
        label_selector: &str,
    ) -> Result<bool, ClientError> {
        let url = self.workers_url(pipeline, label_selector)?;

        let status: WorkerStatus = send(self.client.get(url.clone()), &url)
            .await?
            .json()
            .await
            .map_err(|error| ClientError::DecodeError {
                url: url.to_string(),
                error,
            })?;

        Ok(status.active)
    }
}

/// `MetricsClient` talking HTTP to the metrics collaborator.
#[derive(Clone)]
pub struct HttpMetricsClient {
    client: Client,
    base_url: Url,
}

impl HttpMetricsClient {
    pub fn new(base_url: Url, request_timeout: time::Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_http_client(request_timeout)?,
            base_url,
        })
    }
}

#[async_trait]
impl MetricsClient for HttpMetricsClient {
    async fn extract_source_metrics(&self, source_id: &str) -> Result<Vec<SourceMetric>, ClientError> {
        let url = endpoint(&self.base_url, &["extractsources", source_id, "metrics"])?;

        send(self.client.get(url.clone()), &url)
            .await?
            .json()
            .await
            .map_err(|error| ClientError::DecodeError {
                url: url.to_string(),
                error,
            })
    }
}
