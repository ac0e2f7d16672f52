//! # Store
//!
//! Storage of pipeline aggregates. A pipeline is stored as one document alongside an
//! opaque version token; every write replaces the whole document and only succeeds if
//! the caller presents the version it read.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::document::PipelineDocument;
use crate::pipeline::PipelineKey;

/// Opaque version token of a stored pipeline document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(String);

impl Version {
    pub fn new(token: &str) -> Self {
        Self(token.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for Version {
    fn from(version: i64) -> Self {
        Self(version.to_string())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enumeration of errors for operations against the registry store.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("pipeline {0} not found")]
    NotFound(PipelineKey),
    #[error("pipeline {0} already exists")]
    AlreadyExists(PipelineKey),
    #[error("pipeline {key} was modified concurrently, version {expected} is stale")]
    Conflict { key: PipelineKey, expected: Version },
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("pipeline document could not be encoded or decoded: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("{0} is not a valid version token")]
    InvalidVersion(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait RegistryStore {
    /// Fetch a pipeline document together with its current version.
    async fn get(&self, key: &PipelineKey) -> StoreResult<(PipelineDocument, Version)>;

    /// Replace a pipeline document, provided it is still at `version`.
    /// Returns the new version.
    async fn update(
        &self,
        key: &PipelineKey,
        document: &PipelineDocument,
        version: &Version,
    ) -> StoreResult<Version>;

    /// Store an empty document for a new pipeline.
    async fn create(&self, key: &PipelineKey) -> StoreResult<Version>;

    async fn delete(&self, key: &PipelineKey) -> StoreResult<()>;
}

/// A store keeping pipelines in process memory. Versions are counters.
#[derive(Clone, Default)]
pub struct MemoryRegistryStore {
    pipelines: Arc<RwLock<HashMap<PipelineKey, (PipelineDocument, i64)>>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn get(&self, key: &PipelineKey) -> StoreResult<(PipelineDocument, Version)> {
        let pipelines = self.pipelines.read().await;

        match pipelines.get(key) {
            Some((document, version)) => Ok((document.clone(), Version::from(*version))),
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    async fn update(
        &self,
        key: &PipelineKey,
        document: &PipelineDocument,
        version: &Version,
    ) -> StoreResult<Version> {
        let mut pipelines = self.pipelines.write().await;

        let (stored, current) = pipelines
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        if Version::from(*current) != *version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected: version.clone(),
            });
        }

        *stored = document.clone();
        *current += 1;

        Ok(Version::from(*current))
    }

    async fn create(&self, key: &PipelineKey) -> StoreResult<Version> {
        let mut pipelines = self.pipelines.write().await;

        if pipelines.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.clone()));
        }
        pipelines.insert(key.clone(), (PipelineDocument::default(), 1));

        Ok(Version::from(1))
    }

    async fn delete(&self, key: &PipelineKey) -> StoreResult<()> {
        let mut pipelines = self.pipelines.write().await;

        match pipelines.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.clone())),
        }
    }
}
