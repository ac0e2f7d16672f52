//! # PgRegistryStore
//!
//! A `RegistryStore` keeping one row per pipeline in PostgreSQL. The document lives in
//! a JSONB column and the version is a counter bumped by every successful write.
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use crate::document::PipelineDocument;
use crate::pipeline::PipelineKey;
use crate::store::{RegistryStore, StoreError, StoreResult, Version};

#[derive(Clone)]
pub struct PgRegistryStore {
    pool: PgPool,
}

impl PgRegistryStore {
    /// Initialize a new PgRegistryStore connecting to the database at `url`.
    pub async fn new(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_version(version: &Version) -> StoreResult<i64> {
    version
        .as_str()
        .parse::<i64>()
        .map_err(|_| StoreError::InvalidVersion(version.to_string()))
}

#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn get(&self, key: &PipelineKey) -> StoreResult<(PipelineDocument, Version)> {
        let row: Option<(Json<PipelineDocument>, i64)> = sqlx::query_as(
            r#"
SELECT
    document, version
FROM
    pipeline_registry
WHERE
    namespace = $1 AND name = $2
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })?;

        match row {
            Some((Json(document), version)) => Ok((document, Version::from(version))),
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    async fn update(
        &self,
        key: &PipelineKey,
        document: &PipelineDocument,
        version: &Version,
    ) -> StoreResult<Version> {
        let expected = parse_version(version)?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
UPDATE
    pipeline_registry
SET
    document = $3,
    version = version + 1,
    updated_at = NOW()
WHERE
    namespace = $1 AND name = $2 AND version = $4
RETURNING
    version
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(Json(document))
        .bind(expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "UPDATE".to_owned(),
            error,
        })?;

        match updated {
            Some(version) => Ok(Version::from(version)),
            // Either the row moved on or it is gone; a fresh read tells which.
            None => Err(StoreError::Conflict {
                key: key.clone(),
                expected: version.clone(),
            }),
        }
    }

    async fn create(&self, key: &PipelineKey) -> StoreResult<Version> {
        let created: Option<i64> = sqlx::query_scalar(
            r#"
INSERT INTO pipeline_registry
    (namespace, name, document, version, created_at, updated_at)
VALUES
    ($1, $2, $3, 1, NOW(), NOW())
ON CONFLICT (namespace, name) DO NOTHING
RETURNING
    version
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(Json(PipelineDocument::default()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "INSERT".to_owned(),
            error,
        })?;

        created
            .map(Version::from)
            .ok_or_else(|| StoreError::AlreadyExists(key.clone()))
    }

    async fn delete(&self, key: &PipelineKey) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM pipeline_registry WHERE namespace = $1 AND name = $2")
            .bind(&key.namespace)
            .bind(&key.name)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "DELETE".to_owned(),
                error,
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.clone()));
        }

        Ok(())
    }
}
