use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;
use crate::value::{null_as_default, Row};

/// Result set of an ad-hoc query. Unrelated to any table schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<Row>,
}

impl QueryResult {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum QueryRunnerError {
    #[error("query failed: {0}")]
    Backend(#[source] ApiError),
}

impl QueryRunnerError {
    #[must_use]
    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::Backend(source) => source,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryExecution {
    pub result: QueryResult,
    pub elapsed: Duration,
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn run_query(&self, sql: &str) -> Result<QueryResult, ApiError>;
}

/// Sends operator-written query text to the backend untouched.
#[derive(Debug, Clone)]
pub struct QueryRunner<B: QueryBackend> {
    backend: B,
}

impl<B: QueryBackend> QueryRunner<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn run(&self, sql: &str) -> Result<QueryExecution, QueryRunnerError> {
        let started_at = Instant::now();
        let result = self
            .backend
            .run_query(sql)
            .await
            .map_err(QueryRunnerError::Backend)?;
        let elapsed = started_at.elapsed();
        log::info!(
            "query returned {} rows in {}ms",
            result.row_count(),
            elapsed.as_millis()
        );

        Ok(QueryExecution { result, elapsed })
    }
}
