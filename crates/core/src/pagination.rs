use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;
use crate::value::{null_as_default, Row};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 1_000;

/// Keeps a configured limit inside the range the backend honours.
#[must_use]
pub fn clamp_limit(limit: u32) -> u32 {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        DEFAULT_PAGE_LIMIT
    } else {
        limit
    }
}

/// Last page that can hold rows; page 1 when the table is empty.
#[must_use]
pub fn last_page(total: u64, limit: u32) -> u32 {
    if limit == 0 || total == 0 {
        return 1;
    }
    let pages = total.div_ceil(u64::from(limit));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[must_use]
pub fn clamp_page(page: u32, total: u64, limit: u32) -> u32 {
    page.clamp(1, last_page(total, limit))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub table: String,
    pub page: u32,
    pub limit: u32,
}

/// One bounded slice of a table plus the metadata needed to navigate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageWindow {
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub page: u32,
}

impl PageWindow {
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.page) * u64::from(self.limit) < self.total
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn next_page(&self) -> Option<u32> {
        self.has_next().then(|| self.page + 1)
    }

    #[must_use]
    pub fn previous_page(&self) -> Option<u32> {
        self.has_previous().then(|| self.page - 1)
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        last_page(self.total, self.limit)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to load page {page} of `{table}`: {source}")]
    Backend {
        table: String,
        page: u32,
        #[source]
        source: ApiError,
    },
    #[error("row {row} of `{table}` has {actual} values but {expected} columns were returned")]
    Misaligned {
        table: String,
        row: usize,
        expected: usize,
        actual: usize,
    },
}

impl FetchError {
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Backend { source, .. } => Some(source),
            Self::Misaligned { .. } => None,
        }
    }
}

#[async_trait]
pub trait PageBackend: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageWindow, ApiError>;
}

/// Loads page windows. It never stores a window; the caller decides whether
/// a fetched window replaces the one it is showing.
#[derive(Debug, Clone)]
pub struct PageFetcher<B: PageBackend> {
    backend: B,
    limit: u32,
}

impl<B: PageBackend> PageFetcher<B> {
    #[must_use]
    pub fn new(backend: B, limit: u32) -> Self {
        Self {
            backend,
            limit: clamp_limit(limit),
        }
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn load_page(&self, table: &str, page: u32) -> Result<PageWindow, FetchError> {
        let request = PageRequest {
            table: table.to_string(),
            page: page.max(1),
            limit: self.limit,
        };
        log::debug!(
            "fetching page {} of `{}` (limit {})",
            request.page,
            request.table,
            request.limit
        );

        let mut window =
            self.backend
                .fetch_page(&request)
                .await
                .map_err(|source| FetchError::Backend {
                    table: request.table.clone(),
                    page: request.page,
                    source,
                })?;

        // The backend echoes page/limit only sometimes; the request is authoritative.
        window.page = request.page;
        if window.limit == 0 {
            window.limit = request.limit;
        }

        if !window.columns.is_empty() {
            let expected = window.columns.len();
            if let Some((row, values)) = window
                .rows
                .iter()
                .enumerate()
                .find(|(_, values)| values.len() != expected)
            {
                return Err(FetchError::Misaligned {
                    table: request.table,
                    row,
                    expected,
                    actual: values.len(),
                });
            }
        }

        Ok(window)
    }
}
