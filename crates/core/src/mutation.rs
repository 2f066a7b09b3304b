use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Map;
use thiserror::Error;

use crate::catalog::ColumnDescriptor;
use crate::error::ApiError;
use crate::row_identity::{resolve_primary_key, IdentityError, PrimaryKey};
use crate::value::CellValue;

/// Column values being composed for an insert or update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditDraft {
    values: BTreeMap<String, CellValue>,
}

impl EditDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a draft from a row, pairing values with columns by position.
    #[must_use]
    pub fn from_row(row: &[CellValue], columns: &[ColumnDescriptor]) -> Self {
        let values = columns
            .iter()
            .zip(row)
            .map(|(column, value)| (column.name.clone(), value.clone()))
            .collect();
        Self { values }
    }

    pub fn set(&mut self, column: impl Into<String>, value: CellValue) {
        self.values.insert(column.into(), value);
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }
}

pub type RowPayload = Map<String, CellValue>;

fn is_omitted(value: Option<&CellValue>) -> bool {
    match value {
        None => true,
        Some(CellValue::String(text)) => text.is_empty(),
        Some(_) => false,
    }
}

/// Insert body: schema columns with a non-empty draft value.
/// Missing and empty-string values are both left out so the backend applies
/// its defaults.
#[must_use]
pub fn insert_payload(draft: &EditDraft, columns: &[ColumnDescriptor]) -> RowPayload {
    columns
        .iter()
        .filter_map(|column| {
            let value = draft.get(&column.name);
            if is_omitted(value) {
                return None;
            }
            value.map(|value| (column.name.clone(), value.clone()))
        })
        .collect()
}

/// Update body: every draft value except the key column, which identifies
/// the row and is never rewritten through this path.
#[must_use]
pub fn update_payload(draft: &EditDraft, key: &PrimaryKey) -> RowPayload {
    draft
        .values
        .iter()
        .filter(|(column, _)| **column != key.column)
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl MutationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("failed to {} row in `{table}`: {source}", .kind.as_str())]
    Rejected {
        kind: MutationKind,
        table: String,
        #[source]
        source: ApiError,
    },
}

impl MutationError {
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Rejected { source, .. } => Some(source),
            Self::Identity(_) => None,
        }
    }
}

#[async_trait]
pub trait MutationBackend: Send + Sync {
    async fn insert_row(&self, table: &str, values: &RowPayload) -> Result<(), ApiError>;
    async fn update_row(
        &self,
        table: &str,
        key: &PrimaryKey,
        values: &RowPayload,
    ) -> Result<(), ApiError>;
    async fn delete_row(&self, table: &str, key: &PrimaryKey) -> Result<(), ApiError>;
}

/// Issues one row operation per call. Identity is resolved before any
/// request is made; local state reconciliation is left to the caller.
#[derive(Debug, Clone)]
pub struct MutationCoordinator<B: MutationBackend> {
    backend: B,
}

impl<B: MutationBackend> MutationCoordinator<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn insert(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        draft: &EditDraft,
    ) -> Result<RowPayload, MutationError> {
        let payload = insert_payload(draft, columns);
        log::info!(
            "inserting row into `{table}` ({} of {} columns set)",
            payload.len(),
            columns.len()
        );
        self.backend
            .insert_row(table, &payload)
            .await
            .map_err(|source| rejected(MutationKind::Insert, table, source))?;
        Ok(payload)
    }

    pub async fn update(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        row: &[CellValue],
        draft: &EditDraft,
    ) -> Result<PrimaryKey, MutationError> {
        let key = resolve_primary_key(row, columns)?;
        let payload = update_payload(draft, &key);
        log::info!("updating `{table}` row {key}");
        self.backend
            .update_row(table, &key, &payload)
            .await
            .map_err(|source| rejected(MutationKind::Update, table, source))?;
        Ok(key)
    }

    pub async fn delete(&self, table: &str, key: &PrimaryKey) -> Result<(), MutationError> {
        log::info!("deleting `{table}` row {key}");
        self.backend
            .delete_row(table, key)
            .await
            .map_err(|source| rejected(MutationKind::Delete, table, source))
    }
}

fn rejected(kind: MutationKind, table: &str, source: ApiError) -> MutationError {
    log::warn!("{} on `{table}` failed: {source}", kind.as_str());
    MutationError::Rejected {
        kind,
        table: table.to_string(),
        source,
    }
}
