use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default)]
    pub row_count: u64,
}

impl TableDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            row_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            primary_key: false,
            not_null: false,
            default_value: None,
        }
    }

    #[must_use]
    pub fn primary(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            not_null: true,
            ..Self::new(name, data_type)
        }
    }
}

/// Column metadata for one table, in the backend's ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    #[must_use]
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    #[must_use]
    pub fn is_for(&self, table: &str) -> bool {
        self.table == table
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    #[must_use]
    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|column| column.primary_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendMode {
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to list tables: {0}")]
    ListTables(#[source] ApiError),
    #[error("failed to load schema for `{table}`: {source}")]
    Schema {
        table: String,
        #[source]
        source: ApiError,
    },
    #[error("failed to read backend mode: {0}")]
    Mode(#[source] ApiError),
}

impl CatalogError {
    #[must_use]
    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::ListTables(source) | Self::Mode(source) | Self::Schema { source, .. } => source,
        }
    }
}

#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>, ApiError>;
    async fn fetch_schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>, ApiError>;
    async fn fetch_mode(&self) -> Result<BackendMode, ApiError>;
}

/// Reads table and column metadata. Holds no state of its own; callers keep
/// the returned [`TableSchema`] and replace it wholesale.
#[derive(Debug, Clone)]
pub struct SchemaCatalog<B: CatalogBackend> {
    backend: B,
}

impl<B: CatalogBackend> SchemaCatalog<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn list_tables(&self) -> Result<Vec<TableDescriptor>, CatalogError> {
        let tables = self
            .backend
            .list_tables()
            .await
            .map_err(CatalogError::ListTables)?;
        log::debug!("listed {} tables", tables.len());
        Ok(tables)
    }

    pub async fn load_schema(&self, table: &str) -> Result<TableSchema, CatalogError> {
        let columns =
            self.backend
                .fetch_schema(table)
                .await
                .map_err(|source| CatalogError::Schema {
                    table: table.to_string(),
                    source,
                })?;

        let primary_keys = columns.iter().filter(|column| column.primary_key).count();
        if primary_keys == 0 {
            log::info!("table `{table}` has no primary key; rows are read-only");
        } else if primary_keys > 1 {
            log::info!(
                "table `{table}` has a composite primary key; the first key column identifies rows"
            );
        }

        Ok(TableSchema::new(table, columns))
    }

    pub async fn backend_mode(&self) -> Result<BackendMode, CatalogError> {
        self.backend.fetch_mode().await.map_err(CatalogError::Mode)
    }
}
