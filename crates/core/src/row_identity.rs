//! Derives the identity of a positional row from the schema's primary key.
//!
//! Rows carry no identity of their own. The primary-key ordinal is looked up
//! in the column list passed to every call, so a reloaded schema is always
//! honoured.

use thiserror::Error;

use crate::catalog::ColumnDescriptor;
use crate::value::{cell_text, CellValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("no primary key found for this table")]
    NoPrimaryKey,
    #[error("schema for `{table}` is not loaded")]
    SchemaUnavailable { table: String },
    #[error("row has {row_len} values but primary key `{column}` is at position {position}")]
    MissingValue {
        column: String,
        position: usize,
        row_len: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub column: String,
    pub value: CellValue,
}

impl PrimaryKey {
    #[must_use]
    pub fn new(column: impl Into<String>, value: CellValue) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }

    /// The value as sent in the `pk_value` query parameter.
    #[must_use]
    pub fn value_param(&self) -> String {
        match &self.value {
            CellValue::Null => "null".to_string(),
            other => cell_text(other),
        }
    }
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.column, self.value_param())
    }
}

/// Ordinal of the first primary-key column, if any.
#[must_use]
pub fn primary_key_position(columns: &[ColumnDescriptor]) -> Option<usize> {
    columns.iter().position(|column| column.primary_key)
}

pub fn resolve_primary_key(
    row: &[CellValue],
    columns: &[ColumnDescriptor],
) -> Result<PrimaryKey, IdentityError> {
    let position = primary_key_position(columns).ok_or(IdentityError::NoPrimaryKey)?;
    let column = &columns[position];
    let value = row.get(position).ok_or_else(|| IdentityError::MissingValue {
        column: column.name.clone(),
        position,
        row_len: row.len(),
    })?;

    Ok(PrimaryKey::new(column.name.clone(), value.clone()))
}
