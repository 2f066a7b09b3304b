use serde::{Deserialize, Deserializer};

/// One column value as it travels over the wire.
pub type CellValue = serde_json::Value;

/// Column values in the ordinal order of the schema that produced them.
pub type Row = Vec<CellValue>;

/// Renders a value the way the grid and request parameters show it.
#[must_use]
pub fn cell_text(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::String(text) => text.clone(),
        CellValue::Bool(flag) => flag.to_string(),
        CellValue::Number(number) => number.to_string(),
        CellValue::Array(_) | CellValue::Object(_) => value.to_string(),
    }
}

/// Text placed in an input field when editing `value`.
#[must_use]
pub fn editable_text(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        other => cell_text(other),
    }
}

/// Value stored once the operator has changed a field to `text`. Numbers
/// and booleans keep their JSON type while the text still reads as one.
#[must_use]
pub fn edited_value(previous: Option<&CellValue>, text: String) -> CellValue {
    match previous {
        Some(CellValue::Number(_)) => match serde_json::from_str::<serde_json::Number>(&text) {
            Ok(number) => CellValue::Number(number),
            Err(_) => CellValue::String(text),
        },
        Some(CellValue::Bool(_)) => match text.as_str() {
            "true" => CellValue::Bool(true),
            "false" => CellValue::Bool(false),
            _ => CellValue::String(text),
        },
        _ => CellValue::String(text),
    }
}

/// Treats an explicit JSON `null` like a missing field. Empty collections
/// are encoded as `null` by some backends.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
