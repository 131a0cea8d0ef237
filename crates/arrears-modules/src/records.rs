//! Row <-> record conversion shared by the module handlers.

use arrears_bus::HandlerError;
use arrears_protocol::Row;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub(crate) fn decode<T: DeserializeOwned>(row: Row) -> Result<T, HandlerError> {
    serde_json::from_value(Value::Object(row))
        .map_err(|error| HandlerError::Internal(format!("malformed row: {error}")))
}

pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, HandlerError> {
    rows.into_iter().map(decode).collect()
}

/// Builds a row from a `json!` object literal.
pub(crate) fn row(value: Value) -> Result<Row, HandlerError> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(HandlerError::Internal(format!(
            "expected an object row, got {other}"
        ))),
    }
}
