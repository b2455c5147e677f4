//! Conversions between libSQL values and model fields.

use libsql::params::Params;
use libsql::{Row, Value};

use crate::error::{Error, Result};

pub fn params(values: Vec<Value>) -> Params {
    Params::Positional(values)
}

pub fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub fn opt_text(value: Option<impl Into<String>>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.into()))
}

pub const fn int(value: i64) -> Value {
    Value::Integer(value)
}

pub fn opt_int(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

pub fn unsigned(value: impl Into<u64>) -> Value {
    Value::Integer(i64::try_from(value.into()).unwrap_or(i64::MAX))
}

pub fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

pub fn json(value: &serde_json::Value) -> Value {
    Value::Text(value.to_string())
}

pub fn opt_json(value: Option<&serde_json::Value>) -> Value {
    value.map_or(Value::Null, json)
}

pub fn read_text(row: &Row, idx: i32) -> Result<String> {
    read_opt_text(row, idx)?
        .ok_or_else(|| Error::Database(format!("column {idx} is unexpectedly NULL")))
}

pub fn read_opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        Value::Integer(number) => Ok(Some(number.to_string())),
        other => Err(Error::Database(format!(
            "column {idx} has unexpected type {other:?}"
        ))),
    }
}

pub fn read_i64(row: &Row, idx: i32) -> Result<i64> {
    read_opt_i64(row, idx)?
        .ok_or_else(|| Error::Database(format!("column {idx} is unexpectedly NULL")))
}

pub fn read_opt_i64(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(number) => Ok(Some(number)),
        other => Err(Error::Database(format!(
            "column {idx} has unexpected type {other:?}"
        ))),
    }
}

pub fn read_u32(row: &Row, idx: i32) -> Result<u32> {
    u32::try_from(read_i64(row, idx)?)
        .map_err(|_| Error::Database(format!("column {idx} is out of range")))
}

pub fn read_u64(row: &Row, idx: i32) -> Result<u64> {
    u64::try_from(read_i64(row, idx)?)
        .map_err(|_| Error::Database(format!("column {idx} is out of range")))
}

pub fn read_flag(row: &Row, idx: i32) -> Result<bool> {
    Ok(read_i64(row, idx)? != 0)
}

pub fn read_json(row: &Row, idx: i32) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(&read_text(row, idx)?)?)
}

pub fn read_opt_json(row: &Row, idx: i32) -> Result<Option<serde_json::Value>> {
    read_opt_text(row, idx)?
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(Into::into)
}

/// Parse a stored enum label.
pub fn read_enum<T>(row: &Row, idx: i32) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    read_text(row, idx)?.parse().map_err(Error::Database)
}
