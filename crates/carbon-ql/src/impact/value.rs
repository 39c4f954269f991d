use super::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Untyped parameter map accepted by the dynamic configuration and usage paths.
pub type RawParams = BTreeMap<String, ParamValue>;

/// Scalar carried by a [`RawParams`] entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ParamValue {
    /// Kind plus value, for error messages.
    pub fn describe(&self) -> String {
        match self {
            ParamValue::Bool(value) => format!("boolean {value}"),
            ParamValue::Integer(value) => format!("integer {value}"),
            ParamValue::Real(value) => format!("real {value}"),
            ParamValue::Text(value) if value.trim().is_empty() => "empty string".to_string(),
            ParamValue::Text(value) => format!("string {value:?}"),
        }
    }

    fn from_json(field: &str, value: &Value) -> Result<Self, ValidationError> {
        match value {
            Value::Bool(flag) => Ok(ParamValue::Bool(*flag)),
            Value::Number(number) => number
                .as_i64()
                .map(ParamValue::Integer)
                .or_else(|| number.as_f64().map(ParamValue::Real))
                .ok_or_else(|| ValidationError::InvalidFieldType {
                    field: field.to_string(),
                    expected: "scalar".to_string(),
                    got: format!("number {number}"),
                }),
            Value::String(text) => Ok(ParamValue::Text(text.clone())),
            other => Err(ValidationError::InvalidFieldType {
                field: field.to_string(),
                expected: "scalar".to_string(),
                got: json_kind(other).to_string(),
            }),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Real(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Convert a JSON object into [`RawParams`]; nested values are rejected per field.
pub fn raw_params_from_json(value: &Value) -> Result<RawParams, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::InvalidShape {
        expected: "mapping",
        got: json_kind(value),
    })?;

    object
        .iter()
        .map(|(key, value)| ParamValue::from_json(key, value).map(|param| (key.clone(), param)))
        .collect()
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
