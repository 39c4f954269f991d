//! Closed parameter schemas and the single validator shared by every input path.

use super::error::ValidationError;
use super::value::{ParamValue, RawParams};
use crate::reference::CLOUD_PROVIDERS;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bumped whenever a schema gains, loses, or retypes a field.
pub const SCHEMA_VERSION: u32 = 1;

/// Semantic type and rule for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    Text { non_empty: bool },
    PositiveInteger,
    NonNegativeReal,
    Real,
    Bool,
    /// Case-insensitive match, stored with the declared spelling.
    Choice(&'static [&'static str]),
}

impl FieldType {
    pub fn expected(&self) -> String {
        match self {
            FieldType::Text { non_empty: true } => "non-empty string".to_string(),
            FieldType::Text { non_empty: false } => "string".to_string(),
            FieldType::PositiveInteger => "positive integer".to_string(),
            FieldType::NonNegativeReal => "non-negative real".to_string(),
            FieldType::Real => "real".to_string(),
            FieldType::Bool => "boolean".to_string(),
            FieldType::Choice(options) => format!("one of {}", options.join(", ")),
        }
    }

    fn coerce(&self, field: &str, value: &ParamValue) -> Result<FieldValue, ValidationError> {
        let accepted = match (self, value) {
            (FieldType::Text { non_empty }, ParamValue::Text(text)) => {
                let trimmed = text.trim();
                (!(*non_empty && trimmed.is_empty())).then(|| FieldValue::Text(trimmed.to_string()))
            }
            (FieldType::PositiveInteger, ParamValue::Integer(number)) => u64::try_from(*number)
                .ok()
                .filter(|number| *number >= 1)
                .map(FieldValue::Integer),
            (FieldType::NonNegativeReal, ParamValue::Integer(number)) if *number >= 0 => {
                Some(FieldValue::Real(*number as f64))
            }
            (FieldType::NonNegativeReal, ParamValue::Real(number))
                if number.is_finite() && *number >= 0.0 =>
            {
                Some(FieldValue::Real(*number))
            }
            (FieldType::Real, ParamValue::Integer(number)) => {
                Some(FieldValue::Real(*number as f64))
            }
            (FieldType::Real, ParamValue::Real(number)) if number.is_finite() => {
                Some(FieldValue::Real(*number))
            }
            (FieldType::Bool, ParamValue::Bool(flag)) => Some(FieldValue::Bool(*flag)),
            (FieldType::Choice(options), ParamValue::Text(text)) => options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(text.trim()))
                .map(|option| FieldValue::Text((*option).to_string())),
            _ => None,
        };

        accepted.ok_or_else(|| ValidationError::InvalidFieldType {
            field: field.to_string(),
            expected: self.expected(),
            got: value.describe(),
        })
    }
}

/// Default applied when a defaulted field is absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Text(&'static str),
    Bool(bool),
}

impl DefaultValue {
    fn to_field_value(self) -> FieldValue {
        match self {
            DefaultValue::Text(text) => FieldValue::Text(text.to_string()),
            DefaultValue::Bool(flag) => FieldValue::Bool(flag),
        }
    }

    fn label(self) -> String {
        match self {
            DefaultValue::Text(text) => text.to_string(),
            DefaultValue::Bool(flag) => flag.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Requirement {
    Required,
    Defaulted(DefaultValue),
    /// May be left out; no value is recorded.
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub requirement: Requirement,
    pub description: &'static str,
}

/// Ordered, closed set of fields recognised for one input kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSchema {
    pub subject: &'static str,
    pub version: u32,
    pub fields: &'static [FieldSpec],
}

pub static CPU_STATIC_SCHEMA: ParameterSchema = ParameterSchema {
    subject: "cpu static parameters",
    version: SCHEMA_VERSION,
    fields: &[
        FieldSpec {
            name: "name",
            field_type: FieldType::Text { non_empty: true },
            requirement: Requirement::Required,
            description: "hardware model name resolved against the reference data",
        },
        FieldSpec {
            name: "core_units",
            field_type: FieldType::PositiveInteger,
            requirement: Requirement::Required,
            description: "number of physical cores attributed to the component",
        },
        FieldSpec {
            name: "allocation",
            field_type: FieldType::Choice(&["LINEAR", "TOTAL"]),
            requirement: Requirement::Defaulted(DefaultValue::Text("LINEAR")),
            description: "LINEAR amortizes embodied impact over the reference lifetime, \
                          TOTAL reports all of it",
        },
        FieldSpec {
            name: "location",
            field_type: FieldType::Text { non_empty: true },
            requirement: Requirement::Optional,
            description: "usage location applied to scenarios that omit usage_location",
        },
        FieldSpec {
            name: "verbose",
            field_type: FieldType::Bool,
            requirement: Requirement::Defaulted(DefaultValue::Bool(false)),
            description: "attach an embodied/usage breakdown to every estimate",
        },
    ],
};

pub static CLOUD_STATIC_SCHEMA: ParameterSchema = ParameterSchema {
    subject: "cloud instance static parameters",
    version: SCHEMA_VERSION,
    fields: &[
        FieldSpec {
            name: "provider",
            field_type: FieldType::Choice(CLOUD_PROVIDERS),
            requirement: Requirement::Required,
            description: "cloud provider publishing the instance catalogue",
        },
        FieldSpec {
            name: "instance_type",
            field_type: FieldType::Text { non_empty: true },
            requirement: Requirement::Required,
            description: "provider instance type, matched exactly against the catalogue",
        },
        FieldSpec {
            name: "allocation",
            field_type: FieldType::Choice(&["LINEAR", "TOTAL"]),
            requirement: Requirement::Defaulted(DefaultValue::Text("TOTAL")),
            description: "LINEAR amortizes embodied impact over the reference lifetime, \
                          TOTAL reports all of it",
        },
        FieldSpec {
            name: "location",
            field_type: FieldType::Text { non_empty: true },
            requirement: Requirement::Optional,
            description: "usage location, checked against the supported locations at \
                          configuration",
        },
        FieldSpec {
            name: "verbose",
            field_type: FieldType::Bool,
            requirement: Requirement::Defaulted(DefaultValue::Bool(false)),
            description: "attach an embodied/usage breakdown to every estimate",
        },
    ],
};

pub static USAGE_SCENARIO_SCHEMA: ParameterSchema = ParameterSchema {
    subject: "usage scenario",
    version: SCHEMA_VERSION,
    fields: &[
        FieldSpec {
            name: "hours_use_time",
            field_type: FieldType::NonNegativeReal,
            requirement: Requirement::Required,
            description: "duration of use in hours",
        },
        FieldSpec {
            name: "usage_location",
            field_type: FieldType::Text { non_empty: true },
            requirement: Requirement::Required,
            description: "location code used for grid carbon intensity",
        },
        FieldSpec {
            name: "time_workload",
            field_type: FieldType::Real,
            requirement: Requirement::Required,
            description: "workload fraction in [0, 1]; overshoot is clamped",
        },
    ],
};

/// Typed value after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(u64),
    Real(f64),
    Bool(bool),
}

/// Output of [`ParameterSchema::validate`]: every schema field present and typed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParams {
    values: BTreeMap<&'static str, FieldValue>,
}

impl ValidatedParams {
    pub fn text(&self, field: &'static str) -> Result<&str, ValidationError> {
        match self.values.get(field) {
            Some(FieldValue::Text(text)) => Ok(text),
            _ => Err(ValidationError::MissingRequiredField(field.to_string())),
        }
    }

    pub fn integer(&self, field: &'static str) -> Result<u64, ValidationError> {
        match self.values.get(field) {
            Some(FieldValue::Integer(number)) => Ok(*number),
            _ => Err(ValidationError::MissingRequiredField(field.to_string())),
        }
    }

    pub fn real(&self, field: &'static str) -> Result<f64, ValidationError> {
        match self.values.get(field) {
            Some(FieldValue::Real(number)) => Ok(*number),
            _ => Err(ValidationError::MissingRequiredField(field.to_string())),
        }
    }

    pub fn flag(&self, field: &'static str) -> Result<bool, ValidationError> {
        match self.values.get(field) {
            Some(FieldValue::Bool(flag)) => Ok(*flag),
            _ => Err(ValidationError::MissingRequiredField(field.to_string())),
        }
    }

    /// Text of an [`Requirement::Optional`] field, if the caller gave one.
    pub fn optional_text(&self, field: &'static str) -> Option<&str> {
        match self.values.get(field) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// One field of a schema, as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub description: &'static str,
}

/// Serializable listing of a schema's fields in validation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub subject: &'static str,
    pub version: u32,
    pub fields: Vec<FieldSummary>,
}

impl ParameterSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            subject: self.subject,
            version: self.version,
            fields: self
                .fields
                .iter()
                .map(|spec| FieldSummary {
                    name: spec.name,
                    field_type: spec.field_type.expected(),
                    required: spec.requirement == Requirement::Required,
                    default: match spec.requirement {
                        Requirement::Defaulted(default) => Some(default.label()),
                        Requirement::Required | Requirement::Optional => None,
                    },
                    description: spec.description,
                })
                .collect(),
        }
    }

    /// Reject unknown keys, apply defaults, and type-check every field in order.
    pub fn validate(&self, raw: &RawParams) -> Result<ValidatedParams, ValidationError> {
        if let Some(unknown) = raw.keys().find(|key| self.field(key).is_none()) {
            return Err(ValidationError::UnknownField(unknown.clone()));
        }

        let mut values = BTreeMap::new();
        for spec in self.fields {
            let value = match (raw.get(spec.name), spec.requirement) {
                (Some(value), _) => spec.field_type.coerce(spec.name, value)?,
                (None, Requirement::Defaulted(default)) => default.to_field_value(),
                (None, Requirement::Optional) => continue,
                (None, Requirement::Required) => {
                    return Err(ValidationError::MissingRequiredField(spec.name.to_string()))
                }
            };
            values.insert(spec.name, value);
        }

        Ok(ValidatedParams { values })
    }
}
