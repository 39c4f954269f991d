use super::error::ValidationError;
use super::schema::USAGE_SCENARIO_SCHEMA;
use super::value::{json_kind, raw_params_from_json, ParamValue, RawParams};
use crate::reference::normalize_location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const USAGE_LOCATION: &str = "usage_location";

/// One validated evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParams")]
pub struct UsageScenario {
    hours_use_time: f64,
    usage_location: String,
    time_workload: f64,
}

impl UsageScenario {
    /// Validate as given. A missing `usage_location` is an error.
    pub fn from_raw(raw: &RawParams) -> Result<Self, ValidationError> {
        let validated = USAGE_SCENARIO_SCHEMA.validate(raw)?;
        Ok(Self {
            hours_use_time: validated.real("hours_use_time")?,
            usage_location: normalize_location(validated.text("usage_location")?),
            time_workload: validated.real("time_workload")?,
        })
    }

    /// Validate, filling an absent `usage_location` from the model's configured
    /// location. A location in the scenario itself always wins.
    pub fn from_raw_located(
        raw: &RawParams,
        configured_location: Option<&str>,
    ) -> Result<Self, ValidationError> {
        match configured_location {
            Some(location) if !raw.contains_key(USAGE_LOCATION) => {
                let mut located = raw.clone();
                located.insert(USAGE_LOCATION.to_string(), ParamValue::from(location));
                Self::from_raw(&located)
            }
            _ => Self::from_raw(raw),
        }
    }

    pub fn hours_use_time(&self) -> f64 {
        self.hours_use_time
    }

    pub fn usage_location(&self) -> &str {
        &self.usage_location
    }

    pub fn time_workload(&self) -> f64 {
        self.time_workload
    }
}

impl TryFrom<RawParams> for UsageScenario {
    type Error = ValidationError;

    fn try_from(raw: RawParams) -> Result<Self, Self::Error> {
        Self::from_raw(&raw)
    }
}

/// Scenario input resolved once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Scenarios {
    Single(UsageScenario),
    /// Each element validated on its own; positions match the input.
    Batch(Vec<Result<UsageScenario, ValidationError>>),
}

/// Classify a JSON value as a single scenario or a batch.
///
/// A mapping is a single scenario and must validate. A sequence of mappings is
/// a batch whose elements are validated independently. Anything else, including
/// a sequence holding a non-mapping, fails the whole call.
pub fn normalize(input: &Value) -> Result<Scenarios, ValidationError> {
    normalize_located(input, None)
}

/// [`normalize`] for a model configured with a static location.
pub fn normalize_located(
    input: &Value,
    configured_location: Option<&str>,
) -> Result<Scenarios, ValidationError> {
    let validate = |raw: &RawParams| UsageScenario::from_raw_located(raw, configured_location);
    match input {
        Value::Object(_) => {
            let raw = raw_params_from_json(input)?;
            validate(&raw).map(Scenarios::Single)
        }
        Value::Array(items) => {
            if let Some(bad) = items.iter().find(|item| !item.is_object()) {
                return Err(ValidationError::InvalidShape {
                    expected: "mapping",
                    got: json_kind(bad),
                });
            }

            let batch = items
                .iter()
                .map(|item| raw_params_from_json(item).and_then(|raw| validate(&raw)))
                .collect();
            Ok(Scenarios::Batch(batch))
        }
        other => Err(ValidationError::InvalidShape {
            expected: "mapping or sequence of mappings",
            got: json_kind(other),
        }),
    }
}

pub fn normalize_batch(
    raw: &[RawParams],
    configured_location: Option<&str>,
) -> Vec<Result<UsageScenario, ValidationError>> {
    raw.iter()
        .map(|raw| UsageScenario::from_raw_located(raw, configured_location))
        .collect()
}

/// Timestamped utilisation sample in the IMPL observation format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    /// Seconds.
    pub duration: f64,
    #[serde(rename = "cpu-util")]
    pub cpu_util: f64,
}

impl Observation {
    /// Scenario without a location; the model's configured location applies.
    pub fn to_raw_scenario(&self) -> RawParams {
        RawParams::from([
            (
                "hours_use_time".to_string(),
                ParamValue::Real(self.duration / 3600.0),
            ),
            ("time_workload".to_string(), ParamValue::Real(self.cpu_util)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mapping_is_a_single_scenario() {
        let scenarios = normalize(&json!({
            "hours_use_time": 0.05,
            "usage_location": "usa",
            "time_workload": 18.392,
        }))
        .expect("valid");

        match scenarios {
            Scenarios::Single(scenario) => {
                assert_eq!(scenario.usage_location(), "USA");
                assert_eq!(scenario.time_workload(), 18.392);
            }
            other => panic!("expected single scenario, got {other:?}"),
        }
    }

    #[test]
    fn batch_isolates_element_errors_and_keeps_order() {
        let scenarios = normalize(&json!([
            { "hours_use_time": 1, "usage_location": "USA", "time_workload": 0.5 },
            { "hours_use_time": 1, "time_workload": 0.5 },
            { "hours_use_time": 2, "usage_location": "FRA", "time_workload": 0.1 },
        ]))
        .expect("structurally valid batch");

        let Scenarios::Batch(items) = scenarios else {
            panic!("expected batch");
        };
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert_eq!(
            items[1],
            Err(ValidationError::MissingRequiredField("usage_location".to_string()))
        );
        assert_eq!(
            items[2].as_ref().map(UsageScenario::usage_location),
            Ok("FRA")
        );
    }

    #[test]
    fn missing_location_on_single_scenario_is_not_defaulted() {
        let error = normalize(&json!({ "hours_use_time": 1, "time_workload": 0.5 }))
            .expect_err("location required");
        assert_eq!(
            error,
            ValidationError::MissingRequiredField("usage_location".to_string())
        );
    }

    #[test]
    fn unknown_scenario_keys_are_rejected() {
        let error = normalize(&json!({
            "hours_use_time": 1,
            "usage_location": "USA",
            "time_workload": 0.5,
            "hours_used": 3,
        }))
        .expect_err("typo rejected");
        assert_eq!(error, ValidationError::UnknownField("hours_used".to_string()));
    }

    #[test]
    fn wrong_shapes_fail_the_whole_call() {
        assert!(matches!(
            normalize(&json!("USA")),
            Err(ValidationError::InvalidShape { got: "string", .. })
        ));
        assert!(matches!(
            normalize(&json!([{ "hours_use_time": 1 }, 7])),
            Err(ValidationError::InvalidShape { got: "number", .. })
        ));
    }

    #[test]
    fn observation_converts_seconds_to_hours() {
        let observation: Observation = serde_json::from_value(json!({
            "timestamp": "2021-01-01T00:00:00Z",
            "duration": 3600,
            "cpu-util": 0.5,
        }))
        .expect("observation parses");

        let raw = observation.to_raw_scenario();
        let scenario = UsageScenario::from_raw_located(&raw, Some("USA")).expect("valid scenario");
        assert_eq!(scenario.hours_use_time(), 1.0);
        assert_eq!(scenario.time_workload(), 0.5);
        assert_eq!(scenario.usage_location(), "USA");
        assert_eq!(
            UsageScenario::from_raw(&raw),
            Err(ValidationError::MissingRequiredField("usage_location".to_string()))
        );
    }

    #[test]
    fn configured_location_fills_only_missing_locations() {
        let scenarios = normalize_located(
            &json!([
                { "hours_use_time": 1, "time_workload": 0.5 },
                { "hours_use_time": 1, "usage_location": "fra", "time_workload": 0.5 },
            ]),
            Some("DEU"),
        )
        .expect("valid batch");

        let Scenarios::Batch(items) = scenarios else {
            panic!("expected batch");
        };
        let locations: Vec<_> = items
            .iter()
            .map(|item| item.as_ref().map(UsageScenario::usage_location))
            .collect();
        assert_eq!(locations, [Ok("DEU"), Ok("FRA")]);
    }
}
