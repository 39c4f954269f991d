use crate::infra::{build_engine, read_json};
use carbon_ql::config::AppConfig;
use carbon_ql::error::AppError;
use carbon_ql::impact::{
    Allocation, CloudParams, ComponentKind, CpuParams, ImpactEngine, ImpactReport, Observation,
    RawParams, StaticParams,
};
use carbon_ql::telemetry;
use clap::{Args, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

/// Scenario input shared by the `evaluate` and `cloud` commands.
#[derive(Args, Debug, Default)]
pub(crate) struct ScenarioInput {
    /// Embodied allocation: LINEAR or TOTAL
    #[arg(long, value_parser = parse_allocation)]
    pub(crate) allocation: Option<Allocation>,
    /// Usage location for scenarios that omit one, and for every observation
    #[arg(long)]
    pub(crate) location: Option<String>,
    /// Attach an embodied/usage breakdown to each estimate
    #[arg(long)]
    pub(crate) verbose: bool,
    /// JSON file holding one scenario mapping or a sequence of them
    #[arg(
        long,
        conflicts_with = "observations",
        required_unless_present = "observations"
    )]
    pub(crate) scenarios: Option<PathBuf>,
    /// JSON file of timestamped `{timestamp, duration, cpu-util}` observations
    #[arg(long, requires = "location")]
    pub(crate) observations: Option<PathBuf>,
    /// Read reference data from this directory instead of the configured source
    #[arg(long)]
    pub(crate) dataset_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Hardware model name, e.g. "Intel Xeon Platinum 8272CL"
    #[arg(long)]
    pub(crate) name: String,
    /// Number of cores attributed to the workload
    #[arg(long)]
    pub(crate) core_units: u32,
    #[command(flatten)]
    pub(crate) input: ScenarioInput,
}

#[derive(Args, Debug)]
pub(crate) struct CloudArgs {
    /// Cloud provider, e.g. "aws"
    #[arg(long, default_value = "aws")]
    pub(crate) provider: String,
    /// Provider instance type, e.g. "m6i.large"
    #[arg(long)]
    pub(crate) instance_type: String,
    #[command(flatten)]
    pub(crate) input: ScenarioInput,
}

#[derive(Args, Debug, Default)]
pub(crate) struct LocationsArgs {
    /// Read reference data from this directory instead of the configured source
    #[arg(long)]
    pub(crate) dataset_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SchemaKind {
    Cpu,
    Cloud,
}

impl From<SchemaKind> for ComponentKind {
    fn from(kind: SchemaKind) -> Self {
        match kind {
            SchemaKind::Cpu => ComponentKind::Cpu,
            SchemaKind::Cloud => ComponentKind::Cloud,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct SchemaArgs {
    /// Component whose static parameters to describe
    #[arg(value_enum, default_value = "cpu")]
    pub(crate) kind: SchemaKind,
}

fn parse_allocation(raw: &str) -> Result<Allocation, String> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "LINEAR" => Ok(Allocation::Linear),
        "TOTAL" => Ok(Allocation::Total),
        other => Err(format!("unknown allocation '{other}', expected LINEAR or TOTAL")),
    }
}

fn load_engine(dataset_dir: Option<PathBuf>) -> Result<ImpactEngine, AppError> {
    let mut config = AppConfig::load()?;
    if dataset_dir.is_some() {
        config.reference.dataset_dir = dataset_dir;
    }
    telemetry::init(&config.telemetry)?;
    Ok(build_engine(&config.reference, config.evaluation))
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let engine = load_engine(args.input.dataset_dir.clone())?;
    let report = evaluate(&engine, &args)?;
    print_report(&args.name, &report)
}

pub(crate) fn run_cloud(args: CloudArgs) -> Result<(), AppError> {
    let engine = load_engine(args.input.dataset_dir.clone())?;
    let report = evaluate_cloud(&engine, &args)?;
    print_report(&args.instance_type, &report)
}

pub(crate) fn run_locations(args: LocationsArgs) -> Result<(), AppError> {
    let engine = load_engine(args.dataset_dir)?;
    for location in engine.supported_locations()? {
        println!("{location}");
    }
    Ok(())
}

pub(crate) fn run_schema(args: SchemaArgs) -> Result<(), AppError> {
    let summary = ComponentKind::from(args.kind).schema().summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_report(model: &str, report: &ImpactReport) -> Result<(), AppError> {
    let degraded = report
        .estimates()
        .iter()
        .filter(|estimate| estimate.is_degraded())
        .count();
    info!(
        model,
        estimates = report.estimates().len(),
        degraded,
        "evaluation complete"
    );

    println!("{}", serde_json::to_string_pretty(&report.view())?);
    Ok(())
}

pub(crate) fn evaluate(
    engine: &ImpactEngine,
    args: &EvaluateArgs,
) -> Result<ImpactReport, AppError> {
    let params = CpuParams {
        allocation: args.input.allocation,
        location: args.input.location.clone(),
        verbose: Some(args.input.verbose),
        ..CpuParams::new(args.name.clone(), args.core_units)
    };
    run_input(engine, &params, &args.input)
}

pub(crate) fn evaluate_cloud(
    engine: &ImpactEngine,
    args: &CloudArgs,
) -> Result<ImpactReport, AppError> {
    let params = CloudParams {
        allocation: args.input.allocation,
        location: args.input.location.clone(),
        verbose: Some(args.input.verbose),
        ..CloudParams::new(args.provider.clone(), args.instance_type.clone())
    };
    run_input(engine, &params, &args.input)
}

fn run_input<P: StaticParams>(
    engine: &ImpactEngine,
    params: &P,
    input: &ScenarioInput,
) -> Result<ImpactReport, AppError> {
    let instance = engine.configure_typed("cli", params)?;

    match (&input.scenarios, &input.observations) {
        (Some(path), _) => {
            let scenarios: Value = read_json(path)?;
            Ok(instance.usage_json(&scenarios)?)
        }
        (None, Some(path)) => {
            let observations: Vec<Observation> = read_json(path)?;
            let scenarios: Vec<RawParams> =
                observations.iter().map(Observation::to_raw_scenario).collect();
            Ok(ImpactReport::Batch(instance.usage_batch(&scenarios)?))
        }
        (None, None) => Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "either --scenarios or --observations with --location is required",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_input(name: &str, value: &Value) -> PathBuf {
        let file = format!("carbon-ql-api-{name}-{}.json", std::process::id());
        let path = std::env::temp_dir().join(file);
        fs::write(&path, value.to_string()).expect("write input");
        path
    }

    fn args(input: ScenarioInput) -> EvaluateArgs {
        EvaluateArgs {
            name: "Intel Xeon Platinum 8272CL".to_string(),
            core_units: 2,
            input,
        }
    }

    #[test]
    fn parses_allocation_case_insensitively() {
        assert_eq!(parse_allocation("total"), Ok(Allocation::Total));
        assert_eq!(parse_allocation(" Linear "), Ok(Allocation::Linear));
        assert!(parse_allocation("half").is_err());
    }

    #[test]
    fn evaluates_a_scenario_file() {
        let path = write_input(
            "scenario",
            &json!({ "hours_use_time": 0.05, "usage_location": "USA", "time_workload": 18.392 }),
        );
        let engine = ImpactEngine::with_bundled_data();
        let report = evaluate(
            &engine,
            &args(ScenarioInput {
                scenarios: Some(path.clone()),
                verbose: true,
                ..ScenarioInput::default()
            }),
        )
        .expect("report");

        match report {
            ImpactReport::Single(estimate) => {
                assert!(estimate.breakdown.is_some());
                assert!(estimate.min <= estimate.value && estimate.value <= estimate.max);
            }
            other => panic!("expected single estimate, got {other:?}"),
        }
        fs::remove_file(path).ok();
    }

    #[test]
    fn location_flag_fills_scenarios_without_one() {
        let path = write_input(
            "located",
            &json!([
                { "hours_use_time": 1, "time_workload": 0.5 },
                { "hours_use_time": 1, "usage_location": "FRA", "time_workload": 0.5 },
            ]),
        );
        let engine = ImpactEngine::with_bundled_data();
        let report = evaluate(
            &engine,
            &args(ScenarioInput {
                scenarios: Some(path.clone()),
                location: Some("FRA".to_string()),
                ..ScenarioInput::default()
            }),
        )
        .expect("report");

        let estimates = report.estimates();
        assert_eq!(estimates.len(), 2);
        assert_eq!(estimates[0], estimates[1]);
        fs::remove_file(path).ok();
    }

    #[test]
    fn evaluates_observations_in_order() {
        let path = write_input(
            "observations",
            &json!([
                { "timestamp": "2023-07-06T00:00:00Z", "duration": 600, "cpu-util": 0.9 },
                { "timestamp": "2023-07-06T00:10:00Z", "duration": 600, "cpu-util": 0.1 },
            ]),
        );
        let engine = ImpactEngine::with_bundled_data();
        let report = evaluate(
            &engine,
            &args(ScenarioInput {
                observations: Some(path.clone()),
                location: Some("DEU".to_string()),
                ..ScenarioInput::default()
            }),
        )
        .expect("report");

        let estimates = report.estimates();
        assert_eq!(estimates.len(), 2);
        assert!(estimates[0].value > estimates[1].value);
        fs::remove_file(path).ok();
    }

    #[test]
    fn evaluates_a_cloud_instance() {
        let path = write_input(
            "cloud",
            &json!({ "hours_use_time": 2, "usage_location": "SWE", "time_workload": 0.4 }),
        );
        let engine = ImpactEngine::with_bundled_data();
        let report = evaluate_cloud(
            &engine,
            &CloudArgs {
                provider: "aws".to_string(),
                instance_type: "m6g.large".to_string(),
                input: ScenarioInput {
                    scenarios: Some(path.clone()),
                    verbose: true,
                    ..ScenarioInput::default()
                },
            },
        )
        .expect("report");

        let estimates = report.estimates();
        let breakdown = estimates[0].breakdown.as_ref().expect("verbose");
        assert_eq!(breakdown.allocation, Allocation::Total);
        fs::remove_file(path).ok();
    }

    #[test]
    fn unknown_cloud_instance_is_a_validation_error() {
        let engine = ImpactEngine::with_bundled_data();
        let err = evaluate_cloud(
            &engine,
            &CloudArgs {
                provider: "aws".to_string(),
                instance_type: "z9.galactic".to_string(),
                input: ScenarioInput::default(),
            },
        )
        .expect_err("unknown instance type");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn missing_input_file_is_an_io_error() {
        let engine = ImpactEngine::with_bundled_data();
        let err = evaluate(
            &engine,
            &args(ScenarioInput {
                scenarios: Some(PathBuf::from("/nonexistent/carbon-ql/scenarios.json")),
                ..ScenarioInput::default()
            }),
        )
        .expect_err("missing file");
        assert!(matches!(err, AppError::Io(_)));
    }
}
