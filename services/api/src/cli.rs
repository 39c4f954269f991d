use crate::evaluate::{
    run_cloud, run_evaluate, run_locations, run_schema, CloudArgs, EvaluateArgs, LocationsArgs,
    SchemaArgs,
};
use crate::server;
use carbon_ql::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "carbon-ql",
    about = "Evaluate hardware component carbon impact from the command line or over HTTP",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Evaluate a CPU model against scenarios or observations and print JSON
    Evaluate(EvaluateArgs),
    /// Evaluate a cloud instance type against scenarios or observations
    Cloud(CloudArgs),
    /// List location codes with a published grid intensity
    Locations(LocationsArgs),
    /// Describe the static parameters a component accepts
    Schema(SchemaArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Evaluate(args) => run_evaluate(args),
        Command::Cloud(args) => run_cloud(args),
        Command::Locations(args) => run_locations(args),
        Command::Schema(args) => run_schema(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["carbon-ql"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn evaluate_requires_an_input_source() {
        let result = Cli::try_parse_from([
            "carbon-ql",
            "evaluate",
            "--name",
            "Intel Xeon Platinum 8272CL",
            "--core-units",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn observations_require_a_location() {
        let result = Cli::try_parse_from([
            "carbon-ql",
            "evaluate",
            "--name",
            "Intel Xeon Platinum 8272CL",
            "--core-units",
            "2",
            "--observations",
            "observations.json",
        ]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "carbon-ql",
            "evaluate",
            "--name",
            "Intel Xeon Platinum 8272CL",
            "--core-units",
            "2",
            "--observations",
            "observations.json",
            "--location",
            "USA",
            "--allocation",
            "total",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Evaluate(args)) => {
                assert_eq!(args.input.location.as_deref(), Some("USA"));
                assert_eq!(
                    args.input.allocation,
                    Some(carbon_ql::impact::Allocation::Total)
                );
            }
            other => panic!("expected evaluate, got {other:?}"),
        }
    }

    #[test]
    fn cloud_defaults_to_aws_and_accepts_a_location() {
        let cli = Cli::try_parse_from([
            "carbon-ql",
            "cloud",
            "--instance-type",
            "t2.micro",
            "--location",
            "USA",
            "--scenarios",
            "scenarios.json",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Cloud(args)) => {
                assert_eq!(args.provider, "aws");
                assert_eq!(args.instance_type, "t2.micro");
                assert_eq!(args.input.location.as_deref(), Some("USA"));
            }
            other => panic!("expected cloud, got {other:?}"),
        }
    }

    #[test]
    fn schema_kind_defaults_to_cpu() {
        let cli = Cli::try_parse_from(["carbon-ql", "schema"]).expect("parses");
        assert!(matches!(
            cli.command,
            Some(Command::Schema(SchemaArgs {
                kind: crate::evaluate::SchemaKind::Cpu
            }))
        ));
        assert!(Cli::try_parse_from(["carbon-ql", "schema", "gpu"]).is_err());
    }
}
