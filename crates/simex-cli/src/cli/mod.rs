mod commands;
mod helpers;

use crate::logging::setup_logging;
use clap::Parser;
use simex_core::SimexError;
use std::path::PathBuf;

pub fn run_from_env() -> i32 {
    match parse_and_dispatch(std::env::args().collect()) {
        Ok(code) => code,
        Err(error) => {
            let simex_error = error.as_simex_error();
            eprintln!("{}", simex_error.diagnostic_line());
            eprintln!("{}", simex_error.fatal_exit_line());
            simex_error.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) => {
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    print!("{}", err);
                    Ok(0)
                }
                _ => Err(CliError::Usage(err.to_string())),
            };
        }
    };

    setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;
    dispatch_parsed(cli.command)
}

#[derive(Parser)]
#[command(
    name = "simex",
    version,
    about = "Drive photon-science simulation backengines from a JSON run configuration"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write log records to this file
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run a calculator and store its output
    Run(commands::RunArgs),
    /// Validate parameters and write the input deck without running the backengine
    Validate(commands::ValidateArgs),
    /// Show what a calculator reads and writes
    Describe(commands::DescribeArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_run_command(args),
        CliCommand::Validate(args) => commands::run_validate_command(args),
        CliCommand::Describe(args) => commands::run_describe_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(SimexError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SimexError> for CliError {
    fn from(error: SimexError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_simex_error(&self) -> SimexError {
        match self {
            Self::Usage(message) => {
                SimexError::input_validation("INPUT.CLI_USAGE", message.trim_end().to_string())
            }
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => SimexError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, CliCommand, CliError};
    use clap::Parser;
    use simex_core::{SimexError, SimexErrorCategory};

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["simex", "describe", "xrts", "-vv"]).expect("parse");
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
        assert!(matches!(cli.command, CliCommand::Describe(_)));
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["simex", "-q", "-v", "describe"]).is_err());
    }

    #[test]
    fn run_requires_a_configuration() {
        assert!(Cli::try_parse_from(["simex", "run"]).is_err());
        assert!(Cli::try_parse_from(["simex", "run", "--config", "run.json"]).is_ok());
    }

    #[test]
    fn errors_map_to_category_exit_codes() {
        let usage = CliError::Usage("bad flag\n".to_string()).as_simex_error();
        assert_eq!(usage.category(), SimexErrorCategory::Input);
        assert_eq!(usage.message(), "bad flag");

        let compute = CliError::from(SimexError::computation("RUN.XRTS_BACKENGINE", "failed"))
            .as_simex_error();
        assert_eq!(compute.exit_code(), 4);

        let internal = CliError::from(anyhow::anyhow!("disk full")).as_simex_error();
        assert_eq!(internal.placeholder(), "IO.CLI");
        assert_eq!(internal.exit_code(), 3);
    }
}
