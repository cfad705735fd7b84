use super::CliError;
use super::helpers::*;
use simex_core::calculators::run_calculation;
use simex_core::process::SystemRunner;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Run configuration (JSON)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Output file, overriding the configuration
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    work: WorkDirFlags,
}

#[derive(clap::Args)]
pub(super) struct ValidateArgs {
    /// Run configuration (JSON)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: PathBuf,

    #[command(flatten)]
    work: WorkDirFlags,
}

#[derive(clap::Args, Default)]
pub(super) struct WorkDirFlags {
    /// Working directory for the input deck and backengine files
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct DescribeArgs {
    /// Calculator name; lists every calculator when omitted
    #[arg(value_name = "CALCULATOR")]
    calculator: Option<String>,

    /// Print the description as JSON
    #[arg(long)]
    json: bool,
}

pub(super) fn run_run_command(args: RunArgs) -> Result<i32, CliError> {
    let overrides = ConfigOverrides {
        output: args.output,
        work_dir: args.work.work_dir,
    };
    let mut calculator = load_calculator(&args.config, overrides)?;
    info!(
        calculator = %calculator.kind(),
        work_dir = %calculator.request().work_dir.display(),
        "starting calculation"
    );

    let output = run_calculation(calculator.as_mut(), &SystemRunner)?;
    println!("{} finished: {}", calculator.kind(), output.display());
    Ok(0)
}

pub(super) fn run_validate_command(args: ValidateArgs) -> Result<i32, CliError> {
    let overrides = ConfigOverrides {
        output: None,
        work_dir: args.work.work_dir,
    };
    let calculator = load_calculator(&args.config, overrides)?;
    let artifacts = calculator.prepare()?;

    let work_dir = &calculator.request().work_dir;
    println!(
        "{} parameters are valid; work directory: {}",
        calculator.kind(),
        work_dir.display()
    );
    for artifact in &artifacts {
        println!("  {}", artifact.display_name());
    }
    Ok(0)
}

pub(super) fn run_describe_command(args: DescribeArgs) -> Result<i32, CliError> {
    let kinds = match args.calculator.as_deref() {
        Some(name) => vec![parse_calculator_name(name)?],
        None => simex_core::CalculatorKind::ALL.to_vec(),
    };

    if args.json {
        let descriptions = kinds
            .iter()
            .map(|kind| describe_json(*kind))
            .collect::<Vec<_>>();
        let rendered = if descriptions.len() == 1 {
            serde_json::to_string_pretty(&descriptions[0])
        } else {
            serde_json::to_string_pretty(&descriptions)
        }
        .map_err(anyhow::Error::from)?;
        println!("{rendered}");
    } else {
        let rendered = kinds
            .iter()
            .map(|kind| describe_text(*kind))
            .collect::<Vec<_>>()
            .join("\n");
        print!("{rendered}");
    }
    Ok(0)
}
