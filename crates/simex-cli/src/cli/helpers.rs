use super::CliError;
use serde_json::{Value, json};
use simex_core::calculators::{Calculator, default_output_path, expected_data, provided_data};
use simex_core::{CalculatorKind, RunConfig, SimexError};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub(super) struct ConfigOverrides {
    pub(super) output: Option<PathBuf>,
    pub(super) work_dir: Option<PathBuf>,
}

pub(super) fn load_calculator(
    config_path: &Path,
    overrides: ConfigOverrides,
) -> Result<Box<dyn Calculator>, CliError> {
    let mut config = RunConfig::load(config_path)?;
    if overrides.output.is_some() {
        config.output_path = overrides.output;
    }
    if overrides.work_dir.is_some() {
        config.work_dir = overrides.work_dir;
    }
    Ok(config.build()?)
}

pub(super) fn parse_calculator_name(name: &str) -> Result<CalculatorKind, CliError> {
    CalculatorKind::from_name(name).ok_or_else(|| {
        CliError::Compute(SimexError::input_validation(
            "INPUT.CLI_CALCULATOR",
            format!(
                "unknown calculator '{}'; expected one of: {}",
                name,
                CalculatorKind::ALL
                    .iter()
                    .map(|kind| kind.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ))
    })
}

pub(super) fn describe_text(kind: CalculatorKind) -> String {
    let mut lines = vec![
        format!("{} ({})", kind.as_str(), kind.long_name()),
        format!("  backengine: {}", kind.default_executable()),
        format!("  default output: {}", default_output_path(kind).display()),
    ];
    for (title, paths) in [
        ("expected data", expected_data(kind)),
        ("provided data", provided_data(kind)),
    ] {
        if paths.is_empty() {
            lines.push(format!("  {title}: none"));
            continue;
        }
        lines.push(format!("  {title}:"));
        lines.extend(paths.iter().map(|path| format!("    {path}")));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

pub(super) fn describe_json(kind: CalculatorKind) -> Value {
    json!({
        "calculator": kind.as_str(),
        "long_name": kind.long_name(),
        "backengine": kind.default_executable(),
        "default_output": default_output_path(kind).to_string_lossy(),
        "expected_data": expected_data(kind),
        "provided_data": provided_data(kind),
    })
}
