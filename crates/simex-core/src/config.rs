//! JSON run configuration: which calculator to run, on which files, with
//! which parameters.
//!
//! Relative paths are taken as given and resolve against the process's
//! current directory, the same way paths inside `parameters` do.

use crate::calculators::{Calculator, build_calculator, default_output_path};
use crate::domain::{
    CalculationRequest, CalculatorKind, ExecutionSettings, SimexError, SimexResult,
};
use crate::parameters::CalculatorParameters;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub calculator: String,
    #[serde(default)]
    pub input_path: Option<PathBuf>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub cpus_per_task: Option<usize>,
    #[serde(default)]
    pub mpi_processes: Option<usize>,
    #[serde(default)]
    pub mpi_launcher: Option<String>,
    #[serde(default)]
    pub executable: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl RunConfig {
    pub fn from_json_str(source: &str) -> SimexResult<Self> {
        let config: Self = serde_json::from_str(source).map_err(|source| {
            SimexError::input_validation(
                "INPUT.CONFIG_PARSE",
                format!("failed to parse run configuration: {source}"),
            )
        })?;
        if config.parameters.is_null() {
            return Ok(Self {
                parameters: empty_object(),
                ..config
            });
        }
        if !config.parameters.is_object() {
            return Err(SimexError::input_validation(
                "INPUT.CONFIG_PARAMETERS",
                "'parameters' must be a JSON object",
            ));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SimexResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| {
            SimexError::io_system(
                "IO.CONFIG_READ",
                format!(
                    "failed to read run configuration '{}': {source}",
                    path.display()
                ),
            )
        })?;
        Self::from_json_str(&source).map_err(|error| {
            SimexError::new(
                error.category(),
                error.placeholder(),
                format!("{} ({})", error.message(), path.display()),
            )
        })
    }

    pub fn kind(&self) -> SimexResult<CalculatorKind> {
        CalculatorKind::from_name(&self.calculator).ok_or_else(|| {
            let known = CalculatorKind::ALL
                .iter()
                .map(|kind| kind.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            SimexError::input_validation(
                "INPUT.CONFIG_CALCULATOR",
                format!(
                    "unknown calculator '{}'; expected one of: {known}",
                    self.calculator
                ),
            )
        })
    }

    pub fn execution_settings(&self) -> SimexResult<ExecutionSettings> {
        let defaults = ExecutionSettings::default();
        let mpi_processes = self
            .execution
            .mpi_processes
            .unwrap_or(defaults.mpi_processes);
        if mpi_processes == 0 {
            return Err(SimexError::input_validation(
                "INPUT.CONFIG_EXECUTION",
                "execution.mpi_processes must be at least 1",
            ));
        }
        if self.execution.cpus_per_task == Some(0) {
            return Err(SimexError::input_validation(
                "INPUT.CONFIG_EXECUTION",
                "execution.cpus_per_task must be at least 1",
            ));
        }
        Ok(ExecutionSettings {
            cpus_per_task: self.execution.cpus_per_task,
            mpi_processes,
            mpi_launcher: self
                .execution
                .mpi_launcher
                .clone()
                .unwrap_or(defaults.mpi_launcher),
            executable: self.execution.executable.clone(),
        })
    }

    pub fn request(&self) -> SimexResult<CalculationRequest> {
        let kind = self.kind()?;
        let output_path = self
            .output_path
            .clone()
            .unwrap_or_else(|| default_output_path(kind));
        let work_dir = self
            .work_dir
            .clone()
            .unwrap_or_else(|| default_work_dir(kind));
        Ok(
            CalculationRequest::new(kind, self.input_path.clone(), output_path, work_dir)
                .with_execution(self.execution_settings()?),
        )
    }

    pub fn calculator_parameters(&self) -> SimexResult<CalculatorParameters> {
        CalculatorParameters::from_value(self.kind()?, &self.parameters)
    }

    pub fn build(&self) -> SimexResult<Box<dyn Calculator>> {
        build_calculator(self.request()?, self.calculator_parameters()?)
    }
}

/// Fresh scratch directory name under the system temp dir.
pub fn default_work_dir(kind: CalculatorKind) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "simex-{}-{}-{nanos}",
        kind.as_str(),
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::RunConfig;
    use crate::domain::CalculatorKind;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn minimal_configuration_uses_defaults() {
        let config = RunConfig::from_json_str(r#"{ "calculator": "crystfel" }"#)
            .expect("config should parse");
        assert_eq!(config.kind().expect("kind"), CalculatorKind::CrystfelDiffractor);
        assert!(config.parameters.as_object().is_some_and(|map| map.is_empty()));

        let request = config.request().expect("request");
        assert_eq!(request.output_path, PathBuf::from("diffr_out.h5"));
        assert_eq!(request.execution.mpi_processes, 1);
        assert_eq!(request.execution.mpi_launcher, "mpirun");
        let work_dir = request.work_dir.to_string_lossy().into_owned();
        assert!(work_dir.contains("simex-crystfel-"), "{work_dir}");
    }

    #[test]
    fn execution_block_is_passed_through() {
        let config = RunConfig::from_json_str(
            r#"{
                "calculator": "plasma_xrts",
                "output_path": "out/xrts.h5",
                "work_dir": "scratch",
                "execution": { "cpus_per_task": 4, "mpi_processes": 8, "mpi_launcher": "srun" }
            }"#,
        )
        .expect("config should parse");
        let request = config.request().expect("request");
        assert_eq!(request.kind, CalculatorKind::PlasmaXrts);
        assert_eq!(request.work_dir, PathBuf::from("scratch"));
        assert_eq!(request.execution.cpus_per_task, Some(4));
        assert_eq!(request.execution.mpi_processes, 8);
        assert_eq!(request.execution.mpi_launcher, "srun");
    }

    #[test]
    fn configuration_errors_carry_placeholders() {
        let unknown = RunConfig::from_json_str(r#"{ "calculator": "singfel" }"#)
            .expect("config should parse");
        assert_eq!(
            unknown.kind().expect_err("unknown").placeholder(),
            "INPUT.CONFIG_CALCULATOR"
        );

        let extra = RunConfig::from_json_str(r#"{ "calculator": "xrts", "beam": 1 }"#)
            .expect_err("unknown field");
        assert_eq!(extra.placeholder(), "INPUT.CONFIG_PARSE");

        let list = RunConfig::from_json_str(r#"{ "calculator": "xrts", "parameters": [] }"#)
            .expect_err("parameters must be an object");
        assert_eq!(list.placeholder(), "INPUT.CONFIG_PARAMETERS");

        let zero = RunConfig::from_json_str(
            r#"{ "calculator": "xrts", "execution": { "mpi_processes": 0 } }"#,
        )
        .expect("config should parse");
        assert_eq!(
            zero.request().expect_err("zero processes").placeholder(),
            "INPUT.CONFIG_EXECUTION"
        );
    }

    #[test]
    fn parameter_errors_surface_through_build() {
        let config = RunConfig::from_json_str(
            r#"{ "calculator": "crystfel", "parameters": { "number_of_diffraction_patterns": 1.5 } }"#,
        )
        .expect("config should parse");
        let error = config.build().err().expect("float where integer expected");
        assert_eq!(error.placeholder(), "INPUT.PARAMETER_TYPE");
    }

    #[test]
    fn load_reads_from_disk() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("run.json");
        std::fs::write(
            &path,
            r#"{ "calculator": "crystfel", "parameters": { "number_of_diffraction_patterns": 3 } }"#,
        )
        .expect("config written");

        let calculator = RunConfig::load(&path)
            .expect("config should load")
            .build()
            .expect("calculator should build");
        assert_eq!(calculator.kind(), CalculatorKind::CrystfelDiffractor);

        let missing = RunConfig::load(temp.path().join("absent.json")).expect_err("no file");
        assert_eq!(missing.placeholder(), "IO.CONFIG_READ");
    }
}
