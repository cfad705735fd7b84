use super::{Calculator, backengine_command, base_layout, write_run_log};
use crate::domain::{CalculationRequest, CalculatorKind, SimexError, SimexResult};
use crate::h5::H5Layout;
use crate::parameters::{ParameterSet, WavefrontPropagatorParameters};
use crate::process::{ProcessRunner, require_output_file, require_success};
use crate::serialization::ensure_directory;
use std::path::Path;
use tracing::info;

pub(crate) const WPG_LOG_NAME: &str = "wpg.log";

pub(crate) const EXPECTED_DATA: [&str; 8] = [
    "/data/arrEhor",
    "/data/arrEver",
    "/params/Mesh",
    "/params/photonEnergy",
    "/info/package_version",
    "/info/contact",
    "/misc/xFWHM",
    "/version",
];

pub(crate) const PROVIDED_DATA: [&str; 11] = [
    "/data/arrEhor",
    "/data/arrEver",
    "/params/Mesh",
    "/params/photonEnergy",
    "/history/parent",
    "/info/package_version",
    "/info/contact",
    "/info/data_description",
    "/info/method_description",
    "/misc",
    "/version",
];

/// Runs a WPG beamline script on a source wavefront. The script writes the
/// propagated wavefront file itself.
pub struct WavefrontPropagatorCalculator {
    parameters: WavefrontPropagatorParameters,
    request: CalculationRequest,
    propagated: bool,
}

impl WavefrontPropagatorCalculator {
    pub fn new(parameters: WavefrontPropagatorParameters, request: CalculationRequest) -> Self {
        Self {
            parameters,
            request,
            propagated: false,
        }
    }

    fn source_wavefront(&self) -> SimexResult<&Path> {
        let input = self.request.input_path.as_deref().ok_or_else(|| {
            SimexError::input_validation(
                "INPUT.WPG_SOURCE",
                "wavefront propagation needs a source wavefront file as input",
            )
        })?;
        if !input.is_file() {
            return Err(SimexError::io_system(
                "IO.WPG_SOURCE",
                format!("source wavefront '{}' does not exist", input.display()),
            ));
        }
        Ok(input)
    }
}

impl Calculator for WavefrontPropagatorCalculator {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::WavefrontPropagator
    }

    fn request(&self) -> &CalculationRequest {
        &self.request
    }

    fn parameters(&self) -> &dyn ParameterSet {
        &self.parameters
    }

    fn backengine(&mut self, runner: &dyn ProcessRunner) -> SimexResult<()> {
        let input = std::path::absolute(self.source_wavefront()?).map_err(|source| {
            SimexError::io_system("IO.WPG_SOURCE", format!("cannot resolve input: {source}"))
        })?;
        let output = std::path::absolute(&self.request.output_path).map_err(|source| {
            SimexError::io_system("IO.WPG_OUTPUT", format!("cannot resolve output: {source}"))
        })?;
        self.prepare()?;
        if let Some(parent) = output.parent() {
            ensure_directory(parent, "IO.WPG_OUTPUT")?;
        }

        let interpreter = self
            .request
            .execution
            .executable
            .clone()
            .unwrap_or_else(|| self.parameters.python.clone());
        let command = backengine_command(
            interpreter,
            &self.request,
            self.parameters.cpus_per_task_default(),
        )
        .args(self.parameters.script_arguments(&input, &output));

        let result = runner.run(&command)?;
        write_run_log(&self.request.work_dir, WPG_LOG_NAME, &result.stdout, "IO.WPG_LOG")?;
        require_success(&result, &command, "RUN.WPG_BACKENGINE")?;
        require_output_file(&output, "IO.WPG_OUTPUT")?;
        info!(output = %output.display(), "wavefront propagated");
        self.propagated = true;
        Ok(())
    }

    /// Metadata only; the wavefront data lives in the file the script wrote.
    fn h5_layout(&self) -> SimexResult<H5Layout> {
        base_layout(
            &self.parameters,
            "Wavefront propagated through an x-ray beamline.",
            "Fourier optics propagation with WPG/SRW.",
        )
    }

    fn save_h5(&self) -> SimexResult<()> {
        require_output_file(&self.request.output_path, "IO.WPG_OUTPUT")?;
        if !self.propagated {
            info!(
                output = %self.request.output_path.display(),
                "keeping existing wavefront file"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::WavefrontPropagatorCalculator;
    use crate::calculators::testing::{FakeRunner, output};
    use crate::calculators::{Calculator, run_calculation};
    use crate::domain::{CalculationRequest, CalculatorKind, ExecutionSettings};
    use crate::parameters::WavefrontPropagatorParameters;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn parameters(root: &Path) -> WavefrontPropagatorParameters {
        let script = root.join("beamline.py");
        std::fs::write(&script, "print('propagate')\n").expect("script staged");
        WavefrontPropagatorParameters::from_value(&json!({
            "beamline_script": script.to_str().expect("utf-8"),
        }))
        .expect("valid parameters")
    }

    fn request(root: &Path, input: Option<PathBuf>) -> CalculationRequest {
        CalculationRequest::new(
            CalculatorKind::WavefrontPropagator,
            input,
            root.join("prop").join("prop_out.h5"),
            root.join("work"),
        )
    }

    fn script_emulator() -> FakeRunner {
        FakeRunner::new(|command| {
            let args = command.arg_strings();
            let index = args.iter().position(|arg| arg == "--output").expect("--output");
            std::fs::write(&args[index + 1], b"HDF").expect("wavefront written");
            Ok(output(0, "propagation done\n", ""))
        })
    }

    #[test]
    fn script_is_run_with_input_and_output() {
        let temp = TempDir::new().expect("tempdir should be created");
        let source = temp.path().join("source.h5");
        std::fs::write(&source, b"HDF").expect("source staged");
        let runner = script_emulator();
        let mut calculator = WavefrontPropagatorCalculator::new(
            parameters(temp.path()),
            request(temp.path(), Some(source)),
        );

        let output = run_calculation(&mut calculator, &runner).expect("propagation");
        assert!(output.ends_with("prop/prop_out.h5"));
        assert!(temp.path().join("prop").join("prop_out.h5").is_file());

        let command = runner.last_command();
        assert_eq!(command.program, "python3");
        let args = command.arg_strings();
        assert!(args[0].ends_with("beamline.py"));
        assert_eq!(args[1], "--input");
        assert!(args[2].ends_with("source.h5"));
        assert!(!args.contains(&"--opmd".to_string()));
    }

    #[test]
    fn executable_override_replaces_the_interpreter() {
        let temp = TempDir::new().expect("tempdir should be created");
        let source = temp.path().join("source.h5");
        std::fs::write(&source, b"HDF").expect("source staged");
        let runner = script_emulator();
        let request = request(temp.path(), Some(source)).with_execution(ExecutionSettings {
            executable: Some("/opt/wpg/bin/python".to_string()),
            ..ExecutionSettings::default()
        });
        let mut calculator = WavefrontPropagatorCalculator::new(parameters(temp.path()), request);

        calculator.backengine(&runner).expect("propagation");
        assert_eq!(runner.last_command().program, "/opt/wpg/bin/python");
    }

    #[test]
    fn relative_script_resolves_from_the_work_dir() {
        let staging = TempDir::new_in(".").expect("tempdir should be created");
        let script = staging.path().join("beamline.py");
        std::fs::write(&script, "print('propagate')\n").expect("script staged");
        assert!(script.is_relative());
        let parameters = WavefrontPropagatorParameters::from_value(&json!({
            "beamline_script": script.to_str().expect("utf-8"),
        }))
        .expect("valid parameters");

        let temp = TempDir::new().expect("tempdir should be created");
        let source = temp.path().join("source.h5");
        std::fs::write(&source, b"HDF").expect("source staged");
        let runner = FakeRunner::new(|command| {
            let cwd = command.current_dir.clone().expect("script runs in the work dir");
            let args = command.arg_strings();
            assert!(cwd.join(&args[0]).is_file(), "{} not reachable", args[0]);
            std::fs::write(&args[4], b"HDF").expect("wavefront written");
            Ok(output(0, "", ""))
        });
        let mut calculator =
            WavefrontPropagatorCalculator::new(parameters, request(temp.path(), Some(source)));

        calculator.backengine(&runner).expect("propagation");
    }

    #[test]
    fn missing_output_is_reported() {
        let temp = TempDir::new().expect("tempdir should be created");
        let source = temp.path().join("source.h5");
        std::fs::write(&source, b"HDF").expect("source staged");
        let mut calculator = WavefrontPropagatorCalculator::new(
            parameters(temp.path()),
            request(temp.path(), Some(source)),
        );

        let error = calculator
            .backengine(&FakeRunner::succeeding(""))
            .expect_err("script wrote nothing");
        assert_eq!(error.placeholder(), "IO.WPG_OUTPUT");
        assert!(calculator.save_h5().is_err());
    }

    #[test]
    fn source_wavefront_is_required() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut calculator =
            WavefrontPropagatorCalculator::new(parameters(temp.path()), request(temp.path(), None));
        let error = calculator
            .backengine(&script_emulator())
            .expect_err("no input");
        assert_eq!(error.placeholder(), "INPUT.WPG_SOURCE");
    }
}
