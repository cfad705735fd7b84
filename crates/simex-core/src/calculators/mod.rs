mod crystfel;
mod esther;
mod wavefront;
mod xrts;

pub use crystfel::CrystfelDiffractorCalculator;
pub use esther::{EstherInteractorCalculator, EstherResults};
pub use wavefront::WavefrontPropagatorCalculator;
pub use xrts::{PlasmaXrtsCalculator, XrtsStaticData, parse_static_data};

use crate::domain::{
    Artifact, CalculationRequest, CalculatorKind, SimexError, SimexResult,
};
use crate::h5::{H5Layout, InfoBlock, package_version};
use crate::parameters::{CalculatorParameters, ParameterSet};
use crate::process::{BackengineCommand, ProcessRunner};
use crate::serialization::{ensure_directory, write_text_file};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONTACT: &str = "simex-rs maintainers";

/// Common lifecycle of a wrapped simulation code: write the input deck, run
/// the backengine, collect its output and store it as HDF5.
pub trait Calculator {
    fn kind(&self) -> CalculatorKind;

    fn request(&self) -> &CalculationRequest;

    fn parameters(&self) -> &dyn ParameterSet;

    /// HDF5 objects this calculator reads from its input.
    fn expected_data(&self) -> &'static [&'static str] {
        expected_data(self.kind())
    }

    /// HDF5 objects this calculator writes.
    fn provided_data(&self) -> &'static [&'static str] {
        provided_data(self.kind())
    }

    /// Creates the working directory and writes the input deck into it.
    fn prepare(&self) -> SimexResult<Vec<Artifact>> {
        let work_dir = &self.request().work_dir;
        ensure_directory(work_dir, "IO.WORK_DIRECTORY")?;
        self.parameters().write_input_deck(work_dir)
    }

    fn backengine(&mut self, runner: &dyn ProcessRunner) -> SimexResult<()>;

    fn h5_layout(&self) -> SimexResult<H5Layout>;

    fn save_h5(&self) -> SimexResult<()> {
        let output = &self.request().output_path;
        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            ensure_directory(parent, "IO.OUTPUT_DIRECTORY")?;
        }
        self.h5_layout()?.save(output)?;
        info!(kind = %self.kind(), output = %output.display(), "wrote calculator output");
        Ok(())
    }
}

pub fn expected_data(kind: CalculatorKind) -> &'static [&'static str] {
    match kind {
        CalculatorKind::CrystfelDiffractor => &crystfel::EXPECTED_DATA,
        CalculatorKind::PlasmaXrts => &xrts::EXPECTED_DATA,
        CalculatorKind::EstherInteractor => &[],
        CalculatorKind::WavefrontPropagator => &wavefront::EXPECTED_DATA,
    }
}

pub fn provided_data(kind: CalculatorKind) -> &'static [&'static str] {
    match kind {
        CalculatorKind::CrystfelDiffractor => &crystfel::PROVIDED_DATA,
        CalculatorKind::PlasmaXrts => &xrts::PROVIDED_DATA,
        CalculatorKind::EstherInteractor => &esther::PROVIDED_DATA,
        CalculatorKind::WavefrontPropagator => &wavefront::PROVIDED_DATA,
    }
}

/// Output file used when a run configuration does not name one.
pub fn default_output_path(kind: CalculatorKind) -> PathBuf {
    PathBuf::from(match kind {
        CalculatorKind::CrystfelDiffractor => "diffr_out.h5",
        CalculatorKind::PlasmaXrts => "xrts_out.h5",
        CalculatorKind::EstherInteractor => "esther_out.h5",
        CalculatorKind::WavefrontPropagator => "prop_out.h5",
    })
}

pub fn build_calculator(
    request: CalculationRequest,
    parameters: CalculatorParameters,
) -> SimexResult<Box<dyn Calculator>> {
    let parameter_kind = parameters.as_parameter_set().kind();
    if parameter_kind != request.kind {
        return Err(SimexError::internal(
            "SYS.CALCULATOR_KIND",
            format!(
                "{} parameters cannot drive the {} calculator",
                parameter_kind, request.kind
            ),
        ));
    }

    Ok(match parameters {
        CalculatorParameters::Crystfel(parameters) => {
            Box::new(CrystfelDiffractorCalculator::new(parameters, request))
        }
        CalculatorParameters::Xrts(parameters) => {
            Box::new(PlasmaXrtsCalculator::new(parameters, request))
        }
        CalculatorParameters::Esther(parameters) => {
            Box::new(EstherInteractorCalculator::new(parameters, request))
        }
        CalculatorParameters::Wavefront(parameters) => {
            Box::new(WavefrontPropagatorCalculator::new(parameters, request))
        }
    })
}

/// Runs the backengine and stores its output.
pub fn run_calculation(
    calculator: &mut dyn Calculator,
    runner: &dyn ProcessRunner,
) -> SimexResult<PathBuf> {
    calculator.backengine(runner)?;
    calculator.save_h5()?;
    Ok(calculator.request().output_path.clone())
}

/// Backengine invocation inside the working directory, wrapped for MPI and
/// thread count as the request asks.
pub(crate) fn backengine_command(
    program: impl Into<String>,
    request: &CalculationRequest,
    cpus_default: usize,
) -> BackengineCommand {
    BackengineCommand::new(program)
        .current_dir(&request.work_dir)
        .with_execution(&request.execution, cpus_default)
}

/// `/info`, `/history`, `/version` and the parameter record under `/params`.
pub(crate) fn base_layout(
    parameters: &dyn ParameterSet,
    data_description: &str,
    method_description: &str,
) -> SimexResult<H5Layout> {
    let mut layout = H5Layout::new();
    InfoBlock {
        package_version: package_version(),
        contact: CONTACT.to_string(),
        data_description: data_description.to_string(),
        method_description: method_description.to_string(),
    }
    .write_into(&mut layout)?;
    layout.text("/params/info", parameters.to_json().to_string())?;
    layout.text("/params/calculator", parameters.kind().long_name())?;
    Ok(layout)
}

pub(crate) fn write_run_log(
    dir: &Path,
    name: &str,
    log: &str,
    placeholder: &'static str,
) -> SimexResult<PathBuf> {
    let path = dir.join(name);
    write_text_file(&path, log, placeholder)?;
    Ok(path)
}

pub(crate) fn not_run_error(kind: CalculatorKind) -> SimexError {
    SimexError::computation(
        "RUN.NO_BACKENGINE_DATA",
        format!("the {kind} backengine has not produced any data yet; run it first"),
    )
}
