pub mod checks;
pub mod crystfel;
pub mod esther;
pub mod wavefront;
pub mod xrts;

pub use checks::{ParameterError, ParameterMap};
pub use crystfel::CrystfelDiffractorParameters;
pub use esther::EstherInteractorParameters;
pub use wavefront::WavefrontPropagatorParameters;
pub use xrts::PlasmaXrtsParameters;

use crate::domain::{Artifact, CalculatorKind, SimexResult};
use serde_json::Value;
use std::path::Path;

/// Validated parameter set of one calculator.
pub trait ParameterSet {
    fn kind(&self) -> CalculatorKind;

    fn cpus_per_task_default(&self) -> usize {
        1
    }

    /// Writes the backengine input deck(s) into `work_dir` and returns the
    /// files written, relative to `work_dir`.
    fn write_input_deck(&self, work_dir: &Path) -> SimexResult<Vec<Artifact>>;

    /// Parameter values as recorded under `/params` in the output file.
    fn to_json(&self) -> Value;
}

/// Any calculator's parameters, as selected by a run configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum CalculatorParameters {
    Crystfel(CrystfelDiffractorParameters),
    Xrts(PlasmaXrtsParameters),
    Esther(EstherInteractorParameters),
    Wavefront(WavefrontPropagatorParameters),
}

impl CalculatorParameters {
    pub fn from_value(kind: CalculatorKind, value: &Value) -> SimexResult<Self> {
        Ok(match kind {
            CalculatorKind::CrystfelDiffractor => {
                Self::Crystfel(CrystfelDiffractorParameters::from_value(value)?)
            }
            CalculatorKind::PlasmaXrts => Self::Xrts(PlasmaXrtsParameters::from_value(value)?),
            CalculatorKind::EstherInteractor => {
                Self::Esther(EstherInteractorParameters::from_value(value)?)
            }
            CalculatorKind::WavefrontPropagator => {
                Self::Wavefront(WavefrontPropagatorParameters::from_value(value)?)
            }
        })
    }

    pub fn as_parameter_set(&self) -> &dyn ParameterSet {
        match self {
            Self::Crystfel(parameters) => parameters,
            Self::Xrts(parameters) => parameters,
            Self::Esther(parameters) => parameters,
            Self::Wavefront(parameters) => parameters,
        }
    }
}
