pub mod errors;

pub use errors::{SimexError, SimexErrorCategory, SimexResult};

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalculatorKind {
    CrystfelDiffractor,
    PlasmaXrts,
    EstherInteractor,
    WavefrontPropagator,
}

impl CalculatorKind {
    pub const ALL: [CalculatorKind; 4] = [
        Self::CrystfelDiffractor,
        Self::PlasmaXrts,
        Self::EstherInteractor,
        Self::WavefrontPropagator,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CrystfelDiffractor => "crystfel",
            Self::PlasmaXrts => "xrts",
            Self::EstherInteractor => "esther",
            Self::WavefrontPropagator => "wpg",
        }
    }

    pub const fn long_name(self) -> &'static str {
        match self {
            Self::CrystfelDiffractor => "crystfel_photon_diffractor",
            Self::PlasmaXrts => "plasma_xrts",
            Self::EstherInteractor => "esther_photon_matter_interactor",
            Self::WavefrontPropagator => "wave_propagator",
        }
    }

    /// Name of the external program a calculator drives by default.
    pub const fn default_executable(self) -> &'static str {
        match self {
            Self::CrystfelDiffractor => "pattern_sim",
            Self::PlasmaXrts => "xrs",
            Self::EstherInteractor => "esther",
            Self::WavefrontPropagator => "python3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized || kind.long_name() == normalized)
    }
}

impl Display for CalculatorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub relative_path: PathBuf,
}

impl Artifact {
    pub fn new(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
        }
    }

    pub fn display_name(&self) -> String {
        self.relative_path.to_string_lossy().replace('\\', "/")
    }
}

/// Process-count settings. These are handed to the MPI launcher untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub cpus_per_task: Option<usize>,
    pub mpi_processes: usize,
    pub mpi_launcher: String,
    pub executable: Option<String>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            cpus_per_task: None,
            mpi_processes: 1,
            mpi_launcher: "mpirun".to_string(),
            executable: None,
        }
    }
}

impl ExecutionSettings {
    pub fn executable_for(&self, kind: CalculatorKind) -> String {
        self.executable
            .clone()
            .unwrap_or_else(|| kind.default_executable().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationRequest {
    pub kind: CalculatorKind,
    pub input_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub work_dir: PathBuf,
    pub execution: ExecutionSettings,
}

impl CalculationRequest {
    pub fn new(
        kind: CalculatorKind,
        input_path: Option<PathBuf>,
        output_path: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            input_path,
            output_path: output_path.into(),
            work_dir: work_dir.into(),
            execution: ExecutionSettings::default(),
        }
    }

    pub fn with_execution(mut self, execution: ExecutionSettings) -> Self {
        self.execution = execution;
        self
    }
}
