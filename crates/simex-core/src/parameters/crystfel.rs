use super::ParameterSet;
use super::checks::{
    ParameterError, ParameterMap, check_bool, check_float_pair, check_int,
    check_non_negative_int, check_optional_file, check_positive, check_positive_int,
};
use crate::domain::{Artifact, CalculatorKind, SimexResult};
use serde::Serialize;
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

pub(crate) const CRYSTFEL_PARAMETER_NAMES: [&str; 11] = [
    "uniform_rotation",
    "number_of_diffraction_patterns",
    "powder",
    "intensities_file",
    "crystal_size_range",
    "poissonize",
    "number_of_background_photons",
    "suppress_fringes",
    "beam_parameter_file",
    "beam_geometry_file",
    "number_of_MPI_processes",
];

/// Options of a `pattern_sim` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrystfelDiffractorParameters {
    pub uniform_rotation: bool,
    pub number_of_diffraction_patterns: usize,
    pub powder: bool,
    pub intensities_file: Option<PathBuf>,
    pub crystal_size_range: Option<(f64, f64)>,
    pub poissonize: bool,
    pub number_of_background_photons: usize,
    pub suppress_fringes: bool,
    pub beam_parameter_file: Option<PathBuf>,
    pub beam_geometry_file: Option<PathBuf>,
    #[serde(rename = "number_of_MPI_processes")]
    pub number_of_mpi_processes: usize,
}

impl Default for CrystfelDiffractorParameters {
    fn default() -> Self {
        Self {
            uniform_rotation: true,
            number_of_diffraction_patterns: 1,
            powder: false,
            intensities_file: None,
            crystal_size_range: None,
            poissonize: false,
            number_of_background_photons: 0,
            suppress_fringes: false,
            beam_parameter_file: None,
            beam_geometry_file: None,
            number_of_mpi_processes: 1,
        }
    }
}

impl CrystfelDiffractorParameters {
    pub fn from_value(value: &Value) -> Result<Self, ParameterError> {
        let map = ParameterMap::new(CalculatorKind::CrystfelDiffractor.as_str(), value)?;
        map.reject_unknown(&CRYSTFEL_PARAMETER_NAMES)?;
        let defaults = Self::default();

        let number_of_diffraction_patterns =
            match check_int("number_of_diffraction_patterns", map.get("number_of_diffraction_patterns"))? {
                Some(count) => check_positive_int("number_of_diffraction_patterns", count)?,
                None => defaults.number_of_diffraction_patterns,
            };
        let number_of_background_photons =
            match check_int("number_of_background_photons", map.get("number_of_background_photons"))? {
                Some(count) => check_non_negative_int("number_of_background_photons", count)?,
                None => defaults.number_of_background_photons,
            };
        let number_of_mpi_processes =
            match check_int("number_of_MPI_processes", map.get("number_of_MPI_processes"))? {
                Some(count) => check_positive_int("number_of_MPI_processes", count)?,
                None => defaults.number_of_mpi_processes,
            };

        let crystal_size_range =
            match check_float_pair("crystal_size_range", map.get("crystal_size_range"))? {
                Some((min, max)) => {
                    check_positive("crystal_size_range", min)?;
                    Some((min, max))
                }
                None => None,
            };

        let beam_parameter_file =
            check_optional_file("beam_parameter_file", map.get("beam_parameter_file"))?;
        if beam_parameter_file.is_none() {
            warn!("beam parameter file not set, pattern_sim will most probably fail");
        }
        let beam_geometry_file =
            check_optional_file("beam_geometry_file", map.get("beam_geometry_file"))?;
        if beam_geometry_file.is_none() {
            warn!("beam geometry file not set, pattern_sim will most probably fail");
        }

        Ok(Self {
            uniform_rotation: check_bool(
                "uniform_rotation",
                map.get("uniform_rotation"),
                defaults.uniform_rotation,
            )?,
            number_of_diffraction_patterns,
            powder: check_bool("powder", map.get("powder"), defaults.powder)?,
            intensities_file: check_optional_file("intensities_file", map.get("intensities_file"))?,
            crystal_size_range,
            poissonize: check_bool("poissonize", map.get("poissonize"), defaults.poissonize)?,
            number_of_background_photons,
            suppress_fringes: check_bool(
                "suppress_fringes",
                map.get("suppress_fringes"),
                defaults.suppress_fringes,
            )?,
            beam_parameter_file,
            beam_geometry_file,
            number_of_mpi_processes,
        })
    }

    /// Command line of `pattern_sim` for one sample structure. Patterns are
    /// written as `<output_prefix>-<n>.h5`; a powder sum, if requested, goes
    /// to `<output_prefix>_powder.h5`.
    pub fn pattern_sim_arguments(&self, sample: &Path, output_prefix: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-p".into(), sample.as_os_str().to_owned()];
        if let Some(geometry) = &self.beam_geometry_file {
            args.push("-g".into());
            args.push(geometry.as_os_str().to_owned());
        }
        if let Some(beam) = &self.beam_parameter_file {
            args.push(prefixed_path("--beam=", beam));
        }
        args.push("-o".into());
        args.push(output_prefix.as_os_str().to_owned());
        args.push("-n".into());
        args.push(self.number_of_diffraction_patterns.to_string().into());
        if self.uniform_rotation {
            args.push("-r".into());
        }
        if self.powder {
            let mut powder = output_prefix.as_os_str().to_owned();
            powder.push("_powder.h5");
            args.push(prefixed_path("--powder=", Path::new(&powder)));
        }
        if let Some(intensities) = &self.intensities_file {
            args.push("-i".into());
            args.push(intensities.as_os_str().to_owned());
        }
        if let Some((min, max)) = self.crystal_size_range {
            args.push(format!("--min-size={min}").into());
            args.push(format!("--max-size={max}").into());
        }
        if !self.poissonize {
            args.push("--no-noise".into());
        }
        if self.number_of_background_photons > 0 {
            args.push(format!("--background={}", self.number_of_background_photons).into());
        }
        if self.suppress_fringes {
            args.push("--no-fringes".into());
        }
        args
    }
}

fn prefixed_path(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path.as_os_str());
    arg
}

impl ParameterSet for CrystfelDiffractorParameters {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::CrystfelDiffractor
    }

    /// `pattern_sim` takes everything on its command line; nothing to write.
    fn write_input_deck(&self, _work_dir: &Path) -> SimexResult<Vec<Artifact>> {
        Ok(Vec::new())
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
