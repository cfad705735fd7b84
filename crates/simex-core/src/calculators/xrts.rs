//! Plasma X-ray Thomson scattering through the `xrs` solver.

use super::{
    Calculator, backengine_command, base_layout, not_run_error, write_run_log,
};
use crate::domain::{CalculationRequest, CalculatorKind, SimexError, SimexResult};
use crate::h5::H5Layout;
use crate::logparse::{SCIENTIFIC_AFTER_EQUAL, extract_scalar};
use crate::parameters::xrts::{SourceSpectrum, XRTS_SOURCE_SPECTRUM_NAME};
use crate::parameters::{ParameterSet, PlasmaXrtsParameters};
use crate::process::{ProcessRunner, require_output_file, require_success};
use crate::serialization::ensure_directory;
use crate::table::NumericTable;
use tracing::{info, warn};

pub(crate) const XRTS_OUTPUT_NAME: &str = "xrts_out.txt";
pub(crate) const XRTS_LOG_NAME: &str = "xrts.log";

pub(crate) const EXPECTED_DATA: [&str; 17] = [
    "/data/snp_<7 digit index>/ff",
    "/data/snp_<7 digit index>/halfQ",
    "/data/snp_<7 digit index>/Nph",
    "/data/snp_<7 digit index>/r",
    "/data/snp_<7 digit index>/T",
    "/data/snp_<7 digit index>/Z",
    "/data/snp_<7 digit index>/xyz",
    "/data/snp_<7 digit index>/Sq_halfQ",
    "/data/snp_<7 digit index>/Sq_bound",
    "/data/snp_<7 digit index>/Sq_free",
    "/history/parent/detail",
    "/history/parent/parent",
    "/info/package_version",
    "/info/contact",
    "/info/data_description",
    "/info/method_description",
    "/version",
];

pub(crate) const PROVIDED_DATA: [&str; 31] = [
    "/data/dynamic/energy_shifts",
    "/data/dynamic/Skw_free",
    "/data/dynamic/Skw_bound",
    "/data/dynamic/Skw_total",
    "/data/static/k",
    "/data/static/fk",
    "/data/static/qk",
    "/data/static/Sk_ion",
    "/data/static/Sk_free",
    "/data/static/Sk_core",
    "/data/static/Wk",
    "/data/static/Sk_total",
    "/data/static/ipl",
    "/data/static/lfc",
    "/data/static/debye_waller",
    "/history/parent",
    "/info/package_version",
    "/info/contact",
    "/info/data_description",
    "/info/method_description",
    "/info/units/energy",
    "/info/units/structure_factor",
    "/params/beam/photonEnergy",
    "/params/beam/spectrum",
    "/params/info",
    "/params/calculator",
    "/version",
    "/data/dynamic",
    "/data/static",
    "/info/units",
    "/params/beam",
];

/// Keys under `/data/static` with the log label `xrs` prints them behind.
const STATIC_DATA_LABELS: [(&str, &str); 11] = [
    ("k", r"k\(w=0\)\s+\[m\^-1\]\s+="),
    ("fk", r"f\(k\)\s+="),
    ("qk", r"q\(k\)\s+="),
    ("Sk_ion", r"S_ii\(k\)\s+="),
    ("Sk_free", r"S_ee\^0\(k\)\s+="),
    ("Sk_core", r"Core_inelastic\(k\)\s+="),
    ("Wk", r"Elastic\(k\)\s+="),
    ("Sk_total", r"S_total\(k\)\s+="),
    ("ipl", r"IP depression \[eV\]\s+="),
    ("lfc", r"G\(k\)\s+="),
    ("debye_waller", r"Debye-Waller\s+="),
];

/// Static structure data reported in the `xrs` run log.
#[derive(Debug, Clone, PartialEq)]
pub struct XrtsStaticData {
    values: Vec<(&'static str, f64)>,
}

impl XrtsStaticData {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.values.iter().copied()
    }
}

pub fn parse_static_data(log: &str) -> SimexResult<XrtsStaticData> {
    let values = STATIC_DATA_LABELS
        .iter()
        .map(|(key, label)| {
            extract_scalar(&format!("{label}{SCIENTIFIC_AFTER_EQUAL}"), log)
                .map(|value| (*key, value))
        })
        .collect::<SimexResult<Vec<_>>>()?;
    Ok(XrtsStaticData { values })
}

pub struct PlasmaXrtsCalculator {
    parameters: PlasmaXrtsParameters,
    request: CalculationRequest,
    /// Photon energy offset (eV) and intensity of the incident spectrum.
    source_spectrum: Option<NumericTable>,
    run_data: Option<NumericTable>,
    static_data: Option<XrtsStaticData>,
    run_log: Option<String>,
}

impl PlasmaXrtsCalculator {
    pub fn new(parameters: PlasmaXrtsParameters, request: CalculationRequest) -> Self {
        Self {
            parameters,
            request,
            source_spectrum: None,
            run_data: None,
            static_data: None,
            run_log: None,
        }
    }

    pub fn xrts_parameters(&self) -> &PlasmaXrtsParameters {
        &self.parameters
    }

    /// Columns: energy shift, Skw_free, Skw_bound, Skw_total.
    pub fn data(&self) -> Option<&NumericTable> {
        self.run_data.as_ref()
    }

    pub fn static_data(&self) -> Option<&XrtsStaticData> {
        self.static_data.as_ref()
    }

    pub fn run_log(&self) -> Option<&str> {
        self.run_log.as_deref()
    }

    pub fn source_spectrum(&self) -> Option<&NumericTable> {
        self.source_spectrum.as_ref()
    }

    /// Reads the incident spectrum from the input (photon energy in eV,
    /// intensity) and centres it on the photon energy actually used.
    ///
    /// The source energy is taken at the spectral peak. If the configured
    /// photon energy differs from it, the source energy wins; if the
    /// spectral mean lies more than 1 eV from the source energy, the mean
    /// is used instead. The chosen energy replaces the configured one.
    pub fn load_source_spectrum(&mut self) -> SimexResult<()> {
        let input = self.request.input_path.as_deref().ok_or_else(|| {
            SimexError::input_validation(
                "INPUT.XRTS_SOURCE",
                "a propagated source spectrum needs an input file",
            )
        })?;
        let table = NumericTable::load(input)?;
        if table.columns() != 2 || table.is_empty() {
            return Err(SimexError::input_validation(
                "INPUT.XRTS_SOURCE",
                format!(
                    "source spectrum '{}' must have two columns (photon energy, intensity)",
                    input.display()
                ),
            ));
        }
        let energies = table.column(0).unwrap_or_default();
        let intensities = table.column(1).unwrap_or_default();

        let total: f64 = intensities.iter().sum();
        if total <= 0.0 {
            return Err(SimexError::input_validation(
                "INPUT.XRTS_SOURCE",
                format!("source spectrum '{}' carries no intensity", input.display()),
            ));
        }
        let mean = energies
            .iter()
            .zip(&intensities)
            .map(|(energy, intensity)| energy * intensity)
            .sum::<f64>()
            / total;
        let mut photon_energy = energies
            .iter()
            .zip(&intensities)
            .fold((energies[0], f64::MIN), |peak, (energy, intensity)| {
                if *intensity > peak.1 {
                    (*energy, *intensity)
                } else {
                    peak
                }
            })
            .0;

        if self.parameters.photon_energy != photon_energy {
            warn!(
                parameter = self.parameters.photon_energy,
                source = photon_energy,
                "photon energy parameter differs from the source, using the source photon energy"
            );
        }
        if (mean - photon_energy).abs() > 1.0 {
            warn!(
                source = photon_energy,
                mean, "source photon energy deviates from the spectral mean by more than 1 eV, using the mean"
            );
            photon_energy = mean;
        }
        self.parameters.photon_energy = photon_energy;

        let rows: Vec<Vec<f64>> = energies
            .iter()
            .zip(&intensities)
            .map(|(energy, intensity)| vec![energy - photon_energy, *intensity])
            .collect();
        self.source_spectrum = Some(NumericTable::from_rows(&rows)?);
        Ok(())
    }
}

impl Calculator for PlasmaXrtsCalculator {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::PlasmaXrts
    }

    fn request(&self) -> &CalculationRequest {
        &self.request
    }

    fn parameters(&self) -> &dyn ParameterSet {
        &self.parameters
    }

    fn backengine(&mut self, runner: &dyn ProcessRunner) -> SimexResult<()> {
        let work_dir = self.request.work_dir.clone();
        ensure_directory(&work_dir, "IO.WORK_DIRECTORY")?;

        if self.parameters.source_spectrum == SourceSpectrum::Prop {
            if self.source_spectrum.is_none() {
                self.load_source_spectrum()?;
            }
            if let Some(spectrum) = &self.source_spectrum {
                spectrum.save_tab_delimited(
                    &work_dir.join(XRTS_SOURCE_SPECTRUM_NAME),
                    "IO.XRTS_SOURCE",
                )?;
            }
        }
        self.parameters.write_input_deck(&work_dir)?;

        let command = backengine_command(
            self.request.execution.executable_for(self.kind()),
            &self.request,
            self.parameters.cpus_per_task_default(),
        );
        let output = runner.run(&command)?;
        if !output.stderr_is_empty() {
            return Err(SimexError::computation(
                "RUN.XRTS_BACKENGINE",
                format!("xrs reported errors: {}", output.stderr.trim()),
            ));
        }
        require_success(&output, &command, "RUN.XRTS_BACKENGINE")?;

        let data_path = work_dir.join(XRTS_OUTPUT_NAME);
        require_output_file(&data_path, "IO.XRTS_OUTPUT")?;
        write_run_log(&work_dir, XRTS_LOG_NAME, &output.stdout, "IO.XRTS_LOG")?;

        let table = NumericTable::load(&data_path)?;
        if table.columns() < 4 {
            return Err(SimexError::computation(
                "RUN.XRTS_OUTPUT",
                format!(
                    "'{}' has {} columns, expected energy, Skw_free, Skw_bound and Skw_total",
                    data_path.display(),
                    table.columns()
                ),
            ));
        }
        self.static_data = Some(parse_static_data(&output.stdout)?);
        info!(points = table.rows(), "loaded xrs dynamic structure factor");
        self.run_data = Some(table);
        self.run_log = Some(output.stdout);
        Ok(())
    }

    fn h5_layout(&self) -> SimexResult<H5Layout> {
        let (Some(data), Some(static_data)) = (&self.run_data, &self.static_data) else {
            return Err(not_run_error(self.kind()));
        };

        let mut layout = base_layout(
            &self.parameters,
            "Dynamic and static structure factors of a plasma probed by x-ray Thomson scattering.",
            "Chihara decomposition of the dynamic structure factor as computed by xrs.",
        )?;

        for (index, (name, unit)) in [
            ("energy_shifts", "eV"),
            ("Skw_free", "eV**-1"),
            ("Skw_bound", "eV**-1"),
            ("Skw_total", "eV**-1"),
        ]
        .into_iter()
        .enumerate()
        {
            let path = format!("/data/dynamic/{name}");
            layout.vector(&path, data.column(index).unwrap_or_default())?;
            layout.set_unit(&path, unit)?;
        }

        for (key, value) in static_data.iter() {
            layout.scalar(&format!("/data/static/{key}"), value)?;
        }
        layout.set_unit("/data/static/ipl", "eV")?;

        layout.text("/info/units/energy", "eV")?;
        layout.text("/info/units/structure_factor", "eV**-1")?;
        layout.scalar("/params/beam/photonEnergy", self.parameters.photon_energy)?;
        layout.set_unit("/params/beam/photonEnergy", "eV")?;
        if let Some(spectrum) = &self.source_spectrum {
            layout.matrix(
                "/params/beam/spectrum",
                spectrum.rows(),
                spectrum.columns(),
                spectrum.values().to_vec(),
            )?;
        }
        Ok(layout)
    }
}
