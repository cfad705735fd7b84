//! Parameters and input deck of the ESTHER laser-matter hydrodynamics code.
//!
//! A target is a stack of layers irradiated from the ablator side:
//! ablator, sample and an optional window behind the sample. When more
//! layers are requested than there are materials, the extra layers
//! subdivide the ablator so the laser deposition zone gets its own meshes.
//!
//! Each `check_*` function validates a single raw JSON value and keeps the
//! type-error / value-error distinction of [`ParameterError`].

use super::ParameterSet;
use super::checks::{
    ParameterError, ParameterMap, check_bool, check_choice, check_float, check_int,
    check_int_range, check_non_negative, check_positive, check_positive_int, check_string,
    check_existing_file, require,
};
use crate::domain::{Artifact, CalculatorKind, SimexError, SimexResult};
use crate::serialization::{format_scientific, write_text_file};
use crate::table::NumericTable;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Formatter};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ESTHER_DECK_NAME: &str = "input.dat";
pub const ESTHER_PULSE_PROFILE_NAME: &str = "intensite_impulsion.dat";

pub(crate) const ESTHER_PARAMETER_NAMES: [&str; 17] = [
    "number_of_layers",
    "ablator",
    "ablator_thickness",
    "sample",
    "sample_thickness",
    "window",
    "window_thickness",
    "laser_wavelength",
    "laser_pulse",
    "laser_pulse_duration",
    "laser_intensity",
    "laser_pulse_profile",
    "run_time",
    "delta_time",
    "zones_per_micron",
    "without_thermal_conduction",
    "radiative_transfer",
];

/// (name accepted in parameters, ESTHER equation-of-state name)
const ABLATORS: [(&str, &str); 5] = [
    ("CH", "CH2_Sesame7171"),
    ("Aluminum", "Al#_Sesame3715"),
    ("Diamond", "C#_Sesame7830"),
    ("Kapton", "Kapton_Sesame7770"),
    ("Mylar", "Mylar_Sesame7770"),
];

const SAMPLES: [(&str, &str); 12] = [
    ("Aluminum", "Al#_Sesame3715"),
    ("CH", "CH2_Sesame7171"),
    ("Copper", "Cu#_Sesame3337"),
    ("Diamond", "C#_Sesame7830"),
    ("Gold", "Au#_Sesame2700"),
    ("Iron", "Fe#_Sesame2140"),
    ("Kapton", "Kapton_Sesame7770"),
    ("LiF", "LiF_Sesame7271"),
    ("Mylar", "Mylar_Sesame7770"),
    ("Silicon", "Si#_Sesame3810"),
    ("Tantalum", "Ta#_Sesame3520"),
    ("Water", "H2O_Sesame7150"),
];

const WINDOWS: [(&str, &str); 4] = [
    ("LiF", "LiF_Sesame7271"),
    ("SiO2", "SiO2_Sesame7386"),
    ("Diamond", "C#_Sesame7830"),
    ("Sapphire", "Al2O3_Sesame7411"),
];

const LASER_PULSES: [&str; 3] = ["flat", "ramp", "other"];

const DEFAULT_DELTA_TIME_NS: f64 = 0.05;
const DEFAULT_ZONES_PER_MICRON: usize = 10;
const RUN_TIME_MARGIN_NS: f64 = 5.0;
const MIN_LAYERS: i64 = 2;
const MAX_LAYERS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaserPulse {
    Flat,
    Ramp,
    Other,
}

impl LaserPulse {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Ramp => "ramp",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstherInteractorParameters {
    pub number_of_layers: usize,
    pub ablator: String,
    /// µm
    pub ablator_thickness: f64,
    pub sample: String,
    /// µm
    pub sample_thickness: f64,
    pub window: Option<String>,
    /// µm
    pub window_thickness: f64,
    /// nm
    pub laser_wavelength: f64,
    pub laser_pulse: LaserPulse,
    /// ns
    pub laser_pulse_duration: f64,
    /// TW/cm²
    pub laser_intensity: f64,
    pub laser_pulse_profile: Option<PathBuf>,
    /// ns
    pub run_time: f64,
    /// ns
    pub delta_time: f64,
    pub zones_per_micron: usize,
    pub without_thermal_conduction: bool,
    pub radiative_transfer: bool,
}

pub fn check_number_of_layers(value: &Value) -> Result<usize, ParameterError> {
    let layers = require("number_of_layers", check_int("number_of_layers", Some(value))?)?;
    let layers = check_int_range("number_of_layers", layers, MIN_LAYERS..=MAX_LAYERS)?;
    check_positive_int("number_of_layers", layers)
}

pub fn check_ablator(value: &Value) -> Result<String, ParameterError> {
    check_material("ablator", value, &ABLATORS)
}

pub fn check_ablator_thickness(value: &Value) -> Result<f64, ParameterError> {
    check_thickness("ablator_thickness", value)
}

pub fn check_sample(value: &Value) -> Result<String, ParameterError> {
    check_material("sample", value, &SAMPLES)
}

pub fn check_sample_thickness(value: &Value) -> Result<f64, ParameterError> {
    check_thickness("sample_thickness", value)
}

pub fn check_window(value: &Value) -> Result<String, ParameterError> {
    check_material("window", value, &WINDOWS)
}

/// Zero is allowed here; whether it fits the chosen window is checked once
/// all parameters are known.
pub fn check_window_thickness(value: &Value) -> Result<f64, ParameterError> {
    let thickness = require(
        "window_thickness",
        check_float("window_thickness", Some(value))?,
    )?;
    check_non_negative("window_thickness", thickness)
}

pub fn check_laser_wavelength(value: &Value) -> Result<f64, ParameterError> {
    check_positive_float("laser_wavelength", value)
}

pub fn check_laser_pulse(value: &Value) -> Result<LaserPulse, ParameterError> {
    let name = require("laser_pulse", check_string("laser_pulse", Some(value))?)?;
    Ok(match check_choice("laser_pulse", &name, &LASER_PULSES)? {
        "flat" => LaserPulse::Flat,
        "ramp" => LaserPulse::Ramp,
        _ => LaserPulse::Other,
    })
}

pub fn check_laser_pulse_duration(value: &Value) -> Result<f64, ParameterError> {
    check_positive_float("laser_pulse_duration", value)
}

pub fn check_laser_intensity(value: &Value) -> Result<f64, ParameterError> {
    check_positive_float("laser_intensity", value)
}

fn check_material(
    name: &str,
    value: &Value,
    table: &[(&'static str, &'static str)],
) -> Result<String, ParameterError> {
    let material = require(name, check_string(name, Some(value))?)?;
    let choices: Vec<&str> = table.iter().map(|(choice, _)| *choice).collect();
    check_choice(name, &material, &choices).map(str::to_string)
}

fn check_thickness(name: &str, value: &Value) -> Result<f64, ParameterError> {
    check_positive_float(name, value)
}

fn check_positive_float(name: &str, value: &Value) -> Result<f64, ParameterError> {
    let number = require(name, check_float(name, Some(value))?)?;
    check_positive(name, number)
}

fn required<'a>(map: &ParameterMap<'a>, name: &str) -> Result<&'a Value, ParameterError> {
    require(name, map.get(name))
}

fn eos_name(table: &[(&'static str, &'static str)], material: &str) -> &'static str {
    table
        .iter()
        .find(|(choice, _)| *choice == material)
        .map(|(_, eos)| *eos)
        .unwrap_or("unknown")
}

impl EstherInteractorParameters {
    pub fn from_value(value: &Value) -> Result<Self, ParameterError> {
        let map = ParameterMap::new(CalculatorKind::EstherInteractor.as_str(), value)?;
        map.reject_unknown(&ESTHER_PARAMETER_NAMES)?;

        let number_of_layers = check_number_of_layers(required(&map, "number_of_layers")?)?;
        let ablator = check_ablator(required(&map, "ablator")?)?;
        let ablator_thickness = check_ablator_thickness(required(&map, "ablator_thickness")?)?;
        let sample = check_sample(required(&map, "sample")?)?;
        let sample_thickness = check_sample_thickness(required(&map, "sample_thickness")?)?;
        let window = map.get("window").map(check_window).transpose()?;
        let window_thickness = map
            .get("window_thickness")
            .map(check_window_thickness)
            .transpose()?
            .unwrap_or(0.0);

        match (&window, window_thickness > 0.0) {
            (Some(_), false) => {
                return Err(ParameterError::invalid(
                    "window_thickness",
                    "must be positive when a window is set",
                    window_thickness,
                ));
            }
            (None, true) => {
                return Err(ParameterError::invalid(
                    "window_thickness",
                    "must be 0.0 when no window is set",
                    window_thickness,
                ));
            }
            _ => {}
        }

        let material_count = if window.is_some() { 3 } else { 2 };
        if number_of_layers < material_count {
            return Err(ParameterError::invalid(
                "number_of_layers",
                format!("must be at least {material_count} for the chosen materials"),
                number_of_layers,
            ));
        }

        let laser_wavelength = check_laser_wavelength(required(&map, "laser_wavelength")?)?;
        let laser_pulse = check_laser_pulse(required(&map, "laser_pulse")?)?;
        let laser_pulse_duration =
            check_laser_pulse_duration(required(&map, "laser_pulse_duration")?)?;
        let laser_intensity = check_laser_intensity(required(&map, "laser_intensity")?)?;

        let laser_pulse_profile = match check_string(
            "laser_pulse_profile",
            map.get("laser_pulse_profile"),
        )? {
            Some(path) => Some(check_existing_file("laser_pulse_profile", &path)?),
            None if laser_pulse == LaserPulse::Other => {
                return Err(ParameterError::missing("laser_pulse_profile"));
            }
            None => None,
        };

        let run_time = match map.get("run_time") {
            Some(raw) => check_positive_float("run_time", raw)?,
            None => laser_pulse_duration + RUN_TIME_MARGIN_NS,
        };
        let delta_time = match map.get("delta_time") {
            Some(raw) => check_positive_float("delta_time", raw)?,
            None => DEFAULT_DELTA_TIME_NS,
        };
        if delta_time >= run_time {
            return Err(ParameterError::invalid(
                "delta_time",
                format!("must be smaller than run_time ({run_time} ns)"),
                delta_time,
            ));
        }
        let zones_per_micron = match check_int("zones_per_micron", map.get("zones_per_micron"))? {
            Some(zones) => check_positive_int("zones_per_micron", zones)?,
            None => DEFAULT_ZONES_PER_MICRON,
        };

        Ok(Self {
            number_of_layers,
            ablator,
            ablator_thickness,
            sample,
            sample_thickness,
            window,
            window_thickness,
            laser_wavelength,
            laser_pulse,
            laser_pulse_duration,
            laser_intensity,
            laser_pulse_profile,
            run_time,
            delta_time,
            zones_per_micron,
            without_thermal_conduction: check_bool(
                "without_thermal_conduction",
                map.get("without_thermal_conduction"),
                false,
            )?,
            radiative_transfer: check_bool(
                "radiative_transfer",
                map.get("radiative_transfer"),
                false,
            )?,
        })
    }

    /// Layers from the laser side inward: (EOS name, thickness in µm).
    pub fn layers(&self) -> Vec<(&'static str, f64)> {
        let material_count = if self.window.is_some() { 3 } else { 2 };
        let ablator_layers = self.number_of_layers.saturating_sub(material_count) + 1;
        let ablator_eos = eos_name(&ABLATORS, &self.ablator);
        let slice = self.ablator_thickness / ablator_layers as f64;

        let mut layers = vec![(ablator_eos, slice); ablator_layers];
        layers.push((eos_name(&SAMPLES, &self.sample), self.sample_thickness));
        if let Some(window) = &self.window {
            layers.push((eos_name(&WINDOWS, window), self.window_thickness));
        }
        layers
    }

    /// Renders `input.dat`. ESTHER lists materials from the rear surface to
    /// the irradiated one, so the layer stack is written in reverse.
    pub fn render_deck(&self) -> String {
        EstherDeck(self).to_string()
    }

    /// Laser intensity (TW/cm²) against time (ns).
    pub fn pulse_profile(&self) -> SimexResult<NumericTable> {
        let duration = self.laser_pulse_duration;
        let intensity = self.laser_intensity;
        let rise = (duration / 10.0).min(0.1);
        let rows = match self.laser_pulse {
            LaserPulse::Flat => vec![
                vec![0.0, 0.0],
                vec![rise, intensity],
                vec![duration - rise, intensity],
                vec![duration, 0.0],
            ],
            LaserPulse::Ramp => vec![
                vec![0.0, 0.0],
                vec![duration, intensity],
                vec![duration + rise, 0.0],
            ],
            LaserPulse::Other => {
                let path = self.laser_pulse_profile.as_deref().ok_or_else(|| {
                    SimexError::from(ParameterError::missing("laser_pulse_profile"))
                })?;
                let table = NumericTable::load(path)?;
                if table.columns() != 2 || table.is_empty() {
                    return Err(SimexError::input_validation(
                        "INPUT.PARAMETER_VALUE",
                        format!(
                            "laser pulse profile '{}' must have two columns (time, intensity)",
                            path.display()
                        ),
                    ));
                }
                return Ok(table);
            }
        };
        NumericTable::from_rows(&rows)
    }
}

struct EstherDeck<'a>(&'a EstherInteractorParameters);

impl fmt::Display for EstherDeck<'_> {
    fn fmt(&self, deck: &mut Formatter<'_>) -> fmt::Result {
        let parameters = self.0;
        writeln!(deck, "// ESTHER input deck")?;
        writeln!(deck)?;
        for (eos, thickness) in parameters.layers().into_iter().rev() {
            let meshes =
                ((thickness * parameters.zones_per_micron as f64).ceil() as usize).max(1);
            writeln!(deck, "NOM_MATERIAU={eos}")?;
            writeln!(
                deck,
                "EPAISSEUR_COUCHE={}",
                format_scientific(thickness * 1.0e-6, 6)
            )?;
            writeln!(deck, "NOMBRE_MAILLES={meshes}")?;
            if parameters.without_thermal_conduction {
                writeln!(deck, "SANS_CONDUCTION_THERMIQUE")?;
            }
            writeln!(deck)?;
        }
        writeln!(deck, "DEPOT_ENERGIE,LASER,DEPOT_HELMHOLTZ")?;
        writeln!(
            deck,
            "LONGUEUR_ONDE_LASER={}",
            format_scientific(parameters.laser_wavelength * 1.0e-9, 6)
        )?;
        writeln!(deck, "PROFIL_IMPULSION={}", parameters.laser_pulse.as_str())?;
        writeln!(
            deck,
            "DUREE_IMPULSION={}",
            format_scientific(parameters.laser_pulse_duration * 1.0e-9, 6)
        )?;
        writeln!(
            deck,
            "INTENSITE_IMPUL_MAX={}",
            format_scientific(parameters.laser_intensity * 1.0e16, 6)
        )?;
        writeln!(deck, "FICHIER_IMPULSION={ESTHER_PULSE_PROFILE_NAME}")?;
        if parameters.radiative_transfer {
            writeln!(deck, "TRANSFERT_RADIATIF")?;
        }
        writeln!(deck)?;
        writeln!(
            deck,
            "TEMPS_MAX={}",
            format_scientific(parameters.run_time * 1.0e-9, 6)
        )?;
        writeln!(
            deck,
            "PAS_DE_TEMPS={}",
            format_scientific(parameters.delta_time * 1.0e-9, 6)
        )?;
        writeln!(deck, "SORTIES_TEXTE")?;
        Ok(())
    }
}

impl ParameterSet for EstherInteractorParameters {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::EstherInteractor
    }

    fn write_input_deck(&self, work_dir: &Path) -> SimexResult<Vec<Artifact>> {
        write_text_file(
            &work_dir.join(ESTHER_DECK_NAME),
            &self.render_deck(),
            "IO.ESTHER_DECK",
        )?;
        self.pulse_profile()?
            .save_tab_delimited(&work_dir.join(ESTHER_PULSE_PROFILE_NAME), "IO.ESTHER_DECK")?;
        debug!(dir = %work_dir.display(), "wrote ESTHER input deck");
        Ok(vec![
            Artifact::new(ESTHER_DECK_NAME),
            Artifact::new(ESTHER_PULSE_PROFILE_NAME),
        ])
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
