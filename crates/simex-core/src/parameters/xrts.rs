use super::ParameterSet;
use super::checks::{
    ParameterError, ParameterMap, check_choice, check_float, check_int, check_non_negative,
    check_positive, check_positive_int, check_string, describe_value, require,
};
use crate::common::elements::{AVOGADRO, atomic_number_for_symbol, atomic_weight};
use crate::domain::{Artifact, CalculatorKind, SimexResult};
use crate::serialization::{format_scientific, write_text_file};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{self, Formatter};
use std::path::Path;
use tracing::debug;

pub const XRTS_DECK_NAME: &str = "xrts_input.txt";
pub const XRTS_SOURCE_SPECTRUM_NAME: &str = "source_spectrum.txt";

pub(crate) const XRTS_PARAMETER_NAMES: [&str; 18] = [
    "elements",
    "photon_energy",
    "scattering_angle",
    "electron_temperature",
    "ion_temperature",
    "electron_density",
    "mass_density",
    "ion_charge",
    "debye_temperature",
    "band_gap",
    "energy_range",
    "model_Sii",
    "model_See",
    "model_Sbf",
    "model_IPL",
    "lfc",
    "source_spectrum",
    "source_spectrum_fwhm",
];

const SII_MODELS: [&str; 4] = ["DH", "OCP", "SOCP", "SOCP+SRR"];
const SEE_MODELS: [&str; 6] = ["RPA", "Lindhard", "static LFC", "dynamic LFC", "BMA", "BMA+sLFC"];
const SBF_MODELS: [&str; 3] = ["IA", "IBA", "HWF"];
const IPL_MODELS: [&str; 3] = ["SP", "EK", "DH"];
const SOURCE_SPECTRA: [&str; 3] = ["GAUSS", "LORENTZ", "PROP"];

const DEFAULT_ENERGY_RANGE: EnergyRange = EnergyRange {
    min: -100.0,
    max: 100.0,
    step: 0.5,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XrtsElement {
    pub symbol: String,
    pub atomic_number: usize,
    pub stoichiometry: usize,
    pub charge: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyRange {
    /// eV, relative to the photon energy.
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl EnergyRange {
    pub fn points(&self) -> usize {
        ((self.max - self.min) / self.step).round() as usize + 1
    }
}

/// Ionization potential lowering: a named model or a fixed shift in eV.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IplModel {
    Model(String),
    Fixed(f64),
}

impl IplModel {
    fn deck_value(&self) -> String {
        match self {
            Self::Model(name) => name.clone(),
            Self::Fixed(value) => format_scientific(*value, 4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceSpectrum {
    Gauss,
    Lorentz,
    Prop,
}

impl SourceSpectrum {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauss => "GAUSS",
            Self::Lorentz => "LORENTZ",
            Self::Prop => "PROP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlasmaXrtsParameters {
    pub elements: Vec<XrtsElement>,
    /// eV
    pub photon_energy: f64,
    /// degrees
    pub scattering_angle: f64,
    /// eV
    pub electron_temperature: f64,
    /// eV
    pub ion_temperature: f64,
    /// cm⁻³
    pub electron_density: f64,
    /// g/cm³
    pub mass_density: f64,
    pub ion_charge: f64,
    /// eV
    pub debye_temperature: Option<f64>,
    /// eV
    pub band_gap: f64,
    pub energy_range: EnergyRange,
    #[serde(rename = "model_Sii")]
    pub model_sii: String,
    #[serde(rename = "model_See")]
    pub model_see: String,
    #[serde(rename = "model_Sbf")]
    pub model_sbf: String,
    #[serde(rename = "model_IPL")]
    pub model_ipl: IplModel,
    pub lfc: f64,
    pub source_spectrum: SourceSpectrum,
    /// eV; not used when the spectrum is read from the input wavefront.
    pub source_spectrum_fwhm: Option<f64>,
}

impl PlasmaXrtsParameters {
    pub fn from_value(value: &Value) -> Result<Self, ParameterError> {
        let map = ParameterMap::new(CalculatorKind::PlasmaXrts.as_str(), value)?;
        map.reject_unknown(&XRTS_PARAMETER_NAMES)?;

        let elements = check_elements(require("elements", map.get("elements"))?)?;
        let photon_energy = positive_float(&map, "photon_energy")?;
        let scattering_angle = positive_float(&map, "scattering_angle")?;
        if scattering_angle >= 180.0 {
            return Err(ParameterError::invalid(
                "scattering_angle",
                "must be below 180 degrees",
                scattering_angle,
            ));
        }
        let electron_temperature = positive_float(&map, "electron_temperature")?;
        let ion_temperature = optional_positive_float(&map, "ion_temperature")?
            .unwrap_or(electron_temperature);

        let ion_charge = match check_float("ion_charge", map.get("ion_charge"))? {
            Some(charge) => check_non_negative("ion_charge", charge)?,
            None => mean_charge(&elements),
        };

        let electron_density = optional_positive_float(&map, "electron_density")?;
        let mass_density = optional_positive_float(&map, "mass_density")?;
        let (electron_density, mass_density) =
            resolve_densities(&elements, ion_charge, electron_density, mass_density)?;

        let debye_temperature = check_float("debye_temperature", map.get("debye_temperature"))?
            .map(|value| check_non_negative("debye_temperature", value))
            .transpose()?;
        let band_gap = check_float("band_gap", map.get("band_gap"))?
            .map(|value| check_non_negative("band_gap", value))
            .transpose()?
            .unwrap_or(0.0);

        let energy_range = check_energy_range(&map)?;

        let model_sii = choice_or_default(&map, "model_Sii", &SII_MODELS)?;
        let model_see = choice_or_default(&map, "model_See", &SEE_MODELS)?;
        let model_sbf = choice_or_default(&map, "model_Sbf", &SBF_MODELS)?;
        let model_ipl = check_ipl_model(map.get("model_IPL"))?;
        let lfc = check_float("lfc", map.get("lfc"))?.unwrap_or(0.0);

        let source_spectrum = match choice_or_default(&map, "source_spectrum", &SOURCE_SPECTRA)?
            .as_str()
        {
            "LORENTZ" => SourceSpectrum::Lorentz,
            "PROP" => SourceSpectrum::Prop,
            _ => SourceSpectrum::Gauss,
        };
        let source_spectrum_fwhm = optional_positive_float(&map, "source_spectrum_fwhm")?;
        if source_spectrum != SourceSpectrum::Prop && source_spectrum_fwhm.is_none() {
            return Err(ParameterError::missing("source_spectrum_fwhm"));
        }

        Ok(Self {
            elements,
            photon_energy,
            scattering_angle,
            electron_temperature,
            ion_temperature,
            electron_density,
            mass_density,
            ion_charge,
            debye_temperature,
            band_gap,
            energy_range,
            model_sii,
            model_see,
            model_sbf,
            model_ipl,
            lfc,
            source_spectrum,
            source_spectrum_fwhm,
        })
    }

    pub fn render_deck(&self) -> String {
        XrtsDeck(self).to_string()
    }
}

fn entry(deck: &mut impl fmt::Write, key: &str, value: f64) -> fmt::Result {
    writeln!(deck, "{:<20} {}", key, format_scientific(value, 4))
}

fn positive_float(map: &ParameterMap<'_>, name: &str) -> Result<f64, ParameterError> {
    let value = require(name, check_float(name, map.get(name))?)?;
    check_positive(name, value)
}

fn optional_positive_float(
    map: &ParameterMap<'_>,
    name: &str,
) -> Result<Option<f64>, ParameterError> {
    check_float(name, map.get(name))?
        .map(|value| check_positive(name, value))
        .transpose()
}

fn choice_or_default(
    map: &ParameterMap<'_>,
    name: &str,
    choices: &[&str],
) -> Result<String, ParameterError> {
    match check_string(name, map.get(name))? {
        Some(value) => check_choice(name, &value, choices).map(str::to_string),
        None => Ok(choices[0].to_string()),
    }
}

fn check_ipl_model(value: Option<&Value>) -> Result<IplModel, ParameterError> {
    match value {
        None => Ok(IplModel::Model(IPL_MODELS[0].to_string())),
        Some(Value::String(name)) => {
            check_choice("model_IPL", name, &IPL_MODELS).map(|name| IplModel::Model(name.to_string()))
        }
        Some(Value::Number(number)) if number.is_f64() => Ok(IplModel::Fixed(
            number.as_f64().unwrap_or_default(),
        )),
        Some(other) => Err(ParameterError::wrong_type(
            "model_IPL",
            "a model name or a float (eV)",
            other,
        )),
    }
}

fn check_energy_range(map: &ParameterMap<'_>) -> Result<EnergyRange, ParameterError> {
    let range = match map.get("energy_range") {
        None => DEFAULT_ENERGY_RANGE,
        Some(Value::Object(fields)) => EnergyRange {
            min: range_field(fields, "min")?,
            max: range_field(fields, "max")?,
            step: range_field(fields, "step")?,
        },
        Some(other) => {
            return Err(ParameterError::wrong_type(
                "energy_range",
                "an object with min, max and step",
                other,
            ));
        }
    };
    check_positive("energy_range.step", range.step)?;
    if range.min >= range.max {
        return Err(ParameterError::invalid(
            "energy_range",
            "must have min < max",
            format!("[{}, {}]", range.min, range.max),
        ));
    }
    Ok(range)
}

fn range_field(fields: &Map<String, Value>, key: &str) -> Result<f64, ParameterError> {
    let name = format!("energy_range.{key}");
    require(&name, check_float(&name, fields.get(key))?)
}

/// `[[symbol, stoichiometry, charge], ...]`
fn check_elements(value: &Value) -> Result<Vec<XrtsElement>, ParameterError> {
    let Value::Array(entries) = value else {
        return Err(ParameterError::wrong_type(
            "elements",
            "a list of [symbol, stoichiometry, charge] entries",
            value,
        ));
    };
    if entries.is_empty() {
        return Err(ParameterError::invalid(
            "elements",
            "must list at least one element",
            "an empty list",
        ));
    }

    entries
        .iter()
        .map(|entry| match entry {
            Value::Array(fields) if fields.len() == 3 => check_element(fields),
            other => Err(ParameterError::wrong_type(
                "elements",
                "[symbol, stoichiometry, charge]",
                other,
            )),
        })
        .collect()
}

fn check_element(fields: &[Value]) -> Result<XrtsElement, ParameterError> {
    let symbol = require("elements.symbol", check_string("elements.symbol", Some(&fields[0]))?)?;
    let atomic_number = atomic_number_for_symbol(&symbol).ok_or_else(|| {
        ParameterError::invalid("elements.symbol", "must be a known chemical element", &symbol)
    })?;
    let stoichiometry = require(
        "elements.stoichiometry",
        check_int("elements.stoichiometry", Some(&fields[1]))?,
    )?;
    let stoichiometry = check_positive_int("elements.stoichiometry", stoichiometry)?;
    let charge = require("elements.charge", check_float("elements.charge", Some(&fields[2]))?)?;
    let charge = check_non_negative("elements.charge", charge)?;
    if charge > atomic_number as f64 {
        return Err(ParameterError::invalid(
            "elements.charge",
            format!("must not exceed the atomic number of {symbol} ({atomic_number})"),
            describe_value(&fields[2]),
        ));
    }
    Ok(XrtsElement {
        symbol,
        atomic_number,
        stoichiometry,
        charge,
    })
}

fn total_stoichiometry(elements: &[XrtsElement]) -> f64 {
    elements.iter().map(|element| element.stoichiometry as f64).sum()
}

/// Stoichiometry-weighted mean charge.
fn mean_charge(elements: &[XrtsElement]) -> f64 {
    let weighted: f64 = elements
        .iter()
        .map(|element| element.stoichiometry as f64 * element.charge)
        .sum();
    weighted / total_stoichiometry(elements)
}

/// Stoichiometry-weighted mean ion mass in g/mol.
fn mean_ion_mass(elements: &[XrtsElement]) -> f64 {
    let weighted: f64 = elements
        .iter()
        .map(|element| {
            element.stoichiometry as f64 * atomic_weight(element.atomic_number).unwrap_or(0.0)
        })
        .sum();
    weighted / total_stoichiometry(elements)
}

/// Fills in whichever of electron density (cm⁻³) and mass density (g/cm³)
/// is missing: `n_e = Z rho N_A / A`.
fn resolve_densities(
    elements: &[XrtsElement],
    ion_charge: f64,
    electron_density: Option<f64>,
    mass_density: Option<f64>,
) -> Result<(f64, f64), ParameterError> {
    let mass = mean_ion_mass(elements);
    match (electron_density, mass_density) {
        (Some(electron_density), Some(mass_density)) => Ok((electron_density, mass_density)),
        (None, Some(mass_density)) if ion_charge > 0.0 => {
            Ok((ion_charge * mass_density * AVOGADRO / mass, mass_density))
        }
        (None, Some(_)) => Err(ParameterError::invalid(
            "ion_charge",
            "must be positive to derive electron_density from mass_density",
            ion_charge,
        )),
        (Some(electron_density), None) if ion_charge > 0.0 => {
            Ok((electron_density, electron_density * mass / (ion_charge * AVOGADRO)))
        }
        (Some(_), None) => Err(ParameterError::missing("mass_density")),
        (None, None) => Err(ParameterError::missing("electron_density")),
    }
}

struct XrtsDeck<'a>(&'a PlasmaXrtsParameters);

impl fmt::Display for XrtsDeck<'_> {
    fn fmt(&self, deck: &mut Formatter<'_>) -> fmt::Result {
        let parameters = self.0;
        writeln!(deck, "--XRTS---input_file-----------------------------------")?;
        writeln!(deck, "--")?;
        writeln!(deck, "--Number-of-components--------------------------------")?;
        writeln!(deck, "NUMBER_OF_ELEMENTS   {}", parameters.elements.len())?;
        writeln!(deck, "--element  Z  stoichiometry  charge  mass[amu]")?;
        for element in &parameters.elements {
            writeln!(
                deck,
                "{:<4} {:>3} {:>4} {} {}",
                element.symbol,
                element.atomic_number,
                element.stoichiometry,
                format_scientific(element.charge, 4),
                format_scientific(atomic_weight(element.atomic_number).unwrap_or(0.0), 4),
            )?;
        }
        writeln!(deck, "--Plasma-parameters-----------------------------------")?;
        entry(deck, "photon_energy", parameters.photon_energy)?;
        entry(deck, "scattering_angle", parameters.scattering_angle)?;
        entry(deck, "electron_temp", parameters.electron_temperature)?;
        entry(deck, "ion_temp", parameters.ion_temperature)?;
        entry(deck, "electron_density", parameters.electron_density)?;
        entry(deck, "mass_density", parameters.mass_density)?;
        entry(deck, "ion_charge", parameters.ion_charge)?;
        if let Some(debye) = parameters.debye_temperature {
            entry(deck, "debye_temp", debye)?;
        }
        entry(deck, "band_gap", parameters.band_gap)?;
        writeln!(deck, "--Energy-grid-----------------------------------------")?;
        entry(deck, "omega_min", parameters.energy_range.min)?;
        entry(deck, "omega_max", parameters.energy_range.max)?;
        entry(deck, "omega_step", parameters.energy_range.step)?;
        writeln!(deck, "--Models----------------------------------------------")?;
        writeln!(deck, "{:<20} {}", "Sii_model", parameters.model_sii)?;
        writeln!(deck, "{:<20} {}", "See_model", parameters.model_see)?;
        writeln!(deck, "{:<20} {}", "Sbf_model", parameters.model_sbf)?;
        writeln!(deck, "{:<20} {}", "IPL_model", parameters.model_ipl.deck_value())?;
        entry(deck, "lfc", parameters.lfc)?;
        writeln!(deck, "--Source----------------------------------------------")?;
        match parameters.source_spectrum {
            SourceSpectrum::Prop => {
                writeln!(
                    deck,
                    "{:<20} PROP {}",
                    "source_spectrum", XRTS_SOURCE_SPECTRUM_NAME
                )?;
            }
            other => {
                writeln!(deck, "{:<20} {}", "source_spectrum", other.as_str())?;
                entry(
                    deck,
                    "source_fwhm",
                    parameters.source_spectrum_fwhm.unwrap_or_default(),
                )?;
            }
        }
        Ok(())
    }
}

impl ParameterSet for PlasmaXrtsParameters {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::PlasmaXrts
    }

    fn write_input_deck(&self, work_dir: &Path) -> SimexResult<Vec<Artifact>> {
        write_text_file(
            &work_dir.join(XRTS_DECK_NAME),
            &self.render_deck(),
            "IO.XRTS_DECK",
        )?;
        debug!(dir = %work_dir.display(), "wrote xrs input deck");
        Ok(vec![Artifact::new(XRTS_DECK_NAME)])
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
