//! Laser-driven shock simulations with ESTHER.
//!
//! ESTHER writes one text table per quantity, `<deck>_<quantity>.txt`, with
//! the time in seconds in the first column and one column per Lagrangian
//! zone after it. All quantities are written in SI units; time is stored in
//! ns and pressure in GPa.

use super::{Calculator, backengine_command, base_layout, not_run_error, write_run_log};
use crate::domain::{CalculationRequest, CalculatorKind, SimexError, SimexResult};
use crate::h5::H5Layout;
use crate::parameters::esther::ESTHER_DECK_NAME;
use crate::parameters::{EstherInteractorParameters, ParameterSet};
use crate::process::{ProcessRunner, require_output_file, require_success};
use crate::table::NumericTable;
use std::path::Path;
use tracing::info;

pub(crate) const ESTHER_LOG_NAME: &str = "esther.log";

pub(crate) const PROVIDED_DATA: [&str; 13] = [
    "/data/time",
    "/data/position",
    "/data/velocity",
    "/data/density",
    "/data/pressure",
    "/data/temperature",
    "/history/parent",
    "/info/package_version",
    "/info/contact",
    "/info/data_description",
    "/info/method_description",
    "/params/info",
    "/version",
];

/// (file suffix, dataset name, unit, divisor from SI to the stored unit)
const QUANTITIES: [(&str, &str, &str, f64); 5] = [
    ("position", "position", "m", 1.0),
    ("vitesse", "velocity", "m/s", 1.0),
    ("densite_massique", "density", "kg/m**3", 1.0),
    ("pression", "pressure", "GPa", 1.0e9),
    ("temperature_kelvin", "temperature", "K", 1.0),
];

const SECONDS_PER_NS: f64 = 1.0e-9;

/// Zone-resolved hydrodynamic history; every table is time × zones.
#[derive(Debug, Clone, PartialEq)]
pub struct EstherResults {
    /// ns
    pub time: Vec<f64>,
    pub fields: Vec<(&'static str, &'static str, NumericTable)>,
}

impl EstherResults {
    pub fn field(&self, name: &str) -> Option<&NumericTable> {
        self.fields
            .iter()
            .find(|(field, _, _)| *field == name)
            .map(|(_, _, table)| table)
    }

    pub fn zones(&self) -> usize {
        self.fields
            .first()
            .map(|(_, _, table)| table.columns())
            .unwrap_or(0)
    }

    pub fn load(dir: &Path, deck_stem: &str) -> SimexResult<Self> {
        let mut time: Option<Vec<f64>> = None;
        let mut fields: Vec<(&'static str, &'static str, NumericTable)> =
            Vec::with_capacity(QUANTITIES.len());

        for (suffix, name, unit, divisor) in QUANTITIES {
            let path = dir.join(format!("{deck_stem}_{suffix}.txt"));
            require_output_file(&path, "IO.ESTHER_OUTPUT")?;
            let table = NumericTable::load(&path)?;
            let Some((times, block)) = table.split_first_column() else {
                return Err(inconsistent(&path, "the table is empty"));
            };
            if block.columns() == 0 {
                return Err(inconsistent(&path, "no zone columns after the time column"));
            }

            match &time {
                None => {
                    time = Some(times.iter().map(|t| t / SECONDS_PER_NS).collect());
                }
                Some(reference) if reference.len() != times.len() => {
                    return Err(inconsistent(
                        &path,
                        &format!("{} time steps, expected {}", times.len(), reference.len()),
                    ));
                }
                Some(_) => {}
            }
            if let Some((_, _, first)) = fields.first() {
                if first.columns() != block.columns() {
                    return Err(inconsistent(
                        &path,
                        &format!("{} zones, expected {}", block.columns(), first.columns()),
                    ));
                }
            }

            let scaled = if divisor == 1.0 {
                block
            } else {
                let rows: Vec<Vec<f64>> = block
                    .values()
                    .chunks(block.columns())
                    .map(|row| row.iter().map(|value| value / divisor).collect())
                    .collect();
                NumericTable::from_rows(&rows)?
            };
            fields.push((name, unit, scaled));
        }

        Ok(Self {
            time: time.unwrap_or_default(),
            fields,
        })
    }
}

fn inconsistent(path: &Path, detail: &str) -> SimexError {
    SimexError::computation(
        "RUN.ESTHER_OUTPUT",
        format!("inconsistent ESTHER output '{}': {}", path.display(), detail),
    )
}

pub struct EstherInteractorCalculator {
    parameters: EstherInteractorParameters,
    request: CalculationRequest,
    results: Option<EstherResults>,
}

impl EstherInteractorCalculator {
    pub fn new(parameters: EstherInteractorParameters, request: CalculationRequest) -> Self {
        Self {
            parameters,
            request,
            results: None,
        }
    }

    pub fn results(&self) -> Option<&EstherResults> {
        self.results.as_ref()
    }
}

impl Calculator for EstherInteractorCalculator {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::EstherInteractor
    }

    fn request(&self) -> &CalculationRequest {
        &self.request
    }

    fn parameters(&self) -> &dyn ParameterSet {
        &self.parameters
    }

    fn backengine(&mut self, runner: &dyn ProcessRunner) -> SimexResult<()> {
        self.prepare()?;
        let work_dir = self.request.work_dir.clone();

        let command = backengine_command(
            self.request.execution.executable_for(self.kind()),
            &self.request,
            self.parameters.cpus_per_task_default(),
        )
        .arg(ESTHER_DECK_NAME);
        let output = runner.run(&command)?;
        write_run_log(&work_dir, ESTHER_LOG_NAME, &output.stdout, "IO.ESTHER_LOG")?;
        require_success(&output, &command, "RUN.ESTHER_BACKENGINE")?;

        let deck_stem = Path::new(ESTHER_DECK_NAME)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let results = EstherResults::load(&work_dir, &deck_stem)?;
        info!(
            steps = results.time.len(),
            zones = results.zones(),
            "loaded ESTHER hydrodynamic history"
        );
        self.results = Some(results);
        Ok(())
    }

    fn h5_layout(&self) -> SimexResult<H5Layout> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| not_run_error(self.kind()))?;

        let mut layout = base_layout(
            &self.parameters,
            "Zone-resolved hydrodynamic history of a laser-irradiated multilayer target.",
            "One-dimensional Lagrangian hydrodynamics with laser energy deposition (ESTHER).",
        )?;
        layout.vector("/data/time", results.time.clone())?;
        layout.set_unit("/data/time", "ns")?;
        for (name, unit, table) in &results.fields {
            let path = format!("/data/{name}");
            layout.matrix(&path, table.rows(), table.columns(), table.values().to_vec())?;
            layout.set_unit(&path, unit)?;
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::{ESTHER_LOG_NAME, EstherInteractorCalculator};
    use crate::calculators::Calculator;
    use crate::calculators::testing::{FakeRunner, output};
    use crate::domain::{CalculationRequest, CalculatorKind};
    use crate::h5::H5Data;
    use crate::parameters::EstherInteractorParameters;
    use crate::parameters::esther::{ESTHER_DECK_NAME, ESTHER_PULSE_PROFILE_NAME};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    const QUANTITY_FILES: [&str; 5] = [
        "position",
        "vitesse",
        "densite_massique",
        "pression",
        "temperature_kelvin",
    ];

    fn parameters() -> EstherInteractorParameters {
        EstherInteractorParameters::from_value(&json!({
            "number_of_layers": 2,
            "ablator": "CH",
            "ablator_thickness": 10.0,
            "sample": "Iron",
            "sample_thickness": 20.0,
            "laser_wavelength": 800.0,
            "laser_pulse": "flat",
            "laser_pulse_duration": 1.0,
            "laser_intensity": 0.1,
        }))
        .expect("valid parameters")
    }

    fn request(root: &Path) -> CalculationRequest {
        CalculationRequest::new(
            CalculatorKind::EstherInteractor,
            None,
            root.join("esther_out.h5"),
            root.join("esther_run"),
        )
    }

    fn esther_emulator(skip: Option<&'static str>) -> FakeRunner {
        FakeRunner::new(move |command| {
            let dir = command.current_dir.clone().expect("esther runs in the work dir");
            assert!(dir.join(ESTHER_DECK_NAME).is_file());
            assert!(dir.join(ESTHER_PULSE_PROFILE_NAME).is_file());
            for quantity in QUANTITY_FILES {
                if Some(quantity) == skip {
                    continue;
                }
                let value = if quantity == "pression" { 2.0e9 } else { 1.0 };
                std::fs::write(
                    dir.join(format!("input_{quantity}.txt")),
                    format!("0.0 {value} {value} {value}\n1.0e-9 {value} {value} {value}\n"),
                )
                .expect("output written");
            }
            Ok(output(0, " ESTHER: run finished\n", ""))
        })
    }

    #[test]
    fn backengine_runs_esther_on_the_deck() {
        let temp = TempDir::new().expect("tempdir should be created");
        let runner = esther_emulator(None);
        let mut calculator = EstherInteractorCalculator::new(parameters(), request(temp.path()));

        calculator.backengine(&runner).expect("backengine should succeed");

        let command = runner.last_command();
        assert_eq!(command.program, "esther");
        assert_eq!(command.arg_strings(), vec![ESTHER_DECK_NAME.to_string()]);
        assert!(temp.path().join("esther_run").join(ESTHER_LOG_NAME).is_file());

        let results = calculator.results().expect("results loaded");
        assert_eq!(results.time.len(), 2);
        assert!((results.time[1] - 1.0).abs() < 1.0e-12);
        assert_eq!(results.zones(), 3);
        assert_eq!(
            results.field("pressure").expect("pressure").values(),
            &[2.0; 6]
        );
    }

    #[test]
    fn layout_holds_time_and_zone_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut calculator = EstherInteractorCalculator::new(parameters(), request(temp.path()));
        calculator.backengine(&esther_emulator(None)).expect("backengine");

        let layout = calculator.h5_layout().expect("layout");
        for path in calculator.provided_data() {
            assert!(layout.contains(path), "{path} should be in the layout");
        }
        assert!(matches!(
            layout.data("/data/velocity"),
            Some(H5Data::Matrix { rows: 2, columns: 3, .. })
        ));
    }

    #[test]
    fn missing_quantity_file_is_reported() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut calculator = EstherInteractorCalculator::new(parameters(), request(temp.path()));

        let error = calculator
            .backengine(&esther_emulator(Some("temperature_kelvin")))
            .expect_err("temperature missing");
        assert_eq!(error.placeholder(), "IO.ESTHER_OUTPUT");
        assert!(error.message().contains("input_temperature_kelvin.txt"));
    }

    #[test]
    fn failing_esther_is_a_computation_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let runner = FakeRunner::new(|_| Ok(output(1, "", "unknown EOS\n")));
        let mut calculator = EstherInteractorCalculator::new(parameters(), request(temp.path()));

        let error = calculator.backengine(&runner).expect_err("exit code 1");
        assert_eq!(error.placeholder(), "RUN.ESTHER_BACKENGINE");
        assert!(error.message().contains("unknown EOS"));
    }
}
