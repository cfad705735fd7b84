use super::{Calculator, backengine_command, base_layout, not_run_error, write_run_log};
use crate::domain::{CalculationRequest, CalculatorKind, SimexError, SimexResult};
use crate::h5::H5Layout;
use crate::parameters::{CrystfelDiffractorParameters, ParameterSet};
use crate::process::{ProcessRunner, require_success};
use crate::serialization::ensure_directory;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub(crate) const PATTERN_PREFIX: &str = "diffr_out";
pub(crate) const CRYSTFEL_LOG_NAME: &str = "pattern_sim.log";

pub(crate) const EXPECTED_DATA: [&str; 1] = ["/data/sample structure (PDB)"];

pub(crate) const PROVIDED_DATA: [&str; 11] = [
    "/data/<7 digit index>/data",
    "/data/<7 digit index>/params",
    "/history/parent",
    "/info/package_version",
    "/info/contact",
    "/info/data_description",
    "/info/method_description",
    "/params/info",
    "/params/calculator",
    "/params/sample",
    "/version",
];

pub struct CrystfelDiffractorCalculator {
    parameters: CrystfelDiffractorParameters,
    request: CalculationRequest,
    /// Pattern files written by `pattern_sim`, in pattern order.
    patterns: Option<Vec<PathBuf>>,
}

impl CrystfelDiffractorCalculator {
    pub fn new(parameters: CrystfelDiffractorParameters, request: CalculationRequest) -> Self {
        Self {
            parameters,
            request,
            patterns: None,
        }
    }

    pub fn patterns(&self) -> Option<&[PathBuf]> {
        self.patterns.as_deref()
    }

    /// Patterns are written next to the output file so the external links
    /// stored in it stay valid after the working directory is removed.
    pub fn pattern_dir(&self) -> PathBuf {
        self.request
            .output_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn sample_path(&self) -> SimexResult<&Path> {
        let sample = self.request.input_path.as_deref().ok_or_else(|| {
            SimexError::input_validation(
                "INPUT.CRYSTFEL_SAMPLE",
                "pattern_sim needs a sample structure (PDB) as input",
            )
        })?;
        if !sample.is_file() {
            return Err(SimexError::io_system(
                "IO.CRYSTFEL_SAMPLE",
                format!("sample structure '{}' does not exist", sample.display()),
            ));
        }
        Ok(sample)
    }
}

/// Files named `<prefix>-<n>.h5` in `dir`, ordered by `n`.
pub(crate) fn collect_patterns(dir: &Path, prefix: &str) -> SimexResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| {
        SimexError::io_system(
            "IO.CRYSTFEL_OUTPUT",
            format!("failed to list pattern directory '{}': {}", dir.display(), source),
        )
    })?;

    let mut numbered: Vec<(u64, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let index = name
                .strip_prefix(prefix)?
                .strip_prefix('-')?
                .strip_suffix(".h5")?
                .parse::<u64>()
                .ok()?;
            Some((index, entry.path()))
        })
        .collect();
    numbered.sort_by_key(|(index, _)| *index);
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}

/// Removes `<prefix>-<n>.h5` files left by an earlier run.
fn remove_stale_patterns(dir: &Path, prefix: &str) -> SimexResult<()> {
    for stale in collect_patterns(dir, prefix)? {
        fs::remove_file(&stale).map_err(|source| {
            SimexError::io_system(
                "IO.CRYSTFEL_OUTPUT",
                format!("failed to remove stale pattern '{}': {}", stale.display(), source),
            )
        })?;
        debug!(pattern = %stale.display(), "removed stale pattern");
    }
    Ok(())
}

impl Calculator for CrystfelDiffractorCalculator {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::CrystfelDiffractor
    }

    fn request(&self) -> &CalculationRequest {
        &self.request
    }

    fn parameters(&self) -> &dyn ParameterSet {
        &self.parameters
    }

    fn backengine(&mut self, runner: &dyn ProcessRunner) -> SimexResult<()> {
        let sample = self.sample_path()?.to_path_buf();
        self.prepare()?;
        let pattern_dir = self.pattern_dir();
        ensure_directory(&pattern_dir, "IO.CRYSTFEL_OUTPUT")?;
        remove_stale_patterns(&pattern_dir, PATTERN_PREFIX)?;

        // pattern_sim runs inside the work dir; hand it absolute paths.
        let absolute = |path: &Path| {
            std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
        };
        let prefix = absolute(pattern_dir.as_path()).join(PATTERN_PREFIX);

        let mut request = self.request.clone();
        if request.execution.mpi_processes <= 1 {
            request.execution.mpi_processes = self.parameters.number_of_mpi_processes;
        }
        let command = backengine_command(
            request.execution.executable_for(self.kind()),
            &request,
            self.parameters.cpus_per_task_default(),
        )
        .args(
            self.parameters
                .pattern_sim_arguments(&absolute(sample.as_path()), &prefix),
        );

        let output = runner.run(&command)?;
        write_run_log(
            &self.request.work_dir,
            CRYSTFEL_LOG_NAME,
            &output.stdout,
            "IO.CRYSTFEL_LOG",
        )?;
        require_success(&output, &command, "RUN.CRYSTFEL_BACKENGINE")?;

        let files = collect_patterns(&pattern_dir, PATTERN_PREFIX)?;
        if files.is_empty() {
            return Err(SimexError::io_system(
                "IO.CRYSTFEL_OUTPUT",
                format!(
                    "pattern_sim wrote no '{}-<n>.h5' files to '{}'",
                    PATTERN_PREFIX,
                    pattern_dir.display()
                ),
            ));
        }
        if files.len() != self.parameters.number_of_diffraction_patterns {
            warn!(
                requested = self.parameters.number_of_diffraction_patterns,
                found = files.len(),
                "pattern_sim wrote an unexpected number of patterns"
            );
        }
        info!(patterns = files.len(), "collected diffraction patterns");
        self.patterns = Some(files);
        Ok(())
    }

    fn h5_layout(&self) -> SimexResult<H5Layout> {
        let patterns = self
            .patterns
            .as_ref()
            .ok_or_else(|| not_run_error(self.kind()))?;

        let mut layout = base_layout(
            &self.parameters,
            "Simulated diffraction patterns of a crystal sample.",
            "Kinematic diffraction from a crystal structure computed by CrystFEL pattern_sim.",
        )?;
        for (index, file) in patterns.iter().enumerate() {
            let name = file
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| file.clone());
            layout.external_link(&format!("/data/{:07}", index + 1), name, "/data")?;
        }
        if let Some(sample) = &self.request.input_path {
            layout.text("/params/sample", sample.to_string_lossy())?;
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::{CRYSTFEL_LOG_NAME, CrystfelDiffractorCalculator, collect_patterns};
    use crate::calculators::Calculator;
    use crate::calculators::testing::{FakeRunner, output};
    use crate::domain::{CalculationRequest, CalculatorKind, ExecutionSettings};
    use crate::h5::H5NodeKind;
    use crate::parameters::CrystfelDiffractorParameters;
    use crate::process::BackengineCommand;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn stage_sample(root: &Path) -> PathBuf {
        let sample = root.join("5udc.pdb");
        std::fs::write(&sample, "CRYST1   80.000   80.000   80.000  90.00  90.00  90.00\n")
            .expect("sample staged");
        sample
    }

    fn parameters(patterns: i64) -> CrystfelDiffractorParameters {
        CrystfelDiffractorParameters::from_value(&json!({
            "number_of_diffraction_patterns": patterns,
            "number_of_MPI_processes": 2,
        }))
        .expect("valid parameters")
    }

    fn option_value(command: &BackengineCommand, flag: &str) -> Option<String> {
        let args = command.arg_strings();
        let index = args.iter().position(|arg| arg == flag)?;
        args.get(index + 1).cloned()
    }

    fn pattern_sim_emulator() -> FakeRunner {
        FakeRunner::new(|command| {
            let prefix = option_value(command, "-o").expect("output prefix");
            let count: usize = option_value(command, "-n")
                .expect("pattern count")
                .parse()
                .expect("numeric count");
            for index in (1..=count).rev() {
                std::fs::write(format!("{prefix}-{index}.h5"), b"HDF").expect("pattern written");
            }
            Ok(output(0, "Simulating patterns\n", ""))
        })
    }

    fn request(root: &Path, sample: Option<PathBuf>) -> CalculationRequest {
        CalculationRequest::new(
            CalculatorKind::CrystfelDiffractor,
            sample,
            root.join("diffr").join("diffr_out.h5"),
            root.join("work"),
        )
    }

    #[test]
    fn backengine_runs_pattern_sim_under_mpi() {
        let temp = TempDir::new().expect("tempdir should be created");
        let sample = stage_sample(temp.path());
        let runner = pattern_sim_emulator();
        let mut calculator =
            CrystfelDiffractorCalculator::new(parameters(3), request(temp.path(), Some(sample)));

        calculator.backengine(&runner).expect("backengine should succeed");

        let command = runner.last_command();
        assert_eq!(command.program, "mpirun");
        assert_eq!(&command.arg_strings()[..3], ["-np", "2", "pattern_sim"]);
        assert!(temp.path().join("work").join(CRYSTFEL_LOG_NAME).is_file());

        let names: Vec<String> = calculator
            .patterns()
            .expect("patterns collected")
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["diffr_out-1.h5", "diffr_out-2.h5", "diffr_out-3.h5"]);
    }

    #[test]
    fn explicit_execution_settings_win_over_parameters() {
        let temp = TempDir::new().expect("tempdir should be created");
        let sample = stage_sample(temp.path());
        let runner = pattern_sim_emulator();
        let request = request(temp.path(), Some(sample)).with_execution(ExecutionSettings {
            mpi_processes: 4,
            mpi_launcher: "srun".to_string(),
            ..ExecutionSettings::default()
        });
        let mut calculator = CrystfelDiffractorCalculator::new(parameters(1), request);

        calculator.backengine(&runner).expect("backengine should succeed");
        assert_eq!(
            &runner.last_command().arg_strings()[..3],
            ["-np", "4", "pattern_sim"]
        );
        assert_eq!(runner.last_command().program, "srun");
    }

    #[test]
    fn layout_links_every_pattern() {
        let temp = TempDir::new().expect("tempdir should be created");
        let sample = stage_sample(temp.path());
        let mut calculator =
            CrystfelDiffractorCalculator::new(parameters(2), request(temp.path(), Some(sample)));
        calculator
            .backengine(&pattern_sim_emulator())
            .expect("backengine");

        let layout = calculator.h5_layout().expect("layout");
        assert_eq!(
            layout.get("/data/0000002").map(|node| &node.kind),
            Some(&H5NodeKind::ExternalLink {
                file: PathBuf::from("diffr_out-2.h5"),
                target: "/data".to_string(),
            })
        );
        assert!(layout.contains("/params/sample"));
        assert!(!layout.contains("/data/0000003"));
    }

    #[test]
    fn sample_structure_is_required() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut calculator =
            CrystfelDiffractorCalculator::new(parameters(1), request(temp.path(), None));
        let error = calculator
            .backengine(&pattern_sim_emulator())
            .expect_err("no sample");
        assert_eq!(error.placeholder(), "INPUT.CRYSTFEL_SAMPLE");

        let mut calculator = CrystfelDiffractorCalculator::new(
            parameters(1),
            request(temp.path(), Some(temp.path().join("missing.pdb"))),
        );
        let error = calculator
            .backengine(&pattern_sim_emulator())
            .expect_err("missing sample");
        assert_eq!(error.placeholder(), "IO.CRYSTFEL_SAMPLE");
    }

    #[test]
    fn no_patterns_is_an_io_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let sample = stage_sample(temp.path());
        let mut calculator =
            CrystfelDiffractorCalculator::new(parameters(1), request(temp.path(), Some(sample)));
        let error = calculator
            .backengine(&FakeRunner::succeeding("nothing written"))
            .expect_err("no patterns");
        assert_eq!(error.placeholder(), "IO.CRYSTFEL_OUTPUT");
    }

    #[test]
    fn patterns_of_earlier_runs_are_not_linked() {
        let temp = TempDir::new().expect("tempdir should be created");
        let sample = stage_sample(temp.path());
        let pattern_dir = temp.path().join("diffr");
        std::fs::create_dir_all(&pattern_dir).expect("pattern dir");
        for index in 1..=3 {
            std::fs::write(pattern_dir.join(format!("diffr_out-{index}.h5")), b"OLD")
                .expect("stale pattern staged");
        }
        let mut calculator =
            CrystfelDiffractorCalculator::new(parameters(1), request(temp.path(), Some(sample)));

        calculator
            .backengine(&pattern_sim_emulator())
            .expect("backengine should succeed");

        assert_eq!(calculator.patterns().expect("patterns").len(), 1);
        assert!(!pattern_dir.join("diffr_out-2.h5").exists());
        assert_eq!(
            std::fs::read(pattern_dir.join("diffr_out-1.h5")).expect("fresh pattern"),
            b"HDF"
        );
        let layout = calculator.h5_layout().expect("layout");
        assert!(layout.contains("/data/0000001"));
        assert!(!layout.contains("/data/0000002"));
    }

    #[test]
    fn relative_beam_files_resolve_from_the_work_dir() {
        let staging = TempDir::new_in(".").expect("tempdir should be created");
        let beam = staging.path().join("simple.beam");
        std::fs::write(&beam, "beam/photon_energy = 9000\n").expect("beam staged");
        assert!(beam.is_relative());

        let temp = TempDir::new().expect("tempdir should be created");
        let sample = stage_sample(temp.path());
        let parameters = CrystfelDiffractorParameters::from_value(&json!({
            "beam_parameter_file": beam.to_str().expect("utf-8"),
        }))
        .expect("valid parameters");
        let runner = FakeRunner::new(|command| {
            let cwd = command.current_dir.clone().expect("pattern_sim runs in the work dir");
            let beam = command
                .arg_strings()
                .iter()
                .find_map(|arg| arg.strip_prefix("--beam=").map(str::to_string))
                .expect("--beam argument");
            assert!(cwd.join(&beam).is_file(), "{beam} not reachable from {}", cwd.display());
            let prefix = option_value(command, "-o").expect("output prefix");
            std::fs::write(format!("{prefix}-1.h5"), b"HDF").expect("pattern written");
            Ok(output(0, "", ""))
        });
        let mut calculator =
            CrystfelDiffractorCalculator::new(parameters, request(temp.path(), Some(sample)));

        calculator.backengine(&runner).expect("backengine should succeed");
    }

    #[test]
    fn patterns_are_ordered_numerically() {
        let temp = TempDir::new().expect("tempdir should be created");
        for name in ["diffr_out-10.h5", "diffr_out-2.h5", "diffr_out-1.h5", "diffr_out.h5", "other-3.h5"] {
            std::fs::write(temp.path().join(name), b"").expect("file staged");
        }
        let files = collect_patterns(temp.path(), "diffr_out").expect("listing");
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["diffr_out-1.h5", "diffr_out-2.h5", "diffr_out-10.h5"]);
    }
}
