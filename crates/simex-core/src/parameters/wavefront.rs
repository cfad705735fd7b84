use super::ParameterSet;
use super::checks::{
    ParameterError, ParameterMap, check_bool, check_existing_file, check_string, require,
};
use crate::domain::{Artifact, CalculatorKind, SimexResult};
use serde::Serialize;
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub(crate) const WAVEFRONT_PARAMETER_NAMES: [&str; 3] = ["beamline_script", "python", "use_opmd"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavefrontPropagatorParameters {
    /// Python module that sets up the beamline and propagates the wavefront.
    pub beamline_script: PathBuf,
    pub python: String,
    /// Also write openPMD output next to the WPG file.
    pub use_opmd: bool,
}

impl WavefrontPropagatorParameters {
    pub fn from_value(value: &Value) -> Result<Self, ParameterError> {
        let map = ParameterMap::new(CalculatorKind::WavefrontPropagator.as_str(), value)?;
        map.reject_unknown(&WAVEFRONT_PARAMETER_NAMES)?;

        let script = require(
            "beamline_script",
            check_string("beamline_script", map.get("beamline_script"))?,
        )?;
        let python = check_string("python", map.get("python"))?
            .unwrap_or_else(|| CalculatorKind::WavefrontPropagator.default_executable().to_string());
        if python.trim().is_empty() {
            return Err(ParameterError::invalid(
                "python",
                "must name an interpreter",
                "an empty string",
            ));
        }

        Ok(Self {
            beamline_script: check_existing_file("beamline_script", &script)?,
            python,
            use_opmd: check_bool("use_opmd", map.get("use_opmd"), false)?,
        })
    }

    pub fn script_arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.beamline_script.as_os_str().to_owned(),
            "--input".into(),
            input.as_os_str().to_owned(),
            "--output".into(),
            output.as_os_str().to_owned(),
        ];
        if self.use_opmd {
            args.push("--opmd".into());
        }
        args
    }
}

impl ParameterSet for WavefrontPropagatorParameters {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::WavefrontPropagator
    }

    fn write_input_deck(&self, _work_dir: &Path) -> SimexResult<Vec<Artifact>> {
        Ok(Vec::new())
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::WavefrontPropagatorParameters;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn script_must_exist() {
        let error = WavefrontPropagatorParameters::from_value(
            &json!({"beamline_script": "nowhere/beamline.py"}),
        )
        .expect_err("missing script");
        assert!(error.to_string().contains("nowhere/beamline.py"));

        let error = WavefrontPropagatorParameters::from_value(&json!({})).expect_err("unset");
        assert!(error.to_string().contains("beamline_script"));
    }

    #[test]
    fn arguments_follow_the_script() {
        let temp = TempDir::new().expect("tempdir should be created");
        let script = temp.path().join("beamline.py");
        std::fs::write(&script, "print('propagate')\n").expect("script staged");

        let parameters = WavefrontPropagatorParameters::from_value(&json!({
            "beamline_script": script.to_str().expect("utf-8"),
            "use_opmd": true,
        }))
        .expect("valid");
        assert_eq!(parameters.python, "python3");

        let args: Vec<String> = parameters
            .script_arguments(Path::new("source.h5"), Path::new("prop_out.h5"))
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                script.to_string_lossy().into_owned(),
                "--input".to_string(),
                "source.h5".to_string(),
                "--output".to_string(),
                "prop_out.h5".to_string(),
                "--opmd".to_string(),
            ]
        );
    }

    #[test]
    fn interpreter_must_not_be_blank() {
        let temp = TempDir::new().expect("tempdir should be created");
        let script = temp.path().join("beamline.py");
        std::fs::write(&script, "").expect("script staged");
        let error = WavefrontPropagatorParameters::from_value(&json!({
            "beamline_script": script.to_str().expect("utf-8"),
            "python": "  ",
        }))
        .expect_err("blank interpreter");
        assert!(error.is_value_error());
    }
}
