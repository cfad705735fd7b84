//! Check-and-set helpers for parameters read from JSON.
//!
//! Every helper distinguishes a wrong JSON type (`ParameterError::WrongType`)
//! from a well-typed value that violates a constraint
//! (`ParameterError::InvalidValue`). Integers are not accepted where a float
//! is expected: `1` is a type error, `1.0` is not.

use crate::domain::SimexError;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("parameter '{name}' must be {expected}, got {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: String,
    },
    #[error("parameter '{name}' {constraint}, got {value}")]
    InvalidValue {
        name: String,
        constraint: String,
        value: String,
    },
    #[error("unknown parameter '{name}' for the {calculator} calculator")]
    Unknown {
        name: String,
        calculator: &'static str,
    },
    #[error("required parameter '{name}' is not set")]
    Missing { name: String },
    #[error("parameter '{name}' points to '{}', which is not a valid file", .path.display())]
    MissingFile { name: String, path: PathBuf },
}

impl ParameterError {
    pub fn wrong_type(name: &str, expected: &'static str, found: &Value) -> Self {
        Self::WrongType {
            name: name.to_string(),
            expected,
            found: describe_value(found),
        }
    }

    pub fn invalid(name: &str, constraint: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            constraint: constraint.into(),
            value: value.to_string(),
        }
    }

    pub fn missing(name: &str) -> Self {
        Self::Missing {
            name: name.to_string(),
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::WrongType { .. })
    }

    pub fn is_value_error(&self) -> bool {
        matches!(self, Self::InvalidValue { .. })
    }
}

impl From<ParameterError> for SimexError {
    fn from(error: ParameterError) -> Self {
        let placeholder = match &error {
            ParameterError::WrongType { .. } => "INPUT.PARAMETER_TYPE",
            ParameterError::InvalidValue { .. } => "INPUT.PARAMETER_VALUE",
            ParameterError::Unknown { .. } => "INPUT.PARAMETER_UNKNOWN",
            ParameterError::Missing { .. } => "INPUT.PARAMETER_MISSING",
            ParameterError::MissingFile { .. } => {
                return SimexError::io_system("IO.PARAMETER_FILE", error.to_string());
            }
        };
        SimexError::input_validation(placeholder, error.to_string())
    }
}

pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => format!("boolean {flag}"),
        Value::Number(number) if number.is_f64() => format!("float {number}"),
        Value::Number(number) => format!("integer {number}"),
        Value::String(text) => format!("string {text:?}"),
        Value::Array(items) => format!("list of {} items", items.len()),
        Value::Object(_) => "object".to_string(),
    }
}

/// Borrowed view over the `parameters` object of a run configuration.
#[derive(Debug, Clone, Copy)]
pub struct ParameterMap<'a> {
    calculator: &'static str,
    values: &'a Map<String, Value>,
}

impl<'a> ParameterMap<'a> {
    pub fn new(calculator: &'static str, value: &'a Value) -> Result<Self, ParameterError> {
        match value {
            Value::Object(values) => Ok(Self { calculator, values }),
            other => Err(ParameterError::wrong_type("parameters", "an object", other)),
        }
    }

    pub fn reject_unknown(&self, known: &[&str]) -> Result<(), ParameterError> {
        match self.values.keys().find(|key| !known.contains(&key.as_str())) {
            Some(unknown) => Err(ParameterError::Unknown {
                name: unknown.clone(),
                calculator: self.calculator,
            }),
            None => Ok(()),
        }
    }

    /// `null` is treated the same as an absent key.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }
}

pub fn require<T>(name: &str, value: Option<T>) -> Result<T, ParameterError> {
    value.ok_or_else(|| ParameterError::missing(name))
}

pub fn check_bool(name: &str, value: Option<&Value>, default: bool) -> Result<bool, ParameterError> {
    match value {
        None => Ok(default),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(ParameterError::wrong_type(name, "a boolean", other)),
    }
}

pub fn check_int(name: &str, value: Option<&Value>) -> Result<Option<i64>, ParameterError> {
    match value {
        None => Ok(None),
        Some(Value::Number(number)) if !number.is_f64() => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| ParameterError::invalid(name, "does not fit a 64-bit integer", number)),
        Some(other) => Err(ParameterError::wrong_type(name, "an integer", other)),
    }
}

pub fn check_float(name: &str, value: Option<&Value>) -> Result<Option<f64>, ParameterError> {
    match value {
        None => Ok(None),
        Some(Value::Number(number)) if number.is_f64() => Ok(number.as_f64()),
        Some(other) => Err(ParameterError::wrong_type(name, "a float", other)),
    }
}

pub fn check_string(name: &str, value: Option<&Value>) -> Result<Option<String>, ParameterError> {
    match value {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(ParameterError::wrong_type(name, "a string", other)),
    }
}

/// A two-element `[min, max]` list of floats with `min <= max`.
pub fn check_float_pair(
    name: &str,
    value: Option<&Value>,
) -> Result<Option<(f64, f64)>, ParameterError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let items = match value {
        Value::Array(items) if items.len() == 2 => items,
        other => {
            return Err(ParameterError::wrong_type(
                name,
                "a list of two floats",
                other,
            ));
        }
    };

    let lower = check_float(name, Some(&items[0]))?.unwrap_or_default();
    let upper = check_float(name, Some(&items[1]))?.unwrap_or_default();
    if lower > upper {
        return Err(ParameterError::invalid(
            name,
            "must be ordered as [min, max]",
            format!("[{lower}, {upper}]"),
        ));
    }
    Ok(Some((lower, upper)))
}

pub fn check_choice<'c>(
    name: &str,
    value: &str,
    choices: &'c [&'c str],
) -> Result<&'c str, ParameterError> {
    choices
        .iter()
        .copied()
        .find(|choice| *choice == value)
        .ok_or_else(|| {
            ParameterError::invalid(
                name,
                format!("must be one of {}", choices.join(", ")),
                format!("{value:?}"),
            )
        })
}

pub fn check_int_range(
    name: &str,
    value: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, ParameterError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ParameterError::invalid(
            name,
            format!("must be between {} and {}", range.start(), range.end()),
            value,
        ))
    }
}

pub fn check_positive_int(name: &str, value: i64) -> Result<usize, ParameterError> {
    if value > 0 {
        Ok(value as usize)
    } else {
        Err(ParameterError::invalid(name, "must be a positive integer", value))
    }
}

pub fn check_non_negative_int(name: &str, value: i64) -> Result<usize, ParameterError> {
    if value >= 0 {
        Ok(value as usize)
    } else {
        Err(ParameterError::invalid(name, "must not be negative", value))
    }
}

pub fn check_positive(name: &str, value: f64) -> Result<f64, ParameterError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ParameterError::invalid(name, "must be positive", value))
    }
}

pub fn check_non_negative(name: &str, value: f64) -> Result<f64, ParameterError> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ParameterError::invalid(name, "must not be negative", value))
    }
}

/// Backengines run inside their work directory, so the checked file is
/// returned as an absolute path.
pub fn check_existing_file(name: &str, path: &str) -> Result<PathBuf, ParameterError> {
    let path = Path::new(path);
    let missing = || ParameterError::MissingFile {
        name: name.to_string(),
        path: path.to_path_buf(),
    };
    if !path.is_file() {
        return Err(missing());
    }
    std::path::absolute(path).map_err(|_| missing())
}

pub fn check_optional_file(
    name: &str,
    value: Option<&Value>,
) -> Result<Option<PathBuf>, ParameterError> {
    check_string(name, value)?
        .map(|path| check_existing_file(name, &path))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::{
        ParameterError, ParameterMap, check_bool, check_choice, check_existing_file,
        check_float, check_float_pair, check_int, check_int_range, check_positive,
        check_string, require,
    };
    use crate::domain::{SimexError, SimexErrorCategory};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn integer_check_rejects_floats_strings_and_lists() {
        for value in [json!("one"), json!("1"), json!([1, 2]), json!(10.5), json!({"1": "one"})]
        {
            let error = check_int("number_of_layers", Some(&value)).expect_err("type error");
            assert!(error.is_type_error(), "{value} should be a type error");
        }
        assert_eq!(check_int("n", Some(&json!(3))).expect("int"), Some(3));
        assert_eq!(check_int("n", Some(&json!(-3))).expect("int"), Some(-3));
        assert_eq!(check_int("n", None).expect("unset"), None);
    }

    #[test]
    fn float_check_rejects_integers() {
        let error = check_float("ablator_thickness", Some(&json!(1))).expect_err("type error");
        assert!(error.is_type_error());
        assert!(error.to_string().contains("integer 1"));

        for value in [json!("ten microns"), json!([10.0, 10.0])] {
            assert!(
                check_float("ablator_thickness", Some(&value))
                    .expect_err("type error")
                    .is_type_error()
            );
        }
        assert_eq!(
            check_float("ablator_thickness", Some(&json!(10.0))).expect("float"),
            Some(10.0)
        );
    }

    #[test]
    fn bool_and_string_checks_apply_defaults() {
        assert!(check_bool("powder", None, true).expect("default"));
        assert!(!check_bool("powder", Some(&json!(false)), true).expect("explicit"));
        assert!(
            check_bool("powder", Some(&json!(1)), false)
                .expect_err("int is not bool")
                .is_type_error()
        );
        assert_eq!(check_string("sample", None).expect("unset"), None);
        assert!(
            check_string("sample", Some(&json!(1.5)))
                .expect_err("float is not string")
                .is_type_error()
        );
    }

    #[test]
    fn float_pair_requires_ordered_floats() {
        assert_eq!(
            check_float_pair("crystal_size_range", Some(&json!([10.0, 20.0]))).expect("pair"),
            Some((10.0, 20.0))
        );
        assert!(
            check_float_pair("crystal_size_range", Some(&json!([20.0, 10.0])))
                .expect_err("unordered")
                .is_value_error()
        );
        assert!(
            check_float_pair("crystal_size_range", Some(&json!([10.0])))
                .expect_err("short list")
                .is_type_error()
        );
        assert!(
            check_float_pair("crystal_size_range", Some(&json!([10, 20])))
                .expect_err("integers")
                .is_type_error()
        );
    }

    #[test]
    fn choice_and_range_checks_report_value_errors() {
        assert_eq!(
            check_choice("laser_pulse", "ramp", &["flat", "ramp", "other"]).expect("choice"),
            "ramp"
        );
        let error = check_choice("laser_pulse", "rectangular", &["flat", "ramp", "other"])
            .expect_err("unknown choice");
        assert!(error.is_value_error());
        assert!(error.to_string().contains("flat, ramp, other"));

        assert!(check_int_range("number_of_layers", 6, 2..=5).is_err());
        assert_eq!(check_int_range("number_of_layers", 3, 2..=5).expect("in range"), 3);
        assert!(check_positive("laser_intensity", -1.0).is_err());
        assert!(check_positive("laser_intensity", f64::NAN).is_err());
    }

    #[test]
    fn parameter_map_rejects_unknown_keys_and_ignores_nulls() {
        let raw = json!({"powder": true, "window": null, "colour": "red"});
        let map = ParameterMap::new("crystfel", &raw).expect("object");
        assert!(map.get("window").is_none());
        assert_eq!(map.get("powder"), Some(&json!(true)));

        let error = map
            .reject_unknown(&["powder", "window"])
            .expect_err("colour is unknown");
        assert_eq!(
            error,
            ParameterError::Unknown {
                name: "colour".to_string(),
                calculator: "crystfel",
            }
        );

        assert!(
            ParameterMap::new("crystfel", &json!([1, 2]))
                .expect_err("not an object")
                .is_type_error()
        );
    }

    #[test]
    fn file_checks_and_error_conversion() {
        let temp = TempDir::new().expect("tempdir should be created");
        let beam = temp.path().join("beam.beam");
        std::fs::write(&beam, "beam/fluence = 2e8\n").expect("beam file staged");

        let path = check_existing_file("beam_parameter_file", beam.to_str().expect("utf-8"))
            .expect("file exists");
        assert_eq!(path, beam);

        let missing = check_existing_file("beam_parameter_file", "does/not/exist.beam")
            .expect_err("missing file");
        let converted = SimexError::from(missing);
        assert_eq!(converted.category(), SimexErrorCategory::Io);
        assert_eq!(converted.placeholder(), "IO.PARAMETER_FILE");

        let converted = SimexError::from(require::<f64>("photon_energy", None).expect_err("unset"));
        assert_eq!(converted.placeholder(), "INPUT.PARAMETER_MISSING");
        assert_eq!(converted.exit_code(), 2);
    }

    #[test]
    fn relative_files_are_returned_absolute() {
        let temp = TempDir::new_in(".").expect("tempdir should be created");
        let beam = temp.path().join("simple.beam");
        std::fs::write(&beam, "beam/photon_energy = 9000\n").expect("beam file staged");
        assert!(beam.is_relative());

        let path = check_existing_file("beam_parameter_file", beam.to_str().expect("utf-8"))
            .expect("file exists");
        assert!(path.is_absolute());
        assert!(path.ends_with("simple.beam"));
        assert!(path.is_file());
    }
}
