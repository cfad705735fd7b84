use crate::domain::{SimexError, SimexResult};
use std::fs;
use std::path::Path;

/// Scientific notation in the `%.Ne` shape the Fortran/C backengines read,
/// i.e. with an explicit exponent sign and at least two exponent digits.
pub fn format_scientific(value: f64, precision: usize) -> String {
    let raw = format!("{value:.precision$e}", precision = precision);
    let Some((mantissa, exponent)) = raw.split_once('e') else {
        return raw;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_text_artifact(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, normalize_text_artifact(content))
}

pub fn ensure_directory(path: &Path, placeholder: &'static str) -> SimexResult<()> {
    fs::create_dir_all(path).map_err(|source| {
        SimexError::io_system(
            placeholder,
            format!("failed to create directory '{}': {}", path.display(), source),
        )
    })
}

pub fn write_text_file(path: &Path, content: &str, placeholder: &'static str) -> SimexResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent, placeholder)?;
        }
    }
    write_text_artifact(path, content).map_err(|source| {
        SimexError::io_system(
            placeholder,
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

pub fn read_text_file(path: &Path, placeholder: &'static str) -> SimexResult<String> {
    fs::read_to_string(path).map_err(|source| {
        SimexError::io_system(
            placeholder,
            format!("failed to read '{}': {}", path.display(), source),
        )
    })
}
