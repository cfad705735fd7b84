//! Whitespace-separated numeric tables, the exchange format of the backengines.

use crate::domain::{SimexError, SimexResult};
use crate::serialization::{format_scientific, read_text_file, write_text_file};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    columns: usize,
    values: Vec<f64>,
}

impl NumericTable {
    pub fn from_rows(rows: &[Vec<f64>]) -> SimexResult<Self> {
        let columns = rows.first().map(Vec::len).unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * columns);
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns {
                return Err(SimexError::input_validation(
                    "INPUT.TABLE_SHAPE",
                    format!(
                        "row {} has {} columns, expected {}",
                        index + 1,
                        row.len(),
                        columns
                    ),
                ));
            }
            values.extend_from_slice(row);
        }
        Ok(Self { columns, values })
    }

    /// Parses a text table. Blank lines and `#` comments are skipped; every
    /// remaining line must have the same number of columns.
    pub fn parse(source: &str, origin: &str) -> SimexResult<Self> {
        let mut rows = Vec::new();
        for (line_index, line) in source.lines().enumerate() {
            let content = line.split('#').next().unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }

            let row = content
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|token| !token.is_empty())
                .map(|token| parse_number(token))
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| {
                    SimexError::computation(
                        "RUN.TABLE_PARSE",
                        format!(
                            "non-numeric value in '{}' at line {}: '{}'",
                            origin,
                            line_index + 1,
                            content
                        ),
                    )
                })?;
            rows.push(row);
        }

        Self::from_rows(&rows).map_err(|error| {
            SimexError::computation(
                "RUN.TABLE_PARSE",
                format!("inconsistent table '{}': {}", origin, error.message()),
            )
        })
    }

    pub fn load(path: &Path) -> SimexResult<Self> {
        let source = read_text_file(path, "IO.TABLE_READ")?;
        Self::parse(&source, &path.display().to_string())
    }

    pub fn rows(&self) -> usize {
        if self.columns == 0 {
            0
        } else {
            self.values.len() / self.columns
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.columns)?;
        self.values.get(start..start + self.columns)
    }

    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.columns {
            return None;
        }
        Some(
            self.values
                .chunks(self.columns)
                .map(|row| row[index])
                .collect(),
        )
    }

    /// Values in row-major order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Drops the first column; returns it together with the remaining block.
    pub fn split_first_column(&self) -> Option<(Vec<f64>, NumericTable)> {
        let first = self.column(0)?;
        let columns = self.columns - 1;
        let values = self
            .values
            .chunks(self.columns)
            .flat_map(|row| row[1..].iter().copied())
            .collect();
        Some((first, NumericTable { columns, values }))
    }

    pub fn render_tab_delimited(&self) -> String {
        let mut text = String::new();
        for row in self.values.chunks(self.columns.max(1)) {
            let line = row
                .iter()
                .map(|value| format_scientific(*value, 18))
                .collect::<Vec<_>>()
                .join("\t");
            text.push_str(&line);
            text.push('\n');
        }
        text
    }

    pub fn save_tab_delimited(&self, path: &Path, placeholder: &'static str) -> SimexResult<()> {
        write_text_file(path, &self.render_tab_delimited(), placeholder)
    }
}

fn parse_number(token: &str) -> Option<f64> {
    token
        .parse::<f64>()
        .ok()
        .or_else(|| token.replace(['D', 'd'], "e").parse::<f64>().ok())
}
