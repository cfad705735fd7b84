//! In-memory description of the HDF5 interchange files.
//!
//! Calculators build an [`H5Layout`] from their results; [`H5Layout::save`]
//! turns it into a file. Keeping the layout separate from the writer lets the
//! group structure be checked without libhdf5.

#[cfg(feature = "hdf5")]
mod writer;

use crate::domain::{SimexError, SimexResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: &str = "0.2";

#[derive(Debug, Clone, PartialEq)]
pub enum H5Data {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix {
        rows: usize,
        columns: usize,
        values: Vec<f64>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum H5NodeKind {
    Group,
    Dataset(H5Data),
    ExternalLink { file: PathBuf, target: String },
}

/// A group, dataset or link plus its text attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct H5Node {
    pub kind: H5NodeKind,
    pub attributes: BTreeMap<String, String>,
}

impl H5Node {
    fn new(kind: H5NodeKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
        }
    }
}

/// Absolute object paths mapped to nodes. The ordered map guarantees that a
/// group is visited before anything below it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct H5Layout {
    nodes: BTreeMap<String, H5Node>,
}

impl H5Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&mut self, path: &str) -> SimexResult<&mut H5Node> {
        let path = normalize_path(path)?;
        self.ensure_parents(&path)?;
        let node = self
            .nodes
            .entry(path.clone())
            .or_insert_with(|| H5Node::new(H5NodeKind::Group));
        if node.kind != H5NodeKind::Group {
            return Err(conflict(&path, "group"));
        }
        Ok(node)
    }

    pub fn dataset(&mut self, path: &str, data: H5Data) -> SimexResult<&mut H5Node> {
        self.leaf(path, H5NodeKind::Dataset(data))
    }

    pub fn external_link(
        &mut self,
        path: &str,
        file: impl Into<PathBuf>,
        target: &str,
    ) -> SimexResult<&mut H5Node> {
        self.leaf(
            path,
            H5NodeKind::ExternalLink {
                file: file.into(),
                target: normalize_path(target)?,
            },
        )
    }

    pub fn text(&mut self, path: &str, value: impl Into<String>) -> SimexResult<&mut H5Node> {
        self.dataset(path, H5Data::Text(value.into()))
    }

    pub fn scalar(&mut self, path: &str, value: f64) -> SimexResult<&mut H5Node> {
        self.dataset(path, H5Data::Scalar(value))
    }

    pub fn vector(&mut self, path: &str, values: Vec<f64>) -> SimexResult<&mut H5Node> {
        self.dataset(path, H5Data::Vector(values))
    }

    pub fn matrix(
        &mut self,
        path: &str,
        rows: usize,
        columns: usize,
        values: Vec<f64>,
    ) -> SimexResult<&mut H5Node> {
        if rows * columns != values.len() {
            return Err(SimexError::internal(
                "SYS.H5_LAYOUT",
                format!(
                    "matrix '{}' declares {}x{} but holds {} values",
                    path,
                    rows,
                    columns,
                    values.len()
                ),
            ));
        }
        self.dataset(
            path,
            H5Data::Matrix {
                rows,
                columns,
                values,
            },
        )
    }

    pub fn set_attribute(
        &mut self,
        path: &str,
        name: &str,
        value: impl Into<String>,
    ) -> SimexResult<()> {
        let path = normalize_path(path)?;
        let node = self.nodes.get_mut(&path).ok_or_else(|| {
            SimexError::internal(
                "SYS.H5_LAYOUT",
                format!("cannot attach attribute '{}' to missing node '{}'", name, path),
            )
        })?;
        node.attributes.insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn set_unit(&mut self, path: &str, unit: &str) -> SimexResult<()> {
        self.set_attribute(path, "unit", unit)
    }

    pub fn get(&self, path: &str) -> Option<&H5Node> {
        normalize_path(path)
            .ok()
            .and_then(|path| self.nodes.get(&path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn data(&self, path: &str) -> Option<&H5Data> {
        match &self.get(path)?.kind {
            H5NodeKind::Dataset(data) => Some(data),
            _ => None,
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &H5Node)> {
        self.nodes.iter().map(|(path, node)| (path.as_str(), node))
    }

    /// Writes the layout to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> SimexResult<()> {
        save_layout(self, path)
    }

    fn leaf(&mut self, path: &str, kind: H5NodeKind) -> SimexResult<&mut H5Node> {
        let path = normalize_path(path)?;
        if path == "/" {
            return Err(conflict(&path, "dataset"));
        }
        self.ensure_parents(&path)?;
        if let Some(existing) = self.nodes.get(&path) {
            if existing.kind == H5NodeKind::Group {
                return Err(conflict(&path, "dataset"));
            }
        }
        let node = self.nodes.entry(path).or_insert_with(|| H5Node::new(H5NodeKind::Group));
        node.kind = kind;
        Ok(node)
    }

    fn ensure_parents(&mut self, path: &str) -> SimexResult<()> {
        let mut prefix = String::new();
        let components: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        for component in components.iter().take(components.len().saturating_sub(1)) {
            prefix.push('/');
            prefix.push_str(component);
            let node = self
                .nodes
                .entry(prefix.clone())
                .or_insert_with(|| H5Node::new(H5NodeKind::Group));
            if node.kind != H5NodeKind::Group {
                return Err(conflict(&prefix, "group"));
            }
        }
        Ok(())
    }
}

fn normalize_path(path: &str) -> SimexResult<String> {
    let components: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    if components.iter().any(|part| *part == "." || *part == "..") {
        return Err(SimexError::internal(
            "SYS.H5_LAYOUT",
            format!("relative components are not allowed in object path '{}'", path),
        ));
    }
    Ok(format!("/{}", components.join("/")))
}

fn conflict(path: &str, wanted: &str) -> SimexError {
    SimexError::internal(
        "SYS.H5_LAYOUT",
        format!("object '{}' already exists and cannot become a {}", path, wanted),
    )
}

#[cfg(feature = "hdf5")]
fn save_layout(layout: &H5Layout, path: &Path) -> SimexResult<()> {
    writer::write_layout(layout, path)
}

#[cfg(not(feature = "hdf5"))]
fn save_layout(_layout: &H5Layout, path: &Path) -> SimexResult<()> {
    Err(SimexError::internal(
        "SYS.HDF5_UNAVAILABLE",
        format!(
            "cannot write '{}': this build does not include HDF5 support (enable the `hdf5` feature)",
            path.display()
        ),
    ))
}

/// Metadata block written under `/info` by every calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoBlock {
    pub package_version: String,
    pub contact: String,
    pub data_description: String,
    pub method_description: String,
}

impl InfoBlock {
    pub fn write_into(&self, layout: &mut H5Layout) -> SimexResult<()> {
        layout.text("/info/package_version", self.package_version.clone())?;
        layout.text("/info/contact", self.contact.clone())?;
        layout.text("/info/data_description", self.data_description.clone())?;
        layout.text("/info/method_description", self.method_description.clone())?;
        layout.group("/history/parent")?;
        layout.text("/version", FORMAT_VERSION)?;
        Ok(())
    }
}

pub fn package_version() -> String {
    format!("simex-core {}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::{H5Data, H5Layout, H5NodeKind, InfoBlock, package_version};

    #[test]
    fn datasets_create_their_parent_groups() {
        let mut layout = H5Layout::new();
        layout
            .vector("data/dynamic/energy_shifts", vec![-1.0, 0.0, 1.0])
            .expect("dataset");

        assert_eq!(
            layout.paths().collect::<Vec<_>>(),
            vec!["/data", "/data/dynamic", "/data/dynamic/energy_shifts"]
        );
        assert_eq!(layout.get("/data").map(|node| &node.kind), Some(&H5NodeKind::Group));
        assert_eq!(
            layout.data("/data/dynamic/energy_shifts"),
            Some(&H5Data::Vector(vec![-1.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn groups_and_datasets_cannot_replace_each_other() {
        let mut layout = H5Layout::new();
        layout.scalar("/data/static/ipl", 12.5).expect("dataset");

        let error = layout.group("/data/static/ipl").expect_err("dataset is not a group");
        assert_eq!(error.placeholder(), "SYS.H5_LAYOUT");
        assert!(layout.scalar("/data/static", 1.0).is_err());
        assert!(layout.scalar("/data/static/ipl/child", 1.0).is_err());
        assert!(layout.group("/data/../escape").is_err());
    }

    #[test]
    fn attributes_require_existing_nodes() {
        let mut layout = H5Layout::new();
        layout.scalar("/data/static/ipl", 12.5).expect("dataset");
        layout.set_unit("/data/static/ipl", "eV").expect("unit");

        let node = layout.get("/data/static/ipl").expect("node");
        assert_eq!(node.attributes.get("unit").map(String::as_str), Some("eV"));
        assert!(layout.set_unit("/data/static/missing", "eV").is_err());
    }

    #[test]
    fn matrix_shape_must_match_values() {
        let mut layout = H5Layout::new();
        assert!(layout.matrix("/data/pressure", 2, 2, vec![1.0, 2.0, 3.0]).is_err());
        layout
            .matrix("/data/pressure", 2, 2, vec![1.0, 2.0, 3.0, 4.0])
            .expect("square matrix");
    }

    #[test]
    fn info_block_fills_metadata_groups() {
        let mut layout = H5Layout::new();
        InfoBlock {
            package_version: package_version(),
            contact: "simex maintainers".to_string(),
            data_description: "test data".to_string(),
            method_description: "test method".to_string(),
        }
        .write_into(&mut layout)
        .expect("info block");

        for path in [
            "/info/package_version",
            "/info/contact",
            "/info/data_description",
            "/info/method_description",
            "/history/parent",
            "/version",
        ] {
            assert!(layout.contains(path), "{path} should exist");
        }
        assert!(matches!(
            layout.data("/info/package_version"),
            Some(H5Data::Text(text)) if text.starts_with("simex-core ")
        ));
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn save_without_hdf5_support_reports_unavailable() {
        let layout = H5Layout::new();
        let error = layout
            .save(std::path::Path::new("out.h5"))
            .expect_err("hdf5 feature disabled");
        assert_eq!(error.placeholder(), "SYS.HDF5_UNAVAILABLE");
    }
}
