use super::{H5Data, H5Layout, H5NodeKind};
use crate::domain::{SimexError, SimexResult};
use hdf5::types::VarLenUnicode;
use hdf5::{File, Location};
use std::path::Path;
use tracing::debug;

pub(super) fn write_layout(layout: &H5Layout, path: &Path) -> SimexResult<()> {
    let file = File::create(path).map_err(|source| h5_error(path, "create file", source))?;

    for (object_path, node) in layout.nodes() {
        let name = object_path.trim_start_matches('/');
        if name.is_empty() {
            write_attributes(&file, &node.attributes, path, object_path)?;
            continue;
        }

        match &node.kind {
            H5NodeKind::Group => {
                let group = file
                    .create_group(name)
                    .map_err(|source| h5_error(path, object_path, source))?;
                write_attributes(&group, &node.attributes, path, object_path)?;
            }
            H5NodeKind::Dataset(data) => {
                let dataset = write_dataset(&file, name, data)
                    .map_err(|source| h5_error(path, object_path, source))?;
                write_attributes(&dataset, &node.attributes, path, object_path)?;
            }
            H5NodeKind::ExternalLink { file: target_file, target } => {
                let (parent, link_name) = match name.rsplit_once('/') {
                    Some((parent, link_name)) => (file.group(parent), link_name),
                    None => (file.group("/"), name),
                };
                let parent = parent.map_err(|source| h5_error(path, object_path, source))?;
                parent
                    .link_external(&target_file.to_string_lossy(), target, link_name)
                    .map_err(|source| h5_error(path, object_path, source))?;
            }
        }
        debug!(file = %path.display(), object = object_path, "wrote hdf5 object");
    }

    file.close()
        .map_err(|source| h5_error(path, "close file", source))
}

fn write_dataset(file: &File, name: &str, data: &H5Data) -> hdf5::Result<hdf5::Dataset> {
    match data {
        H5Data::Scalar(value) => {
            let dataset = file.new_dataset::<f64>().shape(()).create(name)?;
            dataset.write_scalar(value)?;
            Ok(dataset)
        }
        H5Data::Vector(values) => file
            .new_dataset_builder()
            .with_data(values.as_slice())
            .create(name),
        H5Data::Matrix {
            rows,
            columns,
            values,
        } => {
            let dataset = file
                .new_dataset::<f64>()
                .shape((*rows, *columns))
                .create(name)?;
            dataset.write_raw(values.as_slice())?;
            Ok(dataset)
        }
        H5Data::Text(text) => {
            let value = to_unicode(text)?;
            let dataset = file.new_dataset::<VarLenUnicode>().shape(()).create(name)?;
            dataset.write_scalar(&value)?;
            Ok(dataset)
        }
    }
}

fn write_attributes(
    location: &Location,
    attributes: &std::collections::BTreeMap<String, String>,
    path: &Path,
    object_path: &str,
) -> SimexResult<()> {
    for (name, text) in attributes {
        to_unicode(text)
            .and_then(|text| {
                location
                    .new_attr::<VarLenUnicode>()
                    .shape(())
                    .create(name.as_str())?
                    .write_scalar(&text)
            })
            .map_err(|source| h5_error(path, &format!("{object_path}@{name}"), source))?;
    }
    Ok(())
}

fn to_unicode(text: &str) -> hdf5::Result<VarLenUnicode> {
    text.parse::<VarLenUnicode>()
        .map_err(|source| hdf5::Error::from(source.to_string()))
}

fn h5_error(path: &Path, object: &str, source: hdf5::Error) -> SimexError {
    SimexError::io_system(
        "IO.HDF5_WRITE",
        format!(
            "failed to write '{}' in '{}': {}",
            object,
            path.display(),
            source
        ),
    )
}
