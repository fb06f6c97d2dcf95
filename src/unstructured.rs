//! Reading dynamic objects from YAML or JSON streams.
use kube::api::DynamicObject;
use serde::Deserialize;
use std::{
    io::Read,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid object in document {index}: {reason}")]
    InvalidObject { index: usize, reason: String },
}

/// Reads all objects of a multi-document YAML (or JSON) string.
///
/// Documents are separated by `---`. Empty and `null` documents are skipped,
/// every other document must be an object with `apiVersion` and `kind`.
pub fn read_str(data: &str) -> Result<Vec<DynamicObject>, Error> {
    let mut objects = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(data).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        objects.push(decode(index, value)?);
    }
    Ok(objects)
}

/// Reads all objects from `reader`. See [`read_str`].
pub fn read<R: Read>(mut reader: R) -> Result<Vec<DynamicObject>, Error> {
    let mut data = String::new();
    reader.read_to_string(&mut data)?;
    read_str(&data)
}

/// Reads all objects from the file at `path`. See [`read_str`].
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<DynamicObject>, Error> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|source| Error::File {
        path: path.to_path_buf(),
        source,
    })?;
    read_str(&data)
}

fn decode(index: usize, value: serde_yaml::Value) -> Result<DynamicObject, Error> {
    let invalid = |reason: String| Error::InvalidObject { index, reason };
    let value = serde_json::to_value(value).map_err(|e| invalid(e.to_string()))?;
    let fields = value
        .as_object()
        .ok_or_else(|| invalid("document is not an object".to_string()))?;
    for required in ["apiVersion", "kind"] {
        match fields.get(required) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => {}
            _ => return Err(invalid(format!("missing {}", required))),
        }
    }
    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
}
