use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Signature of one native method, as exported from the Java side.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MethodDescriptor {
    pub(crate) return_type: String,
    pub(crate) is_static: bool,
    pub(crate) argument_types: Vec<String>,
}

/// Where a catalog document comes from.
pub(crate) enum CatalogSource {
    Path(PathBuf),
    Reader(Box<dyn Read>),
}

impl fmt::Debug for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            CatalogSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("no signature file selected")]
    SourceUnavailable,

    #[error("failed to open {origin}")]
    Io {
        origin: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed signature file {origin}: {reason}")]
    Malformed { origin: String, reason: String },
}

/// Mapping from native function name to its method descriptor.
///
/// Entries are kept as raw JSON and only decoded on lookup, so one bad entry
/// never prevents the rest of the document from loading.
#[derive(Clone, Debug, Default)]
pub(crate) struct Catalog {
    entries: Map<String, Value>,
}

impl Catalog {
    pub(crate) fn from_value(value: Value, origin: &str) -> Result<Self, CatalogError> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(CatalogError::Malformed {
                origin: origin.to_string(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }

    pub(crate) fn from_reader<R: Read>(reader: R, origin: &str) -> Result<Self, CatalogError> {
        let value: Value =
            serde_json::from_reader(reader).map_err(|err| CatalogError::Malformed {
                origin: origin.to_string(),
                reason: err.to_string(),
            })?;
        Self::from_value(value, origin)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode the descriptor for `name`.
    ///
    /// Missing names and explicit `null` values both yield `None`.
    pub(crate) fn descriptor(&self, name: &str) -> Option<Result<MethodDescriptor, serde_json::Error>> {
        match self.entries.get(name)? {
            Value::Null => None,
            value => Some(MethodDescriptor::deserialize(value)),
        }
    }
}

/// Load a catalog from the selected source.
pub(crate) fn load(source: Option<CatalogSource>) -> Result<Catalog, CatalogError> {
    let source = source.ok_or(CatalogError::SourceUnavailable)?;
    let catalog = match source {
        CatalogSource::Path(path) => {
            let origin = path.display().to_string();
            info!(path = %origin, "loading signature file");
            let file = File::open(&path).map_err(|source| CatalogError::Io {
                origin: origin.clone(),
                source,
            })?;
            Catalog::from_reader(BufReader::new(file), &origin)?
        }
        CatalogSource::Reader(reader) => {
            info!("loading signature stream");
            Catalog::from_reader(reader, "<stream>")?
        }
    };
    if catalog.is_empty() {
        warn!("signature file has no entries");
    }
    info!(methods = catalog.len(), "loaded methods from JSON");
    Ok(catalog)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
