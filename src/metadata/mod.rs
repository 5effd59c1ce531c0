//! Metadata extraction capability
//!
//! Format-aware parsers plug in through [`MetadataExtractor`]. The analysis
//! pipeline calls every registered extractor that supports the detected
//! type and merges the returned maps; a failing extractor only adds a
//! warning to the report.

pub mod filesystem;

use std::{collections::BTreeMap, fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{analyzer::signatures::FileKind, error::ExtractionError};

pub use filesystem::FilesystemExtractor;

/// One extracted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bytes(#[serde(with = "hex::serde")] Vec<u8>),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Integer(n) => write!(f, "{}", n),
            MetadataValue::Float(x) => write!(f, "{:.2}", x),
            MetadataValue::Bytes(b) if b.len() > 100 => write!(f, "<binary data, {} bytes>", b.len()),
            MetadataValue::Bytes(b) => f.write_str(&hex::encode(b)),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(MetadataValue::Integer)
            .unwrap_or_else(|_| MetadataValue::Text(value.to_string()))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(value: Vec<u8>) -> Self {
        MetadataValue::Bytes(value)
    }
}

/// Extracted key-value pairs, ordered by key
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Format-specific metadata source
pub trait MetadataExtractor: Send + Sync {
    /// Short identifier used in warnings and as a key prefix by convention
    fn name(&self) -> &str;

    /// Whether this extractor handles `kind`
    fn supports(&self, _kind: FileKind) -> bool {
        true
    }

    fn extract(&self, path: &Path, kind: FileKind) -> Result<Metadata, ExtractionError>;
}
