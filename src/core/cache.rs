//! Pipeline-scoped key/value cache
//!
//! The cache lives exactly as long as one pipeline run and is the only
//! channel through which earlier modules hand facts to later ones (for
//! example the binary descriptors registered before a sync).

use crate::core::host::Arch;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Resource kind prefix for binary descriptor maps
pub const KUBE_BINARIES: &str = "KubeBinaries";

/// Cache key holding the binary descriptors of one architecture
pub fn binaries_key(arch: Arch) -> String {
    format!("{}-{}", KUBE_BINARIES, arch)
}

/// A locally staged artifact that can be shipped to hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeBinary {
    /// Identifier such as `docker` or `crictl`
    pub id: String,
    pub file_name: String,
    pub arch: Arch,
    pub version: String,
    /// Directory on the orchestrating machine holding the file
    pub base_dir: PathBuf,
}

impl KubeBinary {
    /// Full local path of the artifact
    pub fn path(&self) -> PathBuf {
        self.base_dir.join(&self.file_name)
    }
}

/// Binary descriptors keyed by id
pub type BinaryMap = HashMap<String, KubeBinary>;

/// A cached value
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Binaries(Arc<BinaryMap>),
    Text(String),
    Json(serde_json::Value),
    Flag(bool),
}

impl CacheValue {
    fn kind(&self) -> &'static str {
        match self {
            CacheValue::Binaries(_) => "binaries",
            CacheValue::Text(_) => "text",
            CacheValue::Json(_) => "json",
            CacheValue::Flag(_) => "flag",
        }
    }
}

/// Cache lookup failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("`{0}` not found in pipeline cache")]
    NotFound(String),

    #[error("type mismatch for key `{key}`: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{entry}` not found in pipeline cache entry `{key}`")]
    MissingEntry { key: String, entry: String },
}

/// Shared store for one pipeline run
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: RwLock<HashMap<String, CacheValue>>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheValue> {
        self.entries.read().get(key).cloned()
    }

    /// Store a value, returning the one it replaced
    pub fn set(&self, key: impl Into<String>, value: CacheValue) -> Option<CacheValue> {
        self.entries.write().insert(key.into(), value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get_binaries(&self, key: &str) -> Result<Arc<BinaryMap>, CacheError> {
        self.get_typed(key, "binaries", |value| match value {
            CacheValue::Binaries(map) => Some(map.clone()),
            _ => None,
        })
    }

    pub fn get_text(&self, key: &str) -> Result<String, CacheError> {
        self.get_typed(key, "text", |value| match value {
            CacheValue::Text(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn get_json(&self, key: &str) -> Result<serde_json::Value, CacheError> {
        self.get_typed(key, "json", |value| match value {
            CacheValue::Json(json) => Some(json.clone()),
            _ => None,
        })
    }

    pub fn get_flag(&self, key: &str) -> Result<bool, CacheError> {
        self.get_typed(key, "flag", |value| match value {
            CacheValue::Flag(flag) => Some(*flag),
            _ => None,
        })
    }

    /// Look up one binary descriptor for an architecture
    pub fn binary(&self, arch: Arch, id: &str) -> Result<KubeBinary, CacheError> {
        let key = binaries_key(arch);
        let binaries = self.get_binaries(&key)?;
        binaries
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::MissingEntry {
                key,
                entry: id.to_string(),
            })
    }

    fn get_typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&CacheValue) -> Option<T>,
    ) -> Result<T, CacheError> {
        let entries = self.entries.read();
        let value = entries
            .get(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        extract(value).ok_or_else(|| CacheError::TypeMismatch {
            key: key.to_string(),
            expected,
            found: value.kind(),
        })
    }
}
