// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Policy bundles: gzip-compressed tar archives of modules, data documents
//! and a `.manifest`.

mod reader;
mod writer;

pub use reader::BundleReader;
pub use writer::{BundleWriter, normalize_entry_path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::params::RegoVersion;
use crate::policy::{ParseError, PolicyModule};

/// File name of the bundle manifest.
pub const MANIFEST_FILE: &str = ".manifest";

/// File name of data documents.
pub const DATA_FILE: &str = "data.json";

/// Suffix identifying bundle archives on disk.
pub const BUNDLE_SUFFIX: &str = ".tar.gz";

/// Errors raised while reading a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// No bytes were supplied.
    #[error("bundle is empty")]
    Empty,

    /// The gzip or tar stream is malformed.
    #[error("failed to read bundle archive: {0}")]
    Archive(#[from] std::io::Error),

    /// An entry path leaves the bundle root.
    #[error("bundle entry escapes the bundle root: {0}")]
    PathTraversal(String),

    /// An entry is a link, device or other non-regular file.
    #[error("unsupported bundle entry type {entry_type} at {path}")]
    UnsafeEntry {
        /// Entry path.
        path: String,
        /// Tar entry type.
        entry_type: String,
    },

    /// The archive holds more entries than allowed.
    #[error("bundle exceeds maximum entry count ({0})")]
    TooManyEntries(usize),

    /// The archive decompresses to more bytes than allowed.
    #[error("bundle exceeds maximum decompressed size ({0} bytes)")]
    TooLarge(u64),

    /// A text entry is not valid UTF-8.
    #[error("bundle entry {0} is not valid UTF-8")]
    Utf8(String),

    /// The manifest is not a valid document.
    #[error("invalid bundle manifest: {0}")]
    Manifest(#[source] serde_json::Error),

    /// A data document is not valid JSON.
    #[error("invalid data document {path}: {source}")]
    Data {
        /// Entry path.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// Two data documents claim the same non-object path.
    #[error("data conflict at {0}")]
    DataConflict(String),

    /// A module lies outside the roots declared by the manifest.
    #[error("{path}: package {package} is outside the manifest roots")]
    OutsideRoots {
        /// Module path.
        path: String,
        /// Module package.
        package: String,
    },

    /// A module failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Bundle manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Revision identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    /// Path prefixes the bundle owns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<String>>,
    /// Dialect of the bundle's modules (`0` for v0, `1` for v1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rego_version: Option<u8>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Whether a slash-separated path falls under the declared roots.
    ///
    /// Bundles without roots own every path.
    pub fn owns(&self, path: &str) -> bool {
        match &self.roots {
            None => true,
            Some(roots) => roots.iter().any(|root| {
                let root = root.trim_matches('/');
                root.is_empty() || path == root || path.starts_with(&format!("{root}/"))
            }),
        }
    }

    /// Dialect declared by the manifest, if any.
    pub fn declared_rego_version(&self) -> Option<RegoVersion> {
        self.rego_version.and_then(RegoVersion::from_manifest)
    }
}

/// An in-memory bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    /// Manifest (default when the archive has none).
    pub manifest: Manifest,
    /// Policy modules in archive order.
    pub modules: Vec<PolicyModule>,
    /// Data tree assembled from every data document.
    pub data: Value,
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            manifest: Manifest::default(),
            modules: Vec::new(),
            data: Value::Object(Map::new()),
        }
    }
}

impl Bundle {
    /// Merge `value` into the data tree at `path`.
    pub fn mount_data(&mut self, path: &[String], value: Value) -> Result<(), BundleError> {
        mount(&mut self.data, path, value).map_err(BundleError::DataConflict)
    }

    /// Whether the data tree holds no documents.
    pub fn data_is_empty(&self) -> bool {
        self.data.as_object().is_none_or(Map::is_empty)
    }
}

/// Deep-merge `value` into `target` at `path`.
///
/// Objects merge key by key; any other collision is reported with the
/// dotted path where it occurred.
pub(crate) fn mount(target: &mut Value, path: &[String], value: Value) -> Result<(), String> {
    let mut node = target;
    for (depth, key) in path.iter().enumerate() {
        let Value::Object(map) = node else {
            return Err(path[..depth].join("."));
        };
        node = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    merge_value(node, value, &mut path.to_vec())
}

fn merge_value(target: &mut Value, value: Value, at: &mut Vec<String>) -> Result<(), String> {
    match (target, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                at.push(key.clone());
                match existing.get_mut(&key) {
                    Some(slot) => merge_value(slot, value, at)?,
                    None => {
                        existing.insert(key, value);
                    }
                }
                at.pop();
            }
            Ok(())
        }
        (slot @ Value::Object(_), value) if slot.as_object().is_some_and(Map::is_empty) => {
            *slot = value;
            Ok(())
        }
        _ => Err(at.join(".")),
    }
}

/// Whether a file name looks like a bundle archive.
pub fn is_bundle_archive(name: &str) -> bool {
    name.ends_with(BUNDLE_SUFFIX)
}

/// Split a slash-separated directory into data path segments.
pub(crate) fn data_path(dir: &str) -> Vec<String> {
    dir.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mount_merges_objects() {
        let mut bundle = Bundle::default();
        assert!(bundle.data_is_empty());

        bundle
            .mount_data(&data_path("a/b"), json!({"x": 1}))
            .unwrap();
        bundle.mount_data(&data_path("a"), json!({"c": true})).unwrap();
        bundle.mount_data(&[], json!({"top": "level"})).unwrap();

        assert_eq!(
            bundle.data,
            json!({"a": {"b": {"x": 1}, "c": true}, "top": "level"})
        );
    }

    #[test]
    fn test_mount_conflict() {
        let mut bundle = Bundle::default();
        bundle.mount_data(&data_path("a"), json!({"x": 1})).unwrap();

        let err = bundle
            .mount_data(&data_path("a"), json!({"x": 2}))
            .unwrap_err();
        assert_eq!(err.to_string(), "data conflict at a.x");
    }

    #[test]
    fn test_manifest_roots() {
        let manifest = Manifest {
            roots: Some(vec!["authz".to_string()]),
            ..Default::default()
        };
        assert!(manifest.owns("authz"));
        assert!(manifest.owns("authz/users"));
        assert!(!manifest.owns("authzx"));
        assert!(Manifest::default().owns("anything"));
    }

    #[test]
    fn test_manifest_keeps_unknown_fields() {
        let manifest: Manifest =
            serde_json::from_str(r#"{"revision":"r1","rego_version":0,"custom":[1]}"#).unwrap();
        assert_eq!(manifest.revision, "r1");
        assert_eq!(manifest.declared_rego_version(), Some(RegoVersion::V0));
        assert_eq!(manifest.extra.get("custom"), Some(&json!([1])));

        let out = serde_json::to_value(&manifest).unwrap();
        assert_eq!(out, json!({"revision":"r1","rego_version":0,"custom":[1]}));
    }
}
