// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Capability sets and their resolution.
//!
//! A capability set declares which builtins, language features, future
//! keywords and network hosts a compiled artifact may use. A build resolves
//! exactly one set from an inline JSON document, a named version, both
//! (merged), or neither (the process-wide default).

pub mod catalog;

use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::BuildEnvConfig;

pub use catalog::CURRENT_VERSION;

/// Feature flag required to parse v1 modules.
pub const FEATURE_REGO_V1: &str = "rego_v1";

/// Feature flag required for `import rego.v1`.
pub const FEATURE_REGO_V1_IMPORT: &str = "rego_v1_import";

/// Errors raised while resolving capabilities.
#[derive(Debug, Error)]
pub enum CapabilitiesError {
    /// Inline capabilities JSON could not be parsed.
    #[error("invalid capabilities JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The identifier is neither a known version nor a readable file.
    #[error("no such file or capabilities version found: {0}")]
    NotFound(String),

    /// A capabilities file was found but is not a valid document.
    #[error("invalid capabilities file {path}: {source}")]
    InvalidFile {
        /// Path as supplied by the caller.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A builtin declaration. Only the name is interpreted; the rest is carried
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Builtin {
    /// Fully qualified builtin name, e.g. `strings.count`.
    pub name: String,
    /// Declaration, infix operator and any other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Builtin {
    /// Create a builtin with no declaration details.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// A supported Wasm ABI version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmAbiVersion {
    /// Major ABI version.
    pub version: u32,
    /// Minor ABI version.
    pub minor_version: u32,
}

/// A capability set.
///
/// Unknown fields in the JSON document are ignored and missing facets are
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Allowed builtin functions.
    pub builtins: Vec<Builtin>,
    /// Enabled future keywords.
    pub future_keywords: Vec<String>,
    /// Supported Wasm ABI versions.
    pub wasm_abi_versions: Vec<WasmAbiVersion>,
    /// Enabled language features.
    pub features: Vec<String>,
    /// Hosts network builtins may reach. `None` means unrestricted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_net: Option<Vec<String>>,
}

impl Capabilities {
    /// Parse a capabilities document.
    pub fn from_json(json: &str) -> Result<Self, CapabilitiesError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolve a version identifier: a named version first, then a file
    /// path.
    ///
    /// Named versions come from the embedded catalog, then from
    /// `REGO_BUILD_CAPABILITIES_DIR` when set.
    pub fn load_version(id: &str) -> Result<Self, CapabilitiesError> {
        Self::load_version_from(id, BuildEnvConfig::global().capabilities_dir.as_deref())
    }

    /// Like [`Capabilities::load_version`] with an explicit extra directory.
    pub fn load_version_from(id: &str, dir: Option<&Path>) -> Result<Self, CapabilitiesError> {
        if let Some(json) = catalog::lookup(id) {
            debug!(version = %id, "Loaded embedded capabilities version");
            return Self::from_json(json);
        }

        if let Some(dir) = dir {
            let candidate = dir.join(format!("{id}.json"));
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Loaded capabilities version from directory");
                return Self::load_file(&candidate).map_err(|e| match e {
                    CapabilitiesError::NotFound(_) => CapabilitiesError::NotFound(id.to_string()),
                    other => other,
                });
            }
        }

        Self::load_file(Path::new(id)).map_err(|e| match e {
            CapabilitiesError::NotFound(_) => CapabilitiesError::NotFound(id.to_string()),
            other => other,
        })
    }

    /// Load a capabilities document from a file.
    pub fn load_file(path: &Path) -> Result<Self, CapabilitiesError> {
        let display = path.display().to_string();
        let contents =
            fs::read_to_string(path).map_err(|_| CapabilitiesError::NotFound(display.clone()))?;
        serde_json::from_str(&contents).map_err(|source| CapabilitiesError::InvalidFile {
            path: display,
            source,
        })
    }

    /// Concatenate every facet of `other` after this set's.
    ///
    /// Nothing is deduplicated. `allow_net` stays unset only when both sides
    /// leave it unset.
    pub fn merge(mut self, other: Capabilities) -> Capabilities {
        self.builtins.extend(other.builtins);
        self.future_keywords.extend(other.future_keywords);
        self.wasm_abi_versions.extend(other.wasm_abi_versions);
        self.features.extend(other.features);
        self.allow_net = match (self.allow_net, other.allow_net) {
            (None, None) => None,
            (a, b) => {
                let mut hosts = a.unwrap_or_default();
                hosts.extend(b.unwrap_or_default());
                Some(hosts)
            }
        };
        self
    }

    /// Whether a builtin with this name is allowed.
    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|b| b.name == name)
    }

    /// Whether a language feature is enabled.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Whether a future keyword is enabled.
    pub fn has_future_keyword(&self, keyword: &str) -> bool {
        self.future_keywords.iter().any(|k| k == keyword)
    }
}

static DEFAULT_CAPABILITIES: OnceLock<Arc<Capabilities>> = OnceLock::new();

/// Capabilities of the bundled compiler's current version.
///
/// Built once per process and shared read-only afterwards.
pub fn default_capabilities() -> Arc<Capabilities> {
    DEFAULT_CAPABILITIES
        .get_or_init(|| {
            let json = catalog::lookup(CURRENT_VERSION).unwrap_or("{}");
            let caps = Capabilities::from_json(json).unwrap_or_else(|e| {
                error!(error = %e, version = CURRENT_VERSION, "Embedded capabilities are invalid");
                Capabilities::default()
            });
            Arc::new(caps)
        })
        .clone()
}

/// Resolve the capability set for one build.
///
/// Empty strings count as absent. Inline JSON is parsed first, then the
/// version identifier; when both are given the inline set comes first in
/// every merged facet.
pub fn resolve_capabilities(
    inline_json: Option<&str>,
    version: Option<&str>,
) -> Result<Arc<Capabilities>, CapabilitiesError> {
    let inline = match inline_json.filter(|s| !s.is_empty()) {
        Some(json) => Some(Capabilities::from_json(json)?),
        None => None,
    };

    let versioned = match version.filter(|s| !s.is_empty()) {
        Some(id) => Some(Capabilities::load_version(id)?),
        None => None,
    };

    match (inline, versioned) {
        (None, None) => {
            debug!("Using default capabilities");
            Ok(default_capabilities())
        }
        (Some(caps), None) | (None, Some(caps)) => Ok(Arc::new(caps)),
        (Some(inline), Some(versioned)) => {
            debug!("Merging inline and versioned capabilities");
            Ok(Arc::new(inline.merge(versioned)))
        }
    }
}
