// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Build parameters and source modes.

use std::fmt;
use std::path::PathBuf;

use crate::bundle::Bundle;

/// Policy-language dialect a source tree or bundle is written in.
///
/// The integer representation is the one used across the native boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RegoVersion {
    /// Not specified; the compiler's default dialect applies.
    #[default]
    Undefined,
    /// Pre-1.0 syntax.
    V0,
    /// Modules must be valid under both the v0 and v1 syntax.
    V0CompatV1,
    /// 1.0 syntax.
    V1,
}

impl RegoVersion {
    /// Dialect used when the caller leaves the version undefined.
    pub const DEFAULT: RegoVersion = RegoVersion::V1;

    /// Decode the boundary integer. Unknown values are treated as undefined.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => RegoVersion::V0,
            2 => RegoVersion::V0CompatV1,
            3 => RegoVersion::V1,
            _ => RegoVersion::Undefined,
        }
    }

    /// Boundary integer for this dialect.
    pub fn as_raw(self) -> i32 {
        match self {
            RegoVersion::Undefined => 0,
            RegoVersion::V0 => 1,
            RegoVersion::V0CompatV1 => 2,
            RegoVersion::V1 => 3,
        }
    }

    /// The dialect actually applied, with `Undefined` resolved to the default.
    pub fn effective(self) -> Self {
        match self {
            RegoVersion::Undefined => Self::DEFAULT,
            other => other,
        }
    }

    /// Whether rule bodies must be introduced with the `if` keyword.
    pub fn requires_if_keyword(self) -> bool {
        matches!(
            self.effective(),
            RegoVersion::V1 | RegoVersion::V0CompatV1
        )
    }

    /// Value recorded as `rego_version` in a bundle manifest.
    pub fn manifest_value(self) -> u8 {
        match self.effective() {
            RegoVersion::V0 => 0,
            _ => 1,
        }
    }

    /// Decode a manifest `rego_version` value.
    pub fn from_manifest(value: u8) -> Option<Self> {
        match value {
            0 => Some(RegoVersion::V0),
            1 => Some(RegoVersion::V1),
            _ => None,
        }
    }
}

impl fmt::Display for RegoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegoVersion::Undefined => "undefined",
            RegoVersion::V0 => "v0",
            RegoVersion::V0CompatV1 => "v0v1",
            RegoVersion::V1 => "v1",
        };
        f.write_str(name)
    }
}

/// Where the compiler reads policy sources from.
///
/// Exactly one source feeds a build; the enum makes any other combination
/// unrepresentable.
#[derive(Debug, Clone)]
pub enum SourceMode {
    /// A file or directory walked at compile time under the path filter.
    Filesystem(PathBuf),
    /// A bundle parsed ahead of compilation.
    Bundle(Box<Bundle>),
}

impl SourceMode {
    /// Short label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceMode::Filesystem(_) => "filesystem",
            SourceMode::Bundle(_) => "bundle",
        }
    }
}

/// Options for a single build, independent of where the sources come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParameters {
    /// Compiler target backend (empty selects the compiler default).
    pub target: String,
    /// Capability set serialized as JSON.
    pub capabilities_json: Option<String>,
    /// Named capability version, or a path to a capabilities file.
    pub capabilities_version: Option<String>,
    /// Treat the source as a bundle rather than loose files.
    pub bundle_mode: bool,
    /// Entrypoints in caller order (duplicates allowed).
    pub entrypoints: Vec<String>,
    /// Capture debug diagnostics into the result log.
    pub debug: bool,
    /// Optimization level passed to the compiler.
    pub optimization_level: u32,
    /// Drop modules not reachable from the entrypoints.
    pub prune_unused: bool,
    /// Working directory hint. Accepted for layout stability; not consumed.
    pub temp_dir: Option<String>,
    /// Revision recorded in the output manifest.
    pub revision: Option<String>,
    /// File name globs excluded while loading sources.
    pub ignore: Vec<String>,
    /// Policy-language dialect.
    pub rego_version: RegoVersion,
    /// Follow symlinks while walking the source tree.
    pub follow_symlinks: bool,
    /// Erase `print` calls at compile time.
    pub disable_print_statements: bool,
}

impl BuildParameters {
    /// Create parameters with every option at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compiler target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set inline capabilities JSON.
    pub fn with_capabilities_json(mut self, json: impl Into<String>) -> Self {
        self.capabilities_json = Some(json.into());
        self
    }

    /// Set the capability version identifier.
    pub fn with_capabilities_version(mut self, version: impl Into<String>) -> Self {
        self.capabilities_version = Some(version.into());
        self
    }

    /// Enable or disable bundle mode.
    pub fn with_bundle_mode(mut self, bundle_mode: bool) -> Self {
        self.bundle_mode = bundle_mode;
        self
    }

    /// Replace the entrypoint list.
    pub fn with_entrypoints<I, S>(mut self, entrypoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoints = entrypoints.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable debug log capture.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the optimization level.
    pub fn with_optimization_level(mut self, level: u32) -> Self {
        self.optimization_level = level;
        self
    }

    /// Enable or disable pruning of unused modules.
    pub fn with_prune_unused(mut self, prune: bool) -> Self {
        self.prune_unused = prune;
        self
    }

    /// Set the output revision.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Replace the ignore glob list.
    pub fn with_ignore<I, S>(mut self, ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = ignore.into_iter().map(Into::into).collect();
        self
    }

    /// Set the policy-language dialect.
    pub fn with_rego_version(mut self, version: RegoVersion) -> Self {
        self.rego_version = version;
        self
    }

    /// Enable or disable symlink following.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Enable or disable print statement erasure.
    pub fn with_disable_print_statements(mut self, disable: bool) -> Self {
        self.disable_print_statements = disable;
        self
    }
}
