// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The compiler seam.
//!
//! The orchestrator only knows [`PolicyCompiler`]: a configuration goes in,
//! bundle bytes or an error come out. [`BundleCompiler`] is the
//! implementation shipped with this crate.

mod bundle_compiler;

pub use bundle_compiler::BundleCompiler;

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::capabilities::Capabilities;
use crate::loader::{LoadError, PathFilter};
use crate::params::{RegoVersion, SourceMode};
use crate::policy::ParseError;

/// Compiles policy sources into bundle bytes.
pub trait PolicyCompiler: Send + Sync {
    /// Run one compilation to completion.
    fn compile(&self, config: &CompileConfig) -> Result<Vec<u8>, CompileError>;

    /// Version string reported in build logs.
    fn version(&self) -> &str {
        crate::version::VERSION
    }
}

/// Output backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Policy source bundle.
    Rego,
    /// Source bundle plus an execution plan document.
    Plan,
}

impl Target {
    /// Parse a target name. The empty name selects [`Target::Rego`].
    pub fn parse(name: &str) -> Result<Self, CompileError> {
        match name {
            "" | "rego" => Ok(Target::Rego),
            "plan" => Ok(Target::Plan),
            other => Err(CompileError::UnsupportedTarget(other.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Rego => f.write_str("rego"),
            Target::Plan => f.write_str("plan"),
        }
    }
}

/// A located compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source file, empty when the problem has no location.
    pub file: String,
    /// One-based line number.
    pub line: usize,
    /// Error category, e.g. `rego_type_error`.
    pub kind: &'static str,
    /// Description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(f, "{}:{}: {}: {}", self.file, self.line, self.kind, self.message)
        }
    }
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        Self {
            file: err.file,
            line: err.line,
            kind: "rego_parse_error",
            message: err.message,
        }
    }
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    match diagnostics {
        [single] => format!("1 error occurred: {single}"),
        many => {
            let lines: Vec<String> = many.iter().map(ToString::to_string).collect();
            format!("{} errors occurred:\n{}", many.len(), lines.join("\n"))
        }
    }
}

/// Errors raised by a compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The sources were rejected.
    #[error("{}", render_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),

    /// The sources could not be loaded.
    #[error(transparent)]
    Load(LoadError),

    /// The target backend is not supported.
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// An entrypoint names nothing in the sources.
    #[error("entrypoint {0:?} does not refer to a rule or policy decision")]
    UnknownEntrypoint(String),

    /// The option combination is invalid.
    #[error("{0}")]
    InvalidConfig(String),

    /// The output bundle could not be written.
    #[error("failed to write output bundle: {0}")]
    Output(#[from] io::Error),
}

impl From<LoadError> for CompileError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Parse(parse) => CompileError::Diagnostics(vec![parse.into()]),
            other => CompileError::Load(other),
        }
    }
}

/// Everything a compiler needs for one run.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Target backend name.
    pub target: String,
    /// Treat a filesystem source as a bundle directory.
    pub as_bundle: bool,
    /// Requested entrypoints, slash- or dot-separated.
    pub entrypoints: Vec<String>,
    /// Where the sources come from.
    pub source: SourceMode,
    /// Capability set to validate against.
    pub capabilities: Arc<Capabilities>,
    /// Keep `print` calls.
    pub enable_print_statements: bool,
    /// Drop modules unreachable from the entrypoints.
    pub prune_unused: bool,
    /// Optimization level.
    pub optimization_level: u32,
    /// Add entrypoints declared by `# METADATA` annotations.
    pub annotation_entrypoints: bool,
    /// Filter for filesystem walks.
    pub filter: PathFilter,
    /// Dialect of the sources.
    pub rego_version: RegoVersion,
    /// Follow symlinks in filesystem walks.
    pub follow_symlinks: bool,
    /// Revision recorded in the output manifest.
    pub revision: Option<String>,
    /// Emit detailed progress events.
    pub debug: bool,
}

impl CompileConfig {
    /// Configuration with defaults for everything but the source and
    /// capabilities.
    pub fn new(source: SourceMode, capabilities: Arc<Capabilities>) -> Self {
        Self {
            target: String::new(),
            as_bundle: false,
            entrypoints: Vec::new(),
            source,
            capabilities,
            enable_print_statements: true,
            prune_unused: false,
            optimization_level: 0,
            annotation_entrypoints: false,
            filter: PathFilter::default(),
            rego_version: RegoVersion::Undefined,
            follow_symlinks: false,
            revision: None,
            debug: false,
        }
    }

    /// Set the target backend.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set bundle mode.
    pub fn with_bundle_mode(mut self, as_bundle: bool) -> Self {
        self.as_bundle = as_bundle;
        self
    }

    /// Set the entrypoints.
    pub fn with_entrypoints(mut self, entrypoints: Vec<String>) -> Self {
        self.entrypoints = entrypoints;
        self
    }

    /// Keep or erase `print` calls.
    pub fn with_print_statements(mut self, enabled: bool) -> Self {
        self.enable_print_statements = enabled;
        self
    }

    /// Enable pruning.
    pub fn with_prune_unused(mut self, prune: bool) -> Self {
        self.prune_unused = prune;
        self
    }

    /// Set the optimization level.
    pub fn with_optimization_level(mut self, level: u32) -> Self {
        self.optimization_level = level;
        self
    }

    /// Enable annotation entrypoints.
    pub fn with_annotation_entrypoints(mut self, enabled: bool) -> Self {
        self.annotation_entrypoints = enabled;
        self
    }

    /// Set the filesystem filter.
    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the dialect.
    pub fn with_rego_version(mut self, version: RegoVersion) -> Self {
        self.rego_version = version;
        self
    }

    /// Follow symlinks.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set the revision.
    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    /// Enable debug events.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
