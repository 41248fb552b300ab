// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rego Build - Policy Bundle Build Pipeline
//!
//! This crate turns policy sources (a directory tree or a serialized bundle)
//! into a compiled policy bundle. It is the engine behind the native ABI
//! exposed by `rego-build-ffi`, and it is equally usable from Rust directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Build Pipeline                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//!     ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//!     │   Build     │      │ Capability  │      │   Source    │
//!     │ Parameters  │─────▶│ Resolution  │─────▶│ Acquisition │
//!     └─────────────┘      └─────────────┘      └─────────────┘
//!                                                      │
//!                                                      ▼
//!     ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//!     │   Output    │◀─────│   Policy    │◀─────│   Compile   │
//!     │   Bundle    │      │  Compiler   │      │   Config    │
//!     └─────────────┘      └─────────────┘      └─────────────┘
//! ```
//!
//! 1. **Resolve capabilities**: inline JSON and/or a named version, merged,
//!    or the process-wide default set
//! 2. **Acquire source**: a filesystem path (walked later under a path filter)
//!    or a bundle archive parsed eagerly
//! 3. **Compile**: hand a [`CompileConfig`] to a [`PolicyCompiler`]
//! 4. **Package**: the output bytes, error text and captured debug log are
//!    returned as a [`BuildOutcome`]
//!
//! # Usage
//!
//! ```ignore
//! use rego_build::{BuildParameters, BundleCompiler, SourceRequest, execute};
//!
//! let params = BuildParameters::new()
//!     .with_entrypoints(["example/allow"])
//!     .with_debug(true);
//!
//! let outcome = execute(&params, SourceRequest::Filesystem("./policies"), &BundleCompiler::new());
//! if let Some(output) = &outcome.output {
//!     std::fs::write("bundle.tar.gz", output)?;
//! }
//! ```
//!
//! # Modules
//!
//! - [`bundle`]: Bundle archive reading and writing
//! - [`capabilities`]: Capability sets, the version catalog and resolution
//! - [`compiler`]: The compiler seam and the bundled structural compiler
//! - [`config`]: Environment-driven configuration
//! - [`debug_log`]: In-memory capture of debug diagnostics
//! - [`loader`]: Filesystem source loading and path filtering
//! - [`orchestrator`]: Pipeline orchestration
//! - [`policy`]: Policy module scanning

#![deny(missing_docs)]

/// Bundle archive reading and writing.
pub mod bundle;

/// Capability sets, the version catalog and resolution.
pub mod capabilities;

/// The compiler seam and the bundled structural compiler.
pub mod compiler;

/// Environment-driven configuration.
pub mod config;

/// In-memory capture of debug diagnostics.
pub mod debug_log;

/// Build error aggregation and boundary status codes.
pub mod error;

/// Filesystem source loading and path filtering.
pub mod loader;

/// Pipeline orchestration.
pub mod orchestrator;

/// Build parameters and source modes.
pub mod params;

/// Policy module scanning.
pub mod policy;

/// Build and version metadata.
pub mod version;

// Re-export main types
pub use bundle::{Bundle, BundleError, BundleReader, BundleWriter, Manifest};
pub use capabilities::{Capabilities, CapabilitiesError, default_capabilities, resolve_capabilities};
pub use compiler::{BundleCompiler, CompileConfig, CompileError, PolicyCompiler, Target};
pub use config::BuildEnvConfig;
pub use debug_log::{DebugLog, with_debug_log};
pub use error::{BuildError, BuildStatus};
pub use loader::{LoadError, PathFilter, SourceLoader};
pub use orchestrator::{BuildOutcome, SourceRequest, execute, run_build};
pub use params::{BuildParameters, RegoVersion, SourceMode};
pub use policy::{ParseError, PolicyModule};
pub use version::VersionInfo;
