// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Build-level error types and the coarse status codes reported to callers.
//!
//! Each pipeline stage owns its error enum; [`BuildError`] aggregates them so
//! the orchestrator can propagate with `?` and the boundary can map any failure
//! onto a single [`BuildStatus`].

use thiserror::Error;

use crate::bundle::BundleError;
use crate::capabilities::CapabilitiesError;
use crate::compiler::CompileError;

/// Coarse outcome of a build attempt, as seen across the native boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BuildStatus {
    /// The build produced an output bundle.
    Ok = 0,
    /// A required argument was missing (null pointer at the boundary).
    InvalidArgument = -1,
    /// The build panicked; the panic was contained at the boundary.
    Internal = -2,
    /// The input bundle bytes could not be read.
    BundleRead = -3,
    /// The compiler rejected the sources or failed to load them.
    Compile = -4,
    /// The capability set could not be resolved.
    Capabilities = -5,
}

impl BuildStatus {
    /// Integer code returned by the boundary entry points.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether this status represents a successful build.
    pub fn is_success(self) -> bool {
        self == BuildStatus::Ok
    }
}

/// Errors that abort a build.
///
/// Every variant is terminal for the call. The display text is what callers
/// receive in the result's error string.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Capability resolution failed (bad inline JSON or unknown version).
    #[error(transparent)]
    Capabilities(#[from] CapabilitiesError),

    /// The serialized input bundle could not be read.
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// The compiler failed.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The caller violated the calling contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An unexpected internal failure (a contained panic).
    #[error("internal error: {0}")]
    Internal(String),
}

impl BuildError {
    /// Status code reported alongside this error.
    pub fn status(&self) -> BuildStatus {
        match self {
            BuildError::Capabilities(_) => BuildStatus::Capabilities,
            BuildError::Bundle(_) => BuildStatus::BundleRead,
            BuildError::Compile(_) => BuildStatus::Compile,
            BuildError::InvalidArgument(_) => BuildStatus::InvalidArgument,
            BuildError::Internal(_) => BuildStatus::Internal,
        }
    }
}

/// Type alias for build results.
pub type Result<T> = std::result::Result<T, BuildError>;
