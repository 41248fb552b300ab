// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Build and version metadata.
//!
//! The toolchain, target and revision strings are captured by the build
//! script at compile time.

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `rustc --version` of the toolchain that built this library.
pub const RUNTIME_VERSION: &str = env!("REGO_BUILD_RUSTC_VERSION");

/// Source control revision (empty when unknown).
pub const COMMIT: &str = env!("REGO_BUILD_VCS_REVISION");

/// Target triple this library was built for.
pub const PLATFORM: &str = env!("REGO_BUILD_TARGET");

/// Static version metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Library version.
    pub version: String,
    /// Host toolchain version.
    pub runtime_version: String,
    /// Source control revision.
    pub commit: String,
    /// Target platform triple.
    pub platform: String,
}

impl VersionInfo {
    /// Version metadata of this build.
    pub fn current() -> Self {
        Self {
            version: VERSION.to_string(),
            runtime_version: RUNTIME_VERSION.to_string(),
            commit: COMMIT.to_string(),
            platform: PLATFORM.to_string(),
        }
    }
}
