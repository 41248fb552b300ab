// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment-driven build configuration.
//!
//! Values are read once per process; [`BuildEnvConfig::global`] caches them.

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Default filter directive for the debug log sink.
pub const DEFAULT_LOG_FILTER: &str = "debug";

/// Default cap on the decompressed size of an input bundle (512 MiB).
pub const DEFAULT_MAX_BUNDLE_BYTES: u64 = 512 * 1024 * 1024;

/// Default cap on the number of entries in an input bundle.
pub const DEFAULT_MAX_BUNDLE_ENTRIES: usize = 10_000;

static GLOBAL: OnceLock<BuildEnvConfig> = OnceLock::new();

/// Process-wide build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvConfig {
    /// Filter directive applied to the debug log sink (default: "debug")
    pub log_filter: String,
    /// Maximum decompressed bundle size in bytes (default: 512 MiB)
    pub max_bundle_bytes: u64,
    /// Maximum number of archive entries in a bundle (default: 10_000)
    pub max_bundle_entries: usize,
    /// Extra directory searched for named capability versions (`<dir>/<version>.json`)
    pub capabilities_dir: Option<PathBuf>,
}

impl Default for BuildEnvConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            max_bundle_bytes: DEFAULT_MAX_BUNDLE_BYTES,
            max_bundle_entries: DEFAULT_MAX_BUNDLE_ENTRIES,
            capabilities_dir: None,
        }
    }
}

impl BuildEnvConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `REGO_BUILD_LOG` - Debug sink filter directive (default: "debug")
    /// - `REGO_BUILD_MAX_BUNDLE_BYTES` - Decompressed bundle size cap (default: 536870912)
    /// - `REGO_BUILD_MAX_BUNDLE_ENTRIES` - Bundle entry count cap (default: 10000)
    /// - `REGO_BUILD_CAPABILITIES_DIR` - Directory of `<version>.json` capability files
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_env() -> Self {
        let log_filter = env::var("REGO_BUILD_LOG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let max_bundle_bytes = env::var("REGO_BUILD_MAX_BUNDLE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BUNDLE_BYTES);

        let max_bundle_entries = env::var("REGO_BUILD_MAX_BUNDLE_ENTRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BUNDLE_ENTRIES);

        let capabilities_dir = env::var("REGO_BUILD_CAPABILITIES_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            log_filter,
            max_bundle_bytes,
            max_bundle_entries,
            capabilities_dir,
        }
    }

    /// Configuration shared by every build in this process.
    ///
    /// Read from the environment on first use and never refreshed.
    pub fn global() -> &'static BuildEnvConfig {
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Set the debug sink filter directive.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the decompressed bundle size cap.
    pub fn with_max_bundle_bytes(mut self, max: u64) -> Self {
        self.max_bundle_bytes = max;
        self
    }

    /// Set the bundle entry count cap.
    pub fn with_max_bundle_entries(mut self, max: usize) -> Self {
        self.max_bundle_entries = max;
        self
    }

    /// Set the capability file directory.
    pub fn with_capabilities_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capabilities_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        // SAFETY: tests touching the environment are serialized.
        unsafe {
            env::remove_var("REGO_BUILD_LOG");
            env::remove_var("REGO_BUILD_MAX_BUNDLE_BYTES");
            env::remove_var("REGO_BUILD_MAX_BUNDLE_ENTRIES");
            env::remove_var("REGO_BUILD_CAPABILITIES_DIR");
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = BuildEnvConfig::from_env();
        assert_eq!(config, BuildEnvConfig::default());
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.max_bundle_entries, 10_000);
        assert!(config.capabilities_dir.is_none());
    }

    #[test]
    #[serial]
    fn test_reads_env_overrides() {
        clear_env();
        // SAFETY: serialized.
        unsafe {
            env::set_var("REGO_BUILD_LOG", "rego_build=trace");
            env::set_var("REGO_BUILD_MAX_BUNDLE_BYTES", "1024");
            env::set_var("REGO_BUILD_MAX_BUNDLE_ENTRIES", "12");
            env::set_var("REGO_BUILD_CAPABILITIES_DIR", "/opt/caps");
        }

        let config = BuildEnvConfig::from_env();
        assert_eq!(config.log_filter, "rego_build=trace");
        assert_eq!(config.max_bundle_bytes, 1024);
        assert_eq!(config.max_bundle_entries, 12);
        assert_eq!(config.capabilities_dir, Some(PathBuf::from("/opt/caps")));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back() {
        clear_env();
        // SAFETY: serialized.
        unsafe {
            env::set_var("REGO_BUILD_MAX_BUNDLE_BYTES", "lots");
            env::set_var("REGO_BUILD_LOG", "   ");
        }

        let config = BuildEnvConfig::from_env();
        assert_eq!(config.max_bundle_bytes, DEFAULT_MAX_BUNDLE_BYTES);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);

        clear_env();
    }

    #[test]
    fn test_builder_pattern() {
        let config = BuildEnvConfig::default()
            .with_log_filter("info")
            .with_max_bundle_bytes(10)
            .with_max_bundle_entries(2)
            .with_capabilities_dir("/tmp/caps");

        assert_eq!(config.log_filter, "info");
        assert_eq!(config.max_bundle_bytes, 10);
        assert_eq!(config.max_bundle_entries, 2);
        assert_eq!(config.capabilities_dir, Some(PathBuf::from("/tmp/caps")));
    }
}
