// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Safe in-process client for the exported entry points.
//!
//! Drives the C ABI exactly the way a foreign caller does: parameters are
//! marshalled into C strings and pointer arrays, the result is copied out
//! and then released with `rego_build_free_result`.

use std::ffi::{CStr, CString, NulError};
use std::fs;
use std::io;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;

use rego_build::{BundleWriter, RegoVersion, VersionInfo};
use thiserror::Error;
use tracing::debug;

use crate::types::{RegoBuildParams, RegoBuildResult, RegoBytesBuildParams, RegoFsBuildParams};
use crate::{
    rego_build_free_result, rego_build_free_version, rego_build_from_bytes, rego_build_from_fs,
    rego_build_get_version,
};

/// Entry name used when a single policy is wrapped into a bundle.
pub const SOURCE_ENTRY: &str = "policy.rego";

/// Default target backend.
pub const DEFAULT_TARGET: &str = "rego";

/// Errors reported by [`InteropCompiler`].
#[derive(Debug, Error)]
pub enum InteropError {
    /// The source path is empty.
    #[error("source path is empty")]
    EmptyPath,

    /// A string parameter contains a NUL byte.
    #[error("parameter contains an interior NUL byte: {0}")]
    InvalidString(#[from] NulError),

    /// A parameter does not fit the C layout.
    #[error("{0}")]
    InvalidArgument(String),

    /// The capabilities file could not be read.
    #[error("failed to read capabilities file {path}: {source}")]
    CapabilitiesFile {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The source could not be wrapped into a bundle.
    #[error("failed to create bundle: {0}")]
    Bundle(#[from] io::Error),

    /// The library reported an error.
    #[error("{message}")]
    Build {
        /// Status code returned by the entry point.
        status: i32,
        /// Error text from the result.
        message: String,
    },

    /// The entry point returned no result object.
    #[error("compilation failed with status {0}")]
    NoResult(i32),

    /// The build succeeded but produced no output.
    #[error("bad result: build produced no output")]
    EmptyOutput,

    /// Version metadata could not be read.
    #[error("failed to get version")]
    Version,
}

/// Options for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationParameters {
    /// Treat the source as a bundle.
    pub is_bundle: bool,
    /// Target backend.
    pub target: String,
    /// Entrypoints.
    pub entrypoints: Vec<String>,
    /// Capabilities file, read and sent inline. Wins over `capabilities_bytes`.
    pub capabilities_file_path: Option<PathBuf>,
    /// Inline capabilities JSON.
    pub capabilities_bytes: Vec<u8>,
    /// Named capabilities version.
    pub capabilities_version: Option<String>,
    /// Capture the build log.
    pub debug: bool,
    /// Drop unreachable modules.
    pub prune_unused: bool,
    /// Optimization level.
    pub optimization_level: u32,
    /// Dialect.
    pub rego_version: RegoVersion,
    /// Manifest revision.
    pub revision: Option<String>,
    /// Ignore globs.
    pub ignore: Vec<String>,
    /// Follow symlinks.
    pub follow_symlinks: bool,
    /// Erase `print` calls.
    pub disable_print_statements: bool,
}

impl Default for CompilationParameters {
    fn default() -> Self {
        Self {
            is_bundle: false,
            target: DEFAULT_TARGET.to_string(),
            entrypoints: Vec::new(),
            capabilities_file_path: None,
            capabilities_bytes: Vec::new(),
            capabilities_version: None,
            debug: false,
            prune_unused: false,
            optimization_level: 0,
            rego_version: RegoVersion::Undefined,
            revision: None,
            ignore: Vec::new(),
            follow_symlinks: false,
            disable_print_statements: false,
        }
    }
}

impl CompilationParameters {
    /// Parameters with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the source as a bundle.
    pub fn with_bundle(mut self, is_bundle: bool) -> Self {
        self.is_bundle = is_bundle;
        self
    }

    /// Set the target backend.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the entrypoints.
    pub fn with_entrypoints<I, S>(mut self, entrypoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoints = entrypoints.into_iter().map(Into::into).collect();
        self
    }

    /// Read capabilities from a file.
    pub fn with_capabilities_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.capabilities_file_path = Some(path.into());
        self
    }

    /// Send inline capabilities JSON.
    pub fn with_capabilities_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.capabilities_bytes = bytes.into();
        self
    }

    /// Use a named capabilities version.
    pub fn with_capabilities_version(mut self, version: impl Into<String>) -> Self {
        self.capabilities_version = Some(version.into());
        self
    }

    /// Capture the build log.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Drop unreachable modules.
    pub fn with_prune_unused(mut self, prune: bool) -> Self {
        self.prune_unused = prune;
        self
    }

    /// Set the optimization level.
    pub fn with_optimization_level(mut self, level: u32) -> Self {
        self.optimization_level = level;
        self
    }

    /// Set the dialect.
    pub fn with_rego_version(mut self, version: RegoVersion) -> Self {
        self.rego_version = version;
        self
    }

    /// Set the manifest revision.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Set the ignore globs.
    pub fn with_ignore<I, S>(mut self, ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = ignore.into_iter().map(Into::into).collect();
        self
    }

    /// Follow symlinks.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Erase `print` calls.
    pub fn with_disable_print_statements(mut self, disable: bool) -> Self {
        self.disable_print_statements = disable;
        self
    }

    fn capabilities_json(&self) -> Result<Option<String>, InteropError> {
        if let Some(path) = &self.capabilities_file_path {
            let json = fs::read_to_string(path).map_err(|source| InteropError::CapabilitiesFile {
                path: path.display().to_string(),
                source,
            })?;
            return Ok(Some(json));
        }
        if self.capabilities_bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.capabilities_bytes).into_owned()))
    }
}

fn optional(value: Option<&str>) -> Result<Option<CString>, InteropError> {
    Ok(value.map(CString::new).transpose()?)
}

fn as_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

fn c_len(len: usize, what: &str) -> Result<c_int, InteropError> {
    c_int::try_from(len).map_err(|_| InteropError::InvalidArgument(format!("too many {what}: {len}")))
}

/// Owned C copies of one parameter set, alive for the duration of a call.
struct NativeParams {
    target: CString,
    capabilities_json: Option<CString>,
    capabilities_version: Option<CString>,
    revision: Option<CString>,
    entrypoints: Vec<CString>,
    ignore: Vec<CString>,
    bundle_mode: bool,
    debug: bool,
    optimization_level: c_int,
    prune_unused: bool,
    rego_version: RegoVersion,
    follow_symlinks: bool,
    disable_print_statements: bool,
}

impl NativeParams {
    fn new(params: &CompilationParameters, force_bundle: bool) -> Result<Self, InteropError> {
        let strings = |values: &[String]| -> Result<Vec<CString>, InteropError> {
            values
                .iter()
                .map(|v| CString::new(v.as_str()).map_err(InteropError::from))
                .collect()
        };

        let entrypoints = strings(&params.entrypoints)?;
        let ignore = strings(&params.ignore)?;
        c_len(entrypoints.len(), "entrypoints")?;
        c_len(ignore.len(), "ignore patterns")?;

        Ok(Self {
            target: CString::new(params.target.as_str())?,
            capabilities_json: optional(params.capabilities_json()?.as_deref())?,
            capabilities_version: optional(params.capabilities_version.as_deref())?,
            revision: optional(params.revision.as_deref())?,
            entrypoints,
            ignore,
            bundle_mode: force_bundle || params.is_bundle,
            debug: params.debug,
            optimization_level: c_int::try_from(params.optimization_level).unwrap_or(c_int::MAX),
            prune_unused: params.prune_unused,
            rego_version: params.rego_version,
            follow_symlinks: params.follow_symlinks,
            disable_print_statements: params.disable_print_statements,
        })
    }

    /// Call `f` with a C record borrowing from `self`.
    fn with_raw<T>(&self, f: impl FnOnce(RegoBuildParams) -> T) -> T {
        let entrypoints: Vec<*const c_char> = self.entrypoints.iter().map(|s| s.as_ptr()).collect();
        let ignore: Vec<*const c_char> = self.ignore.iter().map(|s| s.as_ptr()).collect();

        let raw = RegoBuildParams {
            target: self.target.as_ptr(),
            capabilities_json: as_ptr(&self.capabilities_json),
            capabilities_version: as_ptr(&self.capabilities_version),
            bundle_mode: c_int::from(self.bundle_mode),
            entrypoints: if entrypoints.is_empty() { ptr::null() } else { entrypoints.as_ptr() },
            entrypoints_len: c_int::try_from(entrypoints.len()).unwrap_or(0),
            debug: c_int::from(self.debug),
            optimization_level: self.optimization_level,
            prune_unused: c_int::from(self.prune_unused),
            temp_dir: ptr::null(),
            revision: as_ptr(&self.revision),
            ignore: if ignore.is_empty() { ptr::null() } else { ignore.as_ptr() },
            ignore_len: c_int::try_from(ignore.len()).unwrap_or(0),
            rego_version: self.rego_version.as_raw(),
            follow_symlinks: c_int::from(self.follow_symlinks),
            disable_print_statements: c_int::from(self.disable_print_statements),
        };
        f(raw)
    }
}

/// Frees a result when dropped.
struct ResultGuard(*mut RegoBuildResult);

impl Drop for ResultGuard {
    fn drop(&mut self) {
        unsafe { rego_build_free_result(self.0) };
    }
}

fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Strip a leading `./` and use forward slashes.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path
        .strip_prefix("./")
        .or_else(|| path.strip_prefix(".\\"))
        .unwrap_or(path);
    trimmed.replace('\\', "/")
}

/// Compiles policies through the exported C entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteropCompiler;

impl InteropCompiler {
    /// Create a client.
    pub fn new() -> Self {
        Self
    }

    /// Version metadata reported by the library.
    pub fn version(&self) -> Result<VersionInfo, InteropError> {
        let info = rego_build_get_version();
        let Some(view) = (unsafe { info.as_ref() }) else {
            return Err(InteropError::Version);
        };

        let version = VersionInfo {
            version: read_c_string(view.lib_version).unwrap_or_default(),
            runtime_version: read_c_string(view.runtime_version).unwrap_or_default(),
            commit: read_c_string(view.commit).unwrap_or_default(),
            platform: read_c_string(view.platform).unwrap_or_default(),
        };
        unsafe { rego_build_free_version(info) };
        Ok(version)
    }

    /// Compile a file or directory.
    pub fn compile_path(&self, path: &str, params: &CompilationParameters) -> Result<Vec<u8>, InteropError> {
        if path.is_empty() {
            return Err(InteropError::EmptyPath);
        }

        let source = CString::new(normalize_path(path))?;
        let native = NativeParams::new(params, false)?;

        native.with_raw(|raw| {
            let request = RegoFsBuildParams {
                source: source.as_ptr(),
                params: raw,
            };
            invoke(|out| unsafe { rego_build_from_fs(&request, out) })
        })
    }

    /// Compile serialized bytes.
    ///
    /// Unless `params.is_bundle` is set, the bytes are a single policy and
    /// are wrapped into a bundle first. Either way the library sees a
    /// bundle.
    pub fn compile_bytes(&self, bytes: &[u8], params: &CompilationParameters) -> Result<Vec<u8>, InteropError> {
        let wrapped;
        let bundle = if params.is_bundle {
            bytes
        } else {
            let mut writer = BundleWriter::new(Vec::new());
            writer.write_entry(SOURCE_ENTRY, bytes)?;
            wrapped = writer.finish()?;
            &wrapped[..]
        };

        let native = NativeParams::new(params, true)?;
        let bytes_len = c_len(bundle.len(), "bundle bytes")?;

        native.with_raw(|raw| {
            let request = RegoBytesBuildParams {
                bytes: bundle.as_ptr(),
                bytes_len,
                params: raw,
            };
            invoke(|out| unsafe { rego_build_from_bytes(&request, out) })
        })
    }

    /// Compile a single policy given as text.
    pub fn compile_source(&self, source: &str, params: &CompilationParameters) -> Result<Vec<u8>, InteropError> {
        let params = params.clone().with_bundle(false);
        self.compile_bytes(source.as_bytes(), &params)
    }
}

fn invoke(call: impl FnOnce(*mut *mut RegoBuildResult) -> c_int) -> Result<Vec<u8>, InteropError> {
    let mut result: *mut RegoBuildResult = ptr::null_mut();
    let status = call(&mut result);
    let guard = ResultGuard(result);

    let Some(view) = (unsafe { guard.0.as_ref() }) else {
        return Err(InteropError::NoResult(status));
    };

    if let Some(log) = read_c_string(view.log).filter(|l| !l.is_empty()) {
        debug!(build_log = %log, "Build log");
    }

    if let Some(message) = read_c_string(view.errors).filter(|e| !e.trim().is_empty()) {
        return Err(InteropError::Build { status, message });
    }
    if status != 0 {
        return Err(InteropError::Build {
            status,
            message: format!("compilation error {status}"),
        });
    }

    let len = usize::try_from(view.result_len).unwrap_or(0);
    if view.result.is_null() || len == 0 {
        return Err(InteropError::EmptyOutput);
    }
    Ok(unsafe { std::slice::from_raw_parts(view.result, len) }.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./policies"), "policies");
        assert_eq!(normalize_path(".\\policies\\authz"), "policies/authz");
        assert_eq!(normalize_path("/abs/path"), "/abs/path");
    }

    #[test]
    fn test_default_target_is_rego() {
        assert_eq!(CompilationParameters::default().target, "rego");
    }

    #[test]
    fn test_capabilities_file_wins_over_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("caps.json");
        fs::write(&path, r#"{"features":["from-file"]}"#).unwrap();

        let params = CompilationParameters::new()
            .with_capabilities_bytes(r#"{"features":["from-bytes"]}"#)
            .with_capabilities_file(&path);
        assert!(params.capabilities_json().unwrap().unwrap().contains("from-file"));

        let params = CompilationParameters::new().with_capabilities_bytes("{}");
        assert_eq!(params.capabilities_json().unwrap().as_deref(), Some("{}"));

        assert_eq!(CompilationParameters::new().capabilities_json().unwrap(), None);
    }

    #[test]
    fn test_missing_capabilities_file() {
        let params = CompilationParameters::new().with_capabilities_file("/no/such/caps.json");
        let err = NativeParams::new(&params, false).err().unwrap();
        assert!(matches!(err, InteropError::CapabilitiesFile { .. }));
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let params = CompilationParameters::new().with_entrypoints(["bad\0entry"]);
        let err = NativeParams::new(&params, false).err().unwrap();
        assert!(matches!(err, InteropError::InvalidString(_)));
    }

    #[test]
    fn test_native_params_force_bundle() {
        let native = NativeParams::new(&CompilationParameters::new(), true).unwrap();
        native.with_raw(|raw| {
            assert_eq!(raw.bundle_mode, 1);
            assert!(raw.entrypoints.is_null());
            assert_eq!(raw.entrypoints_len, 0);
            assert!(raw.capabilities_json.is_null());
        });
    }
}
