// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! C-compatible layouts shared with foreign callers.
//!
//! Field order and widths match `include/rego_build.h` and must not change.
//! Flags are C `int`s where any value greater than zero means true.

use std::os::raw::{c_char, c_int};
use std::ptr;

/// Version metadata, owned by the caller after `rego_build_get_version`.
#[repr(C)]
#[derive(Debug)]
pub struct RegoVersionInfo {
    /// Library version.
    pub lib_version: *mut c_char,
    /// Toolchain that built the library.
    pub runtime_version: *mut c_char,
    /// Source control revision, possibly empty.
    pub commit: *mut c_char,
    /// Target platform triple.
    pub platform: *mut c_char,
}

/// Options shared by both build entry points.
///
/// All pointers are borrowed for the duration of the call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RegoBuildParams {
    /// Target backend name; null or empty selects the default.
    pub target: *const c_char,
    /// Inline capabilities JSON.
    pub capabilities_json: *const c_char,
    /// Named capabilities version or capabilities file path.
    pub capabilities_version: *const c_char,
    /// Treat the source as a bundle.
    pub bundle_mode: c_int,
    /// Entrypoint names.
    pub entrypoints: *const *const c_char,
    /// Number of pointers in `entrypoints`.
    pub entrypoints_len: c_int,
    /// Capture a debug log into the result.
    pub debug: c_int,
    /// Optimization level; negative values count as zero.
    pub optimization_level: c_int,
    /// Drop modules unreachable from the entrypoints.
    pub prune_unused: c_int,
    /// Working directory hint. Not consumed.
    pub temp_dir: *const c_char,
    /// Revision recorded in the output manifest.
    pub revision: *const c_char,
    /// Ignore globs.
    pub ignore: *const *const c_char,
    /// Number of pointers in `ignore`.
    pub ignore_len: c_int,
    /// Dialect: 0 undefined, 1 v0, 2 v0 compatible with v1, 3 v1.
    pub rego_version: c_int,
    /// Follow symlinks while walking the source tree.
    pub follow_symlinks: c_int,
    /// Erase `print` calls.
    pub disable_print_statements: c_int,
}

impl Default for RegoBuildParams {
    fn default() -> Self {
        Self {
            target: ptr::null(),
            capabilities_json: ptr::null(),
            capabilities_version: ptr::null(),
            bundle_mode: 0,
            entrypoints: ptr::null(),
            entrypoints_len: 0,
            debug: 0,
            optimization_level: 0,
            prune_unused: 0,
            temp_dir: ptr::null(),
            revision: ptr::null(),
            ignore: ptr::null(),
            ignore_len: 0,
            rego_version: 0,
            follow_symlinks: 0,
            disable_print_statements: 0,
        }
    }
}

/// Parameters for `rego_build_from_fs`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RegoFsBuildParams {
    /// File or directory to build from.
    pub source: *const c_char,
    /// Build options.
    pub params: RegoBuildParams,
}

/// Parameters for `rego_build_from_bytes`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RegoBytesBuildParams {
    /// Serialized bundle.
    pub bytes: *const u8,
    /// Length of `bytes`.
    pub bytes_len: c_int,
    /// Build options.
    pub params: RegoBuildParams,
}

/// Build result, owned by the caller until `rego_build_free_result`.
///
/// Absent pieces stay null.
#[repr(C)]
#[derive(Debug)]
pub struct RegoBuildResult {
    /// Output bundle bytes.
    pub result: *mut u8,
    /// Length of `result`.
    pub result_len: c_int,
    /// Error text.
    pub errors: *mut c_char,
    /// Captured debug log.
    pub log: *mut c_char,
}

impl Default for RegoBuildResult {
    fn default() -> Self {
        Self {
            result: ptr::null_mut(),
            result_len: 0,
            errors: ptr::null_mut(),
            log: ptr::null_mut(),
        }
    }
}
