// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Allocation and release of every object handed to the caller.
//!
//! Each `new_*`/`into_*` function here has exactly one matching `free_*`
//! counterpart. Nothing outside this module creates or frees
//! boundary-owned memory.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::ptr;

use rego_build::{BuildOutcome, BuildStatus, VersionInfo};
use thiserror::Error;

use crate::types::{RegoBuildResult, RegoVersionInfo};

/// Failures while packaging data for the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OwnershipError {
    /// The output does not fit the C `int` length field.
    #[error("build output of {0} bytes exceeds the maximum result size")]
    OutputTooLarge(usize),

    /// A successful build returned no bytes.
    #[error("build succeeded without producing output")]
    EmptyOutput,
}

/// Hand a string to the caller. Interior NUL bytes are removed.
pub fn into_c_string(text: &str) -> *mut c_char {
    let sanitized = if text.contains('\0') {
        CString::new(text.replace('\0', "")).unwrap_or_default()
    } else {
        CString::new(text).unwrap_or_default()
    };
    sanitized.into_raw()
}

/// Release a string from [`into_c_string`]. Null is ignored.
///
/// # Safety
/// `ptr` must be null or come from [`into_c_string`] and not have been
/// freed.
pub unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Hand a byte buffer to the caller as a pointer and C length.
///
/// An empty buffer yields a null pointer and zero length.
pub fn into_c_bytes(bytes: Vec<u8>) -> Result<(*mut u8, c_int), OwnershipError> {
    if bytes.is_empty() {
        return Ok((ptr::null_mut(), 0));
    }
    let len = c_int::try_from(bytes.len()).map_err(|_| OwnershipError::OutputTooLarge(bytes.len()))?;
    let raw = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
    Ok((raw, len))
}

/// Release a buffer from [`into_c_bytes`]. Null is ignored.
///
/// # Safety
/// `ptr` and `len` must be exactly what [`into_c_bytes`] returned, and the
/// buffer must not have been freed.
pub unsafe fn free_c_bytes(ptr: *mut u8, len: c_int) {
    if ptr.is_null() {
        return;
    }
    let len = usize::try_from(len).unwrap_or(0);
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)) });
}

/// Allocate an empty result with every field null.
pub fn new_build_result() -> *mut RegoBuildResult {
    Box::into_raw(Box::new(RegoBuildResult::default()))
}

/// Copy an outcome into a result from [`new_build_result`].
///
/// Returns the status to report, which differs from the outcome's only
/// when the output cannot be handed over. An empty output counts as an
/// internal failure so that exactly one of output and error is set.
///
/// # Safety
/// `result` must come from [`new_build_result`] and still be unpopulated.
pub unsafe fn package_result(result: *mut RegoBuildResult, outcome: BuildOutcome) -> BuildStatus {
    let Some(result) = (unsafe { result.as_mut() }) else {
        return outcome.status;
    };

    let mut status = outcome.status;
    let mut error = outcome.error;

    if let Some(output) = outcome.output {
        let handed = if output.is_empty() {
            Err(OwnershipError::EmptyOutput)
        } else {
            into_c_bytes(output)
        };
        match handed {
            Ok((ptr, len)) => {
                result.result = ptr;
                result.result_len = len;
            }
            Err(e) => {
                status = BuildStatus::Internal;
                error = Some(e.to_string());
            }
        }
    }
    if let Some(error) = error {
        result.errors = into_c_string(&error);
    }
    if let Some(log) = outcome.log {
        result.log = into_c_string(&log);
    }

    status
}

/// Release a result and every populated field.
///
/// # Safety
/// `result` must be null or come from [`new_build_result`] and not have
/// been freed.
pub unsafe fn free_build_result(result: *mut RegoBuildResult) {
    if result.is_null() {
        return;
    }
    let result = unsafe { Box::from_raw(result) };
    unsafe {
        free_c_bytes(result.result, result.result_len);
        free_c_string(result.errors);
        free_c_string(result.log);
    }
}

/// Allocate version metadata for the caller.
pub fn new_version_info(info: &VersionInfo) -> *mut RegoVersionInfo {
    Box::into_raw(Box::new(RegoVersionInfo {
        lib_version: into_c_string(&info.version),
        runtime_version: into_c_string(&info.runtime_version),
        commit: into_c_string(&info.commit),
        platform: into_c_string(&info.platform),
    }))
}

/// Release version metadata from [`new_version_info`].
///
/// # Safety
/// `info` must be null or come from [`new_version_info`] and not have been
/// freed.
pub unsafe fn free_version_info(info: *mut RegoVersionInfo) {
    if info.is_null() {
        return;
    }
    let info = unsafe { Box::from_raw(info) };
    unsafe {
        free_c_string(info.lib_version);
        free_c_string(info.runtime_version);
        free_c_string(info.commit);
        free_c_string(info.platform);
    }
}
