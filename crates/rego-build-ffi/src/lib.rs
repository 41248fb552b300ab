// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rego Build FFI - C ABI for the policy bundle pipeline
//!
//! Exposes the `rego-build` pipeline to callers that cannot link Rust
//! directly. The layouts live in [`types`] and are mirrored by
//! `include/rego_build.h`.
//!
//! # Ownership
//!
//! Every pointer returned by this library is owned by the caller and must
//! be released with the matching free function exactly once:
//!
//! | Constructor               | Destructor                |
//! |---------------------------|---------------------------|
//! | `rego_build_get_version`  | `rego_build_free_version` |
//! | `rego_build_from_fs`      | `rego_build_free_result`  |
//! | `rego_build_from_bytes`   | `rego_build_free_result`  |
//!
//! Parameter pointers are only borrowed for the duration of a call.
//!
//! # Status codes
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | `0`  | Success                                   |
//! | `-1` | Null argument                             |
//! | `-2` | Internal failure (contained panic)        |
//! | `-3` | Input bundle bytes could not be read      |
//! | `-4` | Compilation failed                        |
//! | `-5` | Capabilities could not be resolved        |
//!
//! A non-zero status does not mean the result is empty: the error and log
//! strings are populated whenever they exist.

use std::any::Any;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};

use rego_build::{
    BuildError, BuildOutcome, BuildParameters, BuildStatus, BundleCompiler, SourceRequest,
    VersionInfo, run_build, with_debug_log,
};
#[cfg(test)]
use rego_build::{CompileConfig, CompileError, PolicyCompiler};
use tracing::{debug, error};

pub mod client;
pub mod marshal;
pub mod ownership;
pub mod types;

pub use client::{CompilationParameters, InteropCompiler, InteropError};
pub use types::{
    RegoBuildParams, RegoBuildResult, RegoBytesBuildParams, RegoFsBuildParams, RegoVersionInfo,
};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "build panicked".to_string()
    }
}

type BuildResult = Result<Vec<u8>, BuildError>;

fn invalid_argument(message: &str) -> BuildResult {
    error!(reason = message, "Invalid build argument");
    Err(BuildError::InvalidArgument(message.to_string()))
}

fn internal_failure(payload: &(dyn Any + Send)) -> BuildError {
    let message = panic_message(payload);
    error!(panic = %message, "Build panicked");
    BuildError::Internal(message)
}

/// Run `f`, turning a panic into an internal error.
fn guarded(f: impl FnOnce() -> BuildResult) -> BuildResult {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(internal_failure(payload.as_ref())))
}

/// Run the argument checks and the build in `f` under one debug capture.
///
/// The capture wraps the panic guard, so the log survives any failure.
fn build_outcome(debug: bool, f: impl FnOnce() -> BuildResult) -> BuildOutcome {
    let (built, log) = with_debug_log(debug, || guarded(f));
    BuildOutcome::from_result(built, log)
}

/// Marshal the parameters, then build under their debug setting.
///
/// Null parameters carry no debug flag and fail without a log.
///
/// # Safety
/// `raw` pointers must satisfy the header's contracts.
unsafe fn build_with(
    raw: Option<&RegoBuildParams>,
    run: impl FnOnce(&BuildParameters) -> BuildResult,
) -> BuildOutcome {
    let Some(raw) = raw else {
        return BuildOutcome::from_result(invalid_argument("build parameters are null"), None);
    };
    let params = unsafe { marshal::build_parameters(raw) };
    build_outcome(params.debug, || {
        debug!(
            target = %params.target,
            bundle_mode = params.bundle_mode,
            entrypoints = params.entrypoints.len(),
            "Build parameters"
        );
        run(&params)
    })
}

/// Allocate a result, fill it from `run`, and hand it to the caller.
///
/// # Safety
/// `out` must be null or valid for a pointer write.
unsafe fn respond(out: *mut *mut RegoBuildResult, run: impl FnOnce() -> BuildOutcome) -> c_int {
    if out.is_null() {
        return BuildStatus::InvalidArgument.code();
    }

    let result = ownership::new_build_result();
    let outcome = panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|payload| BuildOutcome::failure(&internal_failure(payload.as_ref()), None));
    let status = unsafe { ownership::package_result(result, outcome) };
    unsafe { *out = result };
    status.code()
}

/// Version metadata of this library.
///
/// Never returns null. Release with [`rego_build_free_version`].
#[unsafe(no_mangle)]
pub extern "C" fn rego_build_get_version() -> *mut RegoVersionInfo {
    ownership::new_version_info(&VersionInfo::current())
}

/// Release version metadata.
///
/// # Safety
/// `info` must be null or a pointer from [`rego_build_get_version`] that
/// has not been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rego_build_free_version(info: *mut RegoVersionInfo) {
    unsafe { ownership::free_version_info(info) }
}

/// Build from a file or directory.
///
/// Writes a newly allocated result to `*result` and returns the status.
/// When `result` itself is null nothing is allocated and `-1` is returned.
///
/// # Safety
/// `params` must be null or point to a valid record whose pointers satisfy
/// the header's contracts. `result` must be null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rego_build_from_fs(
    params: *const RegoFsBuildParams,
    result: *mut *mut RegoBuildResult,
) -> c_int {
    unsafe {
        let raw = params.as_ref();
        respond(result, || {
            build_with(raw.map(|raw| &raw.params), |params| {
                let Some(source) = raw.and_then(|raw| marshal::non_empty_c_string(raw.source)) else {
                    return invalid_argument("source path is null or empty");
                };
                run_build(params, SourceRequest::Filesystem(&source), &BundleCompiler::new())
            })
        })
    }
}

/// Build from serialized bundle bytes.
///
/// Writes a newly allocated result to `*result` and returns the status.
/// When `result` itself is null nothing is allocated and `-1` is returned.
///
/// # Safety
/// `params` must be null or point to a valid record; `bytes` must cover
/// `bytes_len` readable bytes. `result` must be null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rego_build_from_bytes(
    params: *const RegoBytesBuildParams,
    result: *mut *mut RegoBuildResult,
) -> c_int {
    unsafe {
        let raw = params.as_ref();
        respond(result, || {
            build_with(raw.map(|raw| &raw.params), |params| {
                let bytes = raw.map_or(&[][..], |raw| marshal::byte_slice(raw.bytes, raw.bytes_len));
                run_build(params, SourceRequest::Bytes(bytes), &BundleCompiler::new())
            })
        })
    }
}

/// Release a build result and everything it holds.
///
/// # Safety
/// `result` must be null or a pointer written by one of the build entry
/// points that has not been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rego_build_free_result(result: *mut RegoBuildResult) {
    unsafe { ownership::free_build_result(result) }
}
