// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversion of borrowed C parameters into owned build parameters.
//!
//! Raw pointers are read once here and never touched again afterwards.
//! Nothing allocated in this module crosses the boundary.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::slice;

use rego_build::{BuildParameters, RegoVersion};

use crate::types::RegoBuildParams;

/// Copy a C string. Null yields `None`; invalid UTF-8 is replaced.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(ptr) };
    Some(text.to_string_lossy().into_owned())
}

/// Like [`c_string`], with the empty string treated as absent.
///
/// # Safety
/// Same as [`c_string`].
pub unsafe fn non_empty_c_string(ptr: *const c_char) -> Option<String> {
    unsafe { c_string(ptr) }.filter(|s| !s.is_empty())
}

/// Copy an array of C strings.
///
/// A null array or a non-positive length yields an empty list. Null and
/// empty entries are skipped; the rest keep their order.
///
/// # Safety
/// When `ptr` is non-null it must point to `len` readable pointers, each
/// null or NUL-terminated.
pub unsafe fn string_array(ptr: *const *const c_char, len: c_int) -> Vec<String> {
    let len = match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => len,
        _ => return Vec::new(),
    };

    let entries = unsafe { slice::from_raw_parts(ptr, len) };
    entries
        .iter()
        .filter_map(|&entry| unsafe { non_empty_c_string(entry) })
        .collect()
}

/// Borrow a C byte buffer. Null or non-positive lengths yield an empty
/// slice.
///
/// # Safety
/// When `ptr` is non-null it must point to `len` readable bytes that
/// outlive `'a`.
pub unsafe fn byte_slice<'a>(ptr: *const u8, len: c_int) -> &'a [u8] {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => unsafe { slice::from_raw_parts(ptr, len) },
        _ => &[],
    }
}

fn flag(value: c_int) -> bool {
    value > 0
}

/// Translate a C parameter record.
///
/// # Safety
/// Every pointer in `raw` must satisfy the contracts of [`c_string`] and
/// [`string_array`].
pub unsafe fn build_parameters(raw: &RegoBuildParams) -> BuildParameters {
    unsafe {
        BuildParameters {
            target: c_string(raw.target).unwrap_or_default(),
            capabilities_json: non_empty_c_string(raw.capabilities_json),
            capabilities_version: non_empty_c_string(raw.capabilities_version),
            bundle_mode: flag(raw.bundle_mode),
            entrypoints: string_array(raw.entrypoints, raw.entrypoints_len),
            debug: flag(raw.debug),
            optimization_level: u32::try_from(raw.optimization_level).unwrap_or(0),
            prune_unused: flag(raw.prune_unused),
            temp_dir: non_empty_c_string(raw.temp_dir),
            revision: non_empty_c_string(raw.revision),
            ignore: string_array(raw.ignore, raw.ignore_len),
            rego_version: RegoVersion::from_raw(raw.rego_version),
            follow_symlinks: flag(raw.follow_symlinks),
            disable_print_statements: flag(raw.disable_print_statements),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    fn owned(values: &[&str]) -> Vec<CString> {
        values.iter().map(|v| CString::new(*v).unwrap()).collect()
    }

    #[test]
    fn test_c_string_null_is_none() {
        assert_eq!(unsafe { c_string(ptr::null()) }, None);
        let empty = CString::new("").unwrap();
        assert_eq!(unsafe { c_string(empty.as_ptr()) }, Some(String::new()));
        assert_eq!(unsafe { non_empty_c_string(empty.as_ptr()) }, None);
    }

    #[test]
    fn test_c_string_replaces_invalid_utf8() {
        let raw = CString::new(vec![b'a', 0xff, b'b']).unwrap();
        assert_eq!(unsafe { c_string(raw.as_ptr()) }.unwrap(), "a\u{fffd}b");
    }

    #[test]
    fn test_string_array_drops_empty_and_keeps_order() {
        let values = owned(&["b/allow", "", "a/deny", "", "c"]);
        let mut ptrs: Vec<*const c_char> = values.iter().map(|v| v.as_ptr()).collect();
        ptrs.insert(1, ptr::null());

        let result = unsafe { string_array(ptrs.as_ptr(), ptrs.len() as c_int) };
        assert_eq!(result, vec!["b/allow", "a/deny", "c"]);
    }

    #[test]
    fn test_string_array_respects_declared_length() {
        let values = owned(&["one", "two", "three"]);
        let ptrs: Vec<*const c_char> = values.iter().map(|v| v.as_ptr()).collect();

        let result = unsafe { string_array(ptrs.as_ptr(), 2) };
        assert_eq!(result, vec!["one", "two"]);
    }

    #[test]
    fn test_string_array_null_or_bad_length_is_empty() {
        assert!(unsafe { string_array(ptr::null(), 5) }.is_empty());

        let values = owned(&["x"]);
        let ptrs: Vec<*const c_char> = values.iter().map(|v| v.as_ptr()).collect();
        assert!(unsafe { string_array(ptrs.as_ptr(), 0) }.is_empty());
        assert!(unsafe { string_array(ptrs.as_ptr(), -1) }.is_empty());
    }

    #[test]
    fn test_byte_slice() {
        let data = [1u8, 2, 3];
        assert_eq!(unsafe { byte_slice(data.as_ptr(), 2) }, &[1, 2]);
        assert!(unsafe { byte_slice(ptr::null(), 3) }.is_empty());
        assert!(unsafe { byte_slice(data.as_ptr(), -3) }.is_empty());
    }

    #[test]
    fn test_build_parameters() {
        let target = CString::new("plan").unwrap();
        let revision = CString::new("rev").unwrap();
        let temp = CString::new("/tmp/work").unwrap();
        let empty = CString::new("").unwrap();
        let entrypoints = owned(&["example/allow", ""]);
        let entry_ptrs: Vec<*const c_char> = entrypoints.iter().map(|v| v.as_ptr()).collect();

        let raw = RegoBuildParams {
            target: target.as_ptr(),
            capabilities_json: empty.as_ptr(),
            bundle_mode: 2,
            entrypoints: entry_ptrs.as_ptr(),
            entrypoints_len: entry_ptrs.len() as c_int,
            debug: 1,
            optimization_level: -4,
            prune_unused: -1,
            temp_dir: temp.as_ptr(),
            revision: revision.as_ptr(),
            ignore: ptr::null(),
            ignore_len: 3,
            rego_version: 1,
            follow_symlinks: 1,
            disable_print_statements: 0,
            ..Default::default()
        };

        let params = unsafe { build_parameters(&raw) };
        assert_eq!(params.target, "plan");
        assert_eq!(params.capabilities_json, None);
        assert_eq!(params.capabilities_version, None);
        assert!(params.bundle_mode);
        assert_eq!(params.entrypoints, vec!["example/allow"]);
        assert!(params.debug);
        assert_eq!(params.optimization_level, 0);
        assert!(!params.prune_unused);
        assert_eq!(params.temp_dir.as_deref(), Some("/tmp/work"));
        assert_eq!(params.revision.as_deref(), Some("rev"));
        assert!(params.ignore.is_empty());
        assert_eq!(params.rego_version, RegoVersion::V0);
        assert!(params.follow_symlinks);
        assert!(!params.disable_print_statements);
    }

    #[test]
    fn test_default_record_gives_default_parameters() {
        let params = unsafe { build_parameters(&RegoBuildParams::default()) };
        assert_eq!(params, BuildParameters::default());
    }
}
