// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test utilities for rego-build-ffi integration tests.

#![allow(dead_code)]

use std::ffi::{CStr, CString};
use std::fs;
use std::os::raw::c_char;

use rego_build_ffi::RegoBuildResult;
use tempfile::TempDir;

pub const SIMPLE_POLICY: &str = r#"package example

default allow := false

allow if input.user == "admin"
"#;

pub fn policy_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (path, contents) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(full, contents).expect("Failed to write file");
    }
    dir
}

/// C strings plus the pointer array a foreign caller would pass.
pub struct CStringArray {
    _owned: Vec<CString>,
    pub ptrs: Vec<*const c_char>,
}

impl CStringArray {
    pub fn new(values: &[&str]) -> Self {
        let owned: Vec<CString> = values.iter().map(|v| CString::new(*v).unwrap()).collect();
        let ptrs = owned.iter().map(|v| v.as_ptr()).collect();
        Self { _owned: owned, ptrs }
    }

    pub fn len(&self) -> i32 {
        self.ptrs.len() as i32
    }
}

/// Borrowed view of a result's fields.
pub struct ResultView {
    pub output: Option<Vec<u8>>,
    pub errors: Option<String>,
    pub log: Option<String>,
}

fn read(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

pub fn view(result: *const RegoBuildResult) -> ResultView {
    let result = unsafe { &*result };
    let output = if result.result.is_null() {
        assert_eq!(result.result_len, 0);
        None
    } else {
        Some(unsafe { std::slice::from_raw_parts(result.result, result.result_len as usize) }.to_vec())
    };
    ResultView {
        output,
        errors: read(result.errors),
        log: read(result.log),
    }
}
