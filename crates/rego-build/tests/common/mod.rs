// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test utilities for rego-build integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rego_build::{BundleCompiler, BundleWriter, CompileConfig, CompileError, PolicyCompiler};
use tempfile::TempDir;

pub const SIMPLE_POLICY: &str = r#"package example

default allow := false

allow if input.user == "admin"
"#;

/// Write files (relative path, contents) under a fresh temp directory.
pub fn policy_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (path, contents) in files {
        write_file(dir.path(), path, contents);
    }
    dir
}

pub fn write_file(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(full, contents).expect("Failed to write file");
}

/// Serialize a directory of policy files into bundle bytes.
pub fn bundle_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = BundleWriter::new(Vec::new());
    for (path, contents) in files {
        writer
            .write_entry(path, contents.as_bytes())
            .expect("Failed to write bundle entry");
    }
    writer.finish().expect("Failed to finish bundle")
}

/// A compiler that records each configuration it receives and delegates to
/// [`BundleCompiler`].
#[derive(Default)]
pub struct RecordingCompiler {
    inner: BundleCompiler,
    calls: Mutex<Vec<CompileConfig>>,
}

impl RecordingCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_config(&self) -> Option<CompileConfig> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl PolicyCompiler for RecordingCompiler {
    fn compile(&self, config: &CompileConfig) -> Result<Vec<u8>, CompileError> {
        self.calls.lock().unwrap().push(config.clone());
        self.inner.compile(config)
    }

    fn version(&self) -> &str {
        "recording"
    }
}
