// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end build pipeline tests.
//!
//! Each test drives [`execute`] the way the native boundary does: parameters
//! and a source request go in, a packaged [`BuildOutcome`] comes out.

mod common;

use common::{RecordingCompiler, SIMPLE_POLICY, bundle_bytes, policy_dir};
use rego_build::{
    BuildParameters, BuildStatus, BundleCompiler, BundleReader, RegoVersion, SourceMode,
    SourceRequest, default_capabilities, execute,
};
use std::sync::Arc;

fn path_of(dir: &tempfile::TempDir) -> String {
    dir.path().to_string_lossy().into_owned()
}

// ============================================================================
// Filesystem builds
// ============================================================================

#[test]
fn test_single_file_directory_build() {
    let dir = policy_dir(&[("policy.rego", SIMPLE_POLICY)]);
    let params = BuildParameters::new().with_entrypoints(["example/allow"]);

    let outcome = execute(
        &params,
        SourceRequest::Filesystem(&path_of(&dir)),
        &BundleCompiler::new(),
    );

    assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);
    assert!(outcome.output.as_ref().is_some_and(|o| !o.is_empty()));
    assert!(outcome.error.is_none());
    assert!(outcome.log.is_none());

    let bundle = BundleReader::new(outcome.output.as_ref().unwrap())
        .read()
        .unwrap();
    assert_eq!(bundle.modules.len(), 1);
    assert_eq!(bundle.modules[0].package, "example");
}

#[test]
fn test_parameters_reach_the_compiler() {
    let dir = policy_dir(&[("policy.rego", SIMPLE_POLICY)]);
    let params = BuildParameters::new()
        .with_target("rego")
        .with_entrypoints(["example/allow", "example"])
        .with_optimization_level(1)
        .with_prune_unused(true)
        .with_revision("abc123")
        .with_ignore(["*_test.rego"])
        .with_rego_version(RegoVersion::V1)
        .with_follow_symlinks(true)
        .with_disable_print_statements(true);
    let compiler = RecordingCompiler::new();

    let outcome = execute(&params, SourceRequest::Filesystem(&path_of(&dir)), &compiler);
    assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);

    let config = compiler.last_config().unwrap();
    assert_eq!(config.target, "rego");
    assert_eq!(config.entrypoints, vec!["example/allow", "example"]);
    assert_eq!(config.optimization_level, 1);
    assert!(config.prune_unused);
    assert_eq!(config.revision.as_deref(), Some("abc123"));
    assert_eq!(config.rego_version, RegoVersion::V1);
    assert!(config.follow_symlinks);
    assert!(!config.enable_print_statements);
    assert!(config.annotation_entrypoints);
    assert!(matches!(config.source, SourceMode::Filesystem(_)));
}

#[test]
fn test_ignore_globs_skip_files_at_any_depth() {
    let dir = policy_dir(&[
        ("policy.rego", SIMPLE_POLICY),
        ("nested/deeper/broken_test.rego", "this is not a policy"),
    ]);
    let params = BuildParameters::new()
        .with_entrypoints(["example/allow"])
        .with_ignore(["*_test.rego"]);

    let outcome = execute(
        &params,
        SourceRequest::Filesystem(&path_of(&dir)),
        &BundleCompiler::new(),
    );
    assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);
}

#[test]
fn test_nested_archives_skipped_outside_bundle_mode() {
    let dir = policy_dir(&[("policy.rego", SIMPLE_POLICY)]);
    std::fs::write(dir.path().join("stale.tar.gz"), b"not an archive").unwrap();
    let params = BuildParameters::new().with_entrypoints(["example/allow"]);

    let outcome = execute(
        &params,
        SourceRequest::Filesystem(&path_of(&dir)),
        &BundleCompiler::new(),
    );
    assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);
}

#[test]
fn test_missing_source_path_is_a_compile_failure() {
    let outcome = execute(
        &BuildParameters::new(),
        SourceRequest::Filesystem("/definitely/not/here"),
        &BundleCompiler::new(),
    );
    assert_eq!(outcome.status, BuildStatus::Compile);
    assert!(outcome.output.is_none());
    assert!(outcome.error.unwrap().contains("/definitely/not/here"));
}

#[test]
fn test_compiler_diagnostics_become_the_error_text() {
    let dir = policy_dir(&[(
        "policy.rego",
        "package example\n\nallow if not_a_builtin(input.x)\n",
    )]);
    let outcome = execute(
        &BuildParameters::new(),
        SourceRequest::Filesystem(&path_of(&dir)),
        &BundleCompiler::new(),
    );

    assert_eq!(outcome.status, BuildStatus::Compile);
    assert!(outcome.output.is_none());
    let error = outcome.error.unwrap();
    assert!(error.starts_with("1 error occurred:"), "{error}");
    assert!(error.contains("undefined function not_a_builtin"), "{error}");
}

// ============================================================================
// Bundle byte builds
// ============================================================================

#[test]
fn test_build_from_bundle_bytes() {
    let bytes = bundle_bytes(&[
        (".manifest", r#"{"revision":"r1","roots":["example"]}"#),
        ("example/policy.rego", SIMPLE_POLICY),
        ("example/data.json", r#"{"threshold": 3}"#),
    ]);
    let compiler = RecordingCompiler::new();

    let outcome = execute(
        &BuildParameters::new().with_bundle_mode(true),
        SourceRequest::Bytes(&bytes),
        &compiler,
    );
    assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);
    assert!(matches!(
        compiler.last_config().unwrap().source,
        SourceMode::Bundle(_)
    ));

    let bundle = BundleReader::new(outcome.output.as_ref().unwrap())
        .read()
        .unwrap();
    assert_eq!(bundle.manifest.revision, "r1");
    assert_eq!(bundle.data["example"]["threshold"], 3);
}

#[test]
fn test_malformed_bundle_bytes_never_reach_the_compiler() {
    let compiler = RecordingCompiler::new();
    let params = BuildParameters::new().with_debug(true);

    let outcome = execute(&params, SourceRequest::Bytes(b"\x00\x01 not a bundle"), &compiler);

    assert_eq!(outcome.status, BuildStatus::BundleRead);
    assert_eq!(outcome.status.code(), -3);
    assert!(outcome.output.is_none());
    assert!(!outcome.error.unwrap().is_empty());
    assert_eq!(compiler.call_count(), 0);

    let log = outcome.log.expect("debug log");
    assert!(!log.contains("Compiling"));
    assert!(!log.contains("Done reading bundle"));
}

#[test]
fn test_empty_bundle_bytes() {
    let compiler = RecordingCompiler::new();
    let outcome = execute(&BuildParameters::new(), SourceRequest::Bytes(&[]), &compiler);

    assert_eq!(outcome.status, BuildStatus::BundleRead);
    assert_eq!(outcome.error.as_deref(), Some("bundle is empty"));
    assert_eq!(compiler.call_count(), 0);
}

// ============================================================================
// Capabilities
// ============================================================================

#[test]
fn test_unknown_capabilities_version_is_named() {
    let dir = policy_dir(&[("policy.rego", SIMPLE_POLICY)]);
    let compiler = RecordingCompiler::new();
    let params = BuildParameters::new().with_capabilities_version("v9.9.9-missing");

    let outcome = execute(&params, SourceRequest::Filesystem(&path_of(&dir)), &compiler);

    assert_eq!(outcome.status, BuildStatus::Capabilities);
    assert!(outcome.output.is_none());
    assert!(outcome.error.unwrap().contains("v9.9.9-missing"));
    assert_eq!(compiler.call_count(), 0);
}

#[test]
fn test_invalid_inline_capabilities_abort_the_build() {
    let compiler = RecordingCompiler::new();
    let params = BuildParameters::new().with_capabilities_json("{ not json");

    let outcome = execute(&params, SourceRequest::Filesystem("/unused"), &compiler);

    assert_eq!(outcome.status, BuildStatus::Capabilities);
    assert!(outcome.error.unwrap().starts_with("invalid capabilities JSON"));
    assert_eq!(compiler.call_count(), 0);
}

#[test]
fn test_default_capabilities_are_shared_across_builds() {
    let dir = policy_dir(&[("policy.rego", SIMPLE_POLICY)]);
    let compiler = RecordingCompiler::new();
    let params = BuildParameters::new();

    for _ in 0..2 {
        let outcome = execute(&params, SourceRequest::Filesystem(&path_of(&dir)), &compiler);
        assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);
        let config = compiler.last_config().unwrap();
        assert!(Arc::ptr_eq(&config.capabilities, &default_capabilities()));
    }
}

#[test]
fn test_older_capabilities_reject_v1_sources() {
    let dir = policy_dir(&[("policy.rego", SIMPLE_POLICY)]);
    let params = BuildParameters::new().with_capabilities_version("v0.68.0");

    let outcome = execute(
        &params,
        SourceRequest::Filesystem(&path_of(&dir)),
        &BundleCompiler::new(),
    );
    assert_eq!(outcome.status, BuildStatus::Compile);
    assert!(outcome.error.unwrap().contains("rego_v1 feature required"));
}

#[test]
fn test_merged_capabilities_reach_the_compiler() {
    let dir = policy_dir(&[(
        "policy.rego",
        "package example\n\nallow if custom.check(input)\n",
    )]);
    let compiler = RecordingCompiler::new();
    let params = BuildParameters::new()
        .with_capabilities_json(r#"{"builtins":[{"name":"custom.check"}]}"#)
        .with_capabilities_version("v1.0.0");

    let outcome = execute(&params, SourceRequest::Filesystem(&path_of(&dir)), &compiler);
    assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);

    let caps = compiler.last_config().unwrap().capabilities;
    assert_eq!(caps.builtins[0].name, "custom.check");
    assert!(caps.has_builtin("count"));
}

// ============================================================================
// Debug log
// ============================================================================

#[test]
fn test_debug_log_is_captured_on_success() {
    let dir = policy_dir(&[("policy.rego", SIMPLE_POLICY)]);
    let params = BuildParameters::new()
        .with_entrypoints(["example/allow"])
        .with_debug(true);

    let outcome = execute(
        &params,
        SourceRequest::Filesystem(&path_of(&dir)),
        &BundleCompiler::new(),
    );

    assert_eq!(outcome.status, BuildStatus::Ok, "error: {:?}", outcome.error);
    let log = outcome.log.expect("debug log");
    assert!(log.contains("Compiler version"));
    assert!(log.contains("Compiling"));
    assert!(log.contains("sha256="));
}

#[test]
fn test_debug_log_is_captured_on_failure() {
    let params = BuildParameters::new()
        .with_capabilities_version("nope")
        .with_debug(true);

    let outcome = execute(&params, SourceRequest::Filesystem("/unused"), &BundleCompiler::new());

    assert_eq!(outcome.status, BuildStatus::Capabilities);
    assert!(outcome.log.expect("debug log").contains("Rego version"));
}
