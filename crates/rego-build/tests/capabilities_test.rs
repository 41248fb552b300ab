// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Capability resolution tests.

use rego_build::capabilities::{CURRENT_VERSION, catalog};
use rego_build::{Capabilities, CapabilitiesError, default_capabilities, resolve_capabilities};
use std::sync::Arc;
use tempfile::TempDir;

const SET_A: &str = r#"{
    "builtins": [{"name": "a.one"}, {"name": "shared"}],
    "future_keywords": ["in"],
    "wasm_abi_versions": [{"version": 1, "minor_version": 1}],
    "features": ["rego_v1"],
    "allow_net": ["a.example.com"]
}"#;

const SET_B: &str = r#"{
    "builtins": [{"name": "shared"}, {"name": "b.two"}],
    "future_keywords": ["in", "every"],
    "wasm_abi_versions": [{"version": 1, "minor_version": 2}],
    "features": ["rego_v1_import"]
}"#;

fn names(caps: &Capabilities) -> Vec<&str> {
    caps.builtins.iter().map(|b| b.name.as_str()).collect()
}

#[test]
fn test_merge_concatenates_in_order_without_dedup() {
    let a = Capabilities::from_json(SET_A).unwrap();
    let b = Capabilities::from_json(SET_B).unwrap();

    let merged = a.merge(b);

    assert_eq!(names(&merged), vec!["a.one", "shared", "shared", "b.two"]);
    assert_eq!(merged.future_keywords, vec!["in", "in", "every"]);
    assert_eq!(merged.features, vec!["rego_v1", "rego_v1_import"]);
    let minors: Vec<u32> = merged
        .wasm_abi_versions
        .iter()
        .map(|v| v.minor_version)
        .collect();
    assert_eq!(minors, vec![1, 2]);
    assert_eq!(merged.allow_net, Some(vec!["a.example.com".to_string()]));
}

#[test]
fn test_merge_is_associative() {
    let parts = [SET_A, SET_B, r#"{"builtins":[{"name":"c"}],"features":["x"]}"#];
    let load = |i: usize| Capabilities::from_json(parts[i]).unwrap();

    let left = load(0).merge(load(1)).merge(load(2));
    let right = load(0).merge(load(1).merge(load(2)));

    assert_eq!(left, right);
}

#[test]
fn test_inline_and_version_are_merged_inline_first() {
    let caps = resolve_capabilities(Some(SET_A), Some(CURRENT_VERSION)).unwrap();
    let embedded = Capabilities::load_version(CURRENT_VERSION).unwrap();

    assert_eq!(caps.builtins.len(), 2 + embedded.builtins.len());
    assert_eq!(caps.builtins[0].name, "a.one");
    assert_eq!(caps.features[0], "rego_v1");
    assert_eq!(caps.features.len(), 1 + embedded.features.len());
}

#[test]
fn test_single_source_is_used_directly() {
    let inline = resolve_capabilities(Some(SET_B), None).unwrap();
    assert_eq!(names(&inline), vec!["shared", "b.two"]);

    let versioned = resolve_capabilities(None, Some("v0.68.0")).unwrap();
    assert!(versioned.has_builtin("count"));
    assert!(!versioned.has_feature("rego_v1"));
}

#[test]
fn test_empty_inputs_resolve_to_the_shared_default() {
    let first = resolve_capabilities(None, None).unwrap();
    let second = resolve_capabilities(Some(""), Some("")).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &default_capabilities()));
    assert!(first.has_feature("rego_v1"));
}

#[test]
fn test_version_falls_back_to_a_file_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom-caps.json");
    std::fs::write(&path, SET_B).unwrap();

    let caps = resolve_capabilities(None, Some(&path.to_string_lossy())).unwrap();
    assert_eq!(names(&caps), vec!["shared", "b.two"]);
}

#[test]
fn test_version_resolves_from_capabilities_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("v2.0.0-custom.json"), SET_A).unwrap();

    let caps = Capabilities::load_version_from("v2.0.0-custom", Some(dir.path())).unwrap();
    assert_eq!(names(&caps), vec!["a.one", "shared"]);

    let err = Capabilities::load_version_from("v2.0.1-custom", Some(dir.path())).unwrap_err();
    assert!(matches!(err, CapabilitiesError::NotFound(id) if id == "v2.0.1-custom"));
}

#[test]
fn test_unresolvable_version_names_the_identifier() {
    let err = resolve_capabilities(None, Some("v0.0.0-nowhere")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "no such file or capabilities version found: v0.0.0-nowhere"
    );
}

#[test]
fn test_malformed_version_file_is_reported_as_invalid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "[1, 2").unwrap();

    let err = resolve_capabilities(None, Some(&path.to_string_lossy())).unwrap_err();
    assert!(matches!(err, CapabilitiesError::InvalidFile { .. }));
}

#[test]
fn test_invalid_inline_json_fails_even_with_a_valid_version() {
    let err = resolve_capabilities(Some("{"), Some(CURRENT_VERSION)).unwrap_err();
    assert!(matches!(err, CapabilitiesError::Parse(_)));
}

#[test]
fn test_catalog_versions_all_parse() {
    let versions: Vec<&str> = catalog::versions().collect();
    assert!(versions.contains(&CURRENT_VERSION));
    for version in versions {
        let json = catalog::lookup(version).unwrap();
        let caps = Capabilities::from_json(json).unwrap();
        assert!(!caps.builtins.is_empty(), "{version} has no builtins");
    }
}
