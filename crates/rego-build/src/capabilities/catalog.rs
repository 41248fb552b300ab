// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded catalog of named capability versions.

/// Capability version matching the bundled compiler.
pub const CURRENT_VERSION: &str = "v1.0.0";

const CATALOG: &[(&str, &str)] = &[
    ("v0.68.0", include_str!("../../capabilities/v0.68.0.json")),
    ("v1.0.0", include_str!("../../capabilities/v1.0.0.json")),
];

/// Raw JSON of a named version, if it is part of the catalog.
pub fn lookup(version: &str) -> Option<&'static str> {
    CATALOG
        .iter()
        .find(|(name, _)| *name == version)
        .map(|(_, json)| *json)
}

/// Names of every embedded version, oldest first.
pub fn versions() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version_is_embedded() {
        assert!(lookup(CURRENT_VERSION).is_some());
        assert!(versions().any(|v| v == CURRENT_VERSION));
    }

    #[test]
    fn test_unknown_version() {
        assert!(lookup("v9.9.9").is_none());
        assert!(lookup("").is_none());
    }
}
