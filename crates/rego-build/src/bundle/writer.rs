// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bundle archive writer.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Bundle, DATA_FILE, MANIFEST_FILE, Manifest};

const COLLECTED_FILES: &[&str] = &[DATA_FILE, "data.yaml", "policy.wasm", MANIFEST_FILE];

/// Writes a gzip-compressed tar bundle.
///
/// Entries carry fixed metadata (mode `0644`, mtime `0`) so identical inputs
/// produce identical archives.
pub struct BundleWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
}

impl<W: Write> BundleWriter<W> {
    /// Create a writer over `writer`.
    pub fn new(writer: W) -> Self {
        let encoder = GzEncoder::new(writer, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.mode(tar::HeaderMode::Deterministic);
        Self { builder }
    }

    /// Append a file. The path is normalized with [`normalize_entry_path`].
    pub fn write_entry(&mut self, path: &str, contents: &[u8]) -> io::Result<()> {
        let path = normalize_entry_path(path);
        if path.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bundle entry path is empty",
            ));
        }

        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        self.builder.append_data(&mut header, &path, contents)
    }

    /// Append `.manifest`.
    pub fn write_manifest(&mut self, manifest: &Manifest) -> io::Result<()> {
        let json = serde_json::to_vec(manifest)?;
        self.write_entry(MANIFEST_FILE, &json)
    }

    /// Append every part of `bundle`: its manifest, modules and data.
    pub fn write_bundle(&mut self, bundle: &Bundle) -> io::Result<()> {
        if bundle.manifest != Manifest::default() {
            self.write_manifest(&bundle.manifest)?;
        }
        for module in &bundle.modules {
            self.write_entry(&module.path, module.source.as_bytes())?;
        }
        if !bundle.data_is_empty() {
            let json = serde_json::to_vec(&bundle.data)?;
            self.write_entry(DATA_FILE, &json)?;
        }
        Ok(())
    }

    /// Append the bundle files found under `dir`.
    ///
    /// Collects `*.rego`, data documents, `policy.wasm` and `.manifest`.
    /// Paths matching any of `exclude` (relative to `dir`) are skipped.
    /// Returns the number of files written.
    pub fn from_directory(&mut self, dir: &Path, exclude: &[&str]) -> io::Result<usize> {
        let excluded = exclusion_set(exclude);
        let mut written = 0;

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !(name.ends_with(".rego") || COLLECTED_FILES.contains(&&*name)) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(io::Error::other)?
                .to_string_lossy()
                .replace('\\', "/");
            if excluded.is_match(&relative) {
                debug!(path = %relative, "Excluded from bundle");
                continue;
            }

            let contents = fs::read(entry.path())?;
            self.write_entry(&relative, &contents)?;
            written += 1;
        }

        Ok(written)
    }

    /// Finish the archive and return the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        self.builder.into_inner()?.finish()
    }
}

fn exclusion_set(patterns: &[&str]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "Invalid exclusion pattern"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build exclusion set");
        GlobSet::empty()
    })
}

/// Normalize a path for use as an archive entry name.
///
/// Backslashes become slashes; drive prefixes, leading slashes and `./`
/// segments are dropped.
pub fn normalize_entry_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = match path.split_once(':') {
        Some((drive, rest)) if drive.len() == 1 && drive.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.to_string()
        }
        _ => path,
    };
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleReader;
    use crate::params::RegoVersion;
    use crate::policy::PolicyModule;

    #[test]
    fn test_normalize_entry_path() {
        assert_eq!(normalize_entry_path("/a/b.rego"), "a/b.rego");
        assert_eq!(normalize_entry_path("C:\\policies\\a.rego"), "policies/a.rego");
        assert_eq!(normalize_entry_path("./x//y.rego"), "x/y.rego");
        assert_eq!(normalize_entry_path(".manifest"), ".manifest");
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut writer = BundleWriter::new(Vec::new());
        assert!(writer.write_entry("/", b"x").is_err());
    }

    #[test]
    fn test_write_bundle_reads_back() {
        let mut bundle = Bundle::default();
        bundle.manifest.revision = "r7".to_string();
        bundle.modules.push(
            PolicyModule::parse("authz/policy.rego", "package authz\nallow := true\n", RegoVersion::V1)
                .unwrap(),
        );
        bundle
            .mount_data(&["authz".to_string()], serde_json::json!({"users": ["a"]}))
            .unwrap();

        let mut writer = BundleWriter::new(Vec::new());
        writer.write_bundle(&bundle).unwrap();
        let bytes = writer.finish().unwrap();

        let read = BundleReader::new(&bytes)
            .with_rego_version(RegoVersion::V1)
            .read()
            .unwrap();
        assert_eq!(read.manifest.revision, "r7");
        assert_eq!(read.modules, bundle.modules);
        assert_eq!(read.data, bundle.data);
    }

    #[test]
    fn test_output_is_deterministic() {
        let build = || {
            let mut writer = BundleWriter::new(Vec::new());
            writer.write_entry("a.rego", b"package a\n").unwrap();
            writer.finish().unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("main.rego"), "package main\n").unwrap();
        fs::write(dir.path().join("lib/util.rego"), "package lib\n").unwrap();
        fs::write(dir.path().join("lib/data.json"), "{}").unwrap();
        fs::write(dir.path().join("vendor/x.rego"), "package x\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let mut writer = BundleWriter::new(Vec::new());
        let written = writer.from_directory(dir.path(), &["vendor/**"]).unwrap();
        assert_eq!(written, 3);

        let bytes = writer.finish().unwrap();
        let bundle = BundleReader::new(&bytes).read().unwrap();
        let paths: Vec<_> = bundle.modules.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["lib/util.rego", "main.rego"]);
    }
}
