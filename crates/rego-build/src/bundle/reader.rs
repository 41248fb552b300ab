// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bundle archive reader.

use std::io::Read;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;

use super::{Bundle, BundleError, DATA_FILE, MANIFEST_FILE, Manifest, data_path};
use crate::config::BuildEnvConfig;
use crate::params::RegoVersion;
use crate::policy::PolicyModule;

/// Reads a gzip-compressed tar bundle into memory.
///
/// # Security
///
/// - Rejects entries with `..` components
/// - Rejects links, devices and other non-regular entries
/// - Limits the entry count and total decompressed size
#[derive(Debug, Clone)]
pub struct BundleReader<'a> {
    bytes: &'a [u8],
    process_annotations: bool,
    rego_version: RegoVersion,
    max_bytes: u64,
    max_entries: usize,
}

impl<'a> BundleReader<'a> {
    /// Create a reader with the limits from [`BuildEnvConfig::global`].
    pub fn new(bytes: &'a [u8]) -> Self {
        let config = BuildEnvConfig::global();
        Self {
            bytes,
            process_annotations: false,
            rego_version: RegoVersion::Undefined,
            max_bytes: config.max_bundle_bytes,
            max_entries: config.max_bundle_entries,
        }
    }

    /// Keep `# METADATA` entrypoint annotations on the parsed modules.
    pub fn with_process_annotations(mut self, enabled: bool) -> Self {
        self.process_annotations = enabled;
        self
    }

    /// Dialect used for modules when the manifest declares none.
    pub fn with_rego_version(mut self, version: RegoVersion) -> Self {
        self.rego_version = version;
        self
    }

    /// Override the size and entry count limits.
    pub fn with_limits(mut self, max_bytes: u64, max_entries: usize) -> Self {
        self.max_bytes = max_bytes;
        self.max_entries = max_entries;
        self
    }

    /// Read and parse the bundle.
    pub fn read(self) -> Result<Bundle, BundleError> {
        if self.bytes.is_empty() {
            return Err(BundleError::Empty);
        }

        let files = self.read_entries()?;

        let mut bundle = Bundle::default();
        if let Some((_, contents)) = files.iter().find(|(path, _)| path == MANIFEST_FILE) {
            bundle.manifest =
                serde_json::from_slice::<Manifest>(contents).map_err(BundleError::Manifest)?;
        }

        let rego_version = bundle
            .manifest
            .declared_rego_version()
            .unwrap_or(self.rego_version);
        debug!(rego_version = %rego_version, files = files.len(), "Reading bundle");

        for (path, contents) in files {
            let (dir, name) = match path.rsplit_once('/') {
                Some((dir, name)) => (dir, name),
                None => ("", path.as_str()),
            };

            if name.ends_with(".rego") {
                let source = String::from_utf8(contents).map_err(|_| BundleError::Utf8(path.clone()))?;
                let mut module = PolicyModule::parse(path.as_str(), source, rego_version)?;
                if !self.process_annotations {
                    module.package_entrypoint = false;
                    module.rules.iter_mut().for_each(|r| r.entrypoint = false);
                }
                if !bundle.manifest.owns(&module.package.replace('.', "/")) {
                    return Err(BundleError::OutsideRoots {
                        path,
                        package: module.package,
                    });
                }
                bundle.modules.push(module);
            } else if name == DATA_FILE {
                let value = serde_json::from_slice(&contents).map_err(|source| BundleError::Data {
                    path: path.clone(),
                    source,
                })?;
                bundle.mount_data(&data_path(dir), value)?;
            } else if path != MANIFEST_FILE {
                debug!(path = %path, "Skipping bundle entry");
            }
        }

        Ok(bundle)
    }

    fn read_entries(&self) -> Result<Vec<(String, Vec<u8>)>, BundleError> {
        let mut archive = Archive::new(GzDecoder::new(self.bytes));
        let mut files = Vec::new();
        let mut entry_count = 0usize;
        let mut total_size = 0u64;

        for entry in archive.entries()? {
            let mut entry = entry?;

            entry_count = entry_count.saturating_add(1);
            if entry_count > self.max_entries {
                return Err(BundleError::TooManyEntries(self.max_entries));
            }

            let raw_path = entry.path()?.into_owned();
            let entry_type = entry.header().entry_type();
            match entry_type {
                EntryType::Regular | EntryType::Continuous => {}
                EntryType::Directory
                | EntryType::XHeader
                | EntryType::XGlobalHeader
                | EntryType::GNULongName => continue,
                other => {
                    return Err(BundleError::UnsafeEntry {
                        path: raw_path.display().to_string(),
                        entry_type: format!("{other:?}"),
                    });
                }
            }

            let path = normalize_archive_path(&raw_path)?;

            total_size = total_size.saturating_add(entry.header().size()?);
            if total_size > self.max_bytes {
                return Err(BundleError::TooLarge(self.max_bytes));
            }

            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            files.push((path, contents));
        }

        Ok(files)
    }
}

/// Convert an archive path to a slash-separated path relative to the
/// bundle root.
fn normalize_archive_path(path: &Path) -> Result<String, BundleError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(BundleError::PathTraversal(path.display().to_string()));
            }
        }
    }
    Ok(parts.join("/"))
}
