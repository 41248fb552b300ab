// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem source loading.
//!
//! Walks a file or directory under a [`PathFilter`] and assembles the
//! modules and data documents it finds into a [`Bundle`].

use std::fs;
use std::io;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::bundle::{
    self, Bundle, BundleError, BundleReader, DATA_FILE, MANIFEST_FILE, is_bundle_archive,
};
use crate::params::RegoVersion;
use crate::policy::{ParseError, PolicyModule};

/// Errors raised while loading sources from the filesystem.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The source path does not exist.
    #[error("{0}: no such file or directory")]
    NotFound(String),

    /// A file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A nested bundle archive could not be read.
    #[error("{path}: {source}")]
    Bundle {
        /// Archive path.
        path: String,
        /// Underlying bundle failure.
        #[source]
        source: BundleError,
    },

    /// A module failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A data document is invalid or conflicts with another.
    #[error("{path}: {message}")]
    Data {
        /// Document path.
        path: String,
        /// Problem description.
        message: String,
    },
}

/// Decides which paths a filesystem walk skips.
#[derive(Debug, Clone)]
pub struct PathFilter {
    bundle_mode: bool,
    ignore: GlobSet,
}

impl PathFilter {
    /// Build a filter. Invalid ignore patterns are skipped with a warning.
    pub fn new(bundle_mode: bool, ignore: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!(pattern = %pattern, error = %e, "Ignoring invalid ignore pattern"),
            }
        }
        let ignore = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build ignore set");
            GlobSet::empty()
        });

        Self {
            bundle_mode,
            ignore,
        }
    }

    /// Whether the walk skips `path`, found at `depth` below the root.
    ///
    /// Outside bundle mode, bundle archives are skipped. Ignore patterns
    /// match the file name of any entry below the root.
    pub fn excludes(&self, path: &Path, is_dir: bool, depth: usize) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.bundle_mode && !is_dir && is_bundle_archive(&name) {
            return true;
        }

        depth >= 1 && self.ignore.is_match(&*name)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(false, &[])
    }
}

/// Loads policy sources from a file or directory.
#[derive(Debug, Clone)]
pub struct SourceLoader<'a> {
    filter: &'a PathFilter,
    bundle_mode: bool,
    rego_version: RegoVersion,
    follow_symlinks: bool,
    process_annotations: bool,
}

impl<'a> SourceLoader<'a> {
    /// Create a loader applying `filter`.
    pub fn new(filter: &'a PathFilter) -> Self {
        Self {
            bundle_mode: filter.bundle_mode,
            filter,
            rego_version: RegoVersion::Undefined,
            follow_symlinks: false,
            process_annotations: false,
        }
    }

    /// Treat the source as a bundle directory (`.manifest`, `data.json`
    /// mounted at its directory).
    pub fn with_bundle_mode(mut self, bundle_mode: bool) -> Self {
        self.bundle_mode = bundle_mode;
        self
    }

    /// Dialect to scan modules under.
    pub fn with_rego_version(mut self, version: RegoVersion) -> Self {
        self.rego_version = version;
        self
    }

    /// Follow symlinks during the walk.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Keep `# METADATA` entrypoint annotations.
    pub fn with_process_annotations(mut self, enabled: bool) -> Self {
        self.process_annotations = enabled;
        self
    }

    /// Load everything under `root`.
    pub fn load(&self, root: &Path) -> Result<Bundle, LoadError> {
        if !root.exists() {
            return Err(LoadError::NotFound(root.display().to_string()));
        }

        let mut bundle = Bundle::default();
        let mut version = self.rego_version;

        // The manifest dialect applies to every module, so read it first.
        let manifest_path = root.join(MANIFEST_FILE);
        if self.bundle_mode && manifest_path.is_file() {
            let text = read_text(&manifest_path)?;
            bundle.manifest = serde_json::from_str(&text).map_err(|e| LoadError::Data {
                path: MANIFEST_FILE.to_string(),
                message: format!("invalid manifest: {e}"),
            })?;
            if let Some(declared) = bundle.manifest.declared_rego_version() {
                version = declared;
            }
        }

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.filter.excludes(e.path(), e.file_type().is_dir(), e.depth()));

        for entry in walker {
            let entry = entry.map_err(|e| LoadError::Io {
                path: e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string()),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_path(root, entry.path());
            self.load_file(&mut bundle, entry.path(), &relative, version)?;
        }

        debug!(
            root = %root.display(),
            modules = bundle.modules.len(),
            "Loaded sources"
        );
        Ok(bundle)
    }

    fn load_file(
        &self,
        bundle: &mut Bundle,
        path: &Path,
        relative: &str,
        version: RegoVersion,
    ) -> Result<(), LoadError> {
        let name = relative.rsplit('/').next().unwrap_or(relative);

        if name.ends_with(".rego") {
            let source = read_text(path)?;
            let module = self.parse_module(relative, source, version)?;
            debug!(path = %relative, package = %module.package, "Loaded module");
            bundle.modules.push(module);
        } else if is_bundle_archive(name) {
            let bytes = fs::read(path).map_err(|source| io_error(path, source))?;
            let nested = BundleReader::new(&bytes)
                .with_process_annotations(self.process_annotations)
                .with_rego_version(version)
                .read()
                .map_err(|source| LoadError::Bundle {
                    path: relative.to_string(),
                    source,
                })?;
            debug!(path = %relative, modules = nested.modules.len(), "Loaded nested bundle");
            bundle.modules.extend(nested.modules);
            self.mount(bundle, relative, &[], nested.data)?;
        } else if self.bundle_mode && name == DATA_FILE {
            let value = self.read_json(path, relative)?;
            let dir = relative.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            self.mount(bundle, relative, &bundle::data_path(dir), value)?;
        } else if !self.bundle_mode && name.ends_with(".json") {
            let value = self.read_json(path, relative)?;
            self.mount(bundle, relative, &[], value)?;
        }

        Ok(())
    }

    fn parse_module(
        &self,
        path: &str,
        source: String,
        version: RegoVersion,
    ) -> Result<PolicyModule, LoadError> {
        let mut module = PolicyModule::parse(path, source, version)?;
        if !self.process_annotations {
            module.package_entrypoint = false;
            module.rules.iter_mut().for_each(|r| r.entrypoint = false);
        }
        Ok(module)
    }

    fn read_json(&self, path: &Path, relative: &str) -> Result<Value, LoadError> {
        let text = read_text(path)?;
        serde_json::from_str(&text).map_err(|e| LoadError::Data {
            path: relative.to_string(),
            message: e.to_string(),
        })
    }

    fn mount(
        &self,
        bundle: &mut Bundle,
        relative: &str,
        at: &[String],
        value: Value,
    ) -> Result<(), LoadError> {
        bundle::mount(&mut bundle.data, at, value).map_err(|conflict| LoadError::Data {
            path: relative.to_string(),
            message: format!("data conflict at {conflict}"),
        })
    }
}

fn read_text(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: io::Error) -> LoadError {
    LoadError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Slash-separated path of `path` relative to `root`, or its file name when
/// `root` is the file itself.
fn relative_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().replace('\\', "/"),
        _ => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}
