// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Build orchestration.
//!
//! Wires parameters, capabilities and the source into a [`CompileConfig`],
//! runs the compiler synchronously and packages the outcome.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::bundle::BundleReader;
use crate::capabilities::resolve_capabilities;
use crate::compiler::{CompileConfig, PolicyCompiler};
use crate::debug_log::with_debug_log;
use crate::error::{BuildError, BuildStatus, Result};
use crate::loader::PathFilter;
use crate::params::{BuildParameters, SourceMode};

/// Where a build reads its sources from.
#[derive(Debug, Clone, Copy)]
pub enum SourceRequest<'a> {
    /// A file or directory walked by the compiler.
    Filesystem(&'a str),
    /// Serialized bundle bytes, parsed before the compiler runs.
    Bytes(&'a [u8]),
}

/// Everything a build attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Coarse status.
    pub status: BuildStatus,
    /// Output bundle (success only).
    pub output: Option<Vec<u8>>,
    /// Error text (failure only).
    pub error: Option<String>,
    /// Captured debug log (debug mode only).
    pub log: Option<String>,
}

impl BuildOutcome {
    /// Package a build result together with its log.
    pub fn from_result(result: Result<Vec<u8>>, log: Option<String>) -> Self {
        match result {
            Ok(output) => Self {
                status: BuildStatus::Ok,
                output: Some(output),
                error: None,
                log,
            },
            Err(e) => Self::failure(&e, log),
        }
    }

    /// Outcome of a failed build.
    pub fn failure(error: &BuildError, log: Option<String>) -> Self {
        Self {
            status: error.status(),
            output: None,
            error: Some(error.to_string()),
            log,
        }
    }
}

/// Turn a source request into the source the compiler consumes.
///
/// Bundle bytes are read here, with annotation processing on, so a
/// malformed bundle fails before the compiler is involved.
pub fn acquire_source(request: SourceRequest<'_>, params: &BuildParameters) -> Result<SourceMode> {
    match request {
        SourceRequest::Filesystem(path) => Ok(SourceMode::Filesystem(PathBuf::from(path))),
        SourceRequest::Bytes(bytes) => {
            let bundle = BundleReader::new(bytes)
                .with_process_annotations(true)
                .with_rego_version(params.rego_version)
                .read()?;
            debug!(modules = bundle.modules.len(), "Done reading bundle");
            Ok(SourceMode::Bundle(Box::new(bundle)))
        }
    }
}

/// Run one build to completion.
pub fn run_build(
    params: &BuildParameters,
    request: SourceRequest<'_>,
    compiler: &dyn PolicyCompiler,
) -> Result<Vec<u8>> {
    debug!(version = compiler.version(), "Compiler version");
    debug!(rego_version = %params.rego_version, "Rego version");

    let capabilities = resolve_capabilities(
        params.capabilities_json.as_deref(),
        params.capabilities_version.as_deref(),
    )?;

    let source = acquire_source(request, params)?;

    let config = CompileConfig::new(source, capabilities)
        .with_target(params.target.clone())
        .with_bundle_mode(params.bundle_mode)
        .with_entrypoints(params.entrypoints.clone())
        .with_print_statements(!params.disable_print_statements)
        .with_prune_unused(params.prune_unused)
        .with_optimization_level(params.optimization_level)
        .with_annotation_entrypoints(true)
        .with_filter(PathFilter::new(params.bundle_mode, &params.ignore))
        .with_rego_version(params.rego_version)
        .with_follow_symlinks(params.follow_symlinks)
        .with_revision(params.revision.clone())
        .with_debug(params.debug);

    let output = compiler.compile(&config)?;

    let checksum = format!("{:x}", Sha256::digest(&output));
    debug!(bytes = output.len(), sha256 = %checksum, "Build output");

    Ok(output)
}

/// Run one build, capturing its debug log when the parameters ask for it.
pub fn execute(
    params: &BuildParameters,
    request: SourceRequest<'_>,
    compiler: &dyn PolicyCompiler,
) -> BuildOutcome {
    let (result, log) = with_debug_log(params.debug, || run_build(params, request, compiler));
    BuildOutcome::from_result(result, log)
}
