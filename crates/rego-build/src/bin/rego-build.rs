// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Policy bundle build CLI
//!
//! Builds a policy bundle from a directory or from an existing bundle file.
//!
//! Usage:
//!
//! ```text
//! rego-build (--source <path> | --bundle-file <path>) [OPTIONS]
//! ```
//!
//! Example:
//!
//! ```text
//! rego-build --source ./policies --bundle --entrypoint authz/allow --output bundle.tar.gz
//! ```

use rego_build::{
    BuildParameters, BundleCompiler, RegoVersion, SourceRequest, VersionInfo, execute,
};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_OUTPUT: &str = "bundle.tar.gz";

fn print_usage() {
    eprintln!(
        r#"Usage: rego-build (--source <path> | --bundle-file <path>) [OPTIONS]

Build a policy bundle.

SOURCES:
    --source <path>              File or directory of policy sources
    --bundle-file <path>         Existing bundle archive (.tar.gz)

OPTIONS:
    --target <name>              Output target: rego or plan (default: rego)
    --entrypoint <path>          Entrypoint rule, e.g. authz/allow (repeatable)
    --bundle                     Treat --source as a bundle directory
    --capabilities <file>        Capabilities JSON file
    --capabilities-version <v>   Named capabilities version, e.g. v0.68.0
    --rego-version <v>           Dialect: v0, v0v1 or v1 (default: v1)
    --revision <rev>             Revision recorded in the manifest
    --ignore <glob>              Skip matching files (repeatable)
    --optimize <n>               Optimization level (default: 0)
    --prune-unused               Drop modules unreachable from the entrypoints
    --follow-symlinks            Follow symlinks while walking --source
    --disable-print              Erase print() calls
    --debug                      Print the captured debug log to stderr
    --output <path>              Output bundle path (default: bundle.tar.gz)
    --version                    Show version information
    --help                       Show this help message

ENVIRONMENT:
    RUST_LOG                     CLI log filter (default: warn)
    REGO_BUILD_LOG               Debug log filter (default: debug)
    REGO_BUILD_CAPABILITIES_DIR  Extra directory of <version>.json capabilities

EXAMPLES:
    # Build a bundle directory with one entrypoint
    rego-build --source ./policies --bundle --entrypoint authz/allow

    # Rebuild an existing bundle against older capabilities
    rego-build --bundle-file in.tar.gz --capabilities-version v0.68.0 --output out.tar.gz
"#
    );
}

enum Source {
    Path(String),
    BundleFile(PathBuf),
}

struct Args {
    source: Source,
    params: BuildParameters,
    output_path: PathBuf,
}

fn parse_rego_version(value: &str) -> Result<RegoVersion, String> {
    match value {
        "v0" | "0" => Ok(RegoVersion::V0),
        "v0v1" | "v0-compat-v1" => Ok(RegoVersion::V0CompatV1),
        "v1" | "1" => Ok(RegoVersion::V1),
        other => Err(format!("Invalid rego version: {}", other)),
    }
}

fn parse_args() -> Result<Option<Args>, String> {
    let args: Vec<String> = std::env::args().collect();

    let mut source: Option<Source> = None;
    let mut params = BuildParameters::new().with_target("rego");
    let mut entrypoints: Vec<String> = Vec::new();
    let mut ignore: Vec<String> = Vec::new();
    let mut output_path = PathBuf::from(DEFAULT_OUTPUT);

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> Result<String, String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };

        match flag {
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--version" => {
                let info = VersionInfo::current();
                println!("Version: {}", info.version);
                println!("Rust Version: {}", info.runtime_version);
                println!("Commit: {}", info.commit);
                println!("Platform: {}", info.platform);
                return Ok(None);
            }
            "--source" => {
                if source.is_some() {
                    return Err("only one of --source and --bundle-file may be given".to_string());
                }
                source = Some(Source::Path(value()?));
            }
            "--bundle-file" => {
                if source.is_some() {
                    return Err("only one of --source and --bundle-file may be given".to_string());
                }
                source = Some(Source::BundleFile(PathBuf::from(value()?)));
            }
            "--target" => params.target = value()?,
            "--entrypoint" | "-e" => entrypoints.push(value()?),
            "--bundle" | "-b" => params.bundle_mode = true,
            "--capabilities" => {
                let path = value()?;
                let json = fs::read_to_string(&path)
                    .map_err(|e| format!("Error reading capabilities file {}: {}", path, e))?;
                params.capabilities_json = Some(json);
            }
            "--capabilities-version" => params.capabilities_version = Some(value()?),
            "--rego-version" => params.rego_version = parse_rego_version(&value()?)?,
            "--revision" => params.revision = Some(value()?),
            "--ignore" => ignore.push(value()?),
            "--optimize" | "-O" => {
                let raw = value()?;
                params.optimization_level = raw
                    .parse()
                    .map_err(|_| format!("Invalid optimization level: {}", raw))?;
            }
            "--prune-unused" => params.prune_unused = true,
            "--follow-symlinks" => params.follow_symlinks = true,
            "--disable-print" => params.disable_print_statements = true,
            "--debug" => params.debug = true,
            "--output" | "-o" => output_path = PathBuf::from(value()?),
            arg => {
                return Err(format!("Unknown argument: {}", arg));
            }
        }
        i += 1;
    }

    let source = source.ok_or("--source or --bundle-file is required")?;
    let params = params.with_entrypoints(entrypoints).with_ignore(ignore);

    Ok(Some(Args {
        source,
        params,
        output_path,
    }))
}

fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(u8::try_from(status.unsigned_abs()).unwrap_or(1))
}

fn main() -> ExitCode {
    // Initialize minimal logging (default to warn if RUST_LOG not set)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let bundle_bytes;
    let request = match &args.source {
        Source::Path(path) => SourceRequest::Filesystem(path),
        Source::BundleFile(path) => {
            bundle_bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    eprintln!("Error reading bundle file {:?}: {}", path, e);
                    return ExitCode::FAILURE;
                }
            };
            SourceRequest::Bytes(&bundle_bytes)
        }
    };

    let compiler = BundleCompiler::new();
    let outcome = execute(&args.params, request, &compiler);

    if let Some(log) = &outcome.log {
        eprint!("{}", log);
    }

    let output = match outcome.output {
        Some(output) if outcome.status.is_success() => output,
        _ => {
            eprintln!(
                "Build failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            return exit_code(outcome.status.code());
        }
    };

    if let Err(e) = fs::write(&args.output_path, &output) {
        eprintln!("Error writing bundle to {:?}: {}", args.output_path, e);
        return ExitCode::FAILURE;
    }

    eprintln!("Build successful:");
    eprintln!("  Bundle size: {} bytes", output.len());

    // Print final path to stdout for scripts to capture
    println!("{}", args.output_path.display());

    ExitCode::SUCCESS
}
