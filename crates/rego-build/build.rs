// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::env;
use std::process::Command;

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    println!("cargo:rerun-if-env-changed=REGO_BUILD_VCS_REVISION");
    println!("cargo:rerun-if-changed=capabilities");

    // Host toolchain version reported through the version descriptor
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version =
        command_output(&rustc, &["--version"]).unwrap_or_else(|| "rustc unknown".to_string());
    println!("cargo:rustc-env=REGO_BUILD_RUSTC_VERSION={}", rustc_version);

    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=REGO_BUILD_TARGET={}", target);

    // Release pipelines pin the revision explicitly; local builds ask git
    let revision = env::var("REGO_BUILD_VCS_REVISION")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| command_output("git", &["rev-parse", "--short", "HEAD"]))
        .unwrap_or_default();
    println!("cargo:rustc-env=REGO_BUILD_VCS_REVISION={}", revision);
}
