// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structural bundle compiler.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info};

use super::{CompileConfig, CompileError, Diagnostic, PolicyCompiler, Target};
use crate::bundle::{Bundle, BundleWriter, DATA_FILE, Manifest};
use crate::capabilities::{Capabilities, FEATURE_REGO_V1, FEATURE_REGO_V1_IMPORT};
use crate::loader::SourceLoader;
use crate::params::{RegoVersion, SourceMode};
use crate::policy::PolicyModule;

const PLAN_FILE: &str = "plan.json";

/// Compiler bundled with this crate.
///
/// Validates modules against the capability set, resolves entrypoints,
/// optionally prunes unreachable packages, and writes a deterministic
/// bundle. It does not evaluate policies.
#[derive(Debug, Clone, Default)]
pub struct BundleCompiler;

impl BundleCompiler {
    /// Create a compiler.
    pub fn new() -> Self {
        Self
    }

    fn load(&self, config: &CompileConfig) -> Result<Bundle, CompileError> {
        match &config.source {
            SourceMode::Bundle(bundle) => Ok((**bundle).clone()),
            SourceMode::Filesystem(path) => Ok(SourceLoader::new(&config.filter)
                .with_bundle_mode(config.as_bundle)
                .with_rego_version(config.rego_version)
                .with_follow_symlinks(config.follow_symlinks)
                .with_process_annotations(config.annotation_entrypoints)
                .load(path)?),
        }
    }
}

impl PolicyCompiler for BundleCompiler {
    fn compile(&self, config: &CompileConfig) -> Result<Vec<u8>, CompileError> {
        let target = Target::parse(&config.target)?;
        if config.debug {
            debug!(
                target = %target,
                source = config.source.kind(),
                bundle_mode = config.as_bundle,
                optimization_level = config.optimization_level,
                "Compiling"
            );
        }

        let mut bundle = self.load(config)?;
        if config.debug {
            debug!(modules = bundle.modules.len(), "Loaded policy sources");
        }

        if !config.enable_print_statements {
            bundle.modules = bundle
                .modules
                .iter()
                .map(PolicyModule::without_print_statements)
                .collect();
        }

        let diagnostics = check_capabilities(&bundle.modules, &config.capabilities);
        if !diagnostics.is_empty() {
            return Err(CompileError::Diagnostics(diagnostics));
        }

        let entrypoints = resolve_entrypoints(&bundle, config)?;
        if config.debug {
            debug!(entrypoints = ?entrypoints, "Resolved entrypoints");
        }

        if target == Target::Plan && entrypoints.is_empty() {
            return Err(CompileError::InvalidConfig(
                "plan compilation requires at least one entrypoint".to_string(),
            ));
        }
        if config.optimization_level > 0 && entrypoints.is_empty() {
            return Err(CompileError::InvalidConfig(
                "bundle optimizations require at least one entrypoint".to_string(),
            ));
        }

        if config.prune_unused && !entrypoints.is_empty() {
            let before = bundle.modules.len();
            bundle.modules = prune(bundle.modules, &entrypoints);
            if config.debug {
                debug!(
                    pruned = before - bundle.modules.len(),
                    kept = bundle.modules.len(),
                    "Pruned unused modules"
                );
            }
        }

        let output = emit(&bundle, config, target, &entrypoints)?;
        info!(bytes = output.len(), "Compiled bundle");
        Ok(output)
    }
}

// ============================================================================
// Capability checks
// ============================================================================

fn check_capabilities(modules: &[PolicyModule], caps: &Capabilities) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    // Functions callable without a builtin: every function defined in a
    // package is visible to all modules of that package.
    let mut functions: HashMap<&str, HashSet<&str>> = HashMap::new();
    for module in modules {
        functions
            .entry(module.package.as_str())
            .or_default()
            .extend(module.function_names());
    }

    for module in modules {
        let mut report = |line: usize, kind: &'static str, message: String| {
            diagnostics.push(Diagnostic {
                file: module.path.clone(),
                line,
                kind,
                message,
            });
        };

        if module.rego_version.effective() == RegoVersion::V1 && !caps.has_feature(FEATURE_REGO_V1) {
            report(
                1,
                "rego_parse_error",
                "illegal capabilities: rego_v1 feature required for parsing v1 Rego".to_string(),
            );
        }

        for import in &module.imports {
            if import.path == "rego.v1" && !caps.has_feature(FEATURE_REGO_V1_IMPORT) {
                report(
                    import.line,
                    "rego_parse_error",
                    "invalid import, `rego.v1` is not supported by current capabilities".to_string(),
                );
            }
        }
        for keyword in module.future_keywords() {
            if !caps.has_future_keyword(&keyword) {
                report(
                    1,
                    "rego_parse_error",
                    format!("unexpected keyword, `{keyword}` is not supported by current capabilities"),
                );
            }
        }

        let aliases: HashSet<&str> = module
            .imports
            .iter()
            .filter_map(|i| i.alias.as_deref())
            .collect();
        let local = functions.get(module.package.as_str());

        for call in &module.calls {
            let root = call.name.split('.').next().unwrap_or_default();
            let defined = local.is_some_and(|names| names.contains(call.name.as_str()));
            if defined || aliases.contains(root) || caps.has_builtin(&call.name) {
                continue;
            }
            report(
                call.line,
                "rego_type_error",
                format!("undefined function {}", call.name),
            );
        }
    }

    diagnostics
}

// ============================================================================
// Entrypoints and pruning
// ============================================================================

/// Normalize an entrypoint to a dotted path without the `data.` prefix.
fn normalize_entrypoint(entrypoint: &str) -> String {
    let dotted = entrypoint.trim_matches('/').replace('/', ".");
    match dotted.strip_prefix("data.") {
        Some(rest) => rest.to_string(),
        None => dotted,
    }
}

fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}."))
}

fn refers_to_decision(bundle: &Bundle, path: &str) -> bool {
    bundle.modules.iter().any(|module| {
        is_within(&module.package, path) || module.rule_paths().any(|rule| is_within(&rule, path))
    })
}

fn resolve_entrypoints(bundle: &Bundle, config: &CompileConfig) -> Result<Vec<String>, CompileError> {
    let mut resolved: Vec<String> = Vec::new();

    for entrypoint in &config.entrypoints {
        let path = normalize_entrypoint(entrypoint);
        if path.is_empty() || !refers_to_decision(bundle, &path) {
            return Err(CompileError::UnknownEntrypoint(entrypoint.clone()));
        }
        if !resolved.contains(&path) {
            resolved.push(path);
        }
    }

    if config.annotation_entrypoints {
        for module in &bundle.modules {
            if module.package_entrypoint && !resolved.contains(&module.package) {
                if config.debug {
                    debug!(entrypoint = %module.package, "Annotated package entrypoint");
                }
                resolved.push(module.package.clone());
            }
            for rule in module.rules.iter().filter(|r| r.entrypoint) {
                let path = format!("{}.{}", module.package, rule.name);
                if !resolved.contains(&path) {
                    if config.debug {
                        debug!(entrypoint = %path, "Annotated rule entrypoint");
                    }
                    resolved.push(path);
                }
            }
        }
    }

    Ok(resolved)
}

/// Keep modules reachable from the entrypoints through `data` references
/// and imports. Modules sharing a package are kept or dropped together.
fn prune(modules: Vec<PolicyModule>, entrypoints: &[String]) -> Vec<PolicyModule> {
    let related = |package: &str, reference: &str| is_within(package, reference) || is_within(reference, package);

    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = modules
        .iter()
        .filter(|m| entrypoints.iter().any(|e| related(&m.package, e)))
        .map(|m| m.package.clone())
        .collect();

    while let Some(package) = queue.pop_front() {
        if !reachable.insert(package.clone()) {
            continue;
        }
        let references = modules
            .iter()
            .filter(|m| m.package == package)
            .flat_map(|m| {
                let imports = m
                    .imports
                    .iter()
                    .filter_map(|i| i.path.strip_prefix("data."));
                m.data_refs.iter().map(String::as_str).chain(imports)
            });
        for reference in references {
            for candidate in &modules {
                if !reachable.contains(&candidate.package) && related(&candidate.package, reference) {
                    queue.push_back(candidate.package.clone());
                }
            }
        }
    }

    modules
        .into_iter()
        .filter(|m| reachable.contains(&m.package))
        .collect()
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct Plan<'a> {
    entrypoints: Vec<PlanEntry<'a>>,
    builtins: BTreeSet<&'a str>,
}

#[derive(Serialize)]
struct PlanEntry<'a> {
    name: String,
    rules: Vec<String>,
    modules: BTreeSet<&'a str>,
}

fn build_plan<'a>(bundle: &'a Bundle, entrypoints: &[String], caps: &Capabilities) -> Plan<'a> {
    let entrypoints = entrypoints
        .iter()
        .map(|entrypoint| {
            let mut rules = Vec::new();
            let mut modules = BTreeSet::new();
            for module in &bundle.modules {
                for rule in module.rule_paths() {
                    if is_within(&rule, entrypoint) || is_within(entrypoint, &rule) {
                        modules.insert(module.path.as_str());
                        if !rules.contains(&rule) {
                            rules.push(rule);
                        }
                    }
                }
            }
            PlanEntry {
                name: entrypoint.replace('.', "/"),
                rules,
                modules,
            }
        })
        .collect();

    let builtins = bundle
        .modules
        .iter()
        .flat_map(|m| m.calls.iter())
        .map(|c| c.name.as_str())
        .filter(|name| caps.has_builtin(name))
        .collect();

    Plan {
        entrypoints,
        builtins,
    }
}

fn emit(
    bundle: &Bundle,
    config: &CompileConfig,
    target: Target,
    entrypoints: &[String],
) -> Result<Vec<u8>, CompileError> {
    let rego_version = bundle
        .manifest
        .declared_rego_version()
        .unwrap_or(config.rego_version);

    let manifest = Manifest {
        revision: config
            .revision
            .clone()
            .unwrap_or_else(|| bundle.manifest.revision.clone()),
        rego_version: Some(rego_version.manifest_value()),
        ..bundle.manifest.clone()
    };

    let mut modules: Vec<&PolicyModule> = bundle.modules.iter().collect();
    modules.sort_by(|a, b| a.path.cmp(&b.path));

    let mut writer = BundleWriter::new(Vec::new());
    writer.write_manifest(&manifest)?;
    for module in modules {
        writer.write_entry(&module.path, module.source.as_bytes())?;
    }
    writer.write_entry(DATA_FILE, &serde_json::to_vec(&bundle.data).map_err(std::io::Error::from)?)?;

    if target == Target::Plan {
        let plan = build_plan(bundle, entrypoints, &config.capabilities);
        let json = serde_json::to_vec_pretty(&plan).map_err(std::io::Error::from)?;
        writer.write_entry(PLAN_FILE, &json)?;
    }

    Ok(writer.finish()?)
}
