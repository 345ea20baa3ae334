//! Subcommand implementations. Each returns whether the run was clean.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use walkdir::WalkDir;

use rulekit_core::{Config, MapRecord};
use rulekit_rules::dependency::DependencyAnalyzer;
use rulekit_rules::scenario::{ScenarioExecutionResult, ScenarioService};
use rulekit_rules::validation::{validate_yaml, ValidationResult};

#[derive(Serialize)]
struct FileReport {
    path: PathBuf,
    #[serde(flatten)]
    result: ValidationResult,
}

pub fn validate(paths: &[PathBuf], strict: bool, json: bool) -> Result<bool> {
    let files = collect_yaml(paths)?;
    if files.is_empty() {
        bail!("no YAML documents found");
    }

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let yaml = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        reports.push(FileReport {
            result: validate_yaml(&yaml),
            path,
        });
    }

    let failed = reports
        .iter()
        .filter(|r| !r.result.is_valid() || (strict && !r.result.warnings.is_empty()))
        .count();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            let status = if report.result.is_valid() { "ok" } else { "FAILED" };
            println!("{} {}", status, report.path.display());
            for e in &report.result.errors {
                match &e.suggestion {
                    Some(s) => println!("  error   {}: {} ({s})", e.path, e.message),
                    None => println!("  error   {}: {}", e.path, e.message),
                }
            }
            for w in &report.result.warnings {
                println!("  warning {}: {}", w.path, w.message);
            }
        }
        println!("\n{} documents, {} failed", reports.len(), failed);
    }
    Ok(failed == 0)
}

/// Expand directories into their YAML files, sorted for stable output.
fn collect_yaml(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.exists() {
            bail!("{} does not exist", path.display());
        }
        for entry in WalkDir::new(path).follow_links(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to read directory entry");
                    continue;
                }
            };
            let yaml = matches!(entry.path().extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
            if entry.file_type().is_file() && yaml {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

#[derive(Serialize)]
struct DepsReport<'a> {
    #[serde(flatten)]
    summary: rulekit_rules::dependency::DependencySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    orphans: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    impact: Option<Impact<'a>>,
}

#[derive(Serialize)]
struct Impact<'a> {
    file: &'a Path,
    dependents: Vec<PathBuf>,
}

pub fn deps(root: &Path, orphans_dir: Option<&Path>, impact: Option<&Path>, json: bool) -> Result<bool> {
    if !root.is_file() {
        bail!("{} is not a file", root.display());
    }
    let analyzer = DependencyAnalyzer::new();
    let graph = analyzer.analyze(root);
    let orphans = orphans_dir.map(|dir| analyzer.find_orphans(&graph, dir));
    let impact = impact.map(|file| Impact {
        file,
        dependents: graph.transitive_dependents(file).into_iter().collect(),
    });
    let clean = graph.missing().is_empty() && graph.invalid().is_empty() && !graph.has_cycles();

    if json {
        let report = DepsReport {
            summary: graph.summary(),
            orphans,
            impact,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(clean);
    }

    print!("{}", graph.report());
    if let Some(orphans) = orphans {
        println!("\norphans ({}):", orphans.len());
        for path in orphans {
            println!("  {}", path.display());
        }
    }
    if let Some(impact) = impact {
        println!("\nchanging {} affects {} files:", impact.file.display(), impact.dependents.len());
        for path in impact.dependents {
            println!("  {}", path.display());
        }
    }
    Ok(clean)
}

fn load_service(config: &Config, registry: &Path) -> Result<ScenarioService> {
    let service = ScenarioService::from_config(config);
    let count = service
        .load_registry(registry)
        .with_context(|| format!("failed to load registry {}", registry.display()))?;
    info!(registry = %registry.display(), scenarios = count, "registry ready");
    Ok(service)
}

pub fn route(config: &Config, registry: &Path, data_type: &str, json: bool) -> Result<bool> {
    let service = load_service(config, registry)?;
    let scenario = service.route_data_type(data_type)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*scenario)?);
    } else {
        println!("{data_type} -> {}", scenario.scenario_id);
        for stage in scenario.stages_by_execution_order() {
            println!(
                "  {}. {} ({}, {})",
                stage.execution_order,
                stage.stage_name,
                stage.config_file,
                stage.policy()
            );
        }
    }
    Ok(true)
}

pub struct RunRequest<'a> {
    pub registry: &'a Path,
    pub record: &'a str,
    pub data_type: Option<&'a str>,
    pub scenario: Option<&'a str>,
}

pub fn run(config: &Config, request: RunRequest<'_>, json: bool) -> Result<bool> {
    let value = read_record(request.record)?;
    let data_type = request
        .data_type
        .map(str::to_string)
        .or_else(|| value.get("type").and_then(Value::as_str).map(str::to_string));
    let mut record = to_record(value, data_type.as_deref());

    let service = load_service(config, request.registry)?;
    let result = match request.scenario {
        Some(id) => service.process_with_scenario(id, &mut record)?,
        None => {
            let Some(data_type) = data_type.as_deref() else {
                bail!("record has no 'type' field; pass --data-type or --scenario");
            };
            service.process(&mut record, Some(data_type))?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(result.is_successful())
}

/// Inline JSON, or `@path` to a JSON file.
fn read_record(arg: &str) -> Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read record file {path}"))?,
        None => arg.to_string(),
    };
    let value: Value = serde_json::from_str(&text).context("record is not valid JSON")?;
    if !value.is_object() {
        bail!("record must be a JSON object");
    }
    Ok(value)
}

fn to_record(value: Value, data_type: Option<&str>) -> MapRecord {
    let Some(data_type) = data_type else {
        return MapRecord::from_value(value);
    };
    let mut record = MapRecord::typed(data_type);
    if let Value::Object(fields) = value {
        for (name, field) in fields {
            record.insert(name, field);
        }
    }
    record
}

fn print_result(result: &ScenarioExecutionResult) {
    println!("scenario {}: {}", result.scenario_id, result.status);
    for error in &result.validation_errors {
        println!("  invalid: {error}");
    }
    for stage in &result.stage_results {
        let message = stage.message.as_deref().unwrap_or("");
        println!("  {:<24} {:?} {}", stage.stage_name, stage.outcome, message);
    }
    for (stage, reason) in &result.skipped_stages {
        println!("  {stage:<24} skipped: {reason}");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    for flag in &result.review_flags {
        println!("  review: {flag}");
    }
}
