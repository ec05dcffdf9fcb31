// module validator - evaluates a module's file bundle against its rego policies

use super::opa;
use super::verdict::{
    discover_rules, display_rule_name, interpret_eval_output, is_violation_rule, RuleOutcome, Violation,
    DEFAULT_RULE,
};
use crate::collector::{collect_module_files, CollectOptions, FileBundle};
use crate::config::{load_config, MonorepoConfig};
use crate::patterns::ModuleTypeRules;
use crate::process::CommandRunner;
use crate::utils::{truncate_with_ellipsis, RunContext};
use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MAX_ERROR_LENGTH: usize = 400;

#[derive(Args, Debug, Clone)]
pub struct ValidateModuleArgs {
    /// path to the terraform module
    #[arg(long)]
    pub module_path: String,

    /// module type whose policies apply
    #[arg(long)]
    pub module_type: String,

    /// path to the monorepo configuration file
    #[arg(long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleStatus {
    Passed,
    Failed { count: usize, violations: Vec<Violation> },
    Errored(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    pub rule: String,
    pub status: RuleStatus,
}

/// everything learned from one policy file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyReport {
    pub name: String,
    /// set when the file could not be evaluated at all
    pub error: Option<String>,
    pub rules: Vec<RuleResult>,
}

impl PolicyReport {
    fn errored(name: String, error: String) -> Self {
        Self {
            name,
            error: Some(error),
            rules: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error.is_some()
            || self
                .rules
                .iter()
                .any(|result| matches!(result.status, RuleStatus::Errored(_)))
    }

    pub fn has_violations(&self) -> bool {
        self.rules
            .iter()
            .any(|result| matches!(result.status, RuleStatus::Failed { .. }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub passed_files: usize,
    pub failed_files: usize,
    pub errored_files: usize,
    pub total_files: usize,
    pub passed_rules: usize,
    pub failed_rules: usize,
    pub errored_rules: usize,
    pub total_rules: usize,
}

impl ValidationSummary {
    pub fn from_reports(reports: &[PolicyReport]) -> Self {
        let mut summary = Self {
            total_files: reports.len(),
            ..Self::default()
        };

        for report in reports {
            if report.has_errors() {
                summary.errored_files += 1;
            } else if report.has_violations() {
                summary.failed_files += 1;
            } else {
                summary.passed_files += 1;
            }

            for result in &report.rules {
                summary.total_rules += 1;
                match result.status {
                    RuleStatus::Passed => summary.passed_rules += 1,
                    RuleStatus::Failed { .. } => summary.failed_rules += 1,
                    RuleStatus::Errored(_) => summary.errored_rules += 1,
                }
            }
        }

        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed_rules == 0 && self.errored_rules == 0 && self.errored_files == 0
    }
}

/// policy dirs for a module type plus the configured additional ones, in that order
pub fn policy_dirs(config: &MonorepoConfig, rules: &ModuleTypeRules, module_type: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    match rules.get(module_type) {
        None => log::warn!("No specific policies for module type: {module_type}"),
        Some(rule) => match &rule.policy_dir {
            Some(dir) => {
                log::info!("Added module type specific policy directory: {dir}");
                dirs.push(PathBuf::from(dir));
            }
            None => log::warn!("No policy directory defined for module type: {module_type}"),
        },
    }

    if config.module_validator_additional_policies.is_empty() {
        log::warn!("No additional policy directories configured");
    }
    for key in &config.module_validator_additional_policies {
        match config.rego_policy_dirs.get(key) {
            Some(dir) => {
                log::info!("Added additional policy directory: {dir}");
                dirs.push(PathBuf::from(dir));
            }
            None => log::warn!("Policy directory not found for key: {key}"),
        }
    }

    dirs
}

/// the `*.rego` files of each dir, sorted within a dir; unreadable dirs are skipped
pub fn policy_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for dir in dirs {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Error reading policy directory {}: {e}", dir.display());
                continue;
            }
        };

        let mut rego_files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "rego"))
            .collect();
        rego_files.sort();

        log::debug!("found {} policy file(s) in {}", rego_files.len(), dir.display());
        files.extend(rego_files);
    }

    files
}

/// the policy input: file keys re-rooted at the module's base name
pub fn prepare_input(bundle: FileBundle, module_path: &str) -> Value {
    let repo_path = module_path.trim_end_matches('/');
    let module_name = Path::new(repo_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| repo_path.to_string());

    let prefix = format!("{repo_path}/");
    let files: BTreeMap<String, String> = bundle
        .files
        .into_iter()
        .map(|(key, content)| match key.strip_prefix(&prefix) {
            Some(rest) => (format!("{module_name}/{rest}"), content),
            None => (key, content),
        })
        .collect();

    json!({
        "files": files,
        "module_path": module_name,
        "repo_path": repo_path,
    })
}

fn write_input(input: &Value, pattern: &str) -> Result<NamedTempFile> {
    let (prefix, suffix) = pattern.split_once('*').unwrap_or((pattern, ""));
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .context("Error creating temp file")?;

    serde_json::to_writer_pretty(&mut file, input).context("Error writing policy input")?;
    file.flush().context("Error writing policy input")?;
    log::debug!("policy input written to {}", file.path().display());
    Ok(file)
}

/// evaluate every violation rule of one policy file
pub async fn evaluate_policy<R: CommandRunner>(runner: &R, policy_file: &Path, input: &Path) -> PolicyReport {
    let name = policy_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| policy_file.display().to_string());

    let content = match fs::read_to_string(policy_file) {
        Ok(content) => content,
        Err(e) => return PolicyReport::errored(name, format!("Error reading policy file: {e}")),
    };

    let Some(package) = opa::package_name(&content) else {
        let error = format!("Could not determine package name for {}", policy_file.display());
        return PolicyReport::errored(name, error);
    };
    log::debug!("{name}: package {package}");

    let rule_names = match opa::eval(runner, policy_file, &format!("data.{package}"), input).await {
        Ok(output) => discover_rules(&output),
        Err(e) => {
            log::warn!("Error getting rule names for {name}, falling back to '{DEFAULT_RULE}': {e:#}");
            vec![DEFAULT_RULE.to_string()]
        }
    };

    let mut rules = Vec::new();
    for rule in rule_names.iter().filter(|rule| is_violation_rule(rule)) {
        let query = format!("data.{package}.{rule}");
        let status = match opa::eval(runner, policy_file, &query, input).await {
            Ok(output) => match interpret_eval_output(&output) {
                RuleOutcome::Passed => RuleStatus::Passed,
                RuleOutcome::Failed { count, violations } => RuleStatus::Failed { count, violations },
            },
            Err(e) => RuleStatus::Errored(format!("{e:#}")),
        };

        rules.push(RuleResult {
            rule: display_rule_name(rule).to_string(),
            status,
        });
    }

    PolicyReport { name, error: None, rules }
}

fn print_policy_report(report: &PolicyReport) {
    if let Some(error) = &report.error {
        println!("{}", style(format!("Error: {error}")).red());
        return;
    }

    for result in &report.rules {
        let label = format!("{}.{}", report.name, result.rule);
        match &result.status {
            RuleStatus::Passed => println!("  {}", style(format!("✅ PASS: {label}")).green()),
            RuleStatus::Failed { count, violations } => {
                println!("  {} ({count} violation(s))", style(format!("❌ FAIL: {label}")).red());
                for violation in violations {
                    println!("    {}", style(&violation.message).red());
                    if let Some(details) = &violation.details {
                        println!("    Details: {details}");
                    }
                    if let Some(resolution) = &violation.resolution {
                        println!("    Resolution: {resolution}");
                    }
                }
            }
            RuleStatus::Errored(error) => {
                println!("  {}", style(format!("⚠️ ERROR: {label}")).yellow());
                println!("    {}", truncate_with_ellipsis(error, MAX_ERROR_LENGTH));
            }
        }
    }
}

fn print_summary(summary: &ValidationSummary) {
    println!("\n{}", style("=== Module Validation Summary ===").blue());
    println!(
        "{} {} policy files ({} rules)",
        style("✅ Passed:").green(),
        summary.passed_files,
        summary.passed_rules
    );
    println!(
        "{} {} policy files ({} rules)",
        style("❌ Failed:").red(),
        summary.failed_files,
        summary.failed_rules
    );
    println!(
        "{} {} policy files ({} rules)",
        style("⚠️ Errors:").yellow(),
        summary.errored_files,
        summary.errored_rules
    );
    println!(
        "{} {} policy files ({} rules)",
        style("🔍 Total:").cyan(),
        summary.total_files,
        summary.total_rules
    );

    if summary.is_success() {
        println!("\n{}", style("✅ Module validation PASSED").green());
    } else {
        println!("\n{}", style("❌ Module validation FAILED").red());
    }
}

pub async fn validate_module<R: CommandRunner>(args: &ValidateModuleArgs, ctx: &RunContext, runner: &R) -> Result<bool> {
    let config = load_config(&args.config).context("Error loading config")?;
    let rules = config.module_type_rules(config.shape_policy(ctx.strict))?;
    log::info!("Validating module: {} (type: {})", args.module_path, args.module_type);

    let bundle = collect_module_files(&args.module_path, &CollectOptions::from_scripts(&config.scripts))
        .context("Error collecting Terraform files")?;
    log::info!("Terraform files collected successfully");

    let dirs = policy_dirs(&config, &rules, &args.module_type);
    if dirs.is_empty() {
        log::warn!("No policy directories found to evaluate");
        return Ok(true);
    }
    log::info!("Found {} policy directories to evaluate", dirs.len());

    let files = policy_files(&dirs);
    if files.is_empty() {
        log::warn!("No policy files found in policy directories");
        return Ok(true);
    }

    if !runner.is_available("opa") {
        bail!("opa is not available on PATH");
    }

    let input = prepare_input(bundle, &args.module_path);
    let input_file = write_input(&input, config.scripts.temp_file_pattern())?;

    println!(
        "\n{}",
        style(format!("=== Evaluating policies for {} module ===", args.module_type)).blue()
    );

    let mut reports = Vec::with_capacity(files.len());
    for file in &files {
        let report = evaluate_policy(runner, file, input_file.path()).await;
        println!("\n{} {}", style("🔍 Evaluating policy:").blue(), report.name);
        print_policy_report(&report);
        reports.push(report);
    }

    let summary = ValidationSummary::from_reports(&reports);
    print_summary(&summary);
    Ok(summary.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::ShapePolicy;
    use crate::process::fake::ScriptedRunner;
    use crate::process::CommandOutput;

    fn bundle(entries: &[(&str, &str)]) -> FileBundle {
        FileBundle {
            files: entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_prepare_input_reroots_keys() {
        let input = prepare_input(
            bundle(&[
                ("modules/service/api/main.tf", "x"),
                ("modules/service/api/tests", "directory"),
                ("elsewhere/file.tf", "y"),
            ]),
            "modules/service/api/",
        );

        assert_eq!(input["module_path"], "api");
        assert_eq!(input["repo_path"], "modules/service/api");
        assert_eq!(input["files"]["api/main.tf"], "x");
        assert_eq!(input["files"]["api/tests"], "directory");
        assert_eq!(input["files"]["elsewhere/file.tf"], "y");
    }

    #[test]
    fn test_policy_dirs_from_type_and_additional_keys() {
        let config: MonorepoConfig = serde_json::from_value(json!({
            "module_types": {
                "service": { "path_patterns": ["modules/service/*"], "policy_dir": "policies/service" },
                "bare": { "path_patterns": ["modules/bare/*"] }
            },
            "rego_policy_dirs": { "common": "policies/common" },
            "module_validator_additional_policies": ["common", "unmapped"]
        }))
        .unwrap();
        let rules = config.module_type_rules(ShapePolicy::Lenient).unwrap();

        assert_eq!(
            policy_dirs(&config, &rules, "service"),
            vec![PathBuf::from("policies/service"), PathBuf::from("policies/common")]
        );
        assert_eq!(policy_dirs(&config, &rules, "bare"), vec![PathBuf::from("policies/common")]);
        assert_eq!(policy_dirs(&config, &rules, "missing"), vec![PathBuf::from("policies/common")]);
    }

    #[test]
    fn test_policy_files_are_sorted_rego_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.rego", "a.rego", "notes.md"] {
            fs::write(dir.path().join(name), "package x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.rego")).unwrap();

        let files = policy_files(&[dir.path().to_path_buf(), dir.path().join("missing")]);
        assert_eq!(files, vec![dir.path().join("a.rego"), dir.path().join("b.rego")]);
    }

    #[tokio::test]
    async fn test_evaluate_policy_reports_each_violation_rule() {
        let dir = tempfile::tempdir().unwrap();
        let policy = dir.path().join("naming.rego");
        fs::write(&policy, "package terraform.naming\n\nviolation contains msg if { false }\n").unwrap();
        let input = dir.path().join("input.json");
        let base = format!("opa eval --format json --data {}", policy.display());

        let runner = ScriptedRunner::new()
            .reply(
                &format!("{base} data.terraform.naming --input"),
                CommandOutput::ok(
                    json!({ "result": [ { "expressions": [ { "value": {
                        "violation": [], "tag_violation": [], "is_tagged": true
                    } } ] } ] })
                    .to_string(),
                ),
            )
            .reply(
                &format!("{base} data.terraform.naming.violation"),
                CommandOutput::ok(json!({ "result": [ { "expressions": [ { "value": [] } ] } ] }).to_string()),
            )
            .reply(
                &format!("{base} data.terraform.naming.tag_violation"),
                CommandOutput::ok(
                    json!({ "result": [ { "expressions": [ { "value": ["missing tags"] } ] } ] }).to_string(),
                ),
            );

        let report = evaluate_policy(&runner, &policy, &input).await;
        assert_eq!(report.name, "naming.rego");
        assert_eq!(report.error, None);
        assert_eq!(
            report.rules,
            vec![
                RuleResult {
                    rule: "main".to_string(),
                    status: RuleStatus::Passed,
                },
                RuleResult {
                    rule: "tag_violation".to_string(),
                    status: RuleStatus::Failed {
                        count: 1,
                        violations: vec![Violation::new("missing tags")],
                    },
                },
            ]
        );
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_evaluate_policy_falls_back_and_records_errors() {
        let dir = tempfile::tempdir().unwrap();
        let policy = dir.path().join("broken.rego");
        fs::write(&policy, "package broken\n").unwrap();
        let input = dir.path().join("input.json");

        let runner = ScriptedRunner::new().reply("opa eval", CommandOutput::failed(1, "rego_parse_error"));
        let report = evaluate_policy(&runner, &policy, &input).await;

        assert_eq!(report.rules.len(), 1);
        assert_eq!(report.rules[0].rule, "main");
        assert!(matches!(report.rules[0].status, RuleStatus::Errored(_)));
        assert!(report.has_errors());
    }

    #[tokio::test]
    async fn test_missing_package_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let policy = dir.path().join("nopkg.rego");
        fs::write(&policy, "violation contains msg if { false }\n").unwrap();

        let runner = ScriptedRunner::new();
        let report = evaluate_policy(&runner, &policy, &dir.path().join("input.json")).await;
        assert!(report.error.is_some());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let reports = vec![
            PolicyReport {
                name: "ok".to_string(),
                error: None,
                rules: vec![RuleResult {
                    rule: "main".to_string(),
                    status: RuleStatus::Passed,
                }],
            },
            PolicyReport {
                name: "bad".to_string(),
                error: None,
                rules: vec![
                    RuleResult {
                        rule: "main".to_string(),
                        status: RuleStatus::Failed {
                            count: 2,
                            violations: Vec::new(),
                        },
                    },
                    RuleResult {
                        rule: "tag_violation".to_string(),
                        status: RuleStatus::Passed,
                    },
                ],
            },
            PolicyReport::errored("nopkg".to_string(), "no package".to_string()),
        ];

        let summary = ValidationSummary::from_reports(&reports);
        assert_eq!(
            summary,
            ValidationSummary {
                passed_files: 1,
                failed_files: 1,
                errored_files: 1,
                total_files: 3,
                passed_rules: 2,
                failed_rules: 1,
                errored_rules: 0,
                total_rules: 3,
            }
        );
        assert!(!summary.is_success());
        assert!(ValidationSummary::from_reports(&reports[..1]).is_success());
    }
}
