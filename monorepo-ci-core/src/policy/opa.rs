// thin wrapper around the opa cli

use crate::process::{CommandRunner, CommandSpec};
use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

lazy_static! {
    static ref PACKAGE_LINE: Regex = Regex::new(r"^\s*package\s+([A-Za-z_][\w.]*)").unwrap();
}

/// the package a rego file declares, from its first `package` line
pub fn package_name(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| PACKAGE_LINE.captures(line))
        .map(|caps| caps[1].to_string())
}

pub fn eval_command(policy_file: &Path, query: &str, input: &Path) -> CommandSpec {
    CommandSpec::new("opa")
        .args(["eval", "--format", "json", "--data"])
        .arg(policy_file.to_string_lossy())
        .arg(query)
        .arg("--input")
        .arg(input.to_string_lossy())
}

/// evaluate a query and parse its json result
///
/// a failing opa process or output that is not json is an error.
pub async fn eval<R: CommandRunner>(runner: &R, policy_file: &Path, query: &str, input: &Path) -> Result<Value> {
    let output = runner.run(&eval_command(policy_file, query, input)).await?;
    log::trace!("opa output for {query}: {}", output.combined());

    if !output.success {
        bail!(
            "opa eval failed for {query} ({}): {}",
            output.status_text(),
            output.combined().trim()
        );
    }

    serde_json::from_str(&output.stdout).with_context(|| format!("failed to parse opa output for {query}"))
}

/// which report `opa test` should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestReport {
    /// verbose pass/fail listing, no coverage
    Verbose,
    /// coverage as opa's default json
    Coverage,
    /// coverage forced to the json output format
    CoverageJson,
    /// plain pass/fail summary
    Plain,
}

pub fn test_command(test_path: &str, policy_dir: Option<&str>, helpers_dir: &Path, report: TestReport) -> CommandSpec {
    let mut spec = CommandSpec::new("opa").arg("test");
    spec = match report {
        TestReport::Verbose => spec.arg("-v"),
        TestReport::Coverage => spec.arg("--coverage"),
        TestReport::CoverageJson => spec.args(["--coverage", "--format=json"]),
        TestReport::Plain => spec,
    };

    spec = spec.arg(test_path);
    if let Some(dir) = policy_dir {
        spec = spec.arg(dir);
    }
    spec.arg(helpers_dir.to_string_lossy())
}
