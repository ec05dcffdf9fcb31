// go unit tests per coverage group, with a weighted coverage summary

use super::go_tool;
use crate::config::{load_config, CoverageGroup};
use crate::coverage::{CoverageSummary, ModuleCoverage};
use crate::process::{run_with_spinner, CommandRunner, CommandSpec};
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref STATEMENT_COUNT: Regex = Regex::new(r"of (\d+) statements").unwrap();
}

const DEFAULT_COVERAGE: &str = "0.0%";

#[derive(Args, Debug, Clone)]
pub struct GoTestArgs {
    /// path to the monorepo configuration file
    pub config: PathBuf,

    /// run tests without collecting coverage data
    #[arg(long)]
    pub no_coverage: bool,

    /// print coverage as text
    #[arg(long)]
    pub coverage_text: bool,

    /// print coverage as json
    #[arg(long)]
    pub coverage_json: bool,

    /// where coverage profiles are written
    #[arg(long, default_value = "tmp/coverage")]
    pub coverage_dir: PathBuf,
}

/// the first `NN.N%` token on a line mentioning `coverage:`
pub fn extract_coverage_percentage(output: &str) -> &str {
    output
        .lines()
        .filter(|line| line.contains("coverage:"))
        .find_map(|line| line.split_whitespace().find(|part| part.ends_with('%')))
        .unwrap_or(DEFAULT_COVERAGE)
}

/// parse a percentage token, zero when it is not a number
pub fn parse_coverage_percentage(token: &str) -> f64 {
    token.trim_end_matches('%').parse().unwrap_or(0.0)
}

pub fn extract_statement_count(output: &str) -> usize {
    STATEMENT_COUNT
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// coverage profile lines minus the `mode:` header
fn profile_statement_count(profile: &Path) -> usize {
    fs::read_to_string(profile)
        .map(|content| content.lines().count().saturating_sub(1))
        .unwrap_or(0)
}

fn with_cover_pkg(spec: CommandSpec, group: &CoverageGroup) -> CommandSpec {
    if group.cover_pkg.is_empty() {
        spec
    } else {
        spec.arg(format!("-coverpkg={}", group.cover_pkg))
    }
}

fn ensure_test_dir(group: &CoverageGroup) -> Result<()> {
    if !Path::new(&group.test_path).is_dir() {
        bail!("directory {} does not exist", group.test_path);
    }
    Ok(())
}

/// run a group's tests with output streamed, no coverage
pub async fn run_group<R: CommandRunner>(runner: &R, group: &CoverageGroup) -> Result<()> {
    ensure_test_dir(group)?;

    let spec = go_tool("go")
        .args(["test", "-v"])
        .current_dir(&group.test_path)
        .streamed();
    let output = runner.run(&spec).await?;
    if !output.success {
        bail!("{}", output.status_text());
    }
    Ok(())
}

/// measure a group's coverage into `profile`
///
/// the first run counts statements, the second writes the profile. when go
/// does not print a statement count the profile's length stands in for it.
pub async fn measure_group<R: CommandRunner>(runner: &R, group: &CoverageGroup, profile: &Path) -> ModuleCoverage {
    match try_measure_group(runner, group, profile).await {
        Ok(coverage) => coverage,
        Err((coverage, statements, e)) => {
            ModuleCoverage::new(&group.name, coverage, statements).failed(format!("Error running tests: {e:#}"))
        }
    }
}

async fn try_measure_group<R: CommandRunner>(
    runner: &R,
    group: &CoverageGroup,
    profile: &Path,
) -> std::result::Result<ModuleCoverage, (f64, usize, anyhow::Error)> {
    ensure_test_dir(group).map_err(|e| (0.0, 0, e))?;

    let count_spec = with_cover_pkg(
        go_tool("go").args(["test", "-cover", "-count=1"]),
        group,
    )
    .current_dir(&group.test_path);
    let counted = run_with_spinner(runner, &count_spec, &format!("counting statements in {}", group.name))
        .await
        .map_err(|e| (0.0, 0, e))?;
    if !counted.success {
        let e = anyhow!("{}: {}", counted.status_text(), counted.combined().trim());
        return Err((0.0, 0, e));
    }
    let mut statements = extract_statement_count(&counted.combined());

    let profile_spec = with_cover_pkg(
        go_tool("go")
            .args(["test", "-cover"])
            .arg(format!("-coverprofile={}", profile.display())),
        group,
    )
    .current_dir(&group.test_path);
    let measured = run_with_spinner(runner, &profile_spec, &format!("measuring coverage of {}", group.name))
        .await
        .map_err(|e| (0.0, 0, e))?;
    let output = measured.combined();

    let coverage = parse_coverage_percentage(extract_coverage_percentage(&output));
    if statements == 0 {
        statements = extract_statement_count(&output);
    }
    if statements == 0 {
        statements = profile_statement_count(profile);
    }
    let statements = statements.max(1);

    if !measured.success {
        return Err((coverage, statements, anyhow!("{}", measured.status_text())));
    }

    log::debug!("{}: {coverage:.1}% of {statements} statements", group.name);
    Ok(ModuleCoverage::new(&group.name, coverage, statements))
}

/// `go tool cover -func` for a group's profile, if it was written
async fn cover_func<R: CommandRunner>(runner: &R, group: &CoverageGroup, profile: &Path) -> Option<String> {
    if !profile.exists() {
        return None;
    }

    let spec = go_tool("go")
        .args(["tool", "cover"])
        .arg(format!("-func={}", profile.display()))
        .current_dir(&group.test_path);
    match runner.run(&spec).await {
        Ok(output) => Some(output.combined()),
        Err(e) => {
            log::warn!("go tool cover failed for {}: {e:#}", group.name);
            None
        }
    }
}

pub async fn run_go_tests<R: CommandRunner>(args: &GoTestArgs, runner: &R) -> Result<bool> {
    let config = load_config(&args.config).context("Error reading config file")?;
    let groups = &config.coverage_groups;
    if groups.is_empty() {
        bail!("No coverage groups provided in the config file");
    }

    let coverage_dir = if args.no_coverage {
        None
    } else {
        fs::create_dir_all(&args.coverage_dir).context("Error creating coverage directory")?;
        // profiles are written from inside each group's dir, so the path must be absolute
        Some(std::path::absolute(&args.coverage_dir).context("Error resolving coverage directory")?)
    };

    let mut modules = Vec::with_capacity(groups.len());
    let mut errors = 0;

    for group in groups {
        eprintln!("{} Running tests for {}...", group.emoji, group.name);

        let result = match &coverage_dir {
            None => match run_group(runner, group).await {
                Ok(()) => ModuleCoverage::new(&group.name, 0.0, 0),
                Err(e) => ModuleCoverage::new(&group.name, 0.0, 0).failed(format!("Error running tests: {e:#}")),
            },
            Some(dir) => {
                let profile = dir.join(&group.output_file);
                let result = measure_group(runner, group, &profile).await;
                if args.coverage_text {
                    if let Some(report) = cover_func(runner, group, &profile).await {
                        eprintln!("\nCoverage for {}:\n{report}", group.name);
                    }
                }
                result
            }
        };

        if let Some(error) = &result.error {
            errors += 1;
            eprintln!("❌ {error}");
        }
        modules.push(result);
    }

    if coverage_dir.is_none() {
        return Ok(errors == 0);
    }

    let summary = CoverageSummary::weighted(modules, errors);
    if args.coverage_text {
        eprintln!("\nSummary:");
        eprintln!("{}", summary.render_table());
        if errors > 0 {
            eprintln!("\n❌ {errors} test modules failed");
        }
    } else if args.coverage_json {
        println!("{}", summary.to_json().context("Error creating JSON output")?);
    }

    Ok(errors == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::ScriptedRunner;
    use crate::process::CommandOutput;

    fn group(test_path: &Path) -> CoverageGroup {
        CoverageGroup {
            name: "scripts".to_string(),
            emoji: "🧪".to_string(),
            output_file: "scripts.out".to_string(),
            test_path: test_path.to_string_lossy().to_string(),
            cover_pkg: String::new(),
        }
    }

    #[test]
    fn test_extract_coverage_percentage() {
        let output = "=== RUN TestX\nPASS\ncoverage: 72.5% of statements\nok  \tpkg\t0.01s\n";
        assert_eq!(extract_coverage_percentage(output), "72.5%");
        assert_eq!(extract_coverage_percentage("ok  \tpkg\t0.01s"), "0.0%");
        assert_eq!(extract_coverage_percentage("ok pkg 0.1s coverage: [no statements]"), "0.0%");
    }

    #[test]
    fn test_parse_coverage_percentage() {
        assert_eq!(parse_coverage_percentage("72.5%"), 72.5);
        assert_eq!(parse_coverage_percentage("100%"), 100.0);
        assert_eq!(parse_coverage_percentage("n/a%"), 0.0);
    }

    #[test]
    fn test_extract_statement_count() {
        assert_eq!(extract_statement_count("coverage: 50.0% of 42 statements"), 42);
        assert_eq!(extract_statement_count("coverage: 50.0% of statements"), 0);
    }

    #[tokio::test]
    async fn test_measure_group_uses_counts_from_output() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("scripts.out");
        let runner = ScriptedRunner::new()
            .reply("go test -cover -count=1", CommandOutput::ok("ok pkg coverage: 80.0% of 20 statements\n"))
            .reply("go test -cover -coverprofile", CommandOutput::ok("ok pkg coverage: 75.0% of statements\n"));

        let result = measure_group(&runner, &group(dir.path()), &profile).await;
        assert_eq!(result, ModuleCoverage::new("scripts", 75.0, 20));
        assert_eq!(
            runner.specs()[1].args.last().unwrap(),
            &format!("-coverprofile={}", profile.display())
        );
    }

    #[tokio::test]
    async fn test_measure_group_falls_back_to_profile_lines() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("scripts.out");
        fs::write(&profile, "mode: set\na.go:1.1,2.2 1 1\na.go:3.1,4.2 1 0\na.go:5.1,6.2 1 1\n").unwrap();
        let runner = ScriptedRunner::new()
            .reply("go test -cover -coverprofile", CommandOutput::ok("coverage: 66.7% of statements\n"));

        let result = measure_group(&runner, &group(dir.path()), &profile).await;
        assert_eq!(result.statements, 3);
        assert_eq!(result.coverage, 66.7);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_measure_group_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = group(&dir.path().join("missing"));
        let result = measure_group(&ScriptedRunner::new(), &missing, &dir.path().join("p.out")).await;
        assert!(result.error.unwrap().contains("does not exist"));

        let failing = ScriptedRunner::new().reply("go test -cover -count=1", CommandOutput::failed(1, "FAIL pkg"));
        let result = measure_group(&failing, &group(dir.path()), &dir.path().join("p.out")).await;
        assert_eq!(result.statements, 0);
        assert!(result.error.unwrap().contains("FAIL pkg"));

        let second_fails = ScriptedRunner::new()
            .reply("go test -cover -coverprofile", CommandOutput::failed(1, "coverage: 10.0% of 5 statements"));
        let result = measure_group(&second_fails, &group(dir.path()), &dir.path().join("p.out")).await;
        assert_eq!(result.coverage, 10.0);
        assert_eq!(result.statements, 5);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_run_group_streams_verbose_tests() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        run_group(&runner, &group(dir.path())).await.unwrap();

        let spec = &runner.specs()[0];
        assert_eq!(spec.display(), "go test -v");
        assert_eq!(spec.current_dir.as_deref(), Some(dir.path()));
        assert_eq!(spec.mode, crate::process::OutputMode::Stream);
    }

    #[test]
    fn test_cover_pkg_is_passed_through() {
        let mut group = group(Path::new("scripts"));
        group.cover_pkg = "./...".to_string();
        let spec = with_cover_pkg(go_tool("go").args(["test", "-cover"]), &group);
        assert_eq!(spec.display(), "go test -cover -coverpkg=./...");
    }
}
