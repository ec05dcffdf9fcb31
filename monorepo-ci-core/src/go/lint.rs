use super::{go_tool, gofmt_list, listed_files, GoTargetArgs, GoTargets};
use crate::process::CommandRunner;
use crate::utils::{format_status, print_indented};
use anyhow::Result;
use clap::Args;
use console::style;
use walkdir::WalkDir;

#[derive(Args, Debug, Clone, Default)]
pub struct GoLintArgs {
    #[command(flatten)]
    pub targets: GoTargetArgs,

    /// skip go files whose path starts with this prefix
    #[arg(long)]
    pub skip_prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LintReport {
    pub gofmt_passed: bool,
    pub vet_passed: bool,
}

impl LintReport {
    pub fn passed(&self) -> bool {
        self.gofmt_passed && self.vet_passed
    }
}

/// step 1: every file gofmt lists (outside ignored dirs) is a failure
pub async fn check_formatting<R: CommandRunner>(runner: &R, targets: &GoTargets) -> Result<bool> {
    let mut unformatted = 0;

    for dir in &targets.dirs {
        let output = runner.run(&gofmt_list(dir)).await?;
        if !output.success {
            println!("{}", style(format!("Error running gofmt on {dir}: {}", output.status_text())).red());
            print_indented(&output.combined());
            return Ok(false);
        }

        for file in listed_files(&output.stdout) {
            if targets.ignore.should_ignore(file) {
                continue;
            }
            if unformatted == 0 {
                println!("Files needing formatting (violates gofmt policy):");
            }
            println!("{}", style(format!("❌ {file}")).red());
            unformatted += 1;
        }
    }

    if unformatted > 0 {
        return Ok(false);
    }

    println!("{}", style("✅ All files properly formatted").green());
    Ok(true)
}

/// step 2: `go vet` each go file; failures in test files are reported but tolerated
pub async fn run_vet_checks<R: CommandRunner>(
    runner: &R,
    targets: &GoTargets,
    skip_prefix: Option<&str>,
) -> Result<bool> {
    let mut passed = true;

    for dir in &targets.dirs {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    println!("{}", style(format!("Error walking {dir} directory: {e}")).red());
                    passed = false;
                    continue;
                }
            };

            let path = entry.path().to_string_lossy().replace('\\', "/");
            if entry.file_type().is_dir() || !path.ends_with(".go") {
                continue;
            }
            if targets.ignore.should_ignore(&path) {
                continue;
            }
            if skip_prefix.is_some_and(|prefix| !prefix.is_empty() && path.starts_with(prefix)) {
                log::debug!("skipping {path}");
                continue;
            }

            let output = runner.run(&go_tool("go").args(["vet", path.as_str()])).await?;
            if output.success {
                println!("{}", style(format!("✅ {path}")).green());
            } else if path.ends_with("_test.go") {
                println!("{}", style(format!("✅ {path} (test file - checked)")).green());
            } else {
                println!("{}", style(format!("❌ {path} (violates go vet policy)")).red());
                print_indented(&output.combined());
                passed = false;
            }
        }
    }

    Ok(passed)
}

pub async fn lint<R: CommandRunner>(runner: &R, targets: &GoTargets, skip_prefix: Option<&str>) -> Result<LintReport> {
    println!("Step 1: Running gofmt checks...");
    let gofmt_passed = check_formatting(runner, targets).await?;

    println!("Step 2: Running go vet checks...");
    let vet_passed = run_vet_checks(runner, targets, skip_prefix).await?;

    Ok(LintReport {
        gofmt_passed,
        vet_passed,
    })
}

pub async fn go_lint<R: CommandRunner>(args: &GoLintArgs, runner: &R) -> Result<bool> {
    let targets = GoTargets::resolve(&args.targets, "lint")?;
    let report = lint(runner, &targets, args.skip_prefix.as_deref()).await?;

    println!("\n=== Lint Summary ===");
    println!(
        "gofmt checks: {}",
        format_status(report.gofmt_passed, "violates code formatting policy")
    );
    println!(
        "go vet checks: {}",
        format_status(report.vet_passed, "violates code correctness policy")
    );

    Ok(report.passed())
}
