use super::{go_tool, gofmt_list, listed_files, GoTargetArgs, GoTargets};
use crate::process::CommandRunner;
use anyhow::{bail, Result};
use clap::Args;
use console::style;

#[derive(Args, Debug, Clone, Default)]
pub struct GoFormatArgs {
    #[command(flatten)]
    pub targets: GoTargetArgs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatReport {
    pub fixed: Vec<String>,
    pub failed: Vec<String>,
}

/// rewrite every file gofmt lists, skipping ignored dirs
///
/// a failing `gofmt -l` aborts the run; a failing rewrite only marks that file.
pub async fn fix_formatting<R: CommandRunner>(runner: &R, targets: &GoTargets) -> Result<FormatReport> {
    let mut report = FormatReport::default();

    for dir in &targets.dirs {
        let output = runner.run(&gofmt_list(dir)).await?;
        if !output.success {
            bail!(
                "Error running gofmt on {dir}: {}: {}",
                output.status_text(),
                output.stderr.trim()
            );
        }

        if output.stdout.trim().is_empty() {
            println!("{}", style(format!("✅ All files in {dir} already properly formatted")).green());
            continue;
        }

        for file in listed_files(&output.stdout) {
            if targets.ignore.should_ignore(file) {
                log::debug!("ignoring {file}");
                continue;
            }

            let fixed = runner.run(&go_tool("gofmt").args(["-w", file])).await;
            match fixed {
                Ok(result) if result.success => {
                    println!("Fixed: {file}");
                    report.fixed.push(file.to_string());
                }
                Ok(result) => {
                    println!("{}", style(format!("❌ Error formatting {file}: {}", result.status_text())).red());
                    report.failed.push(file.to_string());
                }
                Err(e) => {
                    println!("{}", style(format!("❌ Error formatting {file}: {e:#}")).red());
                    report.failed.push(file.to_string());
                }
            }
        }
    }

    Ok(report)
}

pub async fn go_format<R: CommandRunner>(args: &GoFormatArgs, runner: &R) -> Result<bool> {
    let targets = GoTargets::resolve(&args.targets, "format")?;

    println!("Formatting Go code...");
    let report = fix_formatting(runner, &targets).await?;

    if report.fixed.is_empty() {
        println!("\n{}", style("✅ No files needed formatting").green());
    } else {
        println!(
            "\n{}",
            style(format!("✅ Formatting complete: fixed {} file(s)", report.fixed.len())).green()
        );
    }

    Ok(report.failed.is_empty())
}
