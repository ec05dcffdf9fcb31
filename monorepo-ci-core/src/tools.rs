// developer tool installation through asdf

use crate::process::{CommandRunner, CommandSpec};
use crate::utils::RunContext;
use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use semver::Version;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// newest asdf release the install flow supports
pub const MAX_ASDF_VERSION: &str = "v0.15.0";

const ASDF_REPOSITORY: &str = "https://github.com/asdf-vm/asdf.git";

#[derive(Args, Debug, Clone)]
pub struct InstallToolsArgs {
    /// only refresh plugins and tools of an existing asdf install
    #[arg(long)]
    pub update: bool,

    /// asdf version to install (capped at the supported maximum)
    #[arg(long, value_name = "VERSION")]
    pub asdf_version: Option<String>,

    /// the asdf tool list
    #[arg(long, default_value = ".tool-versions")]
    pub tool_versions: PathBuf,
}

fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    // "1" and "1.2" are padded to full versions
    let parts: Vec<u64> = trimmed
        .split('.')
        .map(|part| part.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [major] => Some(Version::new(*major, 0, 0)),
        [major, minor] => Some(Version::new(*major, *minor, 0)),
        _ => None,
    }
}

/// compare asdf versions, with or without a leading `v`
///
/// anything semver cannot read is compared segment by segment, numerically
/// where both segments are numbers; on a tie the longer version is greater.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if let (Some(a), Some(b)) = (parse_version(a), parse_version(b)) {
        return a.cmp(&b);
    }

    let a_parts: Vec<&str> = a.trim().trim_start_matches('v').split('.').collect();
    let b_parts: Vec<&str> = b.trim().trim_start_matches('v').split('.').collect();

    for (left, right) in a_parts.iter().zip(&b_parts) {
        let ordering = match (left.parse::<u64>(), right.parse::<u64>()) {
            (Ok(left), Ok(right)) => left.cmp(&right),
            _ => left.cmp(right),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a_parts.len().cmp(&b_parts.len())
}

/// the requested version, or the cap when the request is above it
pub fn select_asdf_version(requested: Option<&str>) -> String {
    match requested {
        None => MAX_ASDF_VERSION.to_string(),
        Some(version) if compare_versions(version, MAX_ASDF_VERSION) != Ordering::Greater => version.to_string(),
        Some(version) => {
            println!(
                "{}",
                style(format!(
                    "Warning: Requested asdf version {version} is higher than maximum allowed {MAX_ASDF_VERSION}. Using {MAX_ASDF_VERSION} instead."
                ))
                .yellow()
            );
            MAX_ASDF_VERSION.to_string()
        }
    }
}

/// plugin names from a `.tool-versions` file
pub fn tool_plugins(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

fn asdf(envs: &[(String, String)]) -> CommandSpec {
    CommandSpec::new("asdf").envs(envs)
}

/// clone asdf into `~/.asdf` and return the PATH that exposes it
async fn install_asdf<R: CommandRunner>(runner: &R, ctx: &RunContext, version: &str) -> Result<Vec<(String, String)>> {
    let home = ctx.home_dir.as_ref().context("Error getting home directory")?;
    let asdf_dir = home.join(".asdf");

    let clone = CommandSpec::new("git")
        .args(["clone", ASDF_REPOSITORY])
        .arg(asdf_dir.to_string_lossy())
        .args(["--branch", version])
        .streamed();
    let output = runner.run(&clone).await?;
    if !output.success {
        bail!("Error cloning asdf repository: {}", output.status_text());
    }

    let path = format!(
        "{}:{}:{}",
        asdf_dir.join("bin").display(),
        asdf_dir.join("shims").display(),
        ctx.path_var.as_deref().unwrap_or_default()
    );
    Ok(vec![("PATH".to_string(), path)])
}

/// add every plugin (already-added plugins fail harmlessly), then install and reshim
async fn sync_tools<R: CommandRunner>(
    runner: &R,
    tool_versions: &Path,
    envs: &[(String, String)],
    update: bool,
) -> Result<()> {
    let content = fs::read_to_string(tool_versions)
        .with_context(|| format!("Error reading {} file", tool_versions.display()))?;

    for plugin in tool_plugins(&content) {
        let mut spec = asdf(envs).args(["plugin", "add", plugin.as_str()]);
        if update {
            println!("Ensuring plugin {plugin} is installed...");
        } else {
            println!("Adding plugin: {plugin}");
            spec = spec.streamed();
        }

        match runner.run(&spec).await {
            Ok(output) if !output.success => log::debug!("asdf plugin add {plugin}: {}", output.status_text()),
            Ok(_) => {}
            Err(e) => log::debug!("asdf plugin add {plugin}: {e:#}"),
        }
    }

    if update {
        println!("Installing/updating tools from .tool-versions...");
    } else {
        println!("Installing tools from .tool-versions...");
    }
    let output = runner.run(&asdf(envs).arg("install").streamed()).await?;
    if !output.success {
        bail!("Error installing tools: {}", output.status_text());
    }

    let output = runner.run(&asdf(envs).arg("reshim").streamed()).await?;
    if !output.success {
        bail!("Error reshimming: {}", output.status_text());
    }

    Ok(())
}

pub async fn update_tools<R: CommandRunner>(runner: &R, tool_versions: &Path) -> Result<()> {
    if !runner.is_available("asdf") {
        bail!("asdf not found. Please run 'make install-tools' first.");
    }

    println!("Checking and updating asdf tools...");
    sync_tools(runner, tool_versions, &[], true).await?;
    println!("{}", style("All tools are up to date.").green());
    Ok(())
}

pub async fn install_tools<R: CommandRunner>(args: &InstallToolsArgs, ctx: &RunContext, runner: &R) -> Result<bool> {
    let version = select_asdf_version(args.asdf_version.as_deref());

    if args.update {
        update_tools(runner, &args.tool_versions).await?;
        return Ok(true);
    }

    if ctx.devcontainer {
        println!("Devcontainer detected. Tools already installed.");
        println!("Running update-tools to ensure everything is up to date...");
        update_tools(runner, &args.tool_versions).await?;
        return Ok(true);
    }

    let envs = if runner.is_available("asdf") {
        println!("asdf already installed.");
        Vec::new()
    } else {
        println!("Installing asdf version {version}...");
        install_asdf(runner, ctx, &version).await?
    };

    sync_tools(runner, &args.tool_versions, &envs, false).await?;
    Ok(true)
}
