// go tooling: formatting fixes, lint checks and unit tests with coverage

pub mod format;
pub mod lint;
pub mod test_runner;

use crate::config::load_config;
use crate::process::CommandSpec;
use crate::utils::IgnoreList;
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use std::path::PathBuf;

pub use format::{go_format, GoFormatArgs};
pub use lint::{go_lint, GoLintArgs};
pub use test_runner::{run_go_tests, GoTestArgs};

/// where the go tools look for code
#[derive(Args, Debug, Clone, Default)]
pub struct GoTargetArgs {
    /// path to the monorepo configuration file (uses scripts.lint_directories)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// a single directory to process, bypassing the config
    #[arg(long)]
    pub path: Option<String>,
}

/// the resolved directories plus the dirs to leave alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoTargets {
    pub dirs: Vec<String>,
    pub ignore: IgnoreList,
}

impl GoTargets {
    /// `--path` wins over the config; the config's ignored dirs apply either way
    pub fn resolve(args: &GoTargetArgs, action: &str) -> Result<Self> {
        let config = match &args.config {
            Some(path) => Some(load_config(path).context("Error loading config file")?),
            None => None,
        };
        let ignore = config
            .as_ref()
            .map(|config| IgnoreList::new(&config.scripts.ignored_dirs))
            .unwrap_or_default();

        if let Some(path) = &args.path {
            return Ok(Self {
                dirs: vec![path.clone()],
                ignore,
            });
        }

        let config = config.ok_or_else(|| anyhow!("--config flag is required when --path is not specified"))?;
        if config.scripts.lint_directories.is_empty() {
            bail!("No directories to {action} specified in config");
        }

        Ok(Self {
            dirs: config.scripts.lint_directories,
            ignore,
        })
    }
}

/// go commands run without garbage collection, they are short lived
pub(crate) fn go_tool(program: &str) -> CommandSpec {
    CommandSpec::new(program).env("GOGC", "off")
}

pub(crate) fn gofmt_list(dir: &str) -> CommandSpec {
    go_tool("gofmt").args(["-l", dir])
}

/// the file names printed by `gofmt -l`
pub(crate) fn listed_files(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|line| !line.is_empty())
}
