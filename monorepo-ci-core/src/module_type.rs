// module type lookup for a single module directory

use crate::config::load_config;
use crate::patterns::classify_directory;
use crate::utils::RunContext;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Clone)]
pub struct ModuleTypeArgs {
    /// path to the module directory
    #[arg(long)]
    pub module_path: PathBuf,

    /// path to the monorepo configuration file
    #[arg(long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// classify a module directory after making it absolute
pub fn resolve_module_type(module_path: &Path, config_path: &Path, strict: bool) -> Result<String> {
    let config = load_config(config_path).context("Error loading config")?;
    let rules = config.module_type_rules(config.shape_policy(strict))?;

    let abs_path = std::path::absolute(module_path)
        .with_context(|| format!("Error getting absolute path for {}", module_path.display()))?;
    log::debug!("classifying {}", abs_path.display());

    Ok(classify_directory(&abs_path, &rules))
}

pub fn detect_module_type(args: &ModuleTypeArgs, ctx: &RunContext) -> Result<bool> {
    let module_type = resolve_module_type(&args.module_path, &args.config, ctx.strict)?;

    println!("MODULE_TYPE={module_type}");
    ctx.publish_outputs(&[("module_type", module_type)])?;

    Ok(true)
}
