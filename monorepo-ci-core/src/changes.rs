// change detection - decides which single module a pull request touches

use crate::config::{load_config, MonorepoConfig};
use crate::git;
use crate::patterns::{classify_changes, ModuleMatch, ModuleTypeRules};
use crate::utils::RunContext;
use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct DetectChangesArgs {
    /// path to the monorepo configuration file
    #[arg(long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// changed file to classify (repeatable); takes precedence over test_changed_files
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<String>,

    /// base ref to diff against when no changed files are given
    #[arg(long)]
    pub base: Option<String>,

    /// head ref for the diff
    #[arg(long, default_value = "HEAD")]
    pub head: String,

    /// path to the git repository
    #[arg(long, default_value = ".")]
    pub repo: String,
}

/// the outcome of classifying a change set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeVerdict {
    NoModule,
    SingleModule(ModuleMatch),
    MultipleModules(Vec<ModuleMatch>),
    Mixed {
        module: ModuleMatch,
        non_module_files: Vec<String>,
    },
}

impl ChangeVerdict {
    /// a pull request may touch at most one module and nothing else alongside it
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::NoModule | Self::SingleModule(_))
    }

    /// KEY=value pairs describing an accepted verdict
    pub fn outputs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::SingleModule(module) => vec![
                ("module_path", module.path.clone()),
                ("module_type", module.module_type.clone()),
                ("is_module", "true".to_string()),
            ],
            Self::NoModule => vec![("is_module", "false".to_string())],
            Self::MultipleModules(_) | Self::Mixed { .. } => Vec::new(),
        }
    }
}

/// changed files that sit under none of the module roots
pub fn non_module_files<S: AsRef<str>>(changed_files: &[S], module_roots: &[String]) -> Vec<String> {
    changed_files
        .iter()
        .map(AsRef::as_ref)
        .filter(|file| !module_roots.iter().any(|root| file.starts_with(root.as_str())))
        .map(str::to_string)
        .collect()
}

pub fn evaluate_changes<S: AsRef<str>>(
    changed_files: &[S],
    rules: &ModuleTypeRules,
    module_roots: &[String],
) -> ChangeVerdict {
    let mut modules = classify_changes(changed_files, rules);

    match modules.len() {
        0 => ChangeVerdict::NoModule,
        1 => {
            let module = modules.remove(0);
            let non_module_files = non_module_files(changed_files, module_roots);
            if non_module_files.is_empty() {
                ChangeVerdict::SingleModule(module)
            } else {
                ChangeVerdict::Mixed {
                    module,
                    non_module_files,
                }
            }
        }
        _ => ChangeVerdict::MultipleModules(modules),
    }
}

/// pick the change set: explicit files, then the configured test list, then a git diff
pub fn resolve_changed_files(args: &DetectChangesArgs, config: &MonorepoConfig) -> Result<Vec<String>> {
    if !args.files.is_empty() {
        return Ok(args.files.clone());
    }

    if let Some(files) = &config.test_changed_files {
        if files.is_empty() {
            bail!("No changed files provided in test_changed_files");
        }
        return Ok(files.clone());
    }

    if let Some(base) = &args.base {
        let files = git::changed_files_between(&args.repo, base, &args.head)?;
        if files.is_empty() {
            bail!("No changed files provided between {base} and {}", args.head);
        }
        return Ok(files);
    }

    bail!("test_changed_files not found in config and no --base ref given")
}

pub fn print_verdict(verdict: &ChangeVerdict) {
    match verdict {
        ChangeVerdict::MultipleModules(modules) => {
            println!("{}", style("Error: Multiple modules detected. Only one module can be changed at a time.").red().bold());
            println!("Detected modules:");
            for module in modules {
                println!("  - {} (type: {})", module.path, module.module_type);
            }
        }
        ChangeVerdict::Mixed { module, non_module_files } => {
            println!("{}", style("Error: Mixed module and non-module changes detected.").red().bold());
            println!("Module: {} (type: {})", module.path, module.module_type);
            println!("Non-module files:");
            for file in non_module_files {
                println!("  - {file}");
            }
        }
        ChangeVerdict::SingleModule(module) => {
            println!("MODULE_PATH={}", module.path);
            println!("MODULE_TYPE={}", module.module_type);
            println!("IS_MODULE=true");
        }
        ChangeVerdict::NoModule => {
            println!("{}", style("No module changes detected").dim());
            println!("IS_MODULE=false");
        }
    }
}

pub fn detect_changes(args: &DetectChangesArgs, ctx: &RunContext) -> Result<bool> {
    let config = load_config(&args.config).context("Error loading config")?;
    let module_roots = config.module_roots()?;
    let rules = config.module_type_rules(config.shape_policy(ctx.strict))?;

    let changed_files = resolve_changed_files(args, &config)?;
    log::debug!("classifying {} changed file(s)", changed_files.len());
    for file in &changed_files {
        log::trace!("changed: {file}");
    }

    let verdict = evaluate_changes(&changed_files, &rules, module_roots);
    print_verdict(&verdict);

    if verdict.is_accepted() {
        ctx.publish_outputs(&verdict.outputs())?;
    }

    Ok(verdict.is_accepted())
}
