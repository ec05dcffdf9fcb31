// module file collector - bundles a module's files into json for policy evaluation

use crate::config::{load_config, ScriptsConfig};
use crate::utils::decode_content;
use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Args, Debug, Clone)]
pub struct CollectFilesArgs {
    /// path to the terraform module
    #[arg(long)]
    pub module_path: String,

    /// path of the json file to write
    #[arg(long)]
    pub output: PathBuf,

    /// path to the monorepo configuration file
    #[arg(long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// `{"files": {path: content}}`, keys sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBundle {
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOptions {
    pub excluded_dirs: Vec<String>,
    pub important_dirs: Vec<String>,
    pub directory_marker: String,
}

impl CollectOptions {
    pub fn from_scripts(scripts: &ScriptsConfig) -> Self {
        Self {
            excluded_dirs: scripts.excluded_dirs.clone(),
            important_dirs: scripts.important_dirs.clone(),
            directory_marker: scripts.directory_marker().to_string(),
        }
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && contains_name(&self.excluded_dirs, entry)
    }

    fn is_important(&self, entry: &DirEntry) -> bool {
        contains_name(&self.important_dirs, entry)
    }
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self::from_scripts(&ScriptsConfig::default())
    }
}

fn contains_name(names: &[String], entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    names.iter().any(|candidate| *candidate == name)
}

/// walk a module and record each file's content under `<module_path>/<relative path>`
///
/// excluded dirs are pruned by base name. important dirs (other than the root)
/// are recorded with the directory marker so policies can test for them.
pub fn collect_module_files(module_path: &str, options: &CollectOptions) -> Result<FileBundle> {
    let root = Path::new(module_path);
    let mut files = BTreeMap::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if options.is_excluded(entry) {
                log::info!("Skipping excluded directory: {}", entry.path().display());
                return false;
            }
            true
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {module_path}"))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {module_path}", entry.path().display()))?;

        if entry.file_type().is_dir() {
            if entry.depth() > 0 && options.is_important(&entry) {
                let key = bundle_key(module_path, rel);
                log::info!("Marked important directory: {key}");
                files.insert(key, options.directory_marker.clone());
            }
            continue;
        }

        if !entry.path().is_file() {
            log::debug!("skipping {}: not a regular file", entry.path().display());
            continue;
        }

        let bytes = fs::read(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        let key = bundle_key(module_path, rel);
        log::info!("Collected file: {key}");
        files.insert(key, decode_content(&bytes));
    }

    Ok(FileBundle { files })
}

fn bundle_key(module_path: &str, rel: &Path) -> String {
    let rel = rel
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{rel}", module_path.trim_end_matches('/'))
}

pub fn write_bundle(bundle: &FileBundle, output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(bundle).context("Error marshaling JSON")?;
    fs::write(output, json).with_context(|| format!("Error writing output file {}", output.display()))
}

pub fn collect_files(args: &CollectFilesArgs) -> Result<bool> {
    let config = load_config(&args.config).context("Error loading configuration")?;
    let options = CollectOptions::from_scripts(&config.scripts);

    let bundle = collect_module_files(&args.module_path, &options)
        .context("Error collecting Terraform files")?;
    write_bundle(&bundle, &args.output)?;

    println!("Terraform files collected and written to {}", args.output.display());
    Ok(true)
}
