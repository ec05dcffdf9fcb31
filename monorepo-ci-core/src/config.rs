// configuration module - the shared monorepo configuration file

use crate::patterns::{ModuleTypeRules, ShapePolicy};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "monorepo-config.json";
pub const DEFAULT_DIRECTORY_MARKER: &str = "directory";
pub const DEFAULT_TEMP_FILE_PATTERN: &str = "terraform-files-*.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file '{}' does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration file '{}' is empty", path.display())]
    Empty { path: PathBuf },

    #[error("failed to parse config file '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("configuration entry '{path}' must be {expected}")]
    Shape { path: String, expected: &'static str },

    #[error("'{0}' not found in config")]
    MissingSection(&'static str),
}

/// the `scripts` section shared by the go and collector tools
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    pub lint_directories: Vec<String>,
    pub ignored_dirs: Vec<String>,
    pub excluded_dirs: Vec<String>,
    pub important_dirs: Vec<String>,
    pub directory_marker: Option<String>,
    pub temp_file_pattern: Option<String>,
}

impl ScriptsConfig {
    pub fn directory_marker(&self) -> &str {
        self.directory_marker
            .as_deref()
            .filter(|marker| !marker.is_empty())
            .unwrap_or(DEFAULT_DIRECTORY_MARKER)
    }

    pub fn temp_file_pattern(&self) -> &str {
        self.temp_file_pattern
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .unwrap_or(DEFAULT_TEMP_FILE_PATTERN)
    }
}

/// a go package tree measured as one unit by `go-test`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoverageGroup {
    pub name: String,
    pub emoji: String,
    pub output_file: String,
    pub test_path: String,
    pub cover_pkg: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowVariation {
    pub name: String,
    pub change_type: String,
    pub contributor_type: String,
    pub can_self_approve: String,
    pub description: String,
    pub inputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowTestConfig {
    pub test_module: String,
    pub test_module_type: String,
    pub repository: String,
    pub variations: Vec<WorkflowVariation>,
    pub default_inputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonorepoConfig {
    pub module_roots: Option<Vec<String>>,
    /// kept raw so malformed entries can be skipped or reported per entry
    pub module_types: Option<Value>,
    pub test_changed_files: Option<Vec<String>>,
    pub scripts: ScriptsConfig,
    pub coverage_groups: Vec<CoverageGroup>,
    pub rego_tests: Vec<String>,
    pub rego_policy_dirs: BTreeMap<String, String>,
    pub rego_helpers_dir: Option<String>,
    pub module_validator_additional_policies: Vec<String>,
    pub workflow_tests: Option<WorkflowTestConfig>,
    pub strict_config: bool,
    /// json paths of non-string list entries dropped while loading
    #[serde(skip)]
    pub skipped_entries: Vec<String>,
}

/// string lists whose non-string entries are dropped on load
const STRING_LISTS: [&[&str]; 8] = [
    &["module_roots"],
    &["test_changed_files"],
    &["rego_tests"],
    &["module_validator_additional_policies"],
    &["scripts", "lint_directories"],
    &["scripts", "ignored_dirs"],
    &["scripts", "excluded_dirs"],
    &["scripts", "important_dirs"],
];

/// remove non-string entries from the known string lists, returning their paths
fn drop_non_string_entries(value: &mut Value) -> Vec<String> {
    let mut skipped = Vec::new();

    for keys in STRING_LISTS {
        let mut target = Some(&mut *value);
        for key in keys {
            target = target.and_then(|node| node.get_mut(*key));
        }
        let Some(Value::Array(entries)) = target else {
            continue;
        };

        let path = keys.join(".");
        let mut idx = 0;
        entries.retain(|entry| {
            let keep = entry.is_string();
            if !keep {
                skipped.push(format!("{path}[{idx}]"));
            }
            idx += 1;
            keep
        });
    }

    skipped
}

impl MonorepoConfig {
    /// load a configuration file, toml when the extension says so and json otherwise
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        if data.trim().is_empty() {
            return Err(ConfigError::Empty {
                path: path.to_path_buf(),
            });
        }

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut raw: Value = if is_toml {
            toml::from_str(&data).map_err(|e| parse_error(e.to_string()))?
        } else {
            serde_json::from_str(&data).map_err(|e| parse_error(e.to_string()))?
        };

        let skipped_entries = drop_non_string_entries(&mut raw);
        for entry in &skipped_entries {
            log::debug!("skipping malformed config entry '{entry}' (expected a string)");
        }

        let mut config: Self = serde_json::from_value(raw).map_err(|e| parse_error(e.to_string()))?;
        config.skipped_entries = skipped_entries;

        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// the effective shape policy: strict when either the file or the caller asks for it
    pub fn shape_policy(&self, strict: bool) -> ShapePolicy {
        if strict || self.strict_config {
            ShapePolicy::Strict
        } else {
            ShapePolicy::Lenient
        }
    }

    /// module type rules in file order
    ///
    /// a missing `module_types` section yields no rules unless the policy is strict.
    pub fn module_type_rules(&self, policy: ShapePolicy) -> Result<ModuleTypeRules, ConfigError> {
        self.check_entries(policy)?;

        match &self.module_types {
            Some(value) => ModuleTypeRules::from_value(value, policy),
            None if policy == ShapePolicy::Strict => Err(ConfigError::MissingSection("module_types")),
            None => {
                log::warn!("module_types not found in config");
                Ok(ModuleTypeRules::default())
            }
        }
    }

    /// under the strict policy a non-string list entry dropped on load is an error
    pub fn check_entries(&self, policy: ShapePolicy) -> Result<(), ConfigError> {
        match self.skipped_entries.first() {
            Some(path) if policy == ShapePolicy::Strict => Err(ConfigError::Shape {
                path: path.clone(),
                expected: "a string",
            }),
            _ => Ok(()),
        }
    }

    pub fn module_roots(&self) -> Result<&[String], ConfigError> {
        self.module_roots
            .as_deref()
            .ok_or(ConfigError::MissingSection("module_roots"))
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<MonorepoConfig, ConfigError> {
    MonorepoConfig::load(path.as_ref())
}
