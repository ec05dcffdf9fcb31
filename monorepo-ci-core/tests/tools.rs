use monorepo_ci_core::changes::{detect_changes, DetectChangesArgs};
use monorepo_ci_core::collector::{collect_files, CollectFilesArgs, FileBundle};
use monorepo_ci_core::module_type::resolve_module_type;
use monorepo_ci_core::{load_config, ConfigError, RunContext};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG: &str = r#"{
  "module_roots": ["modules/", "skeletons/"],
  "module_types": {
    "service": { "path_patterns": ["modules/service/*"], "policy_dir": "policies/service" },
    "data": { "path_patterns": ["modules/data/*"], "policy_dir": "policies/data" },
    "skeleton": { "path_patterns": ["skeletons/*"] }
  },
  "scripts": {
    "excluded_dirs": [".terraform"],
    "important_dirs": ["tests"]
  }
}"#;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn detect_args(config: PathBuf, files: &[&str]) -> DetectChangesArgs {
    DetectChangesArgs {
        config,
        files: files.iter().map(|file| file.to_string()).collect(),
        base: None,
        head: "HEAD".to_string(),
        repo: ".".to_string(),
    }
}

fn actions_context(output: PathBuf) -> RunContext {
    RunContext {
        github_actions: true,
        github_output: Some(output),
        ..RunContext::default()
    }
}

#[test]
fn detect_changes_publishes_single_module() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "monorepo-config.json", CONFIG);
    let output = dir.path().join("github_output");
    let ctx = actions_context(output.clone());

    let args = detect_args(config, &["modules/data/cache/main.tf", "modules/data/cache/variables.tf"]);
    assert!(detect_changes(&args, &ctx).unwrap());

    assert_eq!(
        fs::read_to_string(output).unwrap(),
        "module_path=modules/data/cache\nmodule_type=data\nis_module=true\n"
    );
}

#[test]
fn detect_changes_rejects_multiple_and_mixed_changes() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "monorepo-config.json", CONFIG);
    let output = dir.path().join("github_output");
    let ctx = actions_context(output.clone());

    let multiple = detect_args(config.clone(), &["modules/data/cache/main.tf", "modules/service/api/main.tf"]);
    assert!(!detect_changes(&multiple, &ctx).unwrap());

    let mixed = detect_args(config, &["modules/data/cache/main.tf", "README.md"]);
    assert!(!detect_changes(&mixed, &ctx).unwrap());

    assert!(!output.exists());
}

#[test]
fn detect_changes_uses_configured_test_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "monorepo-config.json",
        r#"{
          "module_roots": ["modules/"],
          "module_types": { "service": { "path_patterns": ["modules/service/*"] } },
          "test_changed_files": ["docs/README.md", ".github/workflows/ci.yml"]
        }"#,
    );
    let output = dir.path().join("github_output");

    assert!(detect_changes(&detect_args(config, &[]), &actions_context(output.clone())).unwrap());
    assert_eq!(fs::read_to_string(output).unwrap(), "is_module=false\n");
}

#[test]
fn detect_changes_strict_mode_reports_malformed_rules() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "monorepo-config.json",
        r#"{
          "module_roots": ["modules/"],
          "module_types": {
            "broken": { "path_patterns": "modules/broken/*" },
            "service": { "path_patterns": ["modules/service/*"] }
          }
        }"#,
    );
    let args = detect_args(config, &["modules/service/api/main.tf"]);

    assert!(detect_changes(&args, &RunContext::default()).unwrap());

    let err = detect_changes(&args, &RunContext::default().with_strict(true)).unwrap_err();
    let shape = err.downcast_ref::<ConfigError>().unwrap();
    assert!(matches!(shape, ConfigError::Shape { .. }));
}

#[test]
fn module_type_classifies_absolute_directories() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "monorepo-config.json", CONFIG);
    let module = dir.path().join("modules/service/api");
    fs::create_dir_all(&module).unwrap();

    assert_eq!(resolve_module_type(&module, &config, false).unwrap(), "service");
    assert_eq!(
        resolve_module_type(&dir.path().join("modules/database/api"), &config, false).unwrap(),
        "unknown"
    );
}

#[test]
fn module_type_resolves_parent_segments_before_matching() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "monorepo-config.json", CONFIG);

    let module = dir.path().join("modules/service/../data/x");
    assert_eq!(resolve_module_type(&module, &config, false).unwrap(), "data");
}

#[test]
fn module_type_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve_module_type(dir.path(), &dir.path().join("missing.json"), false).unwrap_err();
    assert!(err.to_string().contains("Error loading config"));
}

#[test]
fn collect_files_writes_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "monorepo-config.json", CONFIG);
    let module = dir.path().join("modules/service/api");
    write(&module, "main.tf", "resource \"null_resource\" \"this\" {}\n");
    write(&module, "tests/basic.tftest.hcl", "run \"basic\" {}\n");
    write(&module, ".terraform/providers/lock", "cached\n");

    let module_path = module.to_string_lossy().replace('\\', "/");
    let output = dir.path().join("bundle.json");
    let args = CollectFilesArgs {
        module_path: module_path.clone(),
        output: output.clone(),
        config,
    };
    assert!(collect_files(&args).unwrap());

    let bundle: FileBundle = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
    let keys: Vec<&str> = bundle.files.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            format!("{module_path}/main.tf"),
            format!("{module_path}/tests"),
            format!("{module_path}/tests/basic.tftest.hcl"),
        ]
    );
    assert_eq!(bundle.files[&format!("{module_path}/tests")], "directory");
}

#[test]
fn toml_config_loads_like_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "monorepo-config.toml",
        r#"
module_roots = ["modules/"]

[module_types.service]
path_patterns = ["modules/service/*"]
policy_dir = "policies/service"

[scripts]
lint_directories = ["scripts"]
"#,
    );

    let config = load_config(config).unwrap();
    assert_eq!(config.scripts.lint_directories, vec!["scripts"]);
    assert_eq!(config.module_roots().unwrap(), &["modules/".to_string()]);
}
