// triggers the merge-approval workflow variations through the github cli

use crate::config::{load_config, MonorepoConfig, WorkflowTestConfig, WorkflowVariation, DEFAULT_CONFIG_FILE};
use crate::git;
use crate::patterns::{ModuleTypeRules, ShapePolicy};
use crate::process::{run_with_spinner, CommandRunner, CommandSpec};
use crate::utils::print_indented;
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use console::style;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// the merge-approval matrix: change type x contributor type x self approval
pub const EXPECTED_VARIATIONS: usize = 6;

const CHANGE_TYPES: [&str; 2] = ["terraform", "non-terraform"];
const CONTRIBUTOR_TYPES: [&str; 2] = ["Internal", "External"];
const SELF_APPROVAL_VALUES: [&str; 2] = ["true", "false"];

#[derive(Args, Debug, Clone)]
pub struct TriggerWorkflowsArgs {
    /// path to the monorepo configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// workflow file to dispatch
    #[arg(long, default_value = "main-validation.yml")]
    pub workflow: String,

    /// skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// seconds to wait between triggers
    #[arg(long, default_value_t = 2)]
    pub pause_secs: u64,

    /// path to the git repository
    #[arg(long, default_value = ".")]
    pub repo: String,
}

fn validate_variation(index: usize, variation: &WorkflowVariation) -> Result<()> {
    if variation.name.is_empty() {
        bail!("Variation {} is missing required field 'name'", index + 1);
    }

    let name = &variation.name;
    let required = [
        ("change_type", &variation.change_type),
        ("contributor_type", &variation.contributor_type),
        ("can_self_approve", &variation.can_self_approve),
    ];
    for (field, value) in required {
        if value.is_empty() {
            bail!("Variation '{name}' is missing required field '{field}'");
        }
    }

    if !CHANGE_TYPES.contains(&variation.change_type.as_str()) {
        bail!(
            "Variation '{name}' has invalid change_type '{}'. Must be 'terraform' or 'non-terraform'",
            variation.change_type
        );
    }
    if !CONTRIBUTOR_TYPES.contains(&variation.contributor_type.as_str()) {
        bail!(
            "Variation '{name}' has invalid contributor_type '{}'. Must be 'Internal' or 'External'",
            variation.contributor_type
        );
    }
    if !SELF_APPROVAL_VALUES.contains(&variation.can_self_approve.as_str()) {
        bail!(
            "Variation '{name}' has invalid can_self_approve '{}'. Must be 'true' or 'false'",
            variation.can_self_approve
        );
    }

    Ok(())
}

/// check the `workflow_tests` section; the test module is resolved against `repo_root`
pub fn validate_workflow_config<'a>(
    config: &'a MonorepoConfig,
    rules: &ModuleTypeRules,
    repo_root: &Path,
) -> Result<&'a WorkflowTestConfig> {
    let tests = config.workflow_tests.as_ref().ok_or_else(|| {
        anyhow!(
            "Missing 'workflow_tests' configuration. Required fields: test_module, test_module_type, repository, default_inputs, variations"
        )
    })?;

    let required = [
        ("test_module", &tests.test_module),
        ("test_module_type", &tests.test_module_type),
        ("repository", &tests.repository),
    ];
    for (field, value) in required {
        if value.is_empty() {
            bail!("'workflow_tests.{field}' is required but not specified");
        }
    }
    if tests.variations.is_empty() {
        bail!("'workflow_tests.variations' is required but empty or not specified");
    }

    if !repo_root.join(&tests.test_module).exists() {
        bail!("Test module '{}' does not exist", tests.test_module);
    }
    if rules.get(&tests.test_module_type).is_none() {
        bail!(
            "Test module type '{}' is not defined in module_types configuration. Available module types: {}",
            tests.test_module_type,
            rules.names().join(", ")
        );
    }

    if tests.default_inputs.contains_key("") {
        bail!("Empty key found in default_inputs configuration");
    }
    for (index, variation) in tests.variations.iter().enumerate() {
        validate_variation(index, variation)?;
        if variation.inputs.contains_key("") {
            bail!("Empty key found in variation '{}' inputs", variation.name);
        }
    }

    Ok(tests)
}

fn push_field(args: &mut Vec<String>, key: &str, value: &str) {
    args.push("--field".to_string());
    args.push(format!("{key}={value}"));
}

/// arguments for `gh` dispatching one variation
///
/// the core pull-request fields come first, then the shared default inputs,
/// then the variation's own inputs.
pub fn workflow_run_args(
    workflow: &str,
    variation: &WorkflowVariation,
    tests: &WorkflowTestConfig,
    branch: &str,
    timestamp: &str,
    test_number: usize,
) -> Result<Vec<String>> {
    let pr_number = format!("test{test_number}-{timestamp}");
    let pr_url = format!("https://github.com/{}/pull/{pr_number}", tests.repository);
    let module_config = serde_json::json!({
        "path": tests.test_module,
        "type": tests.test_module_type,
    });

    let mut args: Vec<String> = ["workflow", "run", workflow, "--ref", branch]
        .iter()
        .map(|arg| arg.to_string())
        .collect();

    push_field(&mut args, "change_type", &variation.change_type);
    push_field(&mut args, "contributor_type", &variation.contributor_type);
    push_field(&mut args, "contributor_username", &format!("test-user-{timestamp}"));
    push_field(&mut args, "can_self_approve", &variation.can_self_approve);
    push_field(&mut args, "pr_number", &pr_number);
    push_field(&mut args, "pr_title", &format!("TEST: {} - {timestamp}", variation.name));
    push_field(&mut args, "pr_html_url", &pr_url);
    push_field(&mut args, "module_config", &module_config.to_string());

    for (key, value) in &tests.default_inputs {
        if key.is_empty() {
            bail!("Empty key found in default_inputs configuration");
        }
        push_field(&mut args, key, value);
    }

    for (key, value) in &variation.inputs {
        if key.is_empty() {
            bail!("Empty key found in variation '{}' inputs", variation.name);
        }
        push_field(&mut args, key, value);
    }

    Ok(args)
}

fn gh() -> CommandSpec {
    CommandSpec::new("gh").env("GH_PAGER", "cat")
}

/// make sure `gh` is logged in, running an interactive login when it is not
pub async fn ensure_auth<R: CommandRunner>(runner: &R) -> Result<()> {
    let status = gh().args(["auth", "status"]);
    if runner.run(&status).await?.success {
        println!("{}", style("✅ Already authenticated with GitHub").green());
        return Ok(());
    }

    println!("{}", style("⚠️  GitHub CLI is not authenticated").yellow());
    println!("{}", style("Starting interactive authentication...").blue());

    let login = runner.run(&gh().args(["auth", "login"]).interactive()).await?;
    if !login.success {
        bail!(
            "Authentication failed: {}. Please run 'gh auth login' manually to authenticate",
            login.status_text()
        );
    }

    let verified = runner.run(&status).await?;
    if !verified.success {
        bail!(
            "Authentication verification failed: {}. Please run 'gh auth status' to check your authentication",
            verified.status_text()
        );
    }

    println!("{}", style("✅ Successfully authenticated with GitHub").green());
    Ok(())
}

async fn trigger_variation<R: CommandRunner>(runner: &R, args: Vec<String>, name: &str) -> bool {
    let spec = gh().args(args);
    println!("{}", style(format!("Debug - Command: {}", spec.display())).blue());

    match run_with_spinner(runner, &spec, &format!("Triggering {name}...")).await {
        Ok(output) if output.success => {
            if !output.stdout.trim().is_empty() {
                println!("{}", style(format!("✅ Success: {}", output.stdout.trim())).green());
            }
            true
        }
        Ok(output) => {
            println!(
                "{}",
                style(format!("❌ GitHub CLI command failed: {}", output.status_text())).red()
            );
            print_indented(&output.combined());
            false
        }
        Err(e) => {
            println!("{}", style(format!("❌ GitHub CLI command failed: {e:#}")).red());
            false
        }
    }
}

fn print_next_steps(tests: &WorkflowTestConfig, workflow: &str) {
    println!("{}", style("=== Next Steps ===").blue());
    println!(
        "1. Go to GitHub Actions: {}",
        style(format!("https://github.com/{}/actions", tests.repository)).yellow()
    );
    println!("2. You should see {} new workflow runs", tests.variations.len());
    println!("3. Each run will have jobs waiting for manual approval");
    println!("4. Look for jobs with '🟡 Waiting' status and click 'Review deployments' to approve them");
    println!("\n{}", style("Quick command to check recent workflow runs:").cyan());
    println!("{}", style(format!("gh run list --workflow={workflow} --limit=10")).blue());
}

/// dispatch every configured variation; false when none of them could be triggered
pub async fn trigger_workflows<R: CommandRunner>(args: &TriggerWorkflowsArgs, runner: &R) -> Result<bool> {
    println!("{}", style("=== Triggering Merge Approval Job Variations ===").blue().bold());

    for program in ["gh", "git"] {
        if !runner.is_available(program) {
            bail!("{program} is not available on PATH");
        }
    }

    let config = load_config(&args.config).context("Configuration Error")?;
    // module_types must be present and well formed before anything is dispatched
    let rules = config.module_type_rules(ShapePolicy::Strict)?;
    let tests = validate_workflow_config(&config, &rules, Path::new(&args.repo))?;

    println!(
        "{}",
        style(format!(
            "📦 Using test module: {} (type: {})",
            tests.test_module, tests.test_module_type
        ))
        .blue()
    );
    println!("{}", style(format!("🏢 Repository: {}", tests.repository)).blue());

    ensure_auth(runner).await?;

    let branch = git::current_branch(&args.repo).context("Could not determine current git branch")?;
    println!("{}", style(format!("📍 Current branch: {branch}")).blue());

    if tests.variations.len() != EXPECTED_VARIATIONS {
        println!(
            "{}",
            style(format!(
                "⚠️  WARNING: Expected {EXPECTED_VARIATIONS} variations but found {} in configuration",
                tests.variations.len()
            ))
            .yellow()
        );
    }

    println!(
        "\n{}",
        style(format!(
            "This will trigger {} variations on branch {branch}. Each will require manual approval in the GitHub UI.",
            tests.variations.len()
        ))
        .yellow()
    );
    if !args.yes {
        let proceed = Confirm::new()
            .with_prompt("Trigger the workflows now?")
            .default(true)
            .interact()?;
        if !proceed {
            println!("Cancelled.");
            return Ok(true);
        }
    }

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut triggered = 0;

    for (index, variation) in tests.variations.iter().enumerate() {
        println!("{}", style(format!("=== Triggering: {} ===", variation.name)).cyan());
        println!("Description: {}", variation.description);
        println!(
            "Inputs: change_type={}, contributor_type={}, can_self_approve={}",
            variation.change_type, variation.contributor_type, variation.can_self_approve
        );

        let dispatched = match workflow_run_args(&args.workflow, variation, tests, &branch, &timestamp, index + 1) {
            Ok(run_args) => trigger_variation(runner, run_args, &variation.name).await,
            Err(e) => {
                println!("{}", style(format!("❌ ERROR: {e}")).red());
                false
            }
        };
        if dispatched {
            println!("{}", style(format!("✅ Successfully triggered: {}", variation.name)).green());
            triggered += 1;
        } else {
            println!("{}", style(format!("❌ Failed to trigger: {}", variation.name)).red());
        }

        println!("\n---\n");
        if index + 1 < tests.variations.len() && args.pause_secs > 0 {
            tokio::time::sleep(Duration::from_secs(args.pause_secs)).await;
        }
    }

    println!(
        "{}\n",
        style(format!(
            "🎉 Triggered {triggered} out of {} variations!",
            tests.variations.len()
        ))
        .green()
    );

    if triggered == 0 {
        println!("{}", style("❌ No workflows were triggered successfully").red());
        return Ok(false);
    }

    print_next_steps(tests, &args.workflow);
    Ok(true)
}
