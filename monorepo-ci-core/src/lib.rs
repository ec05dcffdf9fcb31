// monorepo-ci-core/src/lib.rs

// declare modules
pub mod changes;
pub mod collector;
pub mod config;
pub mod coverage;
pub mod git;
pub mod go;
pub mod module_type;
pub mod patterns;
pub mod policy;
pub mod process;
pub mod tools;
pub mod utils;
pub mod workflow;

// re-export key structs/functions for the cli crate
pub use anyhow::{Context, Result};
pub use clap::Parser;
pub use console::style;
pub use dotenv::dotenv;

pub use crate::config::{load_config, ConfigError, MonorepoConfig};
pub use crate::patterns::{classify_changes, classify_directory, match_path, ModuleMatch, ModuleTypeRules};
pub use crate::process::{CommandRunner, SystemRunner};
pub use crate::utils::RunContext;

use clap::Subcommand;

#[derive(Parser, Debug, Clone)]
#[command(name = "monorepo-ci", version, about = "CI tooling for a terraform monorepo")]
pub struct CoreCliArgs {
    /// more log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// fail on malformed module_types entries instead of skipping them
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// work out which single module a change set touches
    DetectChanges(changes::DetectChangesArgs),
    /// print the module type of a module directory
    ModuleType(module_type::ModuleTypeArgs),
    /// bundle a module's files into json for policy evaluation
    CollectFiles(collector::CollectFilesArgs),
    /// evaluate the module's opa policies
    ValidateModule(policy::ValidateModuleArgs),
    /// rewrite go files gofmt reports
    GoFormat(go::GoFormatArgs),
    /// run gofmt and go vet checks
    GoLint(go::GoLintArgs),
    /// run go unit tests per coverage group
    GoTest(go::GoTestArgs),
    /// run rego unit tests with coverage
    RegoTest(policy::RegoTestArgs),
    /// install developer tools through asdf
    InstallTools(tools::InstallToolsArgs),
    /// dispatch the workflow test variations through gh
    TriggerWorkflows(workflow::TriggerWorkflowsArgs),
}

/// the log level for the verbosity flags; RUST_LOG still wins when set
pub fn log_level(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

pub fn init_logging(verbose: u8, quiet: bool) {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", log_level(verbose, quiet)))
        .format_timestamp(None)
        .format_module_path(false)
        .init();
}

/// run the selected tool. Ok(false) means the tool ran and its checks failed
pub async fn execute_monorepo_ci_flow(args: CoreCliArgs) -> Result<bool> {
    let ctx = RunContext::from_env().with_strict(args.strict);
    let runner = SystemRunner;
    log::debug!("running {:?}", args.command);

    match &args.command {
        Command::DetectChanges(cmd) => changes::detect_changes(cmd, &ctx),
        Command::ModuleType(cmd) => module_type::detect_module_type(cmd, &ctx),
        Command::CollectFiles(cmd) => collector::collect_files(cmd),
        Command::ValidateModule(cmd) => policy::validate_module(cmd, &ctx, &runner).await,
        Command::GoFormat(cmd) => go::go_format(cmd, &runner).await,
        Command::GoLint(cmd) => go::go_lint(cmd, &runner).await,
        Command::GoTest(cmd) => go::run_go_tests(cmd, &runner).await,
        Command::RegoTest(cmd) => policy::run_rego_tests(cmd, &runner).await,
        Command::InstallTools(cmd) => tools::install_tools(cmd, &ctx, &runner).await,
        Command::TriggerWorkflows(cmd) => workflow::trigger_workflows(cmd, &runner).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        CoreCliArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommand_with_global_flags() {
        let args = CoreCliArgs::try_parse_from([
            "monorepo-ci",
            "detect-changes",
            "--file",
            "modules/service/a/main.tf",
            "--file",
            "README.md",
            "-vv",
            "--strict",
        ])
        .unwrap();

        assert_eq!(args.verbose, 2);
        assert!(args.strict);
        match args.command {
            Command::DetectChanges(cmd) => {
                assert_eq!(cmd.files, vec!["modules/service/a/main.tf", "README.md"]);
                assert_eq!(cmd.config.to_str(), Some("monorepo-config.json"));
                assert_eq!(cmd.head, "HEAD");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rego_test_positional_config() {
        let args = CoreCliArgs::try_parse_from(["monorepo-ci", "rego-test", "rego-config.json", "--no-coverage"]).unwrap();
        assert!(matches!(args.command, Command::RegoTest(_)));
        assert!(CoreCliArgs::try_parse_from(["monorepo-ci", "-q", "-v", "go-lint"]).is_err());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0, false), "info");
        assert_eq!(log_level(1, false), "debug");
        assert_eq!(log_level(3, false), "trace");
        assert_eq!(log_level(0, true), "warn");
    }
}
