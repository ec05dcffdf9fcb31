use clap::Parser;
use monorepo_ci_core::{dotenv, execute_monorepo_ci_flow, init_logging, style, CoreCliArgs};

#[tokio::main]
async fn main() {
    // a .env file may override GITHUB_* and DEVCONTAINER for local runs
    dotenv().ok();

    let cli_args = CoreCliArgs::parse();
    init_logging(cli_args.verbose, cli_args.quiet);

    match execute_monorepo_ci_flow(cli_args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!(
                "{} {} {}",
                style("❌"),
                style("monorepo-ci failed:").red().bold(),
                style(format!("{e:#}")).red()
            );
            std::process::exit(1);
        }
    }
}
