//! `ecofood` - provisions and tears down the EcoFoodChain environment.

use clap::{CommandFactory, Parser};
use orchestrator::{Action, Orchestrator, OrchestratorConfig, ProcessRunner};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "ecofood",
    version,
    about = "EcoFoodChain environment orchestrator (LocalStack, kind, Fabric)"
)]
struct Args {
    #[arg(value_enum)]
    action: Action,

    #[arg(short = 'c', long = "config", help = "Config file (default: ./ecofood.toml)")]
    config: Option<PathBuf>,
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = OrchestratorConfig::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let orchestrator = Orchestrator::new(config, Arc::new(ProcessRunner));
    runtime.block_on(orchestrator.run(args.action))?;
    Ok(())
}

fn main() {
    if std::env::args_os().len() == 1 {
        let mut cmd = Args::command();
        eprintln!("{}", cmd.render_help());
        std::process::exit(1);
    }

    let args = Args::parse();

    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
