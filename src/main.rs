use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;

use pgdev::config::{self, ConfigBuilder, DevArgs};
use pgdev::constants::CONFIG_FILENAME;
use pgdev::{docker, logging, session};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config_file: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch declared schema files and continuously reconcile the local
    /// database against them
    Dev(DevArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    logging::initialize_logging(cli.debug, cli.verbose, cli.quiet);

    let result = run_main(cli).await;

    // Safety net: the session removes its own shadow, but an errored-out
    // session may leave registered containers behind
    if let Err(e) = docker::cleanup_all_containers().await {
        eprintln!("Warning: failed to clean up containers: {e}");
    }

    result
}

async fn run_main(cli: Cli) -> Result<()> {
    let (file_config, root_dir) = config::load_config(&cli.config_file)?;

    match cli.command {
        Commands::Dev(args) => {
            let config = ConfigBuilder::new()
                .with_file(file_config)
                .with_cli_args(args.into())
                .resolve(&root_dir)?;

            info!("Starting dev session");
            session::run_dev_session(&config, &root_dir).await
        }
    }
}
