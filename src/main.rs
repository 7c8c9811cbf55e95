use anyhow::Result;
use clap::Parser;

mod cli;

use logboard::{config, init_tracing, server};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    init_tracing();

    match args.get_command() {
        cli::Commands::Serve => {
            let cfg = config::load_config(&args.config)?;
            server::start_server(cfg).await?;
        }
        cli::Commands::Check => match config::load_config(&args.config) {
            Ok(_) => {
                println!("Configuration OK: {}", args.config.display());
            }
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                std::process::exit(1);
            }
        },
        cli::Commands::Version => {
            println!("Logboard v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
