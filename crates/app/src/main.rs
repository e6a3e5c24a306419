mod config;
mod server;

use clap::Parser;
use config::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(config) => {
            server::init_tracing(config.debug);
            server::start_server(&config).await?;
        }
        Commands::Version => {
            println!("hashmark v{}", env!("CARGO_PKG_VERSION"));
            println!("Prediction-market and perpetuals engine on a Hedera-style ledger");
        }
    }

    Ok(())
}
