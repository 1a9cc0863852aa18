//! Breath monitor: breathing-belt acquisition, conditioning and publishing

mod app;
mod cli;
mod outlet;
mod plot;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    app::run(cli).await
}
