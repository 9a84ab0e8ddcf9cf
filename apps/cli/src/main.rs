//! adstxt — periodic ads.txt crawler.
//!
//! Discovers publisher domains, fetches their ads.txt files, and
//! reconciles the declared supplier records into a local database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
