mod cli;
mod config;
mod docker;
mod utils;

use anyhow::Result;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    utils::logger::init()?;

    // Parse the argument vector and run the selected path
    let cli = Cli::parse();
    cli.execute().await
}
