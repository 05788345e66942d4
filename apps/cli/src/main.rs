//! enquete CLI: turns the latest municipal news headline into a weekly
//! yes/no poll question and delivers it to a consumer service.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = commands::resolve_config(&cli)?;
    commands::init_tracing(&cli, &config.log_level);
    commands::run(cli, config).await
}
