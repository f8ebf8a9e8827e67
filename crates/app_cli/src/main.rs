mod bootstrap;
mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap::{App, ensure_dir, init_local_logger, resolve_data_dir};
use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        eprintln!("failed to read .env: {err}");
    }

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.clone());
    if let Err(err) = ensure_dir(&data_dir) {
        eprintln!("failed to prepare data dir `{}`: {err}", data_dir.display());
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    let app = App::load(&data_dir, cli.lang.as_deref());
    commands::run(app, cli.command).await
}
