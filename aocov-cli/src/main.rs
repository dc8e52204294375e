#![deny(missing_docs)]
//! ao-coverage command-line interface.
//!
//! Uploads coverage reports to an ao-coverage server and checks that the
//! server is reachable.

mod client;
mod upload;

use clap::{Parser, Subcommand};
use client::ServerArgs;
use upload::UploadArgs;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "aocov", version, about = "ao-coverage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a coverage report for a commit.
    Upload(UploadArgs),
    /// Check that the server answers its health check.
    Health(ServerArgs),
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Upload(args) => upload::run_upload(args).await?,
        Commands::Health(server) => client::run_health(server).await?,
    }

    Ok(())
}

#[cfg(test)]
fn main() {}
