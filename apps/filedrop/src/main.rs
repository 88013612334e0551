//! filedrop entry point.

mod app;
mod config;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Send or receive a single file over TCP, verified chunk by chunk
#[derive(Parser)]
#[command(name = "filedrop")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a file to a receiver
    Send {
        /// File to send
        file: PathBuf,

        /// Receiver address
        ip: String,

        /// Receiver port
        port: u16,

        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Receive files until interrupted
    Recv {
        /// Address to listen on
        ip: String,

        /// Port to listen on
        port: u16,

        /// Output directory
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting filedrop");

    let config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Send {
            file,
            ip,
            port,
            chunk_size,
        } => rt.block_on(app::run_send(&config, &file, &ip, port, chunk_size))?,
        Command::Recv { ip, port, dest } => {
            rt.block_on(app::run_recv(&config, &ip, port, dest))?
        }
    }

    Ok(())
}
