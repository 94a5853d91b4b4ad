use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "policyqa",
    about = "Retrieval-augmented Q&A over HR policy documents"
)]
pub struct Cli {
    /// Override the data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP service (API and messaging webhook)
    Serve(ServeArgs),
    /// Ingest policy documents from files or directories
    Ingest(IngestArgs),
    /// Show index status and statistics
    Status(StatusArgs),
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Socket address to bind
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,
}

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Policy files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
