use clap::{Parser, Subcommand};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "civitasd")]
#[command(about = "Civitas identity & proof service")]
#[command(version = BUILD_VERSION)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "CIVITAS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the service in the foreground.
    Run {
        #[arg(long, value_name = "FILE")]
        pid_file: Option<PathBuf>,
    },
    /// Write a default config and key material skeleton.
    Init {
        #[arg(short, long)]
        force: bool,
    },
    /// Print a snapshot of tree size, pending requests, and policy.
    Status,
    /// Validate config and key material without starting the service.
    Check {
        #[arg(long)]
        full: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
}
