mod cli;

use cli::{init_logging, Cli, Commands};
use civitas_types::CoreResult;
use clap::Parser;

#[tokio::main]
async fn main() -> CoreResult<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(civitas_node::default_config_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));

    match cli.command {
        Commands::Run { pid_file } => {
            cli::run_node(&config_path, &data_dir, pid_file).await?;
        }
        Commands::Init { force } => {
            cli::init_node(&config_path, &data_dir, force)?;
        }
        Commands::Status => {
            cli::show_status(&config_path, &data_dir).await?;
        }
        Commands::Check { full } => {
            cli::run_checks(&config_path, &data_dir, full).await?;
        }
        Commands::Config { action } => {
            cli::handle_config(&config_path, action)?;
        }
    }

    Ok(())
}
