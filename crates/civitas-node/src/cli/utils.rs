use super::commands::Cli;
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, EnvFilter};

pub fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "info,civitas_node=debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(cli.verbose >= 2));
    subscriber.init();
}

pub fn print_banner() {
    println!("\x1b[38;5;51mcivitas\x1b[0m — anonymous headcount identity & proof service");
    println!("        v{}", env!("CARGO_PKG_VERSION"));
    println!();
}
