use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slack_archiver::commands::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = commands::run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logging goes to stderr; `RUST_LOG` overrides the verbosity flags.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "slack_archiver=info",
        1 => "slack_archiver=debug",
        _ => "slack_archiver=trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
