//! Deepdive CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deepdive::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Research(args) => deepdive::cli::commands::research::execute(args, cli.json).await,
        Commands::Models(args) => deepdive::cli::commands::models::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        deepdive::cli::handle_error(err, cli.json);
    }
}
