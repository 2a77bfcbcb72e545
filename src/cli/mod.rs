//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use console::style;

/// Deepdive - iterative deep-research over LLM providers
#[derive(Parser, Debug)]
#[command(name = "deepdive", version, about)]
pub struct Cli {
    /// Emit machine-readable JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a research session for a query
    Research(commands::research::ResearchArgs),

    /// List registered models and their capabilities
    Models(commands::models::ModelsArgs),
}

/// Print a top-level error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let payload = serde_json::json!({"error": err.to_string()});
        eprintln!("{payload}");
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
    }
    std::process::exit(1);
}
