//! `deepdive research` - run one research session end to end.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use tracing::debug;

use crate::application::ResearchEngine;
use crate::domain::models::{ApiMode, EffortLevel, ResearchConfig, StepStatus, TaskModels};
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ResearchArgs {
    /// The research question
    pub query: String,

    /// API key (falls back to DEEPDIVE_API_KEY)
    #[arg(long, env = "DEEPDIVE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Round/sub-query budget
    #[arg(long, value_enum)]
    pub effort: Option<EffortArg>,

    /// Protocol mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Route analysis/reflection/answer to this model (search stays on the
    /// search-capable default)
    #[arg(long)]
    pub model: Option<String>,

    /// Configuration file path (defaults to .deepdive/config.yaml)
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum EffortArg {
    Low,
    Medium,
    High,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    Native,
    Generic,
    Auto,
}

pub async fn execute(args: ResearchArgs, json: bool) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    if let Some(effort) = args.effort {
        config.effort = match effort {
            EffortArg::Low => EffortLevel::Low,
            EffortArg::Medium => EffortLevel::Medium,
            EffortArg::High => EffortLevel::High,
        };
    }
    if let Some(mode) = args.mode {
        config.mode = match mode {
            ModeArg::Native => ApiMode::Native,
            ModeArg::Generic => ApiMode::Generic,
            ModeArg::Auto => ApiMode::Auto,
        };
    }
    if let Some(model) = &args.model {
        config.models = TaskModels::from_user_model(model.clone());
    }
    ConfigLoader::validate(&config).context("configuration rejected")?;

    let mut engine = ResearchEngine::new(config, args.api_key);
    let mut events = engine.subscribe();

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if json {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            } else if event.status == StepStatus::Running {
                eprintln!("{} {}", style("→").cyan(), event.stage);
            } else {
                debug!(stage = %event.stage, status = ?event.status, "step finished");
            }
        }
    });

    let result = engine.run(&args.query).await;
    drop(engine);
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("\n{}", style("Answer").green().bold());
    println!("{}\n", result.answer);

    if !result.citations.is_empty() {
        println!("{}", style("Sources").bold());
        for citation in &result.citations {
            println!("  - {} ({})", citation.title, citation.url);
        }
        println!();
    }

    if result.degraded_searches > 0 {
        println!(
            "{} {} search call(s) were answered without live web grounding",
            style("note:").yellow().bold(),
            result.degraded_searches
        );
    }
    if result.aborted {
        println!(
            "{} run ended early: {}",
            style("note:").yellow().bold(),
            result.error.as_deref().unwrap_or("aborted")
        );
    }
    println!(
        "{} rounds in {:.1}s",
        result.rounds.len(),
        result.elapsed_secs
    );

    if !result.success {
        anyhow::bail!(
            "research failed: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}
