//! `deepdive models` - list registered models and capabilities.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Cell, Table};

use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::registry::{ModelDescriptor, ModelRegistry};

#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Configuration file path (custom registrations are merged in)
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
}

pub async fn execute(args: ModelsArgs, json: bool) -> Result<()> {
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    let registry = ModelRegistry::with_builtin_models();
    for custom in config.custom_models {
        registry
            .register(ModelDescriptor::from(custom))
            .map_err(|e| anyhow::anyhow!("failed to register custom model: {e}"))?;
    }

    let models = registry.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Model", "Protocol", "Search", "Tools", "Endpoint",
    ]);

    for model in models {
        table.add_row(vec![
            Cell::new(&model.id),
            Cell::new(model.affinity.to_string()),
            Cell::new(if model.supports_search { "yes" } else { "no" }),
            Cell::new(if model.supports_tools { "yes" } else { "no" }),
            Cell::new(&model.base_url),
        ]);
    }

    println!("{table}");
    Ok(())
}
