//! # Deployment Configuration Check
//!
//! Loads a deployment configuration (first argument, or the file named by
//! `CLOUD_DEPLOY_CONFIG`, or defaults plus environment), validates it and
//! prints the resolved result as JSON.

use anyhow::Context;
use cloud_deploy_core::config::ConfigManager;
use cloud_deploy_core::logging::init_structured_logging;
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = match std::env::args().nth(1) {
        Some(path) => ConfigManager::load_from_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => ConfigManager::from_env().context("loading configuration")?,
    };

    let source = manager
        .source_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults and environment".to_string());
    info!(source = %source, services = manager.config().services.len(), "✅ Configuration is valid");

    let rendered = serde_json::to_string_pretty(manager.config())
        .context("rendering configuration as JSON")?;
    println!("{rendered}");
    Ok(())
}
