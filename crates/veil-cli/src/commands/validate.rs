//! Validate configuration command

use anyhow::{Context, Result};
use veil_core::ProtectionConfig;
use veil_engine::engine_from_config;

/// Run the validate command
pub async fn run(config_path: &str, profile: Option<&str>) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = ProtectionConfig::load_with_profile(config_path, profile)
        .context("Failed to load configuration")?;
    let engine = engine_from_config(&config.engine);

    tracing::info!("✓ Root: {}", config.root.display());
    tracing::info!(
        "✓ Profile: {}",
        config.profile_name.as_deref().unwrap_or("(default)")
    );
    tracing::info!("✓ Engine: {}", engine.name());

    let enabled = config.active_profile.enabled_options();
    if enabled.is_empty() {
        tracing::warn!("No transform options enabled; output will match input");
    } else {
        tracing::info!("✓ Options: {}", enabled.join(", "));
    }
    for option in engine.unsupported_options(&config.active_profile) {
        tracing::warn!(
            "engine '{}' does not support {}; option will be ignored",
            engine.name(),
            option
        );
    }

    if config.targets.is_empty() {
        tracing::warn!("No targets configured");
    }
    for target in &config.targets {
        let path = config.resolve(target);
        if path.is_file() {
            tracing::info!("✓ Target: {}", target);
        } else {
            tracing::warn!("Target {} not found at {}", target, path.display());
        }
    }

    tracing::info!("✓ Configuration is valid");
    Ok(())
}
