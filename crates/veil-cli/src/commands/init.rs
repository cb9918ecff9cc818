//! Initialize a Veil configuration

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use veil_core::config::CONFIG_FILE_NAME;
use veil_core::profile::builtin_presets;

/// Run the init command
pub async fn run(path: &str, profile: &str) -> Result<()> {
    let project_dir = Path::new(path);

    let presets = builtin_presets().context("Failed to load built-in presets")?;
    if !presets.contains_key(profile) {
        let available: Vec<_> = presets.keys().map(String::as_str).collect();
        anyhow::bail!(
            "Unknown preset '{}' (available: {})",
            profile,
            available.join(", ")
        );
    }

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Check if already initialized
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            project_dir.display(),
            CONFIG_FILE_NAME
        );
    }

    let config = format!(
        r#"# Veil configuration
#
# Target paths are relative to this file's directory (or to `root`).
targets:
  - dist/main.js

# Built-in presets: {presets}
profile: {profile}

# Individual options override the preset, for example:
# stringPoolThreshold: 0.5
# debugProtection: false

# Files processed at once
concurrency: 1

# Hand files to another obfuscator instead of the built-in engine.
# It reads source on stdin, gets the profile as JSON in VEIL_PROFILE_JSON,
# and writes the result to stdout.
# engine:
#   type: external
#   command: node
#   args: [scripts/obfuscate.js]
"#,
        presets = presets.keys().cloned().collect::<Vec<_>>().join(", "),
    );
    fs::write(&config_path, config)?;

    tracing::info!("✓ Created {}", config_path.display());
    tracing::info!("");
    tracing::info!("Next steps:");
    tracing::info!("  veil validate    # Check configuration");
    tracing::info!("  veil protect     # Protect build output in place");

    Ok(())
}
