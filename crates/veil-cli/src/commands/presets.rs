//! List built-in presets

use anyhow::{Context, Result};
use veil_core::profile::builtin_presets;

/// Run the presets command
pub fn run(name: Option<&str>) -> Result<()> {
    let presets = builtin_presets().context("Failed to load built-in presets")?;

    match name {
        None => {
            let width = presets.keys().map(String::len).max().unwrap_or(0);
            for (name, preset) in &presets {
                println!("{name:<width$}  {}", preset.description);
            }
        }
        Some(name) => {
            let preset = presets.get(name).with_context(|| {
                let available: Vec<_> = presets.keys().map(String::as_str).collect();
                format!(
                    "Unknown preset '{}' (available: {})",
                    name,
                    available.join(", ")
                )
            })?;
            print!("{}", serde_yaml::to_string(&preset.profile())?);
        }
    }
    Ok(())
}
