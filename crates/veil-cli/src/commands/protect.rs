//! Protect command

use anyhow::{Context, Result};
use std::process::ExitCode;
use veil_core::{ProtectionConfig, ProtectionPipeline};
use veil_engine::engine_from_config;

/// Environment variable selecting the preset
pub const PROFILE_ENV: &str = "VEIL_PROFILE";

/// Exit status when `--fail-on-error` is set and a file failed
const FAILED_FILES_EXIT: u8 = 2;

/// Options of the protect command
#[derive(clap::Args, Debug, Default)]
pub struct ProtectArgs {
    /// Preset to use instead of the one named in the configuration
    #[arg(short, long, env = PROFILE_ENV)]
    pub profile: Option<String>,

    /// Number of files processed at once (overrides `concurrency`)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Exit non-zero when any file fails to transform or write
    #[arg(long)]
    pub fail_on_error: bool,
}

/// Run the protect command
pub async fn run(config_path: &str, args: &ProtectArgs) -> Result<ExitCode> {
    tracing::info!("Loading configuration from {}", config_path);

    let config = ProtectionConfig::load_with_profile(config_path, args.profile.as_deref())
        .context("Failed to load configuration")?;
    if let Some(name) = &config.profile_name {
        tracing::info!("Using profile '{}'", name);
    }

    let mut pipeline = ProtectionPipeline::new(engine_from_config(&config.engine));
    if let Some(jobs) = args.jobs {
        pipeline = pipeline.with_concurrency(jobs);
    }

    let summary = pipeline.run(&config).await;

    if args.fail_on_error && summary.has_failures() {
        tracing::error!(
            "{} of {} target(s) failed",
            summary.failed(),
            summary.total()
        );
        return Ok(ExitCode::from(FAILED_FILES_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}
