//! Veil CLI
//!
//! Build-time step that protects generated JavaScript in place.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::protect::{PROFILE_ENV, ProtectArgs};

/// Veil - obfuscate build output before it ships
#[derive(Parser)]
#[command(name = "veil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file, or a directory containing veil.yaml
    #[arg(short, long, default_value = "veil.yaml", env = "VEIL_CONFIG", global = true)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Protect every configured target (the default)
    Protect(ProtectArgs),

    /// Validate configuration without touching any file
    Validate {
        /// Preset to use instead of the one named in the configuration
        #[arg(short, long, env = PROFILE_ENV)]
        profile: Option<String>,
    },

    /// List built-in presets, or show one in full
    Presets {
        /// Preset to print as a complete profile
        name: Option<String>,
    },

    /// Write a starter veil.yaml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Preset the new configuration starts from
        #[arg(short, long, default_value = "conservative")]
        profile: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    match cli.command {
        None => {
            let args = ProtectArgs {
                profile: std::env::var(PROFILE_ENV).ok(),
                ..Default::default()
            };
            commands::protect::run(&cli.config, &args).await
        }
        Some(Commands::Protect(args)) => commands::protect::run(&cli.config, &args).await,
        Some(Commands::Validate { profile }) => {
            commands::validate::run(&cli.config, profile.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Presets { name }) => {
            commands::presets::run(name.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Init { path, profile }) => {
            commands::init::run(&path, &profile).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
