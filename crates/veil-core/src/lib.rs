//! Veil Core Library
//!
//! This crate provides the core functionality for Veil:
//! - Transform profiles and built-in presets
//! - Configuration parsing and validation
//! - The transformation engine contract
//! - The protection pipeline and its run summary
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Config    │────▶│  Pipeline   │────▶│   Engine    │
//! │   (YAML)    │     │ (per file)  │     │ (transform) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use veil_core::{ProtectionConfig, ProtectionPipeline};
//!
//! let config = ProtectionConfig::load("./veil.yaml")?;
//! let summary = ProtectionPipeline::new(engine).run(&config).await;
//! println!("{} protected", summary.succeeded());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod profile;

pub use config::{EngineConfig, ProtectionConfig};
pub use engine::TransformationEngine;
pub use error::{Error, FileError, Result, TransformError};
pub use pipeline::{Diagnostic, FileOutcome, FileReport, ProtectionPipeline, RunSummary, Severity};
pub use profile::{IdentifierStrategy, StringEncoding, TransformProfile};
