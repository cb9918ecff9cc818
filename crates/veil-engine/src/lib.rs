//! Veil transformation engines
//!
//! Two implementations of [`TransformationEngine`]:
//!
//! - [`BuiltinEngine`] rewrites JavaScript in-process through a fixed
//!   sequence of stages.
//! - [`ExternalEngine`] delegates each file to a user-supplied command.
//!
//! ```text
//! ┌────────┐   ┌──────────┐   ┌───────┐   ┌──────┐   ┌─────────┐   ┌────────┐
//! │property│──▶│  split   │──▶│ pool  │──▶│decoys│──▶│ compact │──▶│ guards │
//! └────────┘   └──────────┘   └───────┘   └──────┘   └─────────┘   └────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use veil_core::{ProtectionConfig, ProtectionPipeline};
//! use veil_engine::engine_from_config;
//!
//! let config = ProtectionConfig::load("veil.yaml")?;
//! let summary = ProtectionPipeline::new(engine_from_config(&config.engine))
//!     .run(&config)
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtin;
pub mod error;
pub mod external;
pub mod lexer;
pub mod names;
pub mod stages;

pub use builtin::BuiltinEngine;
pub use error::{Error, Result};
pub use external::ExternalEngine;

use veil_core::{EngineConfig, TransformationEngine};

/// Build the engine a configuration asks for
pub fn engine_from_config(config: &EngineConfig) -> Box<dyn TransformationEngine> {
    match config {
        EngineConfig::Builtin => Box::new(BuiltinEngine::new()),
        EngineConfig::External { command, args } => {
            Box::new(ExternalEngine::new(command.clone(), args.clone()))
        }
    }
}
