//! Error types for the built-in engine

use thiserror::Error;

use crate::lexer::LexError;

/// Result type for stage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while rewriting a single source file
#[derive(Error, Debug)]
pub enum Error {
    /// Input (or an intermediate result) is not well-formed JavaScript
    #[error("malformed source: {0}")]
    Malformed(#[from] LexError),

    /// Invalid guard template
    #[error("invalid template: {0}")]
    InvalidTemplate(#[from] minijinja::Error),
}
