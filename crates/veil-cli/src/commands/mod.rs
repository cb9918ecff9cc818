//! CLI command implementations

pub mod init;
pub mod presets;
pub mod protect;
pub mod validate;
