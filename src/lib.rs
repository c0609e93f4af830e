pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod process;

// Re-export for main.rs
pub use crate::config::{Config, ConfigError};
pub use crate::context::Context;
pub use crate::error::ResetError;
pub use crate::orchestrator::{reset, ResetOptions};
pub use crate::process::ProcessRunner;
