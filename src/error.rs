use crate::config::ConfigError;
use crate::driver::DriverError;
use crate::manifest::ManifestError;
use crate::process::ProcessError;
use std::time::Duration;
use thiserror::Error;

/// Any failure that ends a reset run
#[derive(Debug, Error)]
pub enum ResetError {
    #[error(transparent)]
    Precondition(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("reset did not finish within {0:?}")]
    RunTimeout(Duration),
}
