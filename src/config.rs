//! Run configuration
//!
//! Environment variables are read once at startup. Precondition failures
//! surface here, before any collaborator is contacted.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Build toolchain root; required
pub const BUILD_ROOT_VAR: &str = "GOPATH";

/// CA trust override that breaks the local client; must be unset
pub const CA_OVERRIDE_VAR: &str = "PACH_CA_CERTS";

pub const DOCKER_CONFIG_VAR: &str = "DOCKER_CONFIG";
/// Fallback base for the docker config when `DOCKER_CONFIG` is unset
pub const HOME_VAR: &str = "HOME";
pub const POLL_INTERVAL_VAR: &str = "PACH_RESET_POLL_INTERVAL_SECS";
pub const MINIKUBE_PUSH_SCRIPT_VAR: &str = "PACH_RESET_MINIKUBE_PUSH_SCRIPT";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MINIKUBE_PUSH_SCRIPT: &str = "./etc/kube/push-to-minikube.sh";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Must set {name}")]
    MissingVariable { name: &'static str },

    #[error("Must unset {name}\nRun:\nunset {name}")]
    ConflictingVariable { name: &'static str },

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the Go toolchain workspace used by `make install`
    pub build_root: PathBuf,
    /// Container runtime credentials, uploaded as the registry pull secret
    pub docker_config_path: PathBuf,
    /// Interval between readiness checks
    pub poll_interval: Duration,
    /// Helper that loads a local image into the minikube VM
    pub minikube_push_script: PathBuf,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let build_root = lookup(BUILD_ROOT_VAR)
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingVariable {
                name: BUILD_ROOT_VAR,
            })?;

        if lookup(CA_OVERRIDE_VAR).is_some() {
            return Err(ConfigError::ConflictingVariable {
                name: CA_OVERRIDE_VAR,
            });
        }

        let docker_config_path = match lookup(DOCKER_CONFIG_VAR) {
            Some(dir) => PathBuf::from(dir).join("config.json"),
            None => lookup(HOME_VAR)
                .map(|home| PathBuf::from(home).join(".docker").join("config.json"))
                .ok_or(ConfigError::MissingVariable { name: HOME_VAR })?,
        };

        let poll_interval = match lookup(POLL_INTERVAL_VAR) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidValue {
                    name: POLL_INTERVAL_VAR,
                    value,
                })?,
            None => DEFAULT_POLL_INTERVAL,
        };

        let minikube_push_script: PathBuf = lookup(MINIKUBE_PUSH_SCRIPT_VAR)
            .unwrap_or_else(|| DEFAULT_MINIKUBE_PUSH_SCRIPT.to_string())
            .into();

        Ok(Config {
            build_root,
            docker_config_path,
            poll_interval,
            minikube_push_script,
        })
    }
}
