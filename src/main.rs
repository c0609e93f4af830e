use clap::Parser;
use pach_reset::{reset, Config, Context, ProcessRunner, ResetOptions};
use std::time::Duration;
use tracing::{error, info};

/// Command-line flags
#[derive(Debug, Parser)]
#[command(name = "pach-reset", version, about = "Resets a pachyderm cluster.")]
pub struct Cli {
    /// Deploy the dashboard
    #[arg(long)]
    pub dash: bool,

    /// Deploy JupyterHub on top of pachyderm
    #[arg(long)]
    pub jupyterhub: bool,

    /// Give up if the reset takes longer than this many seconds
    #[arg(long, value_name = "SECONDS", env = "PACH_RESET_TIMEOUT_SECS")]
    pub timeout: Option<u64>,
}

impl Cli {
    pub fn options(&self) -> ResetOptions {
        ResetOptions {
            dashboard: self.dash,
            jupyterhub: self.jupyterhub,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Preconditions are checked before any external command runs
    let config = Config::from_env()?;
    info!(
        build_root = %config.build_root.display(),
        poll_interval = ?config.poll_interval,
        "configuration loaded"
    );

    let ctx = Context::new(config, ProcessRunner::system());

    if let Err(e) = reset(&ctx, &cli.options()).await {
        error!(error = %e, "reset failed");
        return Err(e.into());
    }

    info!("reset complete");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
