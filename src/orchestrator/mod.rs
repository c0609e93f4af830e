//! Reset pipeline
//!
//! Tears the development cluster down and brings a fresh deployment up in
//! strictly ordered stages. Within a stage, independent commands run
//! concurrently on the current task; a stage finishes completely before
//! the next begins, because the cluster and registry have no locking of
//! their own:
//!
//! 1. clear the old deployment
//! 2. start the backend, build images, prepare registry credentials
//! 3. render and parse the manifest
//! 4. pull, then push every image the manifest references
//! 5. apply the manifest, repoint the client, wait for readiness
//! 6. optionally deploy JupyterHub

use crate::context::Context;
use crate::driver::{select_driver, ClusterDriver, DOCKER, KUBECTL, PACHCTL};
use crate::error::ResetError;
use crate::manifest::ManifestSet;
use crate::process::{wait_for_success, Invocation, ProcessError, RedactedValue};
use futures::future::try_join_all;
use futures::TryFutureExt;
use std::time::Duration;
use tracing::info;

/// etcd image the platform manifest references from quay.io
pub const ETCD_IMAGE: &str = "quay.io/coreos/etcd:v3.3.5";
pub const PACHD_IMAGE: &str = "pachyderm/pachd:local";
pub const WORKER_IMAGE: &str = "pachyderm/worker:local";
pub const JUPYTERHUB_USER_IMAGE: &str = "pachyderm/jupyterhub-pachyderm-user:local";
pub const JUPYTERHUB_HUB_IMAGE: &str = "pachyderm/jupyterhub-pachyderm-hub:local";

/// Object holding the enterprise activation code for test clusters
pub const ENTERPRISE_TOKEN_URL: &str =
    "s3://pachyderm-engineering/test_enterprise_activation_code.txt";

/// Initial admin user for auth activation
const DEFAULT_AUTH_USER: &str = "admin";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Deploy the dashboard
    pub dashboard: bool,
    /// Deploy JupyterHub on top of the platform
    pub jupyterhub: bool,
    /// Upper bound for the whole run; unbounded if unset
    pub timeout: Option<Duration>,
}

/// Reset the cluster the current kubectl context points at
pub async fn reset(ctx: &Context, options: &ResetOptions) -> Result<(), ResetError> {
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, select_and_run(ctx, options))
            .await
            .map_err(|_| ResetError::RunTimeout(limit))?,
        None => select_and_run(ctx, options).await,
    }
}

async fn select_and_run(ctx: &Context, options: &ResetOptions) -> Result<(), ResetError> {
    let driver = select_driver(ctx).await?.into_driver();
    run_pipeline(ctx, driver.as_ref(), options).await
}

/// Run every stage against an already selected driver
pub async fn run_pipeline(
    ctx: &Context,
    driver: &dyn ClusterDriver,
    options: &ResetOptions,
) -> Result<(), ResetError> {
    // Teardown must finish before anything is recreated
    info!(driver = driver.name(), "clearing previous deployment");
    driver.clear(ctx).await?;

    futures::try_join!(
        driver.start(ctx).map_err(ResetError::from),
        build_images(ctx).map_err(ResetError::from),
        driver.init_image_registry(ctx).map_err(ResetError::from),
    )?;

    let version = ctx
        .runner
        .capture(Invocation::new(PACHCTL).args(["version", "--client-only"]))
        .await?;
    info!(version = %version.trim(), "deploy pachyderm version v{}", version.trim());

    let manifest = ManifestSet::parse(driver.create_manifest(ctx, options.dashboard).await?)?;
    let discovered = manifest.auxiliary_images()?.to_vec();
    info!(
        documents = manifest.documents().len(),
        discovered = ?discovered,
        "deployment manifest generated"
    );

    let pulls = std::iter::once(ETCD_IMAGE.to_string())
        .chain(discovered.iter().cloned())
        .map(|image| {
            ctx.runner
                .run(Invocation::new(DOCKER).args(["pull".to_string(), image]))
        });
    try_join_all(pulls).await?;

    let push_list: Vec<String> = [ETCD_IMAGE, PACHD_IMAGE, WORKER_IMAGE]
        .into_iter()
        .map(str::to_string)
        .chain(discovered)
        .collect();
    push_images(ctx, driver, &push_list).await?;

    ctx.runner
        .run(
            Invocation::new(KUBECTL)
                .args(["create", "-f", "-"])
                .stdin(manifest.raw()),
        )
        .await?;

    driver.update_config(ctx).await?;

    wait_for_success(
        &ctx.runner,
        Invocation::new(PACHCTL).arg("version"),
        ctx.config.poll_interval,
        "waiting for pachyderm to come up...",
    )
    .await?;
    info!("pachyderm is up");

    if options.jupyterhub {
        deploy_jupyterhub(ctx, driver).await?;
    }

    Ok(())
}

/// Build and install the local binaries and images
async fn build_images(ctx: &Context) -> Result<(), ProcessError> {
    info!(build_root = %ctx.config.build_root.display(), "building local images");
    futures::try_join!(
        ctx.runner.run(Invocation::new("make").arg("install")),
        ctx.runner.run(Invocation::new("make").arg("docker-build")),
    )?;
    Ok(())
}

async fn push_images(
    ctx: &Context,
    driver: &dyn ClusterDriver,
    images: &[String],
) -> Result<(), ResetError> {
    try_join_all(images.iter().map(|image| driver.push_image(ctx, image))).await?;
    Ok(())
}

/// Activate enterprise features and auth, then deploy JupyterHub
async fn deploy_jupyterhub(ctx: &Context, driver: &dyn ClusterDriver) -> Result<(), ResetError> {
    let images = [JUPYTERHUB_USER_IMAGE, JUPYTERHUB_HUB_IMAGE].map(str::to_string);
    push_images(ctx, driver, &images).await?;

    let token = ctx
        .runner
        .capture(Invocation::new("aws").args(["s3", "cp", ENTERPRISE_TOKEN_URL, "-"]))
        .await?;

    ctx.runner
        .run(
            Invocation::new(PACHCTL)
                .args(["enterprise", "activate"])
                .secret(RedactedValue::new(token.trim())),
        )
        .await?;

    ctx.runner
        .run(
            Invocation::new(PACHCTL)
                .args(["auth", "activate"])
                .stdin(format!("{}\n", DEFAULT_AUTH_USER)),
        )
        .await?;

    ctx.runner
        .run(Invocation::new(PACHCTL).args([
            "deploy",
            "jupyterhub",
            "--user-image",
            JUPYTERHUB_USER_IMAGE,
            "--hub-image",
            JUPYTERHUB_HUB_IMAGE,
        ]))
        .await?;

    info!("jupyterhub deployed");
    Ok(())
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
