//! Cluster drivers
//!
//! A driver encapsulates everything that differs between the backends a
//! development cluster can run on:
//! - LocalDriver: Docker Desktop's built-in Kubernetes, all defaults
//! - MinikubeDriver: a throwaway minikube VM
//! - CloudDriver: a GKE cluster pulling from the project's GCR registry
//!
//! The backend is picked once per run from the current kubectl context.

pub mod cloud;
pub mod local;
pub mod minikube;

use crate::context::Context;
use crate::process::{best_effort, Invocation, ProcessError};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::info;

pub const KUBECTL: &str = "kubectl";
pub const PACHCTL: &str = "pachctl";
pub const DOCKER: &str = "docker";
pub const MINIKUBE: &str = "minikube";

/// Label carried by every resource the platform deploys
pub const SUITE_LABEL_SELECTOR: &str = "suite=pachyderm";

/// Resource kinds removed on reset
pub const DELETABLE_RESOURCES: &[&str] = &[
    "replicasets",
    "services",
    "deployments",
    "pods",
    "rc",
    "serviceaccounts",
    "secrets",
    "clusterrole",
    "clusterrolebinding",
    "roles.rbac.authorization.k8s.io",
    "rolebindings.rbac.authorization.k8s.io",
];

/// `gke_<project>_<location>_<cluster>` as written by `gcloud`
static GKE_CONTEXT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gke_([^_]+)_(.+)").expect("GKE context pattern is valid"));

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not derive driver from context name: {context:?}")]
    Selection { context: String },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Backend-specific cluster lifecycle operations
///
/// The provided methods are the Docker Desktop behavior; other backends
/// override what differs. Every method runs external commands through
/// `ctx.runner` and must not keep state between calls.
#[async_trait]
pub trait ClusterDriver: Send + Sync {
    /// Driver name for logging
    fn name(&self) -> &'static str;

    /// Remove the previous deployment
    ///
    /// The undeploy step is best-effort since a fresh cluster has nothing
    /// to undeploy. The labeled resource deletion is mandatory.
    async fn clear(&self, ctx: &Context) -> Result<(), DriverError> {
        clear_deployment(ctx).await
    }

    /// Bring the backend up
    async fn start(&self, _ctx: &Context) -> Result<(), DriverError> {
        Ok(())
    }

    /// Render the deployment manifest without applying it
    async fn create_manifest(
        &self,
        ctx: &Context,
        include_dashboard: bool,
    ) -> Result<String, DriverError> {
        let host_path = unique_host_path();
        let invocation = deploy_dry_run(["--host-path", host_path.as_str()], include_dashboard);
        Ok(ctx.runner.capture(invocation).await?)
    }

    /// Prepare credentials the cluster needs to pull images
    async fn init_image_registry(&self, _ctx: &Context) -> Result<(), DriverError> {
        Ok(())
    }

    /// Make a locally built image available to the cluster
    async fn push_image(&self, _ctx: &Context, _image: &str) -> Result<(), DriverError> {
        Ok(())
    }

    /// Point the platform client at the freshly deployed cluster
    async fn update_config(&self, _ctx: &Context) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Undeploy (best-effort) and delete every labeled resource
pub async fn clear_deployment(ctx: &Context) -> Result<(), DriverError> {
    best_effort(
        "undeploy",
        ctx.runner.run(
            Invocation::new(PACHCTL)
                .args(["undeploy", "--metadata", "--jupyterhub"])
                .stdin("y\n"),
        ),
    )
    .await;

    ctx.runner
        .run(
            Invocation::new(KUBECTL)
                .arg("delete")
                .arg(DELETABLE_RESOURCES.join(","))
                .args(["-l", SUITE_LABEL_SELECTOR]),
        )
        .await?;

    Ok(())
}

/// `pachctl deploy local` in dry-run mode, with driver-specific arguments
pub fn deploy_dry_run<I, A>(extra_args: I, include_dashboard: bool) -> Invocation
where
    I: IntoIterator<Item = A>,
    A: Into<crate::process::Arg>,
{
    let invocation = Invocation::new(PACHCTL)
        .args([
            "deploy",
            "local",
            "-d",
            "--dry-run",
            "--create-context",
            "--no-guaranteed",
        ])
        .args(extra_args);

    if include_dashboard {
        invocation
    } else {
        invocation.arg("--no-dashboard")
    }
}

/// Fresh host path for the storage volume
///
/// Host paths survive a redeploy until the VM restarts, so reusing one
/// would hand the new cluster the old cluster's data.
pub fn unique_host_path() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("/var/pachyderm-{}", &token[..10])
}

/// The closed set of supported backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverKind {
    LocalDesktop,
    MinikubeVm,
    CloudManaged { project_id: String },
}

impl DriverKind {
    /// Map a kubectl context name to a backend, if it is a known one
    pub fn from_context_name(context: &str) -> Option<Self> {
        match context {
            "minikube" => Some(DriverKind::MinikubeVm),
            "docker-desktop" => Some(DriverKind::LocalDesktop),
            other => GKE_CONTEXT_NAME
                .captures(other)
                .and_then(|caps| caps.get(1))
                .map(|project| DriverKind::CloudManaged {
                    project_id: project.as_str().to_string(),
                }),
        }
    }

    pub fn into_driver(self) -> Box<dyn ClusterDriver> {
        match self {
            DriverKind::LocalDesktop => Box::new(local::LocalDriver),
            DriverKind::MinikubeVm => Box::new(minikube::MinikubeDriver),
            DriverKind::CloudManaged { project_id } => Box::new(cloud::CloudDriver::new(project_id)),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::LocalDesktop => f.write_str("docker desktop"),
            DriverKind::MinikubeVm => f.write_str("minikube"),
            DriverKind::CloudManaged { project_id } => write!(f, "GKE (project {})", project_id),
        }
    }
}

/// Derive the backend from the current kubectl context
///
/// minikube does not set a context while its VM is down, so an
/// unrecognized context falls back to probing for the minikube executable.
pub async fn select_driver(ctx: &Context) -> Result<DriverKind, DriverError> {
    let current = ctx
        .runner
        .run(
            Invocation::new(KUBECTL)
                .args(["config", "current-context"])
                .capture_output()
                .allow_failure(),
        )
        .await?;
    let context = current.stdout.unwrap_or_default().trim().to_string();

    let kind = match DriverKind::from_context_name(&context) {
        Some(kind) => kind,
        None => {
            let probe = best_effort(
                "minikube probe",
                ctx.runner.run(
                    Invocation::new(MINIKUBE)
                        .arg("version")
                        .capture_output()
                        .allow_failure(),
                ),
            )
            .await;

            if probe.is_some_and(|result| result.success()) {
                DriverKind::MinikubeVm
            } else {
                return Err(DriverError::Selection { context });
            }
        }
    };

    info!(context = %context, driver = %kind, "using the {} driver", kind);
    Ok(kind)
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod tests;
