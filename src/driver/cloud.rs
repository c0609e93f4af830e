//! GKE driver
//!
//! Cloud nodes cannot see images on the developer's machine. Images are
//! re-tagged into the project's GCR registry and pushed there, and the
//! cluster pulls them with a secret built from the local docker
//! credentials.

use super::{clear_deployment, deploy_dry_run, ClusterDriver, DriverError, DOCKER, KUBECTL};
use crate::context::Context;
use crate::process::{best_effort, Invocation};
use async_trait::async_trait;
use tracing::info;

/// Image pull secret created from the docker credentials
pub const PULL_SECRET_NAME: &str = "regcred";

/// Public registry whose prefix is replaced when re-rooting images
pub const PUBLIC_REGISTRY_PREFIX: &str = "quay.io/";

/// Registry for a GCP project
pub fn cloud_registry(project_id: &str) -> String {
    format!("gcr.io/{}", project_id)
}

/// Re-root an image reference at `registry`
///
/// `quay.io/coreos/etcd:v3.3.5` becomes `<registry>/coreos/etcd:v3.3.5`.
/// References from anywhere else keep their full path under `registry`.
pub fn rewrite_image_reference(image: &str, registry: &str) -> String {
    let path = image.strip_prefix(PUBLIC_REGISTRY_PREFIX).unwrap_or(image);
    format!("{}/{}", registry, path)
}

pub struct CloudDriver {
    project_id: String,
}

impl CloudDriver {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn registry(&self) -> String {
        cloud_registry(&self.project_id)
    }
}

#[async_trait]
impl ClusterDriver for CloudDriver {
    fn name(&self) -> &'static str {
        "gke"
    }

    async fn clear(&self, ctx: &Context) -> Result<(), DriverError> {
        clear_deployment(ctx).await?;

        // The secret only exists if a previous reset got far enough
        best_effort(
            "delete pull secret",
            ctx.runner.run(
                Invocation::new(KUBECTL).args(["delete", "secret", PULL_SECRET_NAME]),
            ),
        )
        .await;

        Ok(())
    }

    async fn create_manifest(
        &self,
        ctx: &Context,
        include_dashboard: bool,
    ) -> Result<String, DriverError> {
        let registry = self.registry();
        let invocation = deploy_dry_run(
            [
                "--image-pull-secret",
                PULL_SECRET_NAME,
                "--registry",
                registry.as_str(),
            ],
            include_dashboard,
        );
        Ok(ctx.runner.capture(invocation).await?)
    }

    async fn init_image_registry(&self, ctx: &Context) -> Result<(), DriverError> {
        let from_file = format!(
            "--from-file=.dockerconfigjson={}",
            ctx.config.docker_config_path.display()
        );

        ctx.runner
            .run(
                Invocation::new(KUBECTL)
                    .args(["create", "secret", "generic", PULL_SECRET_NAME])
                    .arg(from_file)
                    .arg("--type=kubernetes.io/dockerconfigjson"),
            )
            .await?;

        Ok(())
    }

    async fn push_image(&self, ctx: &Context, image: &str) -> Result<(), DriverError> {
        let target = rewrite_image_reference(image, &self.registry());
        info!(image = %image, target = %target, "pushing image to project registry");

        ctx.runner
            .run(Invocation::new(DOCKER).args(["tag", image, target.as_str()]))
            .await?;
        ctx.runner
            .run(Invocation::new(DOCKER).args(["push", target.as_str()]))
            .await?;

        Ok(())
    }
}
