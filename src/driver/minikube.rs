//! Minikube driver
//!
//! The VM is destroyed and recreated on every reset. Images are loaded
//! straight into the VM's container runtime instead of a registry.

use super::{ClusterDriver, DriverError, MINIKUBE, PACHCTL};
use crate::context::Context;
use crate::process::{wait_for_success, Invocation};
use async_trait::async_trait;
use tracing::info;

/// NodePort the platform daemon is exposed on
pub const PACHD_NODE_PORT: u16 = 30650;

pub struct MinikubeDriver;

#[async_trait]
impl ClusterDriver for MinikubeDriver {
    fn name(&self) -> &'static str {
        "minikube"
    }

    async fn clear(&self, ctx: &Context) -> Result<(), DriverError> {
        ctx.runner.run(Invocation::new(MINIKUBE).arg("delete")).await?;
        Ok(())
    }

    async fn start(&self, ctx: &Context) -> Result<(), DriverError> {
        ctx.runner.run(Invocation::new(MINIKUBE).arg("start")).await?;

        wait_for_success(
            &ctx.runner,
            Invocation::new(MINIKUBE).arg("status"),
            ctx.config.poll_interval,
            "Waiting for minikube to come up...",
        )
        .await?;

        info!("minikube is up");
        Ok(())
    }

    async fn push_image(&self, ctx: &Context, image: &str) -> Result<(), DriverError> {
        let script = ctx.config.minikube_push_script.to_string_lossy().into_owned();
        ctx.runner.run(Invocation::new(script).arg(image)).await?;
        Ok(())
    }

    async fn update_config(&self, ctx: &Context) -> Result<(), DriverError> {
        let ip = ctx
            .runner
            .capture(Invocation::new(MINIKUBE).arg("ip"))
            .await?
            .trim()
            .to_string();

        ctx.runner
            .run(Invocation::new(PACHCTL).args([
                "config".to_string(),
                "update".to_string(),
                "context".to_string(),
                format!("--pachd-address={}:{}", ip, PACHD_NODE_PORT),
            ]))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeBackend;

    #[test]
    fn test_minikube_driver_name() {
        assert_eq!(MinikubeDriver.name(), "minikube");
    }

    #[tokio::test]
    async fn test_clear_deletes_vm_only() {
        let backend = FakeBackend::new();
        let ctx = Context::new_mock(backend.clone());

        MinikubeDriver.clear(&ctx).await.expect("clear");

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argv, vec!["minikube", "delete"]);
    }

    #[tokio::test]
    async fn test_clear_ignores_missing_deployment() {
        // An undeploy failure must not matter; minikube never runs it
        let backend = FakeBackend::new();
        backend.respond(&["pachctl", "undeploy"], 1, "");
        let ctx = Context::new_mock(backend.clone());

        assert!(MinikubeDriver.clear(&ctx).await.is_ok());
        assert!(!backend.was_called(&["pachctl", "undeploy"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_waits_for_status() {
        // ARRANGE: VM reports unhealthy twice before coming up
        let backend = FakeBackend::new();
        backend.respond_sequence(&["minikube", "status"], &[(7, ""), (7, ""), (0, "Running")]);
        let ctx = Context::new_mock(backend.clone());

        // ACT
        MinikubeDriver.start(&ctx).await.expect("start");

        // ASSERT: booted once, then polled until healthy
        assert_eq!(backend.positions(&["minikube", "start"]), vec![0]);
        assert_eq!(backend.count(&["minikube", "status"]), 3);
    }

    #[tokio::test]
    async fn test_start_fails_when_boot_fails() {
        let backend = FakeBackend::new();
        backend.respond(&["minikube", "start"], 1, "");
        let ctx = Context::new_mock(backend.clone());

        let result = MinikubeDriver.start(&ctx).await;

        assert!(matches!(result, Err(DriverError::Process(_))));
        assert!(!backend.was_called(&["minikube", "status"]));
    }

    #[tokio::test]
    async fn test_push_image_uses_helper_script() {
        let backend = FakeBackend::new();
        let ctx = Context::new_mock(backend.clone());

        MinikubeDriver
            .push_image(&ctx, "pachyderm/worker:local")
            .await
            .expect("push");

        assert_eq!(
            backend.calls()[0].argv,
            vec!["./etc/kube/push-to-minikube.sh", "pachyderm/worker:local"]
        );
    }

    #[tokio::test]
    async fn test_update_config_points_client_at_vm() {
        let backend = FakeBackend::new();
        backend.respond(&["minikube", "ip"], 0, "192.168.49.2\n");
        let ctx = Context::new_mock(backend.clone());

        MinikubeDriver.update_config(&ctx).await.expect("update config");

        let calls = backend.calls();
        assert_eq!(
            calls[1].argv,
            vec![
                "pachctl",
                "config",
                "update",
                "context",
                "--pachd-address=192.168.49.2:30650"
            ]
        );
    }

    #[tokio::test]
    async fn test_manifest_uses_fresh_host_path() {
        let backend = FakeBackend::new();
        backend.respond(&["pachctl", "deploy"], 0, "{}");
        let ctx = Context::new_mock(backend.clone());

        MinikubeDriver.create_manifest(&ctx, false).await.expect("manifest");
        MinikubeDriver.create_manifest(&ctx, false).await.expect("manifest");

        let calls = backend.calls();
        let host_path = |i: usize| {
            let argv = &calls[i].argv;
            let at = argv.iter().position(|a| a == "--host-path").expect("host path flag");
            argv[at + 1].clone()
        };
        assert!(host_path(0).starts_with("/var/pachyderm-"));
        assert_ne!(host_path(0), host_path(1));
        assert_eq!(calls[0].argv.last().map(String::as_str), Some("--no-dashboard"));
    }
}
