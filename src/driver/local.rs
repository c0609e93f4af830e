//! Docker Desktop driver
//!
//! The built-in Kubernetes shares the host's image store, so images built
//! locally are already visible to the cluster and every default applies.

use super::ClusterDriver;
use async_trait::async_trait;

pub struct LocalDriver;

#[async_trait]
impl ClusterDriver for LocalDriver {
    fn name(&self) -> &'static str {
        "docker-desktop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::process::fake::FakeBackend;

    #[tokio::test]
    async fn test_local_driver_hooks_are_noops() {
        let backend = FakeBackend::new();
        let ctx = Context::new_mock(backend.clone());
        let driver = LocalDriver;

        driver.start(&ctx).await.expect("start");
        driver.init_image_registry(&ctx).await.expect("init registry");
        driver
            .push_image(&ctx, "pachyderm/pachd:local")
            .await
            .expect("push");
        driver.update_config(&ctx).await.expect("update config");

        assert!(backend.calls().is_empty(), "no commands expected");
    }
}
