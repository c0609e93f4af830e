use crate::config::Config;
use crate::process::ProcessRunner;

/// Read-only state shared by the driver and every pipeline stage
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub runner: ProcessRunner,
}

impl Context {
    pub fn new(config: Config, runner: ProcessRunner) -> Self {
        Context { config, runner }
    }

    /// Context over a recording fake backend, with test defaults
    #[cfg(test)]
    pub fn new_mock(backend: std::sync::Arc<crate::process::fake::FakeBackend>) -> Self {
        let config = Config {
            build_root: "/home/dev/go".into(),
            docker_config_path: "/home/dev/.docker/config.json".into(),
            poll_interval: std::time::Duration::from_secs(1),
            minikube_push_script: "./etc/kube/push-to-minikube.sh".into(),
        };
        Context::new(config, ProcessRunner::with_backend(backend))
    }
}
