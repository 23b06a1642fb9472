use anyhow::{Context, Result};
use bollard::Docker;

/// Thin handle on the Docker daemon, used to verify it is reachable before
/// compose is invoked.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect to the local daemon and ping it.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Cannot reach the Docker daemon. Is Docker running?")?;

        docker
            .ping()
            .await
            .context("Docker daemon did not answer a ping")?;

        Ok(Self { docker })
    }

    /// Daemon version string, for diagnostics.
    pub async fn server_version(&self) -> Option<String> {
        self.docker.version().await.ok().and_then(|v| v.version)
    }
}
