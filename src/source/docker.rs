use std::process::Command;

use anyhow::{bail, Result};
use log::info;

use crate::command::{self, Captured};

use super::environment::SourceEnvironment;

/// A running Docker container, queried through `docker exec`.
pub struct DockerSource {
    container: String,
}

impl DockerSource {
    /// Connects to `container`, failing unless it exists and is running.
    pub fn connect(container: &str) -> Result<Self> {
        let state = command::run_checked(Command::new("docker").args([
            "inspect",
            "--format",
            "{{.State.Running}}",
            container,
        ]))?;

        if state.trim() != "true" {
            bail!("container {container} is not running");
        }

        info!("connected to running container {container}");

        Ok(Self {
            container: container.to_owned(),
        })
    }
}

impl SourceEnvironment for DockerSource {
    fn run(&self, args: &[&str]) -> Result<Captured> {
        command::capture(
            Command::new("docker")
                .arg("exec")
                .arg(&self.container)
                .args(args),
        )
    }
}
