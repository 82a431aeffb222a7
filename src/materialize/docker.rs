use std::path::Path;
use std::process::Command;

use anyhow::Result;
use log::info;

use crate::command;

use super::materializer::Materializer;

/// Materializes a container's filesystem through `docker export`.
pub struct DockerExport {
    container: String,
}

impl DockerExport {
    #[must_use]
    pub fn new(container: &str) -> Self {
        Self {
            container: container.to_owned(),
        }
    }
}

impl Materializer for DockerExport {
    fn export(&self, archive: &Path) -> Result<()> {
        command::run_checked(
            Command::new("docker")
                .arg("export")
                .arg("--output")
                .arg(archive)
                .arg(&self.container),
        )?;

        info!("exported {} to {}", self.container, archive.display());
        Ok(())
    }
}
