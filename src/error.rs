use thiserror::Error;

/// A failure that aborts the run. Carried inside [`anyhow::Error`] and recovered by
/// downcasting to pick the process exit code.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source environment could not be reached or queried.
    #[error("source unavailable: {0:#}")]
    SourceUnavailable(anyhow::Error),

    /// Creating, formatting, attaching, mounting or opening the image failed.
    #[error("image provisioning failed: {0:#}")]
    ImageProvisioning(anyhow::Error),

    /// Exporting the source to an archive or extracting it into the image failed.
    #[error("materialization failed: {0:#}")]
    Materialization(anyhow::Error),

    /// The intermediate record list could not be written or read back.
    #[error("record list unusable: {0:#}")]
    RecordList(anyhow::Error),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::SourceUnavailable(_) => 2,
            PipelineError::ImageProvisioning(_) => 3,
            PipelineError::Materialization(_) => 4,
            PipelineError::RecordList(_) => 1,
        }
    }
}

/// The exit code for a failed run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .map_or(1, PipelineError::exit_code)
}
