use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::export::TimestampExporter;
use crate::image::{BlockDevice, LoopImage};
use crate::materialize::{running_as_root, DockerExport, Materializer};
use crate::offset::calculate_offset;
use crate::record::{read_records, write_records, ClockOffset, TimestampRecord};
use crate::restore::{RestoreSummary, TimestampRestorer};
use crate::source::{DockerSource, SourceEnvironment};
use crate::verify::Verification;

/// What a completed run did, written to `report.json`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub source: String,
    pub offset_seconds: i64,
    pub exported: usize,
    pub unreadable: usize,
    pub excluded: usize,
    pub restore: RestoreSummary,
    pub verification: Verification,
}

/// The five stages wired together over injected collaborators.
pub struct Pipeline<S, M, D> {
    config: RunConfig,
    source: S,
    materializer: M,
    device: D,
}

impl<S, M, D> Pipeline<S, M, D>
where
    S: SourceEnvironment,
    M: Materializer,
    D: BlockDevice,
{
    #[must_use]
    pub fn new(config: RunConfig, source: S, materializer: M, device: D) -> Self {
        Self {
            config,
            source,
            materializer,
            device,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Runs every stage in order. Stages are sequential; each consumes the previous one's
    /// artifact.
    pub fn run(&mut self) -> Result<RunReport> {
        self.prepare().map_err(PipelineError::ImageProvisioning)?;

        let offset = calculate_offset(&self.source).map_err(PipelineError::SourceUnavailable)?;

        let export = TimestampExporter::new(self.config.excludes.iter().cloned())
            .export(&self.source)
            .map_err(PipelineError::SourceUnavailable)?;
        write_records(&self.config.records_path(), &export.records)
            .map_err(PipelineError::RecordList)?;

        self.provision().map_err(PipelineError::ImageProvisioning)?;
        self.materialize().map_err(PipelineError::Materialization)?;
        self.device
            .unmount()
            .map_err(PipelineError::ImageProvisioning)?;

        let records =
            read_records(&self.config.records_path()).map_err(PipelineError::RecordList)?;
        let (restore, verification) = self.restore(&records, offset)?;

        if let Err(err) = self.device.detach() {
            warn!("unable to detach the image: {err:#}");
        }
        self.cleanup();

        let report = RunReport {
            source: self.config.source.clone(),
            offset_seconds: offset.seconds(),
            exported: export.records.len(),
            unreadable: export.skipped,
            excluded: export.excluded,
            restore,
            verification,
        };

        if let Err(err) = write_report(&self.config.report_path(), &report) {
            warn!("unable to write run report: {err:#}");
        }

        if restore.nothing_restored() {
            warn!("no timestamps were restored: {restore}");
        } else {
            info!("timestamp restoration finished: {restore}");
        }

        Ok(report)
    }

    /// Clears what an earlier run left behind so the run starts from a clean slate.
    fn prepare(&mut self) -> Result<()> {
        let mount_dir = self.config.mount_dir();

        fs::create_dir_all(&self.config.output)
            .with_context(|| format!("creating {}", self.config.output.display()))?;
        self.device.release_stale(&mount_dir)?;

        for artifact in self.config.artifacts() {
            if artifact.exists() {
                fs::remove_file(&artifact)
                    .with_context(|| format!("removing {}", artifact.display()))?;
            }
        }

        if mount_dir.exists() {
            fs::remove_dir(&mount_dir).with_context(|| {
                format!("mount point {} is not empty", mount_dir.display())
            })?;
        }
        fs::create_dir(&mount_dir)
            .with_context(|| format!("creating {}", mount_dir.display()))?;

        Ok(())
    }

    fn provision(&mut self) -> Result<()> {
        self.device.create(self.config.image_size)?;
        self.device.format()?;
        self.device.attach()?;
        self.device.mount(&self.config.mount_dir())
    }

    fn materialize(&mut self) -> Result<()> {
        let archive = self.config.archive_path();

        self.materializer.export(&archive)?;
        self.materializer.extract(&archive, &self.config.mount_dir())
    }

    fn restore(
        &mut self,
        records: &[TimestampRecord],
        offset: ClockOffset,
    ) -> Result<(RestoreSummary, Verification)> {
        let mut editor = self
            .device
            .open_editor()
            .map_err(PipelineError::ImageProvisioning)?;

        let mut verification = Verification::begin(&mut *editor, &self.config.verify_path);

        info!("restoring timestamps for {} records", records.len());
        let summary = TimestampRestorer::new(&mut *editor, offset).restore_all(records);

        verification.finish(&mut *editor);
        verification.report();

        Ok((summary, verification))
    }

    fn cleanup(&self) {
        if self.config.keep_mount {
            return;
        }

        let mount_dir = self.config.mount_dir();
        if let Err(err) = fs::remove_dir(&mount_dir) {
            warn!("unable to remove {}: {err}", mount_dir.display());
        }
    }
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report).context("serializing run report")?;
    Ok(())
}

/// Images a running Docker container into an ext4 image under the output directory.
pub fn image_container(config: RunConfig) -> Result<RunReport> {
    ensure!(
        running_as_root(),
        "attaching, mounting and editing the image requires root privileges"
    );

    let source =
        DockerSource::connect(&config.source).map_err(PipelineError::SourceUnavailable)?;
    let materializer = DockerExport::new(&config.source);
    let device = LoopImage::new(config.image_path());

    Pipeline::new(config, source, materializer, device).run()
}
