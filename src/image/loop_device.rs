use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, ensure, Context, Result};
use log::{info, warn};

use crate::command;

use super::block_device::BlockDevice;
use super::debugfs::Debugfs;
use super::inode_editor::InodeEditor;

/// The smallest image mkfs.ext4 formats without complaint.
pub const MIN_IMAGE_SIZE: u64 = 1 << 20;

/// A sparse image file formatted as ext4 and attached to a loop device.
///
/// Whatever is still mounted or attached when the value is dropped is released, so an aborted
/// run does not leave the loop device behind.
pub struct LoopImage {
    image: PathBuf,
    device: Option<PathBuf>,
    mount_dir: Option<PathBuf>,
}

impl LoopImage {
    #[must_use]
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            device: None,
            mount_dir: None,
        }
    }

    /// The loop device the image is attached to, if any.
    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }

    fn attached_device(&self) -> Result<&Path> {
        self.device()
            .ok_or_else(|| anyhow!("{} is not attached", self.image.display()))
    }
}

impl BlockDevice for LoopImage {
    fn release_stale(&mut self, mount_dir: &Path) -> Result<()> {
        if mount_dir.is_dir() {
            // not being mounted is the expected case
            let _ = command::capture(Command::new("umount").arg(mount_dir));
        }

        if !self.image.exists() {
            return Ok(());
        }

        let listing = command::run_checked(Command::new("losetup").arg("-j").arg(&self.image))?;

        for device in stale_devices(&listing) {
            warn!("detaching stale loop device {device}");
            command::run_checked(Command::new("losetup").args(["-d", device]))?;
        }

        Ok(())
    }

    fn create(&mut self, size: u64) -> Result<()> {
        ensure!(
            size >= MIN_IMAGE_SIZE,
            "image size {size} is below the minimum of {MIN_IMAGE_SIZE} bytes"
        );

        let file = File::create(&self.image)
            .with_context(|| format!("creating {}", self.image.display()))?;
        file.set_len(size)
            .with_context(|| format!("sizing {} to {size} bytes", self.image.display()))?;

        info!("created {} ({size} bytes)", self.image.display());
        Ok(())
    }

    fn format(&mut self) -> Result<()> {
        // 256-byte inodes carry the crtime field and extra epoch bits
        command::run_checked(
            Command::new("mkfs.ext4")
                .args(["-q", "-F", "-I", "256"])
                .arg(&self.image),
        )?;

        info!("formatted {} as ext4", self.image.display());
        Ok(())
    }

    fn attach(&mut self) -> Result<()> {
        let device = command::run_checked(
            Command::new("losetup")
                .args(["--find", "--show"])
                .arg(&self.image),
        )?;

        let device = PathBuf::from(device.trim());
        info!("attached {} to {}", self.image.display(), device.display());

        self.device = Some(device);
        Ok(())
    }

    fn mount(&mut self, dir: &Path) -> Result<()> {
        let device = self.attached_device()?;
        command::run_checked(Command::new("mount").arg(device).arg(dir))?;

        info!("mounted {} at {}", device.display(), dir.display());

        self.mount_dir = Some(dir.to_owned());
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        if let Some(dir) = &self.mount_dir {
            command::run_checked(Command::new("umount").arg(dir))?;
            info!("unmounted {}", dir.display());
        }

        self.mount_dir = None;
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        if let Some(device) = &self.device {
            command::run_checked(Command::new("losetup").arg("-d").arg(device))?;
            info!("detached {}", device.display());
        }

        self.device = None;
        Ok(())
    }

    fn open_editor(&mut self) -> Result<Box<dyn InodeEditor + '_>> {
        ensure!(
            self.mount_dir.is_none(),
            "image must be unmounted before editing inodes"
        );

        Ok(Box::new(Debugfs::open(self.attached_device()?)?))
    }
}

impl Drop for LoopImage {
    fn drop(&mut self) {
        if let Err(err) = self.unmount() {
            warn!("leaving image mounted: {err:#}");
            // detaching a mounted device only marks it for autoclear
        }

        if let Err(err) = self.detach() {
            warn!("leaving loop device attached: {err:#}");
        }
    }
}

/// Loop devices named in `losetup -j` output, e.g. `/dev/loop3: [2049]:131 (/out/disk.img)`.
fn stale_devices(listing: &str) -> impl Iterator<Item = &str> {
    listing
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(device, _)| device.trim())
        .filter(|device| !device.is_empty())
}
