use std::path::Path;

use anyhow::Result;

use super::inode_editor::InodeEditor;

/// A block-device-backed filesystem image, from creation to detachment.
///
/// Operations are called in pipeline order: [`create`](Self::create), [`format`](Self::format),
/// [`attach`](Self::attach), [`mount`](Self::mount), [`unmount`](Self::unmount),
/// [`open_editor`](Self::open_editor), [`detach`](Self::detach).
pub trait BlockDevice {
    /// Releases mounts and attachments an interrupted earlier run may have left behind.
    fn release_stale(&mut self, _mount_dir: &Path) -> Result<()> {
        Ok(())
    }

    /// Creates the backing store with a capacity of `size` bytes.
    fn create(&mut self, size: u64) -> Result<()>;

    /// Writes a fresh, empty filesystem.
    fn format(&mut self) -> Result<()>;

    fn attach(&mut self) -> Result<()>;

    fn mount(&mut self, dir: &Path) -> Result<()>;

    fn unmount(&mut self) -> Result<()>;

    fn detach(&mut self) -> Result<()>;

    /// Opens raw inode metadata access. The image must be attached and unmounted, since editing
    /// inodes under a mounted filesystem loses writes.
    fn open_editor(&mut self) -> Result<Box<dyn InodeEditor + '_>>;
}
