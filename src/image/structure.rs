use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use walkdir::WalkDir;

use crate::metadata::TimeMetadata;

use super::block_device::BlockDevice;
use super::inode_editor::InodeEditor;

/// An image held in memory: a map from image-relative path to inode timestamps.
///
/// Mounting lends a real directory to the image. On unmount the tree under that directory
/// becomes the image's content, with whatever timestamps extraction left behind, and the
/// directory is emptied again.
#[derive(Default)]
pub struct StructImage {
    entries: BTreeMap<PathBuf, TimeMetadata>,
    size: Option<u64>,
    formatted: bool,
    attached: bool,
    mount_dir: Option<PathBuf>,
    /// Paths whose inodes reject writes.
    unwritable: HashSet<PathBuf>,
    /// The number of batched inode writes applied so far.
    pub writes: usize,
}

impl StructImage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An attached, unmounted image that already holds `entries`.
    #[must_use]
    pub fn with_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, TimeMetadata)>,
        P: Into<PathBuf>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(path, times)| (path.into(), times))
                .collect(),
            size: Some(0),
            formatted: true,
            attached: true,
            ..Self::default()
        }
    }

    /// Makes every write to `path` fail.
    pub fn reject_writes(&mut self, path: impl Into<PathBuf>) {
        self.unwritable.insert(path.into());
    }

    pub fn times(&self, path: impl AsRef<Path>) -> Option<TimeMetadata> {
        self.entries.get(path.as_ref()).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_dir.is_some()
    }

    /// Reads the tree under `dir` into entries keyed by image-relative path.
    fn scan(dir: &Path) -> Result<BTreeMap<PathBuf, TimeMetadata>> {
        let mut entries = BTreeMap::new();

        for entry in WalkDir::new(dir) {
            let entry = entry.context("scanning mounted tree")?;
            let metadata = entry.metadata().context("reading extracted metadata")?;

            let relative = entry
                .path()
                .strip_prefix(dir)
                .context("entry outside mounted tree")?
                .to_owned();

            entries.insert(
                relative,
                TimeMetadata {
                    ctime: metadata.ctime(),
                    mtime: metadata.mtime(),
                    atime: metadata.atime(),
                    crtime: metadata.ctime(),
                },
            );
        }

        Ok(entries)
    }

    fn clear(dir: &Path) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if path.is_dir() && !path.is_symlink() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }

        Ok(())
    }
}

impl BlockDevice for StructImage {
    fn create(&mut self, size: u64) -> Result<()> {
        ensure!(size > 0, "image size must be positive");

        *self = Self {
            size: Some(size),
            unwritable: std::mem::take(&mut self.unwritable),
            ..Self::default()
        };
        Ok(())
    }

    fn format(&mut self) -> Result<()> {
        ensure!(self.size.is_some(), "image has not been created");

        self.entries = BTreeMap::from([(PathBuf::new(), TimeMetadata::default())]);
        self.formatted = true;
        Ok(())
    }

    fn attach(&mut self) -> Result<()> {
        ensure!(self.formatted, "image has not been formatted");

        self.attached = true;
        Ok(())
    }

    fn mount(&mut self, dir: &Path) -> Result<()> {
        ensure!(self.attached, "image is not attached");
        ensure!(self.mount_dir.is_none(), "image is already mounted");
        ensure!(dir.is_dir(), "mount point {} does not exist", dir.display());

        self.mount_dir = Some(dir.to_owned());
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        if let Some(dir) = self.mount_dir.take() {
            self.entries = Self::scan(&dir)?;
            Self::clear(&dir)?;
        }

        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        ensure!(self.mount_dir.is_none(), "image is still mounted");

        self.attached = false;
        Ok(())
    }

    fn open_editor(&mut self) -> Result<Box<dyn InodeEditor + '_>> {
        ensure!(self.attached, "image is not attached");
        ensure!(
            self.mount_dir.is_none(),
            "image must be unmounted before editing inodes"
        );

        Ok(Box::new(self))
    }
}

impl InodeEditor for StructImage {
    fn contains(&mut self, path: &Path) -> Result<bool> {
        Ok(self.entries.contains_key(path))
    }

    fn stat(&mut self, path: &Path) -> Result<Option<String>> {
        Ok(self.entries.get(path).map(|times| {
            format!(
                "/{}\n ctime: {}\n mtime: {}\n atime: {}\ncrtime: {}\n",
                path.display(),
                times.ctime,
                times.mtime,
                times.atime,
                times.crtime
            )
        }))
    }

    fn write_times(&mut self, path: &Path, times: &TimeMetadata) -> Result<()> {
        ensure!(self.mount_dir.is_none(), "image is mounted");

        if self.unwritable.contains(path) {
            bail!("inode for /{} is not writable", path.display());
        }

        let Some(entry) = self.entries.get_mut(path) else {
            bail!("no inode at /{}", path.display());
        };

        // the on-disk encoding must accept every field
        times.encode()?;

        *entry = *times;
        self.writes += 1;
        Ok(())
    }
}
