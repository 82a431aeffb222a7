use std::path::Path;

use anyhow::Result;

use crate::metadata::TimeMetadata;

/// Direct access to inode metadata of an unmounted image.
///
/// Paths are image-relative: the source path without its leading separator, with an empty path
/// naming the root directory. They are passed through byte for byte.
pub trait InodeEditor {
    /// Whether an entry exists at `path`.
    fn contains(&mut self, path: &Path) -> Result<bool> {
        Ok(self.stat(path)?.is_some())
    }

    /// A human-readable snapshot of the entry's full metadata, or `None` if it does not exist.
    fn stat(&mut self, path: &Path) -> Result<Option<String>>;

    /// Writes all four timestamp fields of the entry in one batched edit.
    fn write_times(&mut self, path: &Path, times: &TimeMetadata) -> Result<()>;
}

impl<E: InodeEditor + ?Sized> InodeEditor for &mut E {
    fn contains(&mut self, path: &Path) -> Result<bool> {
        (**self).contains(path)
    }

    fn stat(&mut self, path: &Path) -> Result<Option<String>> {
        (**self).stat(path)
    }

    fn write_times(&mut self, path: &Path, times: &TimeMetadata) -> Result<()> {
        (**self).write_times(path, times)
    }
}
