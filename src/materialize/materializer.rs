use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

/// Produces a flat archive of the source's content and extracts it into a directory.
pub trait Materializer {
    /// Writes the source filesystem to `archive` as a tar stream.
    fn export(&self, archive: &Path) -> Result<()>;

    /// Extracts `archive` into `dest`, which becomes the image's content.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file =
            File::open(archive).with_context(|| format!("opening {}", archive.display()))?;

        let entries = unpack_tar(BufReader::new(file), dest)?;
        info!("extracted {entries} archive entries into {}", dest.display());

        Ok(())
    }
}

/// Unpacks a tar stream into `dest`, keeping permissions, ownership and extended attributes.
///
/// Ownership can only be restored with root privileges, so it is kept only when running as
/// root. Returns the number of entries unpacked.
pub fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_ownerships(running_as_root());
    archive.set_unpack_xattrs(true);

    let mut count = 0;
    for entry in archive
        .entries()
        .with_context(|| format!("failed to extract archive to {}", dest.display()))?
    {
        let mut entry =
            entry.with_context(|| format!("failed to extract archive to {}", dest.display()))?;

        entry.unpack_in(dest).with_context(|| {
            format!(
                "failed to extract {} to {}",
                entry.path().unwrap_or_default().display(),
                dest.display()
            )
        })?;
        count += 1;
    }

    Ok(count)
}

pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use crate::testing::DirectoryMaterializer;

    use super::*;

    #[test]
    fn test_export_and_extract() {
        let source = tempfile::tempdir().unwrap();
        fs::create_dir_all(source.path().join("etc/ssl")).unwrap();
        fs::write(source.path().join("etc/hostname"), "web-1\n").unwrap();
        std::os::unix::fs::symlink("hostname", source.path().join("etc/name")).unwrap();

        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("container.tar");
        let dest = out.path().join("mnt");
        fs::create_dir(&dest).unwrap();

        let materializer = DirectoryMaterializer(source.path().to_owned());
        materializer.export(&archive).unwrap();
        materializer.extract(&archive, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("etc/hostname")).unwrap(), "web-1\n");
        assert!(dest.join("etc/ssl").is_dir());
        assert_eq!(
            fs::read_link(dest.join("etc/name")).unwrap(),
            PathBuf::from("hostname")
        );
    }

    #[test]
    fn test_extract_missing_archive() {
        let out = tempfile::tempdir().unwrap();
        let materializer = DirectoryMaterializer(out.path().to_owned());

        assert!(materializer
            .extract(&out.path().join("absent.tar"), out.path())
            .is_err());
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("container.tar");
        fs::write(&archive, vec![0xab; 1024]).unwrap();

        let materializer = DirectoryMaterializer(out.path().to_owned());
        assert!(materializer.extract(&archive, out.path()).is_err());
    }
}
