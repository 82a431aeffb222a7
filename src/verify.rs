use std::fmt;
use std::path::Path;

use log::warn;
use serde::Serialize;

use crate::image::InodeEditor;

/// The metadata of the designated entry at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Snapshot {
    Found(String),
    NotFound,
    /// The entry could not be read; the run goes on regardless.
    Unreadable(String),
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Found(metadata) => write!(f, "{}", metadata.trim_end()),
            Snapshot::NotFound => write!(f, "not found"),
            Snapshot::Unreadable(reason) => write!(f, "unreadable: {reason}"),
        }
    }
}

/// Snapshots of the designated entry taken around the restoration pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// The entry's path in the source namespace.
    pub path: String,
    pub before: Snapshot,
    pub after: Option<Snapshot>,
}

impl Verification {
    /// Takes the "before" snapshot.
    pub fn begin<E: InodeEditor + ?Sized>(editor: &mut E, path: &str) -> Self {
        Self {
            path: path.to_owned(),
            before: snapshot(editor, path),
            after: None,
        }
    }

    /// Takes the "after" snapshot.
    pub fn finish<E: InodeEditor + ?Sized>(&mut self, editor: &mut E) {
        self.after = Some(snapshot(editor, &self.path));
    }

    /// Prints both snapshots for the operator.
    pub fn report(&self) {
        println!("== {} before restoration ==\n{}", self.path, self.before);

        if let Some(after) = &self.after {
            println!("== {} after restoration ==\n{after}", self.path);
        }
    }
}

/// Reads the full metadata of `path` (a source path) from the image.
pub fn snapshot<E: InodeEditor + ?Sized>(editor: &mut E, path: &str) -> Snapshot {
    let relative = path.strip_prefix('/').unwrap_or(path);

    match editor.stat(Path::new(relative)) {
        Ok(Some(metadata)) => Snapshot::Found(metadata),
        Ok(None) => {
            warn!("verification path {path} does not exist in the image");
            Snapshot::NotFound
        }
        Err(err) => {
            warn!("unable to read verification path {path}: {err:#}");
            Snapshot::Unreadable(format!("{err:#}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::image::StructImage;
    use crate::metadata::TimeMetadata;

    use super::*;

    #[test]
    fn test_before_and_after() {
        let mut image = StructImage::with_entries([("etc/hostname", TimeMetadata::default())]);

        let mut verification = Verification::begin(&mut image, "/etc/hostname");
        image
            .write_times(
                Path::new("etc/hostname"),
                &TimeMetadata {
                    ctime: 1,
                    mtime: 2,
                    atime: 3,
                    crtime: 4,
                },
            )
            .unwrap();
        verification.finish(&mut image);

        let Snapshot::Found(before) = &verification.before else {
            panic!("expected a snapshot before restoration");
        };
        assert!(before.contains("mtime: 0"));

        let Some(Snapshot::Found(after)) = &verification.after else {
            panic!("expected a snapshot after restoration");
        };
        assert!(after.contains("mtime: 2"));
    }

    #[test]
    fn test_missing_path_is_soft() {
        let mut image = StructImage::with_entries([("", TimeMetadata::default())]);

        let mut verification = Verification::begin(&mut image, "/nope");
        verification.finish(&mut image);

        assert_eq!(verification.before, Snapshot::NotFound);
        assert_eq!(verification.after, Some(Snapshot::NotFound));
        assert_eq!(verification.before.to_string(), "not found");
    }

    #[test]
    fn test_snapshot_does_not_modify() {
        let mut image = StructImage::with_entries([("a", TimeMetadata::default())]);
        snapshot(&mut image, "/a");

        assert_eq!(image.writes, 0);
        assert_eq!(image.times("a"), Some(TimeMetadata::default()));
    }
}
