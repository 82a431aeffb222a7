use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::image::InodeEditor;
use crate::metadata::TimeMetadata;
use crate::record::{ClockOffset, TimestampRecord};

/// What happened to one record during restoration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// All four timestamps were written.
    Applied,
    /// The image has no entry at the record's path.
    SkippedMissing,
    /// The entry exists but its inode could not be read or written.
    Failed(String),
}

/// Aggregated outcomes of a restoration pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub applied: usize,
    pub skipped_missing: usize,
    pub failed: usize,
}

impl RestoreSummary {
    pub fn record(&mut self, outcome: &RestoreOutcome) {
        match outcome {
            RestoreOutcome::Applied => self.applied += 1,
            RestoreOutcome::SkippedMissing => self.skipped_missing += 1,
            RestoreOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.applied + self.skipped_missing + self.failed
    }

    /// True when records were offered but none of them could be applied.
    pub fn nothing_restored(&self) -> bool {
        self.applied == 0 && self.total() > 0
    }
}

impl fmt::Display for RestoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} restored, {} not in image, {} failed",
            self.applied, self.skipped_missing, self.failed
        )
    }
}

/// The UTC timestamps an inode should carry for `record`.
///
/// A record without a birth time gets its adjusted change time as birth time.
pub fn adjust(record: &TimestampRecord, offset: ClockOffset) -> TimeMetadata {
    let ctime = offset.to_utc(record.ctime);

    TimeMetadata {
        ctime,
        mtime: offset.to_utc(record.mtime),
        atime: offset.to_utc(record.atime),
        crtime: if record.has_birth_time() {
            offset.to_utc(record.crtime)
        } else {
            ctime
        },
    }
}

/// Applies exported timestamps to the inodes of an unmounted image.
pub struct TimestampRestorer<E> {
    editor: E,
    offset: ClockOffset,
}

impl<E: InodeEditor> TimestampRestorer<E> {
    #[must_use]
    pub fn new(editor: E, offset: ClockOffset) -> Self {
        Self { editor, offset }
    }

    /// Restores one record. Never fails: problems with a single entry become its outcome.
    pub fn restore(&mut self, record: &TimestampRecord) -> RestoreOutcome {
        let path = record.image_path();

        match self.editor.contains(path) {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} is not in the image, skipping", record.path.display());
                return RestoreOutcome::SkippedMissing;
            }
            Err(err) => {
                warn!("unable to read inode for {}: {err:#}", record.path.display());
                return RestoreOutcome::Failed(format!("{err:#}"));
            }
        }

        let times = adjust(record, self.offset);

        match self.editor.write_times(path, &times) {
            Ok(()) => RestoreOutcome::Applied,
            Err(err) => {
                warn!("unable to write inode for {}: {err:#}", record.path.display());
                RestoreOutcome::Failed(format!("{err:#}"))
            }
        }
    }

    /// Restores every record in list order.
    pub fn restore_all(&mut self, records: &[TimestampRecord]) -> RestoreSummary {
        let mut summary = RestoreSummary::default();

        for (i, record) in records.iter().enumerate() {
            summary.record(&self.restore(record));

            if (i + 1) % 10_000 == 0 {
                info!("processed {} of {} records", i + 1, records.len());
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    use crate::image::StructImage;

    use super::*;

    const EXTRACTED: TimeMetadata = TimeMetadata {
        ctime: 1_800_000_000,
        mtime: 1_800_000_000,
        atime: 1_800_000_000,
        crtime: 1_800_000_000,
    };

    fn record(path: &str, ctime: i64, mtime: i64, atime: i64, crtime: i64) -> TimestampRecord {
        TimestampRecord {
            path: PathBuf::from(path),
            ctime,
            mtime,
            atime,
            crtime,
        }
    }

    #[test]
    fn test_offset_correction() {
        let times = adjust(
            &record("/a", 1_000_018_000, 1_000_018_000, 1_000_018_000, 1_000_018_000),
            ClockOffset(18000),
        );

        assert_eq!(times.mtime, 1_000_000_000);
        assert_eq!(times.crtime, 1_000_000_000);
    }

    #[test]
    fn test_crtime_fallback() {
        let times = adjust(&record("/a", 1_700_000_000, 5, 6, 0), ClockOffset(0));
        assert_eq!(times.crtime, 1_700_000_000);

        let times = adjust(&record("/a", 1_700_003_600, 5, 6, 0), ClockOffset(3600));
        assert_eq!(times.crtime, 1_700_000_000);
        assert_eq!(times.crtime, times.ctime);
    }

    #[test]
    fn test_restore_writes_image() {
        let mut image = StructImage::with_entries([("", EXTRACTED), ("etc/hostname", EXTRACTED)]);
        let records = [
            record("/", 1_700_018_000, 1_700_018_001, 1_700_018_002, 0),
            record("/etc/hostname", 1_000_018_000, 1_000_018_000, 1_000_018_500, 999_018_000),
        ];

        let summary = TimestampRestorer::new(&mut image, ClockOffset(18000)).restore_all(&records);

        assert_eq!(
            summary,
            RestoreSummary {
                applied: 2,
                skipped_missing: 0,
                failed: 0
            }
        );
        assert_eq!(
            image.times(""),
            Some(TimeMetadata {
                ctime: 1_700_000_000,
                mtime: 1_700_000_001,
                atime: 1_700_000_002,
                crtime: 1_700_000_000,
            })
        );
        assert_eq!(
            image.times("etc/hostname"),
            Some(TimeMetadata {
                ctime: 1_000_000_000,
                mtime: 1_000_000_000,
                atime: 1_000_000_500,
                crtime: 999_000_000,
            })
        );
    }

    #[test]
    fn test_missing_entries_are_skipped() {
        let mut image = StructImage::with_entries([("etc", EXTRACTED)]);
        let records = [
            record("/proc/1/status", 1, 2, 3, 0),
            record("/etc", 10, 20, 30, 0),
        ];

        let mut restorer = TimestampRestorer::new(&mut image, ClockOffset(0));
        assert_eq!(restorer.restore(&records[0]), RestoreOutcome::SkippedMissing);

        let summary = restorer.restore_all(&records);
        assert_eq!(summary.skipped_missing, 1);
        assert_eq!(summary.applied, 1);
        assert!(!summary.nothing_restored());
        assert!(!image.contains(Path::new("proc/1/status")).unwrap());
    }

    #[test]
    fn test_write_failure_does_not_stop_pass() {
        let mut image = StructImage::with_entries([("a", EXTRACTED), ("b", EXTRACTED)]);
        image.reject_writes("a");

        let records = [record("/a", 1, 1, 1, 1), record("/b", 2, 2, 2, 2)];
        let summary = TimestampRestorer::new(&mut image, ClockOffset(0)).restore_all(&records);

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(image.times("a"), Some(EXTRACTED));
        assert_eq!(image.times("b").unwrap().mtime, 2);
    }

    #[test]
    fn test_unencodable_timestamp_fails_entry() {
        let mut image = StructImage::with_entries([("a", EXTRACTED)]);
        let mut restorer = TimestampRestorer::new(&mut image, ClockOffset(0));

        let outcome = restorer.restore(&record("/a", i64::MAX, 0, 0, 0));
        assert!(matches!(outcome, RestoreOutcome::Failed(_)));
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let mut image = StructImage::with_entries([("", EXTRACTED), ("a", EXTRACTED), ("b", EXTRACTED)]);
        let records = [
            record("/", 100, 200, 300, 0),
            record("/a", 400, 500, 600, 350),
            record("/missing", 1, 2, 3, 4),
        ];

        let first = TimestampRestorer::new(&mut image, ClockOffset(-60)).restore_all(&records);
        let after_first = image.paths().map(|p| image.times(p)).collect::<Vec<_>>();

        let second = TimestampRestorer::new(&mut image, ClockOffset(-60)).restore_all(&records);
        let after_second = image.paths().map(|p| image.times(p)).collect::<Vec<_>>();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert_eq!(image.times("a").unwrap().crtime, 410);
        assert_eq!(image.times("b"), Some(EXTRACTED));
    }

    #[test]
    fn test_non_utf8_path_is_applied() {
        let name = OsStr::from_bytes(b"caf\xe9");
        let mut image = StructImage::with_entries([(name, EXTRACTED)]);
        let cafe = TimestampRecord {
            path: Path::new("/").join(name),
            ..record("/", 10, 20, 30, 0)
        };

        let summary = TimestampRestorer::new(&mut image, ClockOffset(0)).restore_all(&[cafe]);

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.skipped_missing, 0);
        assert_eq!(image.times(name).unwrap().mtime, 20);
    }

    #[test]
    fn test_nothing_restored() {
        let mut image = StructImage::with_entries([("a", EXTRACTED)]);
        let summary = TimestampRestorer::new(&mut image, ClockOffset(0))
            .restore_all(&[record("/x", 1, 1, 1, 1)]);

        assert!(summary.nothing_restored());
        assert!(!RestoreSummary::default().nothing_restored());
        assert_eq!(summary.to_string(), "0 restored, 1 not in image, 0 failed");
    }
}
