use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use log::{debug, info, warn};

use crate::record::{parse_epoch, TimestampRecord, FIELD_SEPARATOR};
use crate::source::SourceEnvironment;

/// The walk run inside the source: every entry on the root device, one
/// `path|ctime|mtime|atime|crtime` line each.
pub const WALK_COMMAND: [&str; 9] = [
    "find",
    "/",
    "-xdev",
    "-exec",
    "stat",
    "-c",
    "%n|%Z|%Y|%X|%W",
    "{}",
    "+",
];

/// Pseudo-filesystem roots that are never exported.
pub const DEFAULT_EXCLUDES: [&str; 3] = ["/proc", "/sys", "/dev"];

/// The result of one export pass.
#[derive(Debug, Default)]
pub struct Export {
    /// Records in walk order, with unique paths.
    pub records: Vec<TimestampRecord>,
    /// Entries that were dropped because their metadata line was unreadable.
    pub skipped: usize,
    /// Entries dropped because they lie under an excluded root.
    pub excluded: usize,
}

pub struct TimestampExporter {
    excludes: Vec<PathBuf>,
}

impl Default for TimestampExporter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDES.iter().copied())
    }
}

impl TimestampExporter {
    #[must_use]
    pub fn new<I, T>(excludes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PathBuf>,
    {
        Self {
            excludes: excludes.into_iter().map(Into::into).collect(),
        }
    }

    /// Walks the source and collects a record for every readable entry.
    ///
    /// A non-zero exit from the walk is tolerated, because `find` reports entries that vanished
    /// or could not be stat'd that way. Only failing to run the walk at all is an error.
    pub fn export<S: SourceEnvironment + ?Sized>(&self, source: &S) -> Result<Export> {
        let walk = source.run(&WALK_COMMAND)?;

        if !walk.success {
            warn!(
                "source walk reported errors, continuing with readable entries: {}",
                walk.stderr.lines().next().unwrap_or_default()
            );
        }

        let export = self.collect(&walk.stdout);
        info!(
            "exported {} records ({} unreadable, {} excluded)",
            export.records.len(),
            export.skipped,
            export.excluded
        );

        Ok(export)
    }

    /// Turns walk output into records, skipping what cannot be used.
    pub fn collect(&self, listing: &[u8]) -> Export {
        let mut export = Export::default();
        let mut seen = HashSet::new();

        for line in listing.split(|b| *b == b'\n').filter(|line| !line.is_empty()) {
            let record = match parse_stat_line(line) {
                Ok(record) => record,
                Err(err) => {
                    debug!(
                        "skipping unreadable entry \"{}\": {err:#}",
                        line.escape_ascii()
                    );
                    export.skipped += 1;
                    continue;
                }
            };

            if self.is_excluded(&record.path) {
                export.excluded += 1;
                continue;
            }

            if !seen.insert(record.path.clone()) {
                debug!("dropping duplicate record for {}", record.path.display());
                continue;
            }

            export.records.push(record);
        }

        export
    }

    /// Whether `path` is an excluded root or lies beneath one.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.excludes.iter().any(|root| path.starts_with(root))
    }
}

/// Parses one line of walk output.
///
/// Birth time is the one field some `stat` implementations cannot report; anything other than a
/// positive number there means "no birth time".
fn parse_stat_line(line: &[u8]) -> Result<TimestampRecord> {
    let Some(split) = line.iter().rposition(|b| *b == FIELD_SEPARATOR) else {
        bail!("missing fields");
    };
    let (rest, crtime) = (&line[..split], &line[split + 1..]);

    let crtime = match std::str::from_utf8(crtime).map(parse_epoch) {
        Ok(Ok(crtime)) if crtime > 0 => crtime,
        _ => 0,
    };

    let mut record = TimestampRecord::parse(&[rest, &b"|0"[..]].concat())?;
    record.crtime = crtime;

    Ok(record)
}
