use anyhow::{anyhow, ensure, Result};
use chrono::DateTime;

/// Calendar encoding of an inode timestamp field, always in UTC.
pub const CALENDAR_FORMAT: &str = "%Y%m%d%H%M%S";

/// Earliest instant an ext4 inode can hold (1901-12-13T20:45:52Z).
pub const MIN_INODE_TIME: i64 = -(1 << 31);

/// Latest instant an ext4 inode with extra epoch bits can hold (2446-05-10T22:38:55Z).
pub const MAX_INODE_TIME: i64 = (1 << 34) - (1 << 31) - 1;

/// The MACB timestamps of one inode, as UTC epoch seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TimeMetadata {
    /// Inode change time.
    pub ctime: i64,
    /// Last modification time.
    pub mtime: i64,
    /// Last access time.
    pub atime: i64,
    /// Creation (birth) time.
    pub crtime: i64,
}

/// A named timestamp field of an inode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeField {
    Ctime,
    Mtime,
    Atime,
    Crtime,
}

impl TimeField {
    /// Every field, in the order they are written to an inode.
    pub const ALL: [TimeField; 4] = [
        TimeField::Ctime,
        TimeField::Mtime,
        TimeField::Atime,
        TimeField::Crtime,
    ];

    /// The field name used by the inode metadata editor.
    pub fn name(self) -> &'static str {
        match self {
            TimeField::Ctime => "ctime",
            TimeField::Mtime => "mtime",
            TimeField::Atime => "atime",
            TimeField::Crtime => "crtime",
        }
    }
}

impl TimeMetadata {
    /// Encodes every field, failing if any of them cannot be stored in an inode.
    pub fn encode(&self) -> Result<[(TimeField, String); 4]> {
        let [c, m, a, cr] = TimeField::ALL;
        Ok([
            (c, encode_calendar(self.ctime)?),
            (m, encode_calendar(self.mtime)?),
            (a, encode_calendar(self.atime)?),
            (cr, encode_calendar(self.crtime)?),
        ])
    }
}

/// The instant the inode editor reads back as a parse failure, so it can never be written.
pub const UNWRITABLE_TIME: i64 = -1;

/// Converts epoch seconds into the on-disk calendar form, e.g. `20231114221320`.
pub fn encode_calendar(epoch: i64) -> Result<String> {
    ensure!(
        (MIN_INODE_TIME..=MAX_INODE_TIME).contains(&epoch),
        "timestamp {epoch} is outside the range an inode can store"
    );
    ensure!(
        epoch != UNWRITABLE_TIME,
        "timestamp {epoch} (19691231235959) cannot be written by the inode editor"
    );

    let time = DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| anyhow!("timestamp {epoch} is not a valid instant"))?;

    Ok(time.format(CALENDAR_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_epoch() {
        assert_eq!(encode_calendar(0).unwrap(), "19700101000000");
    }

    #[test]
    fn test_encode_is_utc() {
        assert_eq!(encode_calendar(1_700_000_000).unwrap(), "20231114221320");
        assert_eq!(encode_calendar(1_000_000_000).unwrap(), "20010909014640");
    }

    #[test]
    fn test_encode_range_limits() {
        assert_eq!(encode_calendar(MIN_INODE_TIME).unwrap(), "19011213204552");
        assert_eq!(encode_calendar(MAX_INODE_TIME).unwrap(), "24460510223855");
        assert!(encode_calendar(MIN_INODE_TIME - 1).is_err());
        assert!(encode_calendar(MAX_INODE_TIME + 1).is_err());
    }

    #[test]
    fn test_encode_rejects_editor_sentinel() {
        assert!(encode_calendar(-1).is_err());
        assert_eq!(encode_calendar(-2).unwrap(), "19691231235958");

        let times = TimeMetadata {
            ctime: 1,
            mtime: -1,
            atime: 3,
            crtime: 4,
        };
        assert!(times.encode().is_err());
    }

    #[test]
    fn test_encode_all_fields_in_order() {
        let times = TimeMetadata {
            ctime: 1,
            mtime: 2,
            atime: 3,
            crtime: 4,
        };

        let encoded = times.encode().unwrap();
        let names = encoded.iter().map(|(f, _)| f.name()).collect::<Vec<_>>();
        assert_eq!(names, ["ctime", "mtime", "atime", "crtime"]);
        assert_eq!(encoded[3].1, "19700101000004");
    }
}
