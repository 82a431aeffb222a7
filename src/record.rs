use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

/// The separator between fields of an exported record.
///
/// One record per line: `<absolute-path>|<ctime>|<mtime>|<atime>|<crtime>`. The four numeric
/// fields are split off from the right, so a path may itself contain `|`.
pub const FIELD_SEPARATOR: u8 = b'|';

/// The raw MACB timestamps of one source entry, on the source's local clock.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimestampRecord {
    /// Absolute path in the source filesystem namespace, byte for byte as the source reported it.
    pub path: PathBuf,
    pub ctime: i64,
    pub mtime: i64,
    pub atime: i64,
    /// Birth time, or `0` when the source filesystem does not record one.
    pub crtime: i64,
}

impl TimestampRecord {
    /// Parses one record line. The path is taken as raw bytes and need not be UTF-8.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let mut fields = line.rsplitn(5, |b| *b == FIELD_SEPARATOR);
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| anyhow!("record is missing its {name} field"))
        };

        let crtime = epoch_field(next("crtime")?).context("parsing crtime")?;
        let atime = epoch_field(next("atime")?).context("parsing atime")?;
        let mtime = epoch_field(next("mtime")?).context("parsing mtime")?;
        let ctime = epoch_field(next("ctime")?).context("parsing ctime")?;
        let path = Path::new(OsStr::from_bytes(next("path")?));

        if !path.is_absolute() {
            bail!("record path is not absolute: {}", path.display());
        }

        Ok(Self {
            path: path.to_owned(),
            ctime,
            mtime,
            atime,
            crtime,
        })
    }

    /// Writes the record as one line, path bytes unchanged.
    pub fn write_line<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.path.as_os_str().as_bytes())?;
        writeln!(
            writer,
            "|{}|{}|{}|{}",
            self.ctime, self.mtime, self.atime, self.crtime
        )
    }

    /// The address of this entry inside the image: the path without its leading separator.
    pub fn image_path(&self) -> &Path {
        self.path.strip_prefix("/").unwrap_or(&self.path)
    }

    pub fn has_birth_time(&self) -> bool {
        self.crtime != 0
    }
}

impl fmt::Display for TimestampRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.path.display(),
            self.ctime,
            self.mtime,
            self.atime,
            self.crtime
        )
    }
}

impl FromStr for TimestampRecord {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        Self::parse(line.as_bytes())
    }
}

fn epoch_field(field: &[u8]) -> Result<i64> {
    let field = std::str::from_utf8(field)
        .map_err(|_| anyhow!("invalid epoch seconds: {}", field.escape_ascii()))?;
    parse_epoch(field)
}

/// Parses whole epoch seconds. A fractional part is truncated, never rounded.
pub fn parse_epoch(field: &str) -> Result<i64> {
    let whole = match field.split_once('.') {
        Some((whole, fraction)) if fraction.bytes().all(|b| b.is_ascii_digit()) => whole,
        Some(_) => bail!("invalid epoch seconds: {field:?}"),
        None => field,
    };

    match whole {
        "" | "-" => bail!("invalid epoch seconds: {field:?}"),
        whole => whole
            .parse()
            .with_context(|| format!("invalid epoch seconds: {field:?}")),
    }
}

/// Signed seconds between the source's local clock and UTC (`local - utc`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockOffset(pub i64);

impl ClockOffset {
    pub fn seconds(self) -> i64 {
        self.0
    }

    /// Normalizes a local epoch reading to UTC, saturating at the `i64` bounds.
    pub fn to_utc(self, local: i64) -> i64 {
        local.saturating_sub(self.0)
    }
}

impl fmt::Display for ClockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{:02}:{:02}:{:02} ({}s)",
            abs / 3600,
            abs % 3600 / 60,
            abs % 60,
            self.0
        )
    }
}

/// Writes records to `path`, one per line, replacing any existing file.
pub fn write_records(path: &Path, records: &[TimestampRecord]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating record list {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        record
            .write_line(&mut writer)
            .context("writing timestamp record")?;
    }

    writer.flush().context("flushing record list")?;
    Ok(())
}

/// Reads a record list previously written by [`write_records`].
///
/// The list is this tool's own artifact, so a malformed line is an error rather than a skip.
pub fn read_records(path: &Path) -> Result<Vec<TimestampRecord>> {
    let file =
        File::open(path).with_context(|| format!("opening record list {}", path.display()))?;

    BufReader::new(file)
        .split(b'\n')
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(line) if line.is_empty()))
        .map(|(i, line)| {
            let line = line.context("reading record list")?;
            TimestampRecord::parse(&line).with_context(|| format!("record list line {}", i + 1))
        })
        .collect()
}
