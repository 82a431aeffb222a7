use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;

use crate::command::Captured;

/// `date` format that prints the local wall clock and the UTC epoch of the same instant.
pub const CLOCK_FORMAT: &str = "+%Y-%m-%dT%H:%M:%S %s";

const LOCAL_CLOCK_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One sample of the source's clocks, taken atomically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockReading {
    /// Local wall-clock time.
    pub local: NaiveDateTime,
    /// The same instant as UTC epoch seconds.
    pub utc: i64,
}

impl ClockReading {
    /// Parses the output of `date` with [`CLOCK_FORMAT`], e.g. `2024-01-01T05:00:00 1704067200`.
    pub fn parse(output: &str) -> Result<Self> {
        let (local, utc) = output
            .trim()
            .split_once(' ')
            .ok_or_else(|| anyhow!("unexpected clock reading: {output:?}"))?;

        Ok(Self {
            local: NaiveDateTime::parse_from_str(local, LOCAL_CLOCK_FORMAT)
                .with_context(|| format!("parsing local clock {local:?}"))?,
            utc: utc
                .parse()
                .with_context(|| format!("parsing UTC epoch {utc:?}"))?,
        })
    }
}

/// The live environment whose filesystem is being imaged.
pub trait SourceEnvironment {
    /// Runs a command inside the source and captures its output.
    fn run(&self, args: &[&str]) -> Result<Captured>;

    /// Samples the local and UTC clocks in a single query.
    fn clock(&self) -> Result<ClockReading> {
        let stdout = self
            .run(&["date", CLOCK_FORMAT])?
            .into_stdout("reading source clock")?;

        ClockReading::parse(&stdout)
    }
}

impl<S: SourceEnvironment + ?Sized> SourceEnvironment for &S {
    fn run(&self, args: &[&str]) -> Result<Captured> {
        (**self).run(args)
    }

    fn clock(&self) -> Result<ClockReading> {
        (**self).clock()
    }
}
