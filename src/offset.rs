use anyhow::Result;
use log::info;

use crate::record::ClockOffset;
use crate::source::SourceEnvironment;

/// Determines `local - utc` for the source from a single clock sample.
///
/// The local wall-clock fields are read as if they were UTC; the difference to the true UTC
/// epoch of the same instant is the offset, in whole seconds.
pub fn calculate_offset<S: SourceEnvironment + ?Sized>(source: &S) -> Result<ClockOffset> {
    let reading = source.clock()?;
    let offset = ClockOffset(reading.local.and_utc().timestamp() - reading.utc);

    info!("source clock offset is {offset}");
    Ok(offset)
}
