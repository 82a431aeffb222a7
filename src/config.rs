use std::path::PathBuf;

use crate::export::DEFAULT_EXCLUDES;

/// Everything one imaging run needs to know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Which container to image.
    pub source: String,
    /// The entry snapshotted before and after restoration.
    pub verify_path: String,
    /// Where run artifacts are written.
    pub output: PathBuf,
    /// Capacity of the created image in bytes.
    pub image_size: u64,
    /// Pseudo-filesystem roots left out of the export.
    pub excludes: Vec<String>,
    /// Leave the (empty) mount point directory in place after the run.
    pub keep_mount: bool,
}

impl RunConfig {
    pub const IMAGE_FILE: &'static str = "disk.img";
    pub const ARCHIVE_FILE: &'static str = "container.tar";
    pub const RECORDS_FILE: &'static str = "timestamps.txt";
    pub const REPORT_FILE: &'static str = "report.json";
    pub const MOUNT_DIR: &'static str = "mnt";

    /// A configuration with default verification path, size and exclusions.
    #[must_use]
    pub fn new(source: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            verify_path: "/etc/hostname".to_owned(),
            output: output.into(),
            image_size: 10 << 30,
            excludes: DEFAULT_EXCLUDES.iter().map(|root| root.to_string()).collect(),
            keep_mount: false,
        }
    }

    pub fn image_path(&self) -> PathBuf {
        self.output.join(Self::IMAGE_FILE)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output.join(Self::ARCHIVE_FILE)
    }

    pub fn records_path(&self) -> PathBuf {
        self.output.join(Self::RECORDS_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.join(Self::REPORT_FILE)
    }

    pub fn mount_dir(&self) -> PathBuf {
        self.output.join(Self::MOUNT_DIR)
    }

    /// Every file artifact a run leaves behind.
    pub fn artifacts(&self) -> [PathBuf; 4] {
        [
            self.image_path(),
            self.archive_path(),
            self.records_path(),
            self.report_path(),
        ]
    }
}

/// Parses a byte size such as `10G`, `512MiB` or `1048576`. Units are binary.
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim();
    let split = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());
    let (digits, unit) = size.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {size:?}"))?;

    let shift = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        _ => return Err(format!("unknown size unit: {unit:?}")),
    };

    value
        .checked_mul(1 << shift)
        .filter(|bytes| *bytes > 0)
        .ok_or_else(|| format!("size out of range: {size:?}"))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_artifact_paths() {
        let config = RunConfig::new("web-1", "/srv/out");

        assert_eq!(config.image_path(), Path::new("/srv/out/disk.img"));
        assert_eq!(config.archive_path(), Path::new("/srv/out/container.tar"));
        assert_eq!(config.records_path(), Path::new("/srv/out/timestamps.txt"));
        assert_eq!(config.mount_dir(), Path::new("/srv/out/mnt"));
        assert_eq!(config.artifacts().len(), 4);
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::new("web-1", "out");

        assert_eq!(config.verify_path, "/etc/hostname");
        assert_eq!(config.image_size, 10 << 30);
        assert_eq!(config.excludes, ["/proc", "/sys", "/dev"]);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("10G"), Ok(10 << 30));
        assert_eq!(parse_size("512MiB"), Ok(512 << 20));
        assert_eq!(parse_size("64k"), Ok(64 << 10));
        assert_eq!(parse_size("1048576"), Ok(1 << 20));
        assert_eq!(parse_size(" 2T "), Ok(2 << 40));
    }

    #[test]
    fn test_parse_size_rejects() {
        assert!(parse_size("").is_err());
        assert!(parse_size("G").is_err());
        assert!(parse_size("0").is_err());
        assert!(parse_size("10X").is_err());
        assert!(parse_size("1.5G").is_err());
        assert!(parse_size("99999999999T").is_err());
    }
}
