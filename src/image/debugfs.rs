use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, ensure, Context, Result};

use crate::command::{self, Captured};
use crate::metadata::TimeMetadata;

use super::inode_editor::InodeEditor;

/// What debugfs prints when a path does not resolve to an inode.
const NOT_FOUND: &str = "File not found by ext2_lookup";

/// Raw inode access to an unmounted ext2/3/4 filesystem through `debugfs`.
pub struct Debugfs {
    device: PathBuf,
}

impl Debugfs {
    /// Opens `device`, checking that its root directory can be read.
    pub fn open(device: &Path) -> Result<Self> {
        let debugfs = Self {
            device: device.to_owned(),
        };

        debugfs
            .stat_root()
            .with_context(|| format!("opening {} with debugfs", device.display()))?;

        Ok(debugfs)
    }

    fn stat_root(&self) -> Result<()> {
        match self.read_stat(Path::new(""))? {
            Some(_) => Ok(()),
            None => bail!("root directory not found"),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new("debugfs");
        command.env("DEBUGFS_PAGER", "__none__");
        command
    }

    fn read_stat(&self, path: &Path) -> Result<Option<String>> {
        let request = [&b"stat "[..], &quote(path)?[..]].concat();
        let captured = command::capture(
            self.command()
                .arg("-R")
                .arg(OsStr::from_bytes(&request))
                .arg(&self.device),
        )?;

        parse_stat(captured)
    }
}

impl InodeEditor for Debugfs {
    fn stat(&mut self, path: &Path) -> Result<Option<String>> {
        self.read_stat(path)
    }

    fn write_times(&mut self, path: &Path, times: &TimeMetadata) -> Result<()> {
        let script = write_script(path, times)?;

        let captured = command::capture_with_input(
            self.command().args(["-w", "-f", "-"]).arg(&self.device),
            &script,
        )?;

        check_write(captured)
    }
}

/// Quotes an image-relative path as an absolute debugfs argument, keeping its bytes as they are.
///
/// debugfs has no escape for `"` inside a quoted argument, so such paths cannot be addressed.
fn quote(path: &Path) -> Result<Vec<u8>> {
    let bytes = path.as_os_str().as_bytes();
    ensure!(
        !bytes.iter().any(|b| matches!(b, b'"' | b'\n')),
        "path cannot be addressed through debugfs: {}",
        path.display()
    );

    Ok([&b"\"/"[..], bytes, &b"\""[..]].concat())
}

/// The debugfs commands that set every timestamp field of one inode.
fn write_script(path: &Path, times: &TimeMetadata) -> Result<Vec<u8>> {
    let target = quote(path)?;
    let mut script = Vec::new();

    for (field, value) in times.encode()? {
        script.extend_from_slice(b"set_inode_field ");
        script.extend_from_slice(&target);
        script.extend_from_slice(format!(" {} {value}\n", field.name()).as_bytes());
    }

    Ok(script)
}

fn parse_stat(captured: Captured) -> Result<Option<String>> {
    if captured.stderr.contains(NOT_FOUND) {
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&captured.stdout);
    if captured.success && stdout.contains("Inode:") {
        return Ok(Some(stdout.into_owned()));
    }

    bail!("debugfs stat failed: {}", diagnostics(&captured.stderr));
}

/// debugfs exits successfully even when a command fails, so errors are read from stderr.
fn check_write(captured: Captured) -> Result<()> {
    let errors = diagnostics(&captured.stderr);

    if !captured.success || !errors.is_empty() {
        bail!("debugfs write failed: {errors}");
    }

    Ok(())
}

/// stderr without the version banner debugfs always prints.
fn diagnostics(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("debugfs "))
        .collect::<Vec<_>>()
        .join("; ")
}
