use std::io::{ErrorKind, Write};
use std::process::{Command, Output, Stdio};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;

/// What a finished child process printed, and whether it exited successfully.
///
/// stdout is kept as raw bytes, since file names printed by a tool need not be UTF-8.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captured {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl Captured {
    /// Returns stdout as text if the process succeeded, otherwise an error carrying its stderr.
    pub fn into_stdout(self, what: &str) -> Result<String> {
        if !self.success {
            bail!("{what} failed: {}", self.stderr.trim());
        }

        String::from_utf8(self.stdout).with_context(|| format!("{what} printed non UTF-8 output"))
    }

    fn from_output(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs `command` to completion, capturing both output streams.
///
/// Only a failure to start or wait for the process is an error; a non-zero exit is reported
/// through [`Captured::success`].
pub fn capture(command: &mut Command) -> Result<Captured> {
    debug!("running {command:?}");

    let output = command
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("unable to run {:?}", command.get_program()))?;

    Ok(Captured::from_output(output))
}

/// Like [`capture`], but feeds `input` to the process on stdin.
///
/// stdin is written from its own thread while the output streams are drained, so input of any
/// size goes through.
pub fn capture_with_input(command: &mut Command, input: &[u8]) -> Result<Captured> {
    debug!("running {command:?} with {} bytes of input", input.len());

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("unable to run {:?}", command.get_program()))?;

    let mut stdin = child.stdin.take().context("child stdin was not piped")?;

    let (written, output) = thread::scope(|scope| {
        // the handle drops when the writer finishes, closing stdin
        let writer = scope.spawn(move || stdin.write_all(input));
        let output = child.wait_with_output();
        (writer.join(), output)
    });

    let output = output.with_context(|| format!("waiting for {:?}", command.get_program()))?;

    match written.map_err(|_| anyhow!("stdin writer panicked"))? {
        // the child is done reading; its exit status and stderr tell why
        Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
        written => written.context("writing to child stdin")?,
    }

    Ok(Captured::from_output(output))
}

/// Runs `command` and returns its stdout, failing on a non-zero exit.
pub fn run_checked(command: &mut Command) -> Result<String> {
    let what = format!("{:?}", command.get_program());
    capture(command)?.into_stdout(&what)
}
