use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::command::Captured;
use crate::materialize::Materializer;
use crate::source::SourceEnvironment;

/// A source that answers commands from a fixed script.
#[derive(Default)]
pub struct ScriptedSource {
    replies: HashMap<String, Captured>,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `program` (the first argument) with a successful run printing `stdout`.
    pub fn reply(self, program: &str, stdout: impl AsRef<[u8]>) -> Self {
        self.reply_with(
            program,
            Captured {
                success: true,
                stdout: stdout.as_ref().to_vec(),
                stderr: String::new(),
            },
        )
    }

    pub fn reply_with(mut self, program: &str, captured: Captured) -> Self {
        self.replies.insert(program.to_owned(), captured);
        self
    }
}

impl SourceEnvironment for ScriptedSource {
    fn run(&self, args: &[&str]) -> Result<Captured> {
        self.calls.borrow_mut().push(args.join(" "));

        match args.first().and_then(|program| self.replies.get(*program)) {
            Some(captured) => Ok(captured.clone()),
            None => bail!("container is not running"),
        }
    }
}

/// Archives a prepared directory instead of a live source.
pub struct DirectoryMaterializer(pub PathBuf);

impl Materializer for DirectoryMaterializer {
    fn export(&self, archive: &Path) -> Result<()> {
        let mut builder = tar::Builder::new(File::create(archive)?);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &self.0)?;
        builder.finish()?;
        Ok(())
    }
}
