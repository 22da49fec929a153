use std::process::Command;

use nanodata_store::{ContentHash, Dataset, Error, Result};
use serde::{Deserialize, Serialize};

use crate::repository::Repository;
use crate::source::DataSource;

/// An external command that writes a dataset.
///
/// The command runs with an empty output directory appended as its last
/// argument and must leave `{split}/*.parquet` (plus an optional `aux/`)
/// there. The result is assumed deterministic in `command` and `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSource {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl GeneratorSource {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn fail(&self, message: impl Into<String>) -> Error {
        Error::Generator {
            command: self.command_line(),
            message: message.into(),
        }
    }
}

impl DataSource for GeneratorSource {
    fn content_hash(&self) -> ContentHash {
        ContentHash::of_params("generator", self)
    }

    fn describe(&self) -> String {
        format!("generate:{}", self.command_line())
    }

    fn prepare(&self, repo: &Repository) -> Result<Dataset> {
        let hash = self.content_hash();
        repo.materialize(&hash, |writer| {
            let out = writer.scratch("generated")?;
            let pb = repo.progress().stage_line("generate");
            pb.set_message(self.command_line());

            let output = Command::new(&self.command)
                .args(&self.args)
                .arg(&out)
                .output()
                .map_err(|e| self.fail(e.to_string()))?;
            pb.finish_and_clear();

            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                log::debug!("{}: {}", self.command, stderr.trim());
            }
            if !output.status.success() {
                let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
                let tail: Vec<&str> = tail.into_iter().rev().collect();
                return Err(self.fail(format!("{} {}", output.status, tail.join("\n"))));
            }

            let generated = Dataset::scan(hash, &out)?;
            if generated.split_names().next().is_none() {
                return Err(self.fail("no parquet splits written"));
            }
            writer.write(&generated)
        })
    }
}
