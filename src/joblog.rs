use std::fs::{self, File};
use std::io::Write;
use std::process::Stdio;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::GseaError;

/// Per-dataset log file. Our own lines are timestamped; child process output
/// is appended raw through [`JobLog::stdio`].
pub struct JobLog {
    path: Utf8PathBuf,
    file: File,
}

impl JobLog {
    pub fn create(path: &Utf8Path) -> Result<Self, GseaError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| GseaError::Filesystem(format!("create {parent}: {err}")))?;
        }
        let file = File::create(path.as_std_path())
            .map_err(|err| GseaError::Filesystem(format!("create {path}: {err}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn line(&mut self, message: impl AsRef<str>) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Err(err) = writeln!(self.file, "[{stamp}] {}", message.as_ref()) {
            tracing::warn!(log = %self.path, "failed to write log line: {err}");
        }
    }

    pub fn stdio(&self) -> Result<Stdio, GseaError> {
        let clone = self
            .file
            .try_clone()
            .map_err(|err| GseaError::Filesystem(format!("clone {}: {err}", self.path)))?;
        Ok(Stdio::from(clone))
    }

    pub fn flush(&mut self) {
        let _ = self.file.flush();
    }
}
