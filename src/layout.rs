use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::DatasetId;
use crate::error::GseaError;
use crate::fs_util;

/// Directory layout of one batch run under `output_root`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// GSEA `-out` directory; reports land in `<label>.Gsea.<timestamp>`.
    pub fn results_dir(&self) -> Utf8PathBuf {
        self.root.join("results")
    }

    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.root.join("logs")
    }

    pub fn dataset_log(&self, id: &DatasetId) -> Utf8PathBuf {
        self.logs_dir().join(format!("{id}.log"))
    }

    pub fn work_dir(&self, id: &DatasetId) -> Utf8PathBuf {
        self.root.join("work").join(id.as_str())
    }

    pub fn plots_dir(&self) -> Utf8PathBuf {
        self.root.join("annotated_enplots")
    }

    pub fn concat_dir(&self) -> Utf8PathBuf {
        self.root.join("concatenated_gsea_results")
    }

    pub fn gallery_dir(&self) -> Utf8PathBuf {
        self.root.join("gallery")
    }

    pub fn summary_csv(&self) -> Utf8PathBuf {
        self.root.join("gsea_analysis_results.csv")
    }

    pub fn ensure_dirs(&self) -> Result<(), GseaError> {
        for dir in [self.results_dir(), self.logs_dir()] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| GseaError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), GseaError> {
        fs_util::write_atomic(path.as_std_path(), content)
    }
}
