use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GseaError {
    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("invalid GEO series accession: {0}")]
    InvalidAccession(String),

    #[error("unknown identifier type: {0}")]
    InvalidIdType(String),

    #[error("missing config file gsea-batch.json in current directory")]
    #[diagnostic(help("pass --config <path> or create gsea-batch.json"))]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("no expression matrix found in {0}")]
    MissingMatrix(PathBuf),

    #[error("expression matrix {0} has no sample columns")]
    EmptyMatrix(PathBuf),

    #[error("no phenotype source (*.cls or controls.txt) found in {0}")]
    MissingPhenotypes(PathBuf),

    #[error("invalid class file: {0}")]
    InvalidClassFile(String),

    #[error("control list matched {matched} of {total} samples; need a non-empty, proper subset")]
    ControlMismatch { matched: usize, total: usize },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("GSEA run failed: {0}")]
    GseaRun(String),

    #[error("all {attempts} strategies failed for gene set {gene_set}")]
    StrategiesExhausted { gene_set: String, attempts: usize },

    #[error("invalid enrichment plot: {0}")]
    InvalidPlot(String),

    #[error("invalid GSEA table {path}: {reason}")]
    InvalidTable { path: PathBuf, reason: String },

    #[error("no leading-edge genes found in {0}")]
    NoLeadingEdge(PathBuf),

    #[error("{failed} of {total} datasets failed")]
    BatchFailed { failed: usize, total: usize },
}
