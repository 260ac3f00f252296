use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::classify::{self, Classification};
use crate::config::ResolvedConfig;
use crate::domain::DatasetId;
use crate::error::GseaError;
use crate::fs_util;
use crate::layout::Layout;
use crate::matrix::ExpressionMatrix;
use crate::phenotype::{self, ClassFile, Phenotypes};
use crate::strategy::{Strategy, StrategyTable};

pub const CONTROLS_FILE: &str = "controls.txt";

const MATRIX_EXTENSIONS: &[&str] = &[".gct", ".tsv", ".txt"];

#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: DatasetId,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhenotypeSource {
    ClassFile(PathBuf),
    Controls(PathBuf),
}

/// Every usable dataset directory directly under `root`, sorted by id.
pub fn discover(root: &Path) -> Result<Vec<Dataset>, GseaError> {
    let mut datasets = Vec::new();
    for dir in fs_util::list_subdirs(root)? {
        let Some(name) = dir.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        match name.parse::<DatasetId>() {
            Ok(id) => datasets.push(Dataset { id, dir }),
            Err(err) => tracing::warn!(dir = %dir.display(), "skipping directory: {err}"),
        }
    }
    datasets.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(datasets)
}

impl Dataset {
    fn files(&self) -> Result<Vec<PathBuf>, GseaError> {
        let entries = fs::read_dir(&self.dir).map_err(|err| fs_util::io_err(&self.dir, err))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn find_matrix(&self) -> Result<PathBuf, GseaError> {
        let files = self.files()?;
        for ext in MATRIX_EXTENSIONS {
            let mut candidates = files.iter().filter(|path| {
                fs_util::plain_name(path)
                    .map(|name| name.ends_with(ext) && name != CONTROLS_FILE)
                    .unwrap_or(false)
            });
            if let Some(first) = candidates.next() {
                let extra = candidates.count();
                if extra > 0 {
                    tracing::warn!(
                        dataset = %self.id,
                        matrix = %first.display(),
                        "{extra} other {ext} candidates ignored"
                    );
                }
                return Ok(first.clone());
            }
        }
        Err(GseaError::MissingMatrix(self.dir.clone()))
    }

    pub fn find_phenotype_source(&self) -> Result<PhenotypeSource, GseaError> {
        let files = self.files()?;
        if let Some(cls) = files.iter().find(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("cls"))
                .unwrap_or(false)
        }) {
            return Ok(PhenotypeSource::ClassFile(cls.clone()));
        }
        let controls = self.dir.join(CONTROLS_FILE);
        if controls.is_file() {
            return Ok(PhenotypeSource::Controls(controls));
        }
        Err(GseaError::MissingPhenotypes(self.dir.clone()))
    }
}

/// A dataset ready for GSEA: inputs located, phenotypes and identifier
/// convention inferred, fallback strategies ordered.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedDataset {
    pub id: DatasetId,
    pub matrix: PathBuf,
    pub cls: PathBuf,
    pub phenotypes: Phenotypes,
    pub classification: Classification,
    pub strategies: Vec<Strategy>,
}

pub fn prepare(
    dataset: &Dataset,
    layout: &Layout,
    config: &ResolvedConfig,
) -> Result<PreparedDataset, GseaError> {
    let matrix = dataset.find_matrix()?;

    let (cls, phenotypes) = match dataset.find_phenotype_source()? {
        PhenotypeSource::ClassFile(path) => {
            let text = fs::read_to_string(&path).map_err(|err| fs_util::io_err(&path, err))?;
            let phenotypes = ClassFile::parse(&text)?.phenotypes();
            (path, phenotypes)
        }
        PhenotypeSource::Controls(path) => {
            let text = fs::read_to_string(&path).map_err(|err| fs_util::io_err(&path, err))?;
            let controls = phenotype::parse_control_list(&text);
            let samples = ExpressionMatrix::new(&matrix).sample_names()?;
            let labels = &config.phenotypes;
            let class_file = ClassFile::from_controls(
                &samples,
                &controls,
                &labels.control_label,
                &labels.treated_label,
            )?;
            let cls_path = layout.work_dir(&dataset.id).join(format!("{}.cls", dataset.id));
            Layout::write_bytes_atomic(&cls_path, class_file.render().as_bytes())?;
            let phenotypes = Phenotypes {
                control: labels.control_label.clone(),
                treated: labels.treated_label.clone(),
            };
            (cls_path.into_std_path_buf(), phenotypes)
        }
    };

    let classification = classify::classify_matrix(&matrix)?;
    let strategies = StrategyTable::for_id_type(classification.id_type, &config.chips);

    Ok(PreparedDataset {
        id: dataset.id.clone(),
        matrix,
        cls,
        phenotypes,
        classification,
        strategies,
    })
}
