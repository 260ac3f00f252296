use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::GseaError;

pub const CONFIG_FILE: &str = "gsea-batch.json";
pub const DEFAULT_MAX_JOBS: usize = 4;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub datasets_root: Utf8PathBuf,
    #[serde(default)]
    pub output_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub max_jobs: Option<usize>,
    #[serde(default)]
    pub gsea: GseaParams,
    #[serde(default)]
    pub chips: ChipFiles,
    #[serde(default)]
    pub phenotypes: PhenotypeLabels,
    #[serde(default)]
    pub gene_sets: Vec<GeneSetEntry>,
}

/// Tunables forwarded to the GSEA command line.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GseaParams {
    pub executable: Option<Utf8PathBuf>,
    pub nperm: u32,
    pub permute: String,
    pub seed: String,
    pub set_min: u32,
    pub set_max: u32,
    pub extra_args: Vec<String>,
}

impl Default for GseaParams {
    fn default() -> Self {
        Self {
            executable: None,
            nperm: 1000,
            permute: "gene_set".to_string(),
            seed: "timestamp".to_string(),
            set_min: 15,
            set_max: 500,
            extra_args: Vec::new(),
        }
    }
}

/// CHIP annotation files, one per identifier convention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChipFiles {
    #[serde(default)]
    pub ensembl: Option<Utf8PathBuf>,
    #[serde(default)]
    pub ncbi: Option<Utf8PathBuf>,
    #[serde(default)]
    pub symbol: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PhenotypeLabels {
    pub control_label: String,
    pub treated_label: String,
}

impl Default for PhenotypeLabels {
    fn default() -> Self {
        Self {
            control_label: "CONTROL".to_string(),
            treated_label: "TREATED".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GeneSetEntry {
    Shorthand(Utf8PathBuf),
    Detailed(GeneSetEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GeneSetEntryObject {
    pub gmx: Utf8PathBuf,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub set_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub concat_output: Option<String>,
}

/// One gene-set collection run against every dataset.
///
/// `label` names the GSEA report (`<dataset>_<label>.Gsea.<ts>`), `set_name`
/// is the gene set inside the GMT/GMX file and names the per-set outputs
/// (`<set_name>.html`, `<set_name>.tsv`, `enplot_<set_name>_<n>.svg.gz`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneSet {
    pub label: String,
    pub gmx: Utf8PathBuf,
    pub set_name: String,
    pub title: String,
    pub concat_output: String,
}

impl GeneSet {
    pub fn report_label(&self, dataset: &str) -> String {
        format!("{dataset}_{}", self.label)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub datasets_root: Utf8PathBuf,
    pub output_root: Utf8PathBuf,
    pub max_jobs: usize,
    pub gsea: GseaParams,
    pub chips: ChipFiles,
    pub phenotypes: PhenotypeLabels,
    pub gene_sets: Vec<GeneSet>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GseaError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(GseaError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| GseaError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GseaError::ConfigParse(err.to_string()))?;

        let base_dir = config_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        Self::resolve_config(config, &base_dir)
    }

    pub fn resolve_config(
        config: Config,
        base_dir: &Utf8Path,
    ) -> Result<ResolvedConfig, GseaError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let max_jobs = config.max_jobs.unwrap_or(DEFAULT_MAX_JOBS);
        if max_jobs == 0 {
            return Err(GseaError::ConfigInvalid(
                "max_jobs must be at least 1".to_string(),
            ));
        }

        let gene_sets = config
            .gene_sets
            .into_iter()
            .map(|entry| resolve_gene_set(entry, base_dir))
            .collect::<Result<Vec<_>, GseaError>>()?;

        let mut seen = HashSet::new();
        for set in &gene_sets {
            if !seen.insert(set.label.as_str()) {
                return Err(GseaError::ConfigInvalid(format!(
                    "duplicate gene set label: {}",
                    set.label
                )));
            }
        }

        let mut gsea = config.gsea;
        // A bare program name is looked up on PATH later.
        gsea.executable = gsea.executable.map(|path| {
            if path.components().count() > 1 {
                anchor(base_dir, path)
            } else {
                path
            }
        });

        let chips = ChipFiles {
            ensembl: config.chips.ensembl.map(|path| anchor(base_dir, path)),
            ncbi: config.chips.ncbi.map(|path| anchor(base_dir, path)),
            symbol: config.chips.symbol.map(|path| anchor(base_dir, path)),
        };

        let output_root = config
            .output_root
            .unwrap_or_else(|| Utf8PathBuf::from("gsea_results"));

        Ok(ResolvedConfig {
            schema_version,
            datasets_root: anchor(base_dir, config.datasets_root),
            output_root: anchor(base_dir, output_root),
            max_jobs,
            gsea,
            chips,
            phenotypes: config.phenotypes,
            gene_sets,
        })
    }
}

fn resolve_gene_set(entry: GeneSetEntry, base_dir: &Utf8Path) -> Result<GeneSet, GseaError> {
    let obj = match entry {
        GeneSetEntry::Shorthand(gmx) => GeneSetEntryObject {
            gmx,
            label: None,
            set_name: None,
            title: None,
            concat_output: None,
        },
        GeneSetEntry::Detailed(obj) => obj,
    };

    let stem = obj
        .gmx
        .file_stem()
        .map(str::to_string)
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| GseaError::ConfigInvalid(format!("invalid gene set path: {}", obj.gmx)))?;
    let set_name = obj.set_name.unwrap_or_else(|| stem.clone());
    let label = obj.label.unwrap_or_else(|| set_name.clone());
    if label.contains(char::is_whitespace) {
        return Err(GseaError::ConfigInvalid(format!(
            "gene set label must not contain whitespace: {label}"
        )));
    }
    let title = obj.title.unwrap_or_else(|| label.replace('_', " "));
    let concat_output = obj.concat_output.unwrap_or_else(|| label.clone());

    Ok(GeneSet {
        label,
        gmx: anchor(base_dir, obj.gmx),
        set_name,
        title,
        concat_output,
    })
}

fn anchor(base_dir: &Utf8Path, path: Utf8PathBuf) -> Utf8PathBuf {
    if path.is_absolute() || base_dir.as_str().is_empty() {
        path
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config: Config = serde_json::from_str(
            r#"{
                "datasets_root": "data",
                "gene_sets": ["sets/UP_GENES.gmt"]
            }"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config, Utf8Path::new("/lab")).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.max_jobs, DEFAULT_MAX_JOBS);
        assert_eq!(resolved.datasets_root, Utf8PathBuf::from("/lab/data"));
        assert_eq!(resolved.gene_sets.len(), 1);
        assert_eq!(resolved.gene_sets[0].set_name, "UP_GENES");
        assert_eq!(resolved.gene_sets[0].label, "UP_GENES");
        assert_eq!(resolved.gene_sets[0].title, "UP GENES");
        assert_eq!(resolved.gsea, GseaParams::default());
    }
}
