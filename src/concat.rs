//! Stitches the per-dataset gene set tables of one collection into a single
//! TSV, one block per dataset headed by its accession.

use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::GeneSet;
use crate::error::GseaError;
use crate::fs_util;
use crate::report::ReportDir;

#[derive(Debug, Clone, Serialize)]
pub struct ConcatOutput {
    pub gene_set: String,
    pub path: Option<Utf8PathBuf>,
    pub blocks: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConcatReport {
    pub outputs: Vec<ConcatOutput>,
}

impl ConcatReport {
    pub fn files_written(&self) -> usize {
        self.outputs.iter().filter(|output| output.path.is_some()).count()
    }
}

pub fn concatenate(
    results: &Path,
    out_dir: &Utf8Path,
    gene_sets: &[GeneSet],
) -> Result<ConcatReport, GseaError> {
    let reports = ReportDir::scan(results)?;
    fs::create_dir_all(out_dir.as_std_path())
        .map_err(|err| fs_util::io_err(out_dir.as_std_path(), err))?;

    let mut report = ConcatReport::default();
    for gene_set in gene_sets {
        let suffix = format!("_{}", gene_set.label);
        let matching: Vec<&ReportDir> = reports
            .iter()
            .filter(|report| report.label.ends_with(&suffix))
            .collect();

        let mut output = ConcatOutput {
            gene_set: gene_set.label.clone(),
            path: None,
            blocks: Vec::new(),
            missing: Vec::new(),
        };
        if matching.is_empty() {
            tracing::warn!(gene_set = %gene_set.label, "no reports to concatenate");
            report.outputs.push(output);
            continue;
        }

        let mut content = String::new();
        for dir in matching {
            let tsv = dir.set_tsv(&gene_set.set_name);
            let table = match fs::read_to_string(&tsv) {
                Ok(table) => table,
                Err(err) => {
                    tracing::warn!(report = %dir.label, "missing {}: {err}", tsv.display());
                    output.missing.push(dir.label.clone());
                    continue;
                }
            };
            if !output.blocks.is_empty() {
                content.push('\n');
            }
            content.push_str(dir.accession());
            content.push('\n');
            content.push_str(&table);
            if !table.ends_with('\n') {
                content.push('\n');
            }
            output.blocks.push(dir.label.clone());
        }

        if !output.blocks.is_empty() {
            let path = out_dir.join(format!("{}.tsv", gene_set.concat_output));
            fs_util::write_atomic(path.as_std_path(), content.as_bytes())?;
            tracing::info!(path = %path, blocks = output.blocks.len(), "concatenated");
            output.path = Some(path);
        }
        report.outputs.push(output);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gene_set(label: &str, set_name: &str) -> GeneSet {
        GeneSet {
            label: label.to_string(),
            gmx: Utf8PathBuf::from(format!("{set_name}.gmt")),
            set_name: set_name.to_string(),
            title: label.to_string(),
            concat_output: format!("{label}_all"),
        }
    }

    fn report(results: &Path, name: &str, tsv: Option<(&str, &str)>) {
        let dir = results.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.html"), "ok").unwrap();
        if let Some((file, body)) = tsv {
            fs::write(dir.join(file), body).unwrap();
        }
    }

    #[test]
    fn concatenates_blocks_with_accession_lines() {
        let temp = tempfile::tempdir().unwrap();
        let results = temp.path().join("results");
        report(&results, "GSE1_UP.Gsea.1", Some(("UP_GENES.tsv", "NAME\tSYMBOL\nrow1\tA")));
        report(&results, "GSE2_UP.Gsea.5", Some(("UP_GENES.tsv", "NAME\tSYMBOL\nrow2\tB\n")));
        report(&results, "GSE3_UP.Gsea.2", None);
        report(&results, "GSE1_DOWN.Gsea.3", Some(("DOWN_GENES.tsv", "x\n")));

        let out_dir = Utf8PathBuf::from_path_buf(temp.path().join("concat")).unwrap();
        let sets = [gene_set("UP", "UP_GENES"), gene_set("OTHER", "OTHER")];
        let result = concatenate(&results, &out_dir, &sets).unwrap();

        assert_eq!(result.files_written(), 1);
        assert_eq!(result.outputs[0].missing, vec!["GSE3_UP".to_string()]);
        assert!(result.outputs[1].path.is_none());

        let text = fs::read_to_string(out_dir.join("UP_all.tsv").as_std_path()).unwrap();
        assert_eq!(
            text,
            "GSE1\nNAME\tSYMBOL\nrow1\tA\n\nGSE2\nNAME\tSYMBOL\nrow2\tB\n"
        );
    }
}
