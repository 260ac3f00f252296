//! Leading-edge genes shared across datasets of a concatenated GSEA table.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::GseaError;
use crate::fs_util;

const SYMBOL_COLUMN: &str = "SYMBOL";
const CORE_COLUMN: &str = "CORE ENRICHMENT";
const HITS_HEADER: &[&str] = &["SYMBOL", "datasets_count", "datasets"];
const INTERSECTIONS_HEADER: &[&str] = &["datasets", "degree", "genes_count", "genes"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneHit {
    pub symbol: String,
    pub datasets: Vec<String>,
}

impl GeneHit {
    pub fn count(&self) -> usize {
        self.datasets.len()
    }

    fn record(&self) -> [String; 3] {
        [
            self.symbol.clone(),
            self.count().to_string(),
            self.datasets.join(";"),
        ]
    }
}

/// Genes found in exactly this combination of datasets and no other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intersection {
    pub datasets: Vec<String>,
    pub genes: Vec<String>,
}

impl Intersection {
    pub fn degree(&self) -> usize {
        self.datasets.len()
    }

    fn record(&self) -> [String; 4] {
        [
            self.datasets.join(";"),
            self.degree().to_string(),
            self.genes.len().to_string(),
            self.genes.join(";"),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntersectReport {
    pub input: PathBuf,
    pub datasets: usize,
    pub genes: usize,
    pub max_count: usize,
    pub full_csv: PathBuf,
    pub max_only_csv: PathBuf,
    pub intersections: usize,
    pub intersections_csv: PathBuf,
}

struct Columns {
    symbol: usize,
    core: usize,
}

/// Leading-edge symbols per dataset block. Datasets without any are dropped.
pub fn parse_leading_edge(path: &Path, content: &str) -> Result<BTreeMap<String, BTreeSet<String>>, GseaError> {
    let mut blocks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut columns: Option<Columns> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !line.contains('\t') && trimmed.starts_with("GSE") {
            blocks.entry(trimmed.to_string()).or_default();
            current = Some(trimmed.to_string());
            columns = None;
            continue;
        }
        if columns.is_none() && line.starts_with("NAME\t") {
            columns = Some(header_columns(path, line)?);
            continue;
        }
        let (Some(dataset), Some(cols)) = (current.as_ref(), columns.as_ref()) else {
            continue;
        };
        let parts: Vec<&str> = line.trim_end_matches('\t').split('\t').collect();
        if parts.len() <= cols.symbol.max(cols.core) {
            continue;
        }
        if parts[cols.core].trim().eq_ignore_ascii_case("yes") {
            let symbol = parts[cols.symbol].trim();
            if !symbol.is_empty() {
                blocks
                    .entry(dataset.clone())
                    .or_default()
                    .insert(symbol.to_string());
            }
        }
    }

    blocks.retain(|_, genes| !genes.is_empty());
    Ok(blocks)
}

fn header_columns(path: &Path, line: &str) -> Result<Columns, GseaError> {
    let names: Vec<&str> = line
        .split('\t')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    let find = |wanted: &str| {
        names
            .iter()
            .position(|name| *name == wanted)
            .ok_or_else(|| GseaError::InvalidTable {
                path: path.to_path_buf(),
                reason: format!("header lacks {wanted} column"),
            })
    };
    Ok(Columns {
        symbol: find(SYMBOL_COLUMN)?,
        core: find(CORE_COLUMN)?,
    })
}

/// Gene to datasets, most shared first, ties by symbol.
pub fn invert(blocks: &BTreeMap<String, BTreeSet<String>>) -> Vec<GeneHit> {
    let mut genes: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (dataset, symbols) in blocks {
        for symbol in symbols {
            genes.entry(symbol.as_str()).or_default().push(dataset.clone());
        }
    }
    let mut hits: Vec<GeneHit> = genes
        .into_iter()
        .map(|(symbol, datasets)| GeneHit {
            symbol: symbol.to_string(),
            datasets,
        })
        .collect();
    hits.sort_by(|a, b| b.count().cmp(&a.count()).then_with(|| a.symbol.cmp(&b.symbol)));
    hits
}

/// Exclusive intersections of degree `min_degree` or more, highest degree
/// first, then larger groups, then dataset names.
pub fn exclusive_intersections(hits: &[GeneHit], min_degree: usize) -> Vec<Intersection> {
    let mut groups: BTreeMap<&[String], Vec<String>> = BTreeMap::new();
    for hit in hits.iter().filter(|hit| hit.count() >= min_degree) {
        groups
            .entry(hit.datasets.as_slice())
            .or_default()
            .push(hit.symbol.clone());
    }
    let mut intersections: Vec<Intersection> = groups
        .into_iter()
        .map(|(datasets, mut genes)| {
            genes.sort();
            Intersection {
                datasets: datasets.to_vec(),
                genes,
            }
        })
        .collect();
    intersections.sort_by(|a, b| {
        b.degree()
            .cmp(&a.degree())
            .then_with(|| b.genes.len().cmp(&a.genes.len()))
            .then_with(|| a.datasets.cmp(&b.datasets))
    });
    intersections
}

/// Output directory used when none is given: `<stem>_intersections` beside
/// the input.
pub fn default_outdir(input: &Path) -> PathBuf {
    let stem = file_stem(input);
    input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}_intersections"))
}

/// `min_degree` limits the exclusive-intersection table; without it the
/// table is complete.
pub fn intersect(
    input: &Path,
    outdir: Option<&Path>,
    min_degree: Option<usize>,
) -> Result<IntersectReport, GseaError> {
    let content = fs::read_to_string(input).map_err(|err| fs_util::io_err(input, err))?;
    let blocks = parse_leading_edge(input, &content)?;
    let hits = invert(&blocks);
    if hits.is_empty() {
        return Err(GseaError::NoLeadingEdge(input.to_path_buf()));
    }

    let outdir = outdir.map(Path::to_path_buf).unwrap_or_else(|| default_outdir(input));
    let stem = file_stem(input);
    let max_count = hits.first().map(GeneHit::count).unwrap_or(0);

    let full_csv = outdir.join(format!("{stem}_intersections_full.csv"));
    let max_only_csv = outdir.join(format!("{stem}_intersections_max_only.csv"));
    fs_util::write_csv_atomic(&full_csv, HITS_HEADER, hits.iter().map(GeneHit::record))?;
    fs_util::write_csv_atomic(
        &max_only_csv,
        HITS_HEADER,
        hits.iter()
            .filter(|hit| hit.count() == max_count)
            .map(GeneHit::record),
    )?;

    let intersections = exclusive_intersections(&hits, min_degree.unwrap_or(1));
    let intersections_csv = match min_degree {
        Some(degree) => outdir.join(format!("{stem}_upset_minDegree{degree}.csv")),
        None => outdir.join(format!("{stem}_upset_full.csv")),
    };
    fs_util::write_csv_atomic(
        &intersections_csv,
        INTERSECTIONS_HEADER,
        intersections.iter().map(Intersection::record),
    )?;
    tracing::info!(
        genes = hits.len(),
        max_count,
        intersections = intersections.len(),
        "intersections written"
    );

    Ok(IntersectReport {
        input: input.to_path_buf(),
        datasets: blocks.len(),
        genes: hits.len(),
        max_count,
        full_csv,
        max_only_csv,
        intersections: intersections.len(),
        intersections_csv,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gsea".to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const TABLE: &str = "GSE1\n\
NAME\tPROBE\tSYMBOL\tRANK IN GENE LIST\tCORE ENRICHMENT\t\n\
row_0\tp\tTP53\t1\tYes\t\n\
row_1\tp\tMYC\t2\tNo\t\n\
\n\
GSE2\n\
NAME\tPROBE\tSYMBOL\tRANK IN GENE LIST\tCORE ENRICHMENT\t\n\
row_0\tp\tTP53\t4\tyes\t\n\
row_1\tp\tMYC\t9\tYES\t\n\
\n\
GSE3\n\
NAME\tPROBE\tSYMBOL\tRANK IN GENE LIST\tCORE ENRICHMENT\t\n\
row_0\tp\tEGFR\t4\tNo\t\n";

    #[test]
    fn parse_keeps_core_rows_only() {
        let blocks = parse_leading_edge(Path::new("t.tsv"), TABLE).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks["GSE1"].contains("TP53"));
        assert!(!blocks["GSE1"].contains("MYC"));
        assert_eq!(blocks["GSE2"].len(), 2);
    }

    #[test]
    fn invert_orders_by_count_then_symbol() {
        let blocks = parse_leading_edge(Path::new("t.tsv"), TABLE).unwrap();
        let hits = invert(&blocks);
        assert_eq!(hits[0].symbol, "TP53");
        assert_eq!(hits[0].datasets, vec!["GSE1", "GSE2"]);
        assert_eq!(hits[1].symbol, "MYC");
        assert_eq!(hits[1].count(), 1);
    }

    #[test]
    fn missing_symbol_column_is_rejected() {
        let result = parse_leading_edge(Path::new("t.tsv"), "GSE1\nNAME\tCORE ENRICHMENT\n");
        assert_matches!(result, Err(GseaError::InvalidTable { .. }));
    }

    #[test]
    fn intersect_writes_both_tables() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("DOXSET.tsv");
        fs::write(&input, TABLE).unwrap();

        let report = intersect(&input, None, None).unwrap();
        assert_eq!(report.max_count, 2);
        assert!(report.full_csv.ends_with("DOXSET_intersections/DOXSET_intersections_full.csv"));

        let full = fs::read_to_string(&report.full_csv).unwrap();
        assert_eq!(full, "SYMBOL,datasets_count,datasets\nTP53,2,GSE1;GSE2\nMYC,1,GSE2\n");
        let max_only = fs::read_to_string(&report.max_only_csv).unwrap();
        assert_eq!(max_only, "SYMBOL,datasets_count,datasets\nTP53,2,GSE1;GSE2\n");
    }

    #[test]
    fn no_core_genes_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("empty.tsv");
        fs::write(&input, "GSE1\nNAME\tSYMBOL\tCORE ENRICHMENT\nr\tA\tNo\n").unwrap();
        assert_matches!(intersect(&input, None, None), Err(GseaError::NoLeadingEdge(_)));
    }

    #[test]
    fn symbols_with_commas_are_quoted() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("HLA.tsv");
        fs::write(&input, "GSE1\nNAME\tSYMBOL\tCORE ENRICHMENT\nr\tHLA-A,B\tYes\n").unwrap();

        let report = intersect(&input, None, None).unwrap();
        let full = fs::read_to_string(&report.full_csv).unwrap();
        assert_eq!(full, "SYMBOL,datasets_count,datasets\n\"HLA-A,B\",1,GSE1\n");
    }

    #[test]
    fn exclusive_intersections_group_by_dataset_combination() {
        let blocks = parse_leading_edge(Path::new("t.tsv"), TABLE).unwrap();
        let mut hits = invert(&blocks);
        hits.push(GeneHit {
            symbol: "EGFR".to_string(),
            datasets: vec!["GSE1".to_string(), "GSE2".to_string()],
        });

        let all = exclusive_intersections(&hits, 1);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].datasets, vec!["GSE1", "GSE2"]);
        assert_eq!(all[0].genes, vec!["EGFR", "TP53"]);
        assert_eq!(all[1].datasets, vec!["GSE2"]);
        assert_eq!(all[1].genes, vec!["MYC"]);

        let shared = exclusive_intersections(&hits, 2);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].degree(), 2);
        assert!(exclusive_intersections(&hits, 3).is_empty());
    }

    #[test]
    fn min_degree_names_the_intersection_table() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("DOXSET.tsv");
        fs::write(&input, TABLE).unwrap();

        let report = intersect(&input, None, Some(2)).unwrap();
        assert_eq!(report.intersections, 1);
        assert!(report.intersections_csv.ends_with("DOXSET_upset_minDegree2.csv"));
        let table = fs::read_to_string(&report.intersections_csv).unwrap();
        assert_eq!(table, "datasets,degree,genes_count,genes\nGSE1;GSE2,2,1,TP53\n");

        let full = intersect(&input, None, None).unwrap();
        assert!(full.intersections_csv.ends_with("DOXSET_upset_full.csv"));
        assert_eq!(full.intersections, 2);
    }
}
