//! Significance table over the annotated plots.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use serde::Serialize;

use crate::error::GseaError;
use crate::fs_util;

pub const NES_CUTOFF: f64 = 1.0;
pub const FDR_CUTOFF: f64 = 0.25;
pub const PVAL_CUTOFF: f64 = 0.05;
pub const BORDERLINE_FDR: f64 = 0.5;
pub const BORDERLINE_LIMIT: usize = 10;

const CSV_HEADER: &[&str] = &[
    "GSE",
    "Gene_Set",
    "NES",
    "FDR_q_val",
    "Nominal_p_val",
    "NES_Significant",
    "FDR_Significant",
    "PVal_Significant",
    "Overall_Significant",
    "Filename",
];

static NES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NES:\s*([-+]?\d*\.?\d+)").expect("valid NES regex"));
static FDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FDR q-val:\s*([-+]?\d*\.?\d+)").expect("valid FDR regex"));
static PVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NOM p-val:\s*([-+]?\d*\.?\d+)").expect("valid p-value regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub gse: String,
    pub gene_set: String,
    pub nes: f64,
    pub fdr_qval: f64,
    pub nom_pval: f64,
    pub nes_significant: bool,
    pub fdr_significant: bool,
    pub pval_significant: bool,
    pub overall_significant: bool,
    pub filename: String,
}

impl SummaryRecord {
    pub fn new(gse: String, gene_set: String, nes: f64, fdr_qval: f64, nom_pval: f64, filename: String) -> Self {
        let fdr_significant = fdr_qval <= FDR_CUTOFF;
        Self {
            gse,
            gene_set,
            nes,
            fdr_qval,
            nom_pval,
            nes_significant: nes.abs() >= NES_CUTOFF,
            fdr_significant,
            pval_significant: nom_pval <= PVAL_CUTOFF,
            overall_significant: fdr_significant,
            filename,
        }
    }

    pub fn is_borderline(&self) -> bool {
        self.fdr_qval > FDR_CUTOFF && self.fdr_qval <= BORDERLINE_FDR
    }

    pub fn direction(&self) -> &'static str {
        if self.nes > 0.0 { "up" } else { "down" }
    }

    fn record(&self) -> [String; 10] {
        [
            self.gse.clone(),
            self.gene_set.clone(),
            self.nes.to_string(),
            self.fdr_qval.to_string(),
            self.nom_pval.to_string(),
            py_bool(self.nes_significant).to_string(),
            py_bool(self.fdr_significant).to_string(),
            py_bool(self.pval_significant).to_string(),
            py_bool(self.overall_significant).to_string(),
            self.filename.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneSetSummary {
    pub gene_set: String,
    pub tests: usize,
    pub significant: usize,
    pub mean_nes: f64,
    pub mean_fdr: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryReport {
    pub records: Vec<SummaryRecord>,
    pub skipped: Vec<String>,
}

impl SummaryReport {
    pub fn datasets(&self) -> usize {
        self.records.iter().map(|r| r.gse.as_str()).collect::<BTreeSet<_>>().len()
    }

    pub fn count(&self, pick: impl Fn(&SummaryRecord) -> bool) -> usize {
        self.records.iter().filter(|record| pick(record)).count()
    }

    pub fn by_gene_set(&self) -> Vec<GeneSetSummary> {
        let mut groups: BTreeMap<&str, Vec<&SummaryRecord>> = BTreeMap::new();
        for record in &self.records {
            groups.entry(record.gene_set.as_str()).or_default().push(record);
        }
        groups
            .into_iter()
            .map(|(gene_set, records)| {
                let tests = records.len();
                let significant = records.iter().filter(|r| r.overall_significant).count();
                let mean = |value: fn(&SummaryRecord) -> f64| {
                    records.iter().map(|r| value(r)).sum::<f64>() / tests as f64
                };
                GeneSetSummary {
                    gene_set: gene_set.to_string(),
                    tests,
                    significant,
                    mean_nes: mean(|r| r.nes),
                    mean_fdr: mean(|r| r.fdr_qval),
                    success_rate: significant as f64 * 100.0 / tests as f64,
                }
            })
            .collect()
    }

    pub fn significant(&self) -> impl Iterator<Item = &SummaryRecord> {
        self.records.iter().filter(|record| record.overall_significant)
    }

    pub fn borderline(&self) -> Vec<&SummaryRecord> {
        self.records.iter().filter(|record| record.is_borderline()).collect()
    }

    /// Human readable digest: totals, per gene set figures, hits and
    /// borderline cases.
    pub fn render_text(&self) -> String {
        let total = self.records.len();
        let mut out = String::new();
        let _ = writeln!(out, "Analyzed {total} enrichment analyses");
        let _ = writeln!(out, "From {} datasets", self.datasets());
        let _ = writeln!(out, "Testing {} gene sets", self.by_gene_set().len());
        let _ = writeln!(out);
        let _ = writeln!(out, "Cutoffs: |NES| >= {NES_CUTOFF}, FDR <= {FDR_CUTOFF}, p <= {PVAL_CUTOFF}; overall = FDR");
        for (name, hits) in [
            ("NES significant", self.count(|r| r.nes_significant)),
            ("FDR significant", self.count(|r| r.fdr_significant)),
            ("p-value significant", self.count(|r| r.pval_significant)),
            ("Overall significant", self.count(|r| r.overall_significant)),
        ] {
            let _ = writeln!(out, "  {name}: {hits}/{total} ({:.1}%)", percent(hits, total));
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "By gene set:");
        for summary in self.by_gene_set() {
            let _ = writeln!(
                out,
                "  {}: {}/{} significant ({:.1}%), mean NES {:.3}, mean FDR {:.3}",
                summary.gene_set,
                summary.significant,
                summary.tests,
                summary.success_rate,
                summary.mean_nes,
                summary.mean_fdr
            );
        }

        let hits: Vec<&SummaryRecord> = self.significant().collect();
        if !hits.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Significant enrichments (FDR <= {FDR_CUTOFF}): {}", hits.len());
            for record in hits {
                let _ = writeln!(out, "  {}", describe(record));
            }
        }

        let borderline = self.borderline();
        if !borderline.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Borderline cases ({FDR_CUTOFF} < FDR <= {BORDERLINE_FDR}): {}",
                borderline.len()
            );
            for record in borderline.iter().take(BORDERLINE_LIMIT) {
                let _ = writeln!(out, "  {}", describe(record));
            }
            if borderline.len() > BORDERLINE_LIMIT {
                let _ = writeln!(out, "  ... and {} more", borderline.len() - BORDERLINE_LIMIT);
            }
        }
        out
    }
}

/// Splits `GSE1_DOXSET_1_DOX_GENES_enplot.svg` into `GSE1` and the rest.
pub fn parse_plot_name(filename: &str) -> Option<(String, String)> {
    let stem = filename.strip_suffix(".svg")?;
    let stem = stem.strip_suffix("_enplot").unwrap_or(stem);
    let (gse, gene_set) = stem.split_once('_')?;
    if gse.is_empty() || gene_set.is_empty() {
        return None;
    }
    Some((gse.to_string(), gene_set.to_string()))
}

pub fn extract_stats(content: &str) -> Option<(f64, f64, f64)> {
    let number = |re: &Regex| {
        re.captures(content)
            .and_then(|caps| caps.get(1))
            .and_then(|value| value.as_str().parse::<f64>().ok())
    };
    Some((number(&NES_RE)?, number(&FDR_RE)?, number(&PVAL_RE)?))
}

pub fn analyze(plots: &Path) -> Result<SummaryReport, GseaError> {
    let mut report = SummaryReport::default();
    if !plots.exists() {
        tracing::warn!(dir = %plots.display(), "no annotated plots directory");
        return Ok(report);
    }
    let mut files: Vec<_> = fs::read_dir(plots)
        .map_err(|err| fs_util::io_err(plots, err))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "svg"))
        .collect();
    files.sort();

    for path in files {
        let Some(filename) = path.file_name().and_then(|name| name.to_str()).map(str::to_string) else {
            continue;
        };
        let Some((gse, gene_set)) = parse_plot_name(&filename) else {
            report.skipped.push(filename);
            continue;
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(plot = %path.display(), "cannot read plot: {err}");
                report.skipped.push(filename);
                continue;
            }
        };
        match extract_stats(&content) {
            Some((nes, fdr, pval)) => report
                .records
                .push(SummaryRecord::new(gse, gene_set, nes, fdr, pval, filename)),
            None => {
                tracing::debug!(plot = %filename, "plot lacks statistics");
                report.skipped.push(filename);
            }
        }
    }
    Ok(report)
}

pub fn write_csv(report: &SummaryReport, path: &Utf8Path) -> Result<(), GseaError> {
    fs_util::write_csv_atomic(
        path.as_std_path(),
        CSV_HEADER,
        report.records.iter().map(SummaryRecord::record),
    )?;
    tracing::info!(path = %path, rows = report.records.len(), "summary written");
    Ok(())
}

fn describe(record: &SummaryRecord) -> String {
    format!(
        "[{}] {} - {}: NES={:.3}, FDR={:.4}, p={:.4}",
        record.direction(),
        record.gse,
        record.gene_set,
        record.nes,
        record.fdr_qval,
        record.nom_pval
    )
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { part as f64 * 100.0 / total as f64 }
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}
