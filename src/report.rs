//! Reading the report directories GSEA leaves behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::GseaError;
use crate::fs_util;

pub const NOT_AVAILABLE: &str = "N/A";

static NES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Normalized Enrichment Score \(NES\)</td><td>([\d\.-]+)</td>")
        .expect("valid NES regex")
});
static PVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Nominal p-value</td><td>([\d\.-]+)</td>").expect("valid p-value regex")
});
static FDR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"FDR q-value</td><td>([\d\.-]+)</td>").expect("valid FDR regex")
});

/// A finished `<label>.Gsea.<timestamp>` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDir {
    pub label: String,
    pub timestamp: u64,
    pub path: PathBuf,
}

impl ReportDir {
    /// Splits `GSE1_Upregulated.Gsea.1700000000000` into label and timestamp.
    pub fn parse_name(name: &str) -> Option<(String, u64)> {
        let (label, timestamp) = name.rsplit_once(".Gsea.")?;
        if label.is_empty() {
            return None;
        }
        let timestamp = timestamp.parse().ok()?;
        Some((label.to_string(), timestamp))
    }

    pub fn is_complete(path: &Path) -> bool {
        path.join("index.html").is_file()
    }

    /// Latest complete report per label, sorted by label.
    pub fn scan(results_root: &Path) -> Result<Vec<ReportDir>, GseaError> {
        if !results_root.exists() {
            return Ok(Vec::new());
        }
        let mut latest: BTreeMap<String, ReportDir> = BTreeMap::new();
        for path in fs_util::list_subdirs(results_root)? {
            let Some((label, timestamp)) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(Self::parse_name)
            else {
                continue;
            };
            if !Self::is_complete(&path) {
                tracing::debug!(report = %path.display(), "incomplete report ignored");
                continue;
            }
            let newer = latest
                .get(&label)
                .map(|current| timestamp > current.timestamp)
                .unwrap_or(true);
            if newer {
                latest.insert(
                    label.clone(),
                    ReportDir {
                        label,
                        timestamp,
                        path,
                    },
                );
            }
        }
        Ok(latest.into_values().collect())
    }

    /// Newest complete report for `label` under `results_root`.
    pub fn latest(results_root: &Path, label: &str) -> Option<ReportDir> {
        Self::scan(results_root)
            .ok()?
            .into_iter()
            .find(|report| report.label == label)
    }

    /// Whether a complete report for `label` exists under `results_root`.
    pub fn exists(results_root: &Path, label: &str) -> bool {
        Self::latest(results_root, label).is_some()
    }

    /// GEO accession: the leading `_` token of the label.
    pub fn accession(&self) -> &str {
        self.label.split('_').next().unwrap_or(&self.label)
    }

    pub fn set_html(&self, set_name: &str) -> PathBuf {
        self.path.join(format!("{set_name}.html"))
    }

    pub fn set_tsv(&self, set_name: &str) -> PathBuf {
        self.path.join(format!("{set_name}.tsv"))
    }
}

/// Statistics of one gene set, kept as the report prints them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub nes: String,
    pub nom_pval: String,
    pub fdr_qval: String,
}

impl EnrichmentStats {
    pub fn from_html(content: &str) -> Self {
        let capture = |re: &Regex| {
            re.captures(content)
                .and_then(|caps| caps.get(1))
                .map(|value| value.as_str().to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        Self {
            nes: capture(&NES_RE),
            nom_pval: capture(&PVAL_RE),
            fdr_qval: capture(&FDR_RE),
        }
    }

    pub fn lines(&self) -> [String; 3] {
        [
            format!("NES: {}", self.nes),
            format!("NOM p-val: {}", self.nom_pval),
            format!("FDR q-val: {}", self.fdr_qval),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_report_dir_name() {
        let (label, ts) = ReportDir::parse_name("GSE1_DOXSET_1.Gsea.1700000000123").unwrap();
        assert_eq!(label, "GSE1_DOXSET_1");
        assert_eq!(ts, 1700000000123);
        assert!(ReportDir::parse_name("GSE1_DOXSET_1").is_none());
        assert!(ReportDir::parse_name("GSE1.Gsea.latest").is_none());
    }

    #[test]
    fn stats_from_html() {
        let html = "<tr><td>Normalized Enrichment Score (NES)</td><td>-1.52</td></tr>\
                    <tr><td>Nominal p-value</td><td>0.004</td></tr>";
        let stats = EnrichmentStats::from_html(html);
        assert_eq!(stats.nes, "-1.52");
        assert_eq!(stats.nom_pval, "0.004");
        assert_eq!(stats.fdr_qval, NOT_AVAILABLE);
    }
}
