//! Guesses the gene identifier convention of an expression matrix from a
//! sample of its row names.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::IdType;
use crate::error::GseaError;
use crate::matrix::ExpressionMatrix;

pub const SAMPLE_LIMIT: usize = 200;

/// Minimum number of hits before a non-symbol convention is considered.
const MIN_VOTES: usize = 3;

static ENSEMBL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ENS[A-Z]*[0-9]+(\.[0-9]+)?$").expect("valid ensembl regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdCounts {
    pub ensembl: usize,
    pub numeric: usize,
    pub other: usize,
}

impl IdCounts {
    pub fn tally<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts = IdCounts::default();
        for id in ids {
            let id = id.as_ref();
            if ENSEMBL_RE.is_match(id) {
                counts.ensembl += 1;
            } else if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
                counts.numeric += 1;
            } else {
                counts.other += 1;
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.ensembl + self.numeric + self.other
    }

    pub fn classify(&self) -> IdType {
        if self.ensembl >= MIN_VOTES && self.ensembl >= self.numeric && self.ensembl >= self.other {
            IdType::Ensembl
        } else if self.numeric >= MIN_VOTES && self.numeric > self.ensembl {
            IdType::Ncbi
        } else {
            IdType::Symbol
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub id_type: IdType,
    pub counts: IdCounts,
}

pub fn classify_matrix(path: &Path) -> Result<Classification, GseaError> {
    let ids = ExpressionMatrix::new(path).sample_identifiers(SAMPLE_LIMIT)?;
    let counts = IdCounts::tally(&ids);
    let id_type = counts.classify();
    tracing::debug!(
        matrix = %path.display(),
        ensembl = counts.ensembl,
        numeric = counts.numeric,
        other = counts.other,
        %id_type,
        "classified identifiers"
    );
    Ok(Classification { id_type, counts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensembl_pattern_accepts_versions() {
        let counts = IdCounts::tally(["ENSG00000141510", "ENSMUSG00000059552.7", "ENS1"]);
        assert_eq!(counts.ensembl, 3);
    }

    #[test]
    fn ensembl_pattern_rejects_lowercase_and_suffixes() {
        let counts = IdCounts::tally(["ensg0001", "ENSG0001_at", "ENSG.1"]);
        assert_eq!(counts.ensembl, 0);
        assert_eq!(counts.other, 3);
    }

    fn counts(ensembl: usize, numeric: usize, other: usize) -> IdCounts {
        IdCounts {
            ensembl,
            numeric,
            other,
        }
    }

    #[test]
    fn majority_rule_boundaries() {
        let cases = [
            (counts(0, 0, 0), IdType::Symbol),
            (counts(3, 0, 0), IdType::Ensembl),
            (counts(2, 0, 0), IdType::Symbol),
            (counts(3, 3, 0), IdType::Ensembl),
            (counts(3, 0, 3), IdType::Ensembl),
            (counts(3, 0, 4), IdType::Symbol),
            (counts(3, 4, 0), IdType::Ncbi),
            (counts(2, 3, 10), IdType::Ncbi),
            (counts(0, 2, 0), IdType::Symbol),
            (counts(0, 0, 50), IdType::Symbol),
        ];
        for (input, expected) in cases {
            assert_eq!(input.classify(), expected, "{input:?}");
        }
    }

    #[test]
    fn entrez_ids_classify_as_ncbi() {
        let counts = IdCounts::tally(["7157", "4609", "1956", "TP53"]);
        assert_eq!(counts.numeric, 3);
        assert_eq!(counts.classify(), IdType::Ncbi);
    }

    #[test]
    fn classify_matrix_skips_na_rows() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("expr.txt");
        std::fs::write(&path, "gene\ts1\ts2\nNA\t1\t2\n7157\t1\t2\n4609\t1\t2\n1956\t1\t2\n").unwrap();
        let result = classify_matrix(&path).unwrap();
        assert_eq!(result.id_type, IdType::Ncbi);
        assert_eq!(result.counts.total(), 3);
    }
}
