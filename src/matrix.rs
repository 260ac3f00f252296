use std::io::BufRead;
use std::path::Path;

use crate::error::GseaError;
use crate::fs_util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFormat {
    /// `#1.2` version line, dimensions line, then `NAME\tDescription\t...`.
    Gct,
    /// Plain tab-delimited table with a header row.
    Tabular,
}

impl MatrixFormat {
    pub fn detect(path: &Path) -> Self {
        match fs_util::plain_name(path) {
            Some(name) if name.ends_with(".gct") => MatrixFormat::Gct,
            _ => MatrixFormat::Tabular,
        }
    }

    fn preamble_lines(&self) -> usize {
        match self {
            MatrixFormat::Gct => 2,
            MatrixFormat::Tabular => 0,
        }
    }
}

/// Line-oriented view over an expression matrix on disk.
pub struct ExpressionMatrix<'a> {
    path: &'a Path,
    format: MatrixFormat,
}

impl<'a> ExpressionMatrix<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self {
            path,
            format: MatrixFormat::detect(path),
        }
    }

    pub fn format(&self) -> MatrixFormat {
        self.format
    }

    /// Sample column names: the header without the identifier column and
    /// without a `Description` column when one follows it.
    pub fn sample_names(&self) -> Result<Vec<String>, GseaError> {
        let reader = fs_util::open_text(self.path)?;
        let header = reader
            .lines()
            .nth(self.format.preamble_lines())
            .transpose()
            .map_err(|err| fs_util::io_err(self.path, err))?
            .ok_or_else(|| GseaError::EmptyMatrix(self.path.to_path_buf()))?;

        let mut columns = header.trim_end_matches(['\r', '\n']).split('\t').skip(1);
        let mut samples = Vec::new();
        if let Some(second) = columns.next() {
            if !second.trim().eq_ignore_ascii_case("description") {
                samples.push(second.trim().to_string());
            }
        }
        samples.extend(columns.map(|name| name.trim().to_string()));
        samples.retain(|name| !name.is_empty());

        if samples.is_empty() {
            return Err(GseaError::EmptyMatrix(self.path.to_path_buf()));
        }
        Ok(samples)
    }

    /// First-column tokens of the data rows, trimmed, skipping blanks and `NA`,
    /// stopping once `limit` tokens were collected.
    pub fn sample_identifiers(&self, limit: usize) -> Result<Vec<String>, GseaError> {
        let reader = fs_util::open_text(self.path)?;
        let mut ids = Vec::with_capacity(limit.min(1024));
        for line in reader.lines().skip(self.format.preamble_lines() + 1) {
            if ids.len() >= limit {
                break;
            }
            let line = line.map_err(|err| fs_util::io_err(self.path, err))?;
            let token = line.split('\t').next().unwrap_or("").trim();
            if token.is_empty() || token == "NA" {
                continue;
            }
            ids.push(token.to_string());
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gct_header_skips_description() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("expr.gct");
        std::fs::write(
            &path,
            "#1.2\n3\t2\nNAME\tDescription\tS1\tS2\nTP53\tna\t1\t2\n\t\t\t\nNA\tna\t0\t0\nMYC\tna\t3\t4\n",
        )
        .unwrap();

        let matrix = ExpressionMatrix::new(&path);
        assert_eq!(matrix.format(), MatrixFormat::Gct);
        assert_eq!(matrix.sample_names().unwrap(), vec!["S1", "S2"]);
        assert_eq!(matrix.sample_identifiers(200).unwrap(), vec!["TP53", "MYC"]);
        assert_eq!(matrix.sample_identifiers(1).unwrap(), vec!["TP53"]);
    }
}
