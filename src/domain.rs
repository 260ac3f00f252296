use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GseaError;

/// Gene identifier convention of an expression matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    Ensembl,
    Ncbi,
    Symbol,
}

impl IdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Ensembl => "ensembl",
            IdType::Ncbi => "ncbi",
            IdType::Symbol => "symbol",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdType {
    type Err = GseaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ensembl" => Ok(IdType::Ensembl),
            "ncbi" | "entrez" => Ok(IdType::Ncbi),
            "symbol" => Ok(IdType::Symbol),
            _ => Err(GseaError::InvalidIdType(value.to_string())),
        }
    }
}

/// Value passed to the GSEA `-collapse` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapseMode {
    Collapse,
    NoCollapse,
    RemapOnly,
}

impl CollapseMode {
    pub fn as_gsea_arg(&self) -> &'static str {
        match self {
            CollapseMode::Collapse => "Collapse",
            CollapseMode::NoCollapse => "No_Collapse",
            CollapseMode::RemapOnly => "Remap_Only",
        }
    }

    pub fn needs_chip(&self) -> bool {
        !matches!(self, CollapseMode::NoCollapse)
    }
}

impl fmt::Display for CollapseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_gsea_arg())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = GseaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized.strip_prefix("GSE").unwrap_or("");
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(GseaError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Name of a dataset directory, e.g. `GSE100132` or `GSE17580_liver`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading `_`-separated token, which by convention is the GEO accession.
    pub fn accession_token(&self) -> &str {
        self.0.split('_').next().unwrap_or(&self.0)
    }

    pub fn accession(&self) -> Option<GeoSeriesAccession> {
        self.accession_token().parse().ok()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = GseaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && !trimmed.starts_with('.')
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !is_valid {
            return Err(GseaError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_accession_valid() {
        let acc: GeoSeriesAccession = "gse100132".parse().unwrap();
        assert_eq!(acc.as_str(), "GSE100132");
    }

    #[test]
    fn parse_accession_invalid() {
        let err = "GSEabc".parse::<GeoSeriesAccession>().unwrap_err();
        assert_matches!(err, GseaError::InvalidAccession(_));
    }

    #[test]
    fn dataset_id_accession_token() {
        let id: DatasetId = "GSE17580_liver".parse().unwrap();
        assert_eq!(id.accession_token(), "GSE17580");
        assert_eq!(id.accession().unwrap().as_str(), "GSE17580");
    }

    #[test]
    fn dataset_id_rejects_whitespace() {
        let err = "GSE 1".parse::<DatasetId>().unwrap_err();
        assert_matches!(err, GseaError::InvalidDatasetId(_));
    }

    #[test]
    fn collapse_mode_arguments() {
        assert_eq!(CollapseMode::NoCollapse.as_gsea_arg(), "No_Collapse");
        assert!(CollapseMode::RemapOnly.needs_chip());
        assert!(!CollapseMode::NoCollapse.needs_chip());
    }
}
