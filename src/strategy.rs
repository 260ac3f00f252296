use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ChipFiles;
use crate::domain::{CollapseMode, IdType};

/// One way of feeding a matrix to GSEA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Strategy {
    pub collapse: CollapseMode,
    pub chip: Option<Utf8PathBuf>,
    pub tag: &'static str,
}

struct Row {
    collapse: CollapseMode,
    chip: ChipSlot,
    tag: &'static str,
}

#[derive(Clone, Copy)]
enum ChipSlot {
    None,
    Ensembl,
    Ncbi,
    Symbol,
}

const ENSEMBL_ROWS: &[Row] = &[
    Row {
        collapse: CollapseMode::Collapse,
        chip: ChipSlot::Ensembl,
        tag: "ensembl_collapse",
    },
    Row {
        collapse: CollapseMode::NoCollapse,
        chip: ChipSlot::None,
        tag: "no_collapse",
    },
];

const NCBI_ROWS: &[Row] = &[
    Row {
        collapse: CollapseMode::Collapse,
        chip: ChipSlot::Ncbi,
        tag: "ncbi_collapse",
    },
    Row {
        collapse: CollapseMode::NoCollapse,
        chip: ChipSlot::None,
        tag: "no_collapse",
    },
];

const SYMBOL_ROWS: &[Row] = &[
    Row {
        collapse: CollapseMode::NoCollapse,
        chip: ChipSlot::None,
        tag: "no_collapse",
    },
    Row {
        collapse: CollapseMode::RemapOnly,
        chip: ChipSlot::Symbol,
        tag: "symbol_remap",
    },
];

pub struct StrategyTable;

impl StrategyTable {
    /// Ordered fallbacks for `id_type`. Rows whose CHIP file is not configured
    /// or not on disk are left out; `no_collapse` is always present.
    pub fn for_id_type(id_type: IdType, chips: &ChipFiles) -> Vec<Strategy> {
        let rows = match id_type {
            IdType::Ensembl => ENSEMBL_ROWS,
            IdType::Ncbi => NCBI_ROWS,
            IdType::Symbol => SYMBOL_ROWS,
        };

        rows.iter()
            .filter_map(|row| {
                let chip = match row.chip {
                    ChipSlot::None => None,
                    ChipSlot::Ensembl => Some(chips.ensembl.as_ref()),
                    ChipSlot::Ncbi => Some(chips.ncbi.as_ref()),
                    ChipSlot::Symbol => Some(chips.symbol.as_ref()),
                };
                match chip {
                    None => Some(Strategy {
                        collapse: row.collapse,
                        chip: None,
                        tag: row.tag,
                    }),
                    Some(Some(path)) if path.as_std_path().is_file() => Some(Strategy {
                        collapse: row.collapse,
                        chip: Some(path.clone()),
                        tag: row.tag,
                    }),
                    Some(Some(path)) => {
                        tracing::warn!(strategy = row.tag, chip = %path, "chip file missing; strategy skipped");
                        None
                    }
                    Some(None) => {
                        tracing::debug!(strategy = row.tag, "no chip configured; strategy skipped");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn tags(strategies: &[Strategy]) -> Vec<&'static str> {
        strategies.iter().map(|strategy| strategy.tag).collect()
    }

    struct Chips {
        _dir: tempfile::TempDir,
        present: ChipFiles,
        missing: ChipFiles,
    }

    fn chips() -> Chips {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut present = ChipFiles::default();
        for (slot, name) in [
            (&mut present.ensembl, "Human_Ensembl.chip"),
            (&mut present.ncbi, "Human_NCBI.chip"),
            (&mut present.symbol, "Human_Symbol.chip"),
        ] {
            let path = root.join(name);
            fs::write(&path, "Probe Set ID\tGene Symbol\n").unwrap();
            *slot = Some(path);
        }
        let missing = ChipFiles {
            ensembl: Some(root.join("gone/ensembl.chip")),
            ncbi: Some(root.join("gone/ncbi.chip")),
            symbol: Some(root.join("gone/symbol.chip")),
        };
        Chips {
            _dir: dir,
            present,
            missing,
        }
    }

    #[test]
    fn ensembl_collapses_first() {
        let chips = chips();
        let table = StrategyTable::for_id_type(IdType::Ensembl, &chips.present);
        assert_eq!(tags(&table), vec!["ensembl_collapse", "no_collapse"]);
        assert_eq!(table[0].collapse, CollapseMode::Collapse);
        assert_eq!(table[0].chip, chips.present.ensembl);
        assert_eq!(table[1].chip, None);

        let absent = StrategyTable::for_id_type(IdType::Ensembl, &ChipFiles::default());
        assert_eq!(tags(&absent), vec!["no_collapse"]);
        let missing = StrategyTable::for_id_type(IdType::Ensembl, &chips.missing);
        assert_eq!(tags(&missing), vec!["no_collapse"]);
    }

    #[test]
    fn ncbi_uses_its_own_chip() {
        let chips = chips();
        let table = StrategyTable::for_id_type(IdType::Ncbi, &chips.present);
        assert_eq!(tags(&table), vec!["ncbi_collapse", "no_collapse"]);
        assert_eq!(table[0].chip, chips.present.ncbi);

        let absent = StrategyTable::for_id_type(IdType::Ncbi, &ChipFiles::default());
        assert_eq!(tags(&absent), vec!["no_collapse"]);
        let missing = StrategyTable::for_id_type(IdType::Ncbi, &chips.missing);
        assert_eq!(tags(&missing), vec!["no_collapse"]);
    }

    #[test]
    fn symbol_remaps_after_no_collapse() {
        let chips = chips();
        let table = StrategyTable::for_id_type(IdType::Symbol, &chips.present);
        assert_eq!(tags(&table), vec!["no_collapse", "symbol_remap"]);
        assert_eq!(table[1].collapse, CollapseMode::RemapOnly);
        assert_eq!(table[1].chip, chips.present.symbol);

        let absent = StrategyTable::for_id_type(IdType::Symbol, &ChipFiles::default());
        assert_eq!(tags(&absent), vec!["no_collapse"]);
        let missing = StrategyTable::for_id_type(IdType::Symbol, &chips.missing);
        assert_eq!(tags(&missing), vec!["no_collapse"]);
    }
}
