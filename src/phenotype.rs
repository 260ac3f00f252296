use std::collections::HashSet;

use serde::Serialize;

use crate::error::GseaError;

const CONTROL_HINTS: &[&str] = &[
    "ctrl",
    "control",
    "untreated",
    "vehicle",
    "dmso",
    "mock",
    "wt",
    "nodox",
    "minus",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phenotypes {
    pub control: String,
    pub treated: String,
}

impl Phenotypes {
    /// Suffix for `-cls <file>#<comparison>`, phenotype of interest first.
    pub fn comparison(&self) -> String {
        format!("{}_versus_{}", self.treated, self.control)
    }
}

/// Two-class GSEA categorical class file (`.cls`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub classes: [String; 2],
    pub assignments: Vec<String>,
}

impl ClassFile {
    pub fn parse(text: &str) -> Result<Self, GseaError> {
        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

        let dims = lines
            .next()
            .ok_or_else(|| GseaError::InvalidClassFile("empty file".to_string()))?;
        let mut dims = dims.split_whitespace().map(str::parse::<usize>);
        let samples = match dims.next() {
            Some(Ok(value)) => value,
            _ => {
                return Err(GseaError::InvalidClassFile(
                    "first line must start with the sample count".to_string(),
                ));
            }
        };

        let names = lines
            .next()
            .and_then(|line| line.strip_prefix('#'))
            .ok_or_else(|| GseaError::InvalidClassFile("missing '#' class line".to_string()))?;
        let names: Vec<&str> = names.split_whitespace().collect();
        let [first, second] = names.as_slice() else {
            return Err(GseaError::InvalidClassFile(format!(
                "expected 2 classes, found {}",
                names.len()
            )));
        };

        let assignments: Vec<String> = lines
            .next()
            .ok_or_else(|| GseaError::InvalidClassFile("missing assignment line".to_string()))?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if assignments.len() != samples {
            return Err(GseaError::InvalidClassFile(format!(
                "header declares {samples} samples, assignment line has {}",
                assignments.len()
            )));
        }

        Ok(Self {
            classes: [first.to_string(), second.to_string()],
            assignments,
        })
    }

    /// Builds a class file from the matrix sample order and a control list.
    pub fn from_controls(
        samples: &[String],
        controls: &[String],
        control_label: &str,
        treated_label: &str,
    ) -> Result<Self, GseaError> {
        let controls: HashSet<&str> = controls.iter().map(String::as_str).collect();
        let assignments: Vec<String> = samples
            .iter()
            .map(|sample| {
                if controls.contains(sample.as_str()) {
                    control_label.to_string()
                } else {
                    treated_label.to_string()
                }
            })
            .collect();

        let matched = assignments
            .iter()
            .filter(|label| label.as_str() == control_label)
            .count();
        if matched == 0 || matched == samples.len() {
            return Err(GseaError::ControlMismatch {
                matched,
                total: samples.len(),
            });
        }

        let first = assignments[0].clone();
        let second = if first == control_label {
            treated_label.to_string()
        } else {
            control_label.to_string()
        };

        Ok(Self {
            classes: [first, second],
            assignments,
        })
    }

    pub fn phenotypes(&self) -> Phenotypes {
        let [first, second] = &self.classes;
        let (control, treated) = if is_control_name(second) && !is_control_name(first) {
            (second, first)
        } else {
            (first, second)
        };
        Phenotypes {
            control: control.clone(),
            treated: treated.clone(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{} 2 1\n# {} {}\n{}\n",
            self.assignments.len(),
            self.classes[0],
            self.classes[1],
            self.assignments.join(" ")
        )
    }
}

/// Sample names from a `controls.txt` body.
pub fn parse_control_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn is_control_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CONTROL_HINTS.iter().any(|hint| lower.contains(hint))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn control_hint_picks_second_class() {
        let cls = ClassFile::parse("4 2 1\n# DOX CTRL\nDOX DOX CTRL CTRL\n").unwrap();
        let phenotypes = cls.phenotypes();
        assert_eq!(phenotypes.control, "CTRL");
        assert_eq!(phenotypes.comparison(), "DOX_versus_CTRL");
    }

    #[test]
    fn render_round_trips() {
        let text = "3 2 1\n# A B\nA B B\n";
        assert_eq!(ClassFile::parse(text).unwrap().render(), text);
    }

    #[test]
    fn parse_rejects_malformed_files() {
        let cases = [
            ("", "empty file"),
            ("x 2 1\n# A B\nA B\n", "sample count"),
            ("2 2 1\nA B\n", "'#'"),
            ("2 1 1\n# A\nA A\n", "found 1"),
            ("3 3 1\n# A B C\nA B C\n", "found 3"),
            ("3 2 1\n# A B\nA B\n", "has 2"),
            ("2 2 1\n# A B\n", "assignment line"),
        ];
        for (text, reason) in cases {
            let err = ClassFile::parse(text).unwrap_err();
            assert_matches!(&err, GseaError::InvalidClassFile(message) if message.contains(reason), "{text:?}");
        }
    }

    #[test]
    fn first_declared_class_is_control_without_hints() {
        let cls = ClassFile::parse("2 2 1\n# KO OE\nKO OE\n").unwrap();
        assert_eq!(cls.phenotypes().comparison(), "OE_versus_KO");
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn controls_must_split_samples() {
        let samples = names(&["s1", "s2", "s3"]);
        assert_matches!(
            ClassFile::from_controls(&samples, &names(&["other"]), "CONTROL", "TREATED"),
            Err(GseaError::ControlMismatch { matched: 0, total: 3 })
        );
        assert_matches!(
            ClassFile::from_controls(&samples, &samples, "CONTROL", "TREATED"),
            Err(GseaError::ControlMismatch { matched: 3, total: 3 })
        );
    }

    #[test]
    fn controls_class_order_follows_first_sample() {
        let samples = names(&["dox_1", "ctrl_1", "dox_2"]);
        let cls = ClassFile::from_controls(&samples, &names(&["ctrl_1"]), "WT", "DOX").unwrap();
        assert_eq!(cls.classes, ["DOX".to_string(), "WT".to_string()]);
        assert_eq!(cls.render(), "3 2 1\n# DOX WT\nDOX WT DOX\n");
    }

    #[test]
    fn control_list_ignores_comments_and_blanks() {
        let list = parse_control_list("# controls\n\nctrl_1\n  ctrl_2  \n");
        assert_eq!(list, names(&["ctrl_1", "ctrl_2"]));
    }
}
