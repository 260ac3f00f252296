use std::io::{self, Write};

use serde::Serialize;

use crate::app::{PlanResult, ProgressEvent, ProgressSink, Stage};
use crate::batch::{BatchReport, DatasetStatus};
use crate::classify::Classification;
use crate::concat::ConcatReport;
use crate::enplot::AnnotateReport;
use crate::gallery::GalleryResult;
use crate::intersect::IntersectReport;
use crate::summary::SummaryReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_batch(result: &BatchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(result: &PlanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_classification(result: &Classification) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_annotate(result: &AnnotateReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_summary(result: &SummaryReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_concat(result: &ConcatReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_gallery(result: &GalleryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_intersect(result: &IntersectReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the tracing subscriber; used by the post-processing
/// commands, which have no dashboard.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match (&event.dataset, event.stage) {
            (Some(id), Stage::Failed) => tracing::warn!(dataset = %id, "{}", event.message),
            (Some(id), _) => tracing::info!(dataset = %id, "{}", event.message),
            (None, _) => tracing::info!("{}", event.message),
        }
    }
}

pub fn print_batch_summary(report: &BatchReport) {
    println!(
        "Batch finished: {} succeeded, {} failed, {} skipped",
        report.succeeded, report.failed, report.skipped
    );
    for outcome in &report.outcomes {
        let status = match outcome.status {
            DatasetStatus::Succeeded => "ok",
            DatasetStatus::Failed => "FAILED",
            DatasetStatus::Skipped => "skipped",
        };
        let id_type = outcome
            .id_type
            .map(|value| value.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<8} {:<8} {:.1}s",
            outcome.id.as_str(),
            status,
            id_type,
            outcome.elapsed_ms as f64 / 1000.0
        );
        for set in &outcome.gene_sets {
            let detail = if set.skipped {
                "existing report".to_string()
            } else if let Some(strategy) = &set.strategy {
                format!("{strategy} after {} attempt(s)", set.attempts.len())
            } else {
                format!("all {} strategies failed", set.attempts.len())
            };
            println!("      {}: {detail}", set.label);
        }
        if let Some(error) = &outcome.error {
            println!("      error: {error}");
        }
        if let Some(log) = &outcome.log {
            println!("      log: {log}");
        }
    }
}

pub fn print_plan(plan: &PlanResult) {
    println!("Gene sets: {}", plan.gene_sets.join(", "));
    for entry in &plan.datasets {
        match &entry.error {
            Some(error) => println!("  {:<16} error: {error}", entry.id.as_str()),
            None => println!(
                "  {:<16} {:<8} {:<28} {}",
                entry.id.as_str(),
                entry
                    .id_type
                    .map(|value| value.to_string())
                    .unwrap_or_default(),
                entry.comparison.as_deref().unwrap_or("-"),
                entry.strategies.join(" -> ")
            ),
        }
    }
}

pub fn print_classification(matrix: &str, result: &Classification) {
    println!(
        "{matrix}: {} (ensembl={}, numeric={}, other={})",
        result.id_type, result.counts.ensembl, result.counts.numeric, result.counts.other
    );
}

pub fn print_annotate(result: &AnnotateReport) {
    println!("Annotated {} plots", result.written.len());
    for failure in &result.failed {
        println!("  failed {}: {}", failure.source.display(), failure.error);
    }
}

pub fn print_concat(result: &ConcatReport) {
    for output in &result.outputs {
        match &output.path {
            Some(path) => println!("  {}: {} blocks -> {path}", output.gene_set, output.blocks.len()),
            None => println!("  {}: nothing to concatenate", output.gene_set),
        }
        for missing in &output.missing {
            println!("      missing table in {missing}");
        }
    }
}

pub fn print_gallery(result: &GalleryResult) {
    println!(
        "Wrote {} gallery {} ({} datasets, {} plots, {} missing)",
        result.kind, result.path, result.datasets, result.plots, result.missing
    );
}

pub fn print_intersect(result: &IntersectReport) {
    println!(
        "{} genes across {} datasets (max shared: {})",
        result.genes, result.datasets, result.max_count
    );
    println!("  {}", result.full_csv.display());
    println!("  {}", result.max_only_csv.display());
    println!(
        "  {} ({} exclusive intersections)",
        result.intersections_csv.display(),
        result.intersections
    );
}
