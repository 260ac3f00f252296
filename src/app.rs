use std::time::Duration;

use serde::Serialize;

use crate::batch::{Batch, BatchOptions, BatchReport};
use crate::concat::{self, ConcatReport};
use crate::config::ResolvedConfig;
use crate::dataset::{self, Dataset};
use crate::domain::{DatasetId, IdType};
use crate::enplot::{self, AnnotateReport};
use crate::error::GseaError;
use crate::gallery::{self, GalleryKind, GalleryResult};
use crate::gsea::GseaRunner;
use crate::layout::Layout;
use crate::summary::{self, SummaryReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Queued,
    Prepare,
    Attempt,
    Succeeded,
    Failed,
    Skipped,
    Info,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub dataset: Option<DatasetId>,
    pub stage: Stage,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(dataset: Option<&DatasetId>, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            dataset: dataset.cloned(),
            stage,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(None, Stage::Info, message)
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

/// Receives progress from batch jobs; called concurrently from pool threads.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub id: DatasetId,
    pub matrix: Option<String>,
    pub comparison: Option<String>,
    pub id_type: Option<IdType>,
    pub strategies: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub datasets: Vec<PlanEntry>,
    pub gene_sets: Vec<String>,
}

pub struct App<G: GseaRunner> {
    config: ResolvedConfig,
    layout: Layout,
    runner: G,
}

impl<G: GseaRunner> App<G> {
    pub fn new(config: ResolvedConfig, runner: G) -> Self {
        let layout = Layout::new(config.output_root.clone());
        Self {
            config,
            layout,
            runner,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn runner(&self) -> &G {
        &self.runner
    }

    /// Datasets under the configured root, restricted to `only` when non-empty.
    pub fn datasets(&self, only: &[DatasetId]) -> Result<Vec<Dataset>, GseaError> {
        let all = dataset::discover(self.config.datasets_root.as_std_path())?;
        if only.is_empty() {
            return Ok(all);
        }
        for id in only {
            if !all.iter().any(|dataset| &dataset.id == id) {
                tracing::warn!(dataset = %id, "requested dataset not found");
            }
        }
        Ok(all
            .into_iter()
            .filter(|dataset| only.contains(&dataset.id))
            .collect())
    }

    pub fn plan(&self, only: &[DatasetId], sink: &dyn ProgressSink) -> Result<PlanResult, GseaError> {
        let datasets = self.datasets(only)?;
        sink.event(ProgressEvent::info(format!(
            "planning {} datasets",
            datasets.len()
        )));

        let entries = datasets
            .iter()
            .map(|dataset| match dataset::prepare(dataset, &self.layout, &self.config) {
                Ok(prepared) => PlanEntry {
                    id: prepared.id.clone(),
                    matrix: Some(prepared.matrix.display().to_string()),
                    comparison: Some(prepared.phenotypes.comparison()),
                    id_type: Some(prepared.classification.id_type),
                    strategies: prepared
                        .strategies
                        .iter()
                        .map(|strategy| strategy.tag.to_string())
                        .collect(),
                    error: None,
                },
                Err(err) => PlanEntry {
                    id: dataset.id.clone(),
                    matrix: None,
                    comparison: None,
                    id_type: None,
                    strategies: Vec::new(),
                    error: Some(err.to_string()),
                },
            })
            .collect();

        Ok(PlanResult {
            datasets: entries,
            gene_sets: self
                .config
                .gene_sets
                .iter()
                .map(|set| set.label.clone())
                .collect(),
        })
    }

    pub fn run(
        &self,
        only: &[DatasetId],
        options: BatchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, GseaError> {
        if self.config.gene_sets.is_empty() {
            return Err(GseaError::ConfigInvalid(
                "no gene_sets configured".to_string(),
            ));
        }
        let datasets = self.datasets(only)?;
        Batch::new(&self.config, &self.layout, &self.runner).run(&datasets, &options, sink)
    }

    pub fn annotate(&self, sink: &dyn ProgressSink) -> Result<AnnotateReport, GseaError> {
        sink.event(ProgressEvent::info("annotating enrichment plots"));
        enplot::annotate_all(
            self.layout.results_dir().as_std_path(),
            self.layout.plots_dir().as_std_path(),
        )
    }

    pub fn summarize(&self, sink: &dyn ProgressSink) -> Result<SummaryReport, GseaError> {
        sink.event(ProgressEvent::info("summarizing annotated plots"));
        let report = summary::analyze(self.layout.plots_dir().as_std_path())?;
        summary::write_csv(&report, &self.layout.summary_csv())?;
        Ok(report)
    }

    pub fn concat(&self, sink: &dyn ProgressSink) -> Result<ConcatReport, GseaError> {
        sink.event(ProgressEvent::info("concatenating gene set tables"));
        concat::concatenate(
            self.layout.results_dir().as_std_path(),
            &self.layout.concat_dir(),
            &self.config.gene_sets,
        )
    }

    pub fn gallery(
        &self,
        kind: GalleryKind,
        sink: &dyn ProgressSink,
    ) -> Result<GalleryResult, GseaError> {
        sink.event(ProgressEvent::info(format!("building {kind} gallery")));
        gallery::build(
            self.layout.plots_dir().as_std_path(),
            &self.layout.gallery_dir(),
            &self.config.gene_sets,
            kind,
        )
    }
}
