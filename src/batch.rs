//! Bounded fan-out of dataset jobs over a rayon pool. Each job prepares its
//! dataset and walks the strategy list for every gene set; a failing dataset
//! never stops its siblings.

use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, Stage};
use crate::config::{GeneSet, ResolvedConfig};
use crate::dataset::{self, Dataset, PreparedDataset};
use crate::domain::{DatasetId, IdType};
use crate::error::GseaError;
use crate::gsea::{GseaInvocation, GseaRunner};
use crate::joblog::JobLog;
use crate::layout::Layout;
use crate::report::ReportDir;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_jobs: usize,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub tag: String,
    pub ok: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneSetOutcome {
    pub label: String,
    pub skipped: bool,
    pub strategy: Option<String>,
    pub attempts: Vec<Attempt>,
}

impl GeneSetOutcome {
    pub fn failed(&self) -> bool {
        !self.skipped && self.strategy.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub id: DatasetId,
    pub status: DatasetStatus,
    pub id_type: Option<IdType>,
    pub gene_sets: Vec<GeneSetOutcome>,
    pub log: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<DatasetOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<DatasetOutcome>) -> Self {
        let count = |status: DatasetStatus| outcomes.iter().filter(|o| o.status == status).count();
        let succeeded = count(DatasetStatus::Succeeded);
        let failed = count(DatasetStatus::Failed);
        let skipped = count(DatasetStatus::Skipped);
        Self {
            outcomes,
            succeeded,
            failed,
            skipped,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub struct Batch<'a, G: GseaRunner> {
    config: &'a ResolvedConfig,
    layout: &'a Layout,
    runner: &'a G,
}

impl<'a, G: GseaRunner> Batch<'a, G> {
    pub fn new(config: &'a ResolvedConfig, layout: &'a Layout, runner: &'a G) -> Self {
        Self {
            config,
            layout,
            runner,
        }
    }

    pub fn run(
        &self,
        datasets: &[Dataset],
        options: &BatchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, GseaError> {
        self.layout.ensure_dirs()?;
        let threads = options.max_jobs.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("gsea-job-{index}"))
            .build()
            .map_err(|err| GseaError::Filesystem(format!("thread pool: {err}")))?;

        tracing::info!(datasets = datasets.len(), threads, "starting batch");
        for dataset in datasets {
            sink.event(ProgressEvent::new(
                Some(&dataset.id),
                Stage::Queued,
                "queued",
            ));
        }

        let outcomes: Vec<DatasetOutcome> = pool.install(|| {
            datasets
                .par_iter()
                .map(|dataset| self.run_dataset(dataset, options, sink))
                .collect()
        });

        let report = BatchReport::from_outcomes(outcomes);
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "batch finished"
        );
        Ok(report)
    }

    fn run_dataset(
        &self,
        dataset: &Dataset,
        options: &BatchOptions,
        sink: &dyn ProgressSink,
    ) -> DatasetOutcome {
        let started = Instant::now();
        let id = &dataset.id;
        let finish = |status: DatasetStatus,
                      id_type: Option<IdType>,
                      gene_sets: Vec<GeneSetOutcome>,
                      log_file: Option<String>,
                      error: Option<String>| {
            let stage = match status {
                DatasetStatus::Succeeded => Stage::Succeeded,
                DatasetStatus::Failed => Stage::Failed,
                DatasetStatus::Skipped => Stage::Skipped,
            };
            let message = error.clone().unwrap_or_else(|| "done".to_string());
            sink.event(
                ProgressEvent::new(Some(id), stage, message).with_elapsed(started.elapsed()),
            );
            DatasetOutcome {
                id: id.clone(),
                status,
                id_type,
                gene_sets,
                log: log_file,
                error,
                elapsed_ms: started.elapsed().as_millis(),
            }
        };

        let log_path = self.layout.dataset_log(id);
        let mut log = match JobLog::create(&log_path) {
            Ok(log) => log,
            Err(err) => {
                tracing::error!(dataset = %id, "cannot open log: {err}");
                return finish(DatasetStatus::Failed, None, Vec::new(), None, Some(err.to_string()));
            }
        };
        let log_name = Some(log.path().to_string());

        sink.event(ProgressEvent::new(Some(id), Stage::Prepare, "preparing"));
        log.line(format!("dataset {id} ({})", dataset.dir.display()));
        let prepared = match dataset::prepare(dataset, self.layout, self.config) {
            Ok(prepared) => prepared,
            Err(err) => {
                log.line(format!("preparation failed: {err}"));
                tracing::warn!(dataset = %id, "preparation failed: {err}");
                return finish(DatasetStatus::Failed, None, Vec::new(), log_name, Some(err.to_string()));
            }
        };
        log_preparation(&mut log, &prepared);

        let results_dir = self.layout.results_dir().into_std_path_buf();
        let mut gene_sets = Vec::with_capacity(self.config.gene_sets.len());
        let mut first_error = None;
        for gene_set in &self.config.gene_sets {
            let rpt_label = gene_set.report_label(id.as_str());
            if !options.force && ReportDir::exists(&results_dir, &rpt_label) {
                log.line(format!("{rpt_label}: completed report present, skipping"));
                gene_sets.push(GeneSetOutcome {
                    label: gene_set.label.clone(),
                    skipped: true,
                    strategy: None,
                    attempts: Vec::new(),
                });
                continue;
            }
            let outcome = self.run_gene_set(&prepared, gene_set, rpt_label, &mut log, sink);
            if outcome.failed() && first_error.is_none() {
                first_error = Some(
                    GseaError::StrategiesExhausted {
                        gene_set: gene_set.label.clone(),
                        attempts: outcome.attempts.len(),
                    }
                    .to_string(),
                );
            }
            gene_sets.push(outcome);
        }

        let status = if first_error.is_some() {
            DatasetStatus::Failed
        } else if !gene_sets.is_empty() && gene_sets.iter().all(|set| set.skipped) {
            DatasetStatus::Skipped
        } else {
            DatasetStatus::Succeeded
        };
        log.line(format!("finished: {status:?}"));
        log.flush();
        finish(
            status,
            Some(prepared.classification.id_type),
            gene_sets,
            log_name,
            first_error,
        )
    }

    fn run_gene_set(
        &self,
        prepared: &PreparedDataset,
        gene_set: &GeneSet,
        rpt_label: String,
        log: &mut JobLog,
        sink: &dyn ProgressSink,
    ) -> GeneSetOutcome {
        let mut attempts = Vec::with_capacity(prepared.strategies.len());
        for (index, strategy) in prepared.strategies.iter().enumerate() {
            let invocation = GseaInvocation {
                matrix: prepared.matrix.clone(),
                cls: prepared.cls.clone(),
                comparison: prepared.phenotypes.comparison(),
                gmx: gene_set.gmx.clone().into_std_path_buf(),
                strategy: strategy.clone(),
                rpt_label: rpt_label.clone(),
                out_dir: self.layout.results_dir().into_std_path_buf(),
                params: self.config.gsea.clone(),
            };
            let message = format!(
                "{rpt_label}: attempt {}/{} [{}]",
                index + 1,
                prepared.strategies.len(),
                strategy.tag
            );
            log.line(&message);
            sink.event(ProgressEvent::new(Some(&prepared.id), Stage::Attempt, message));

            match self.runner.run(&invocation, log) {
                Ok(()) => {
                    log.line(format!("{rpt_label}: succeeded with {}", strategy.tag));
                    attempts.push(Attempt {
                        tag: strategy.tag.to_string(),
                        ok: true,
                        message: None,
                    });
                    return GeneSetOutcome {
                        label: gene_set.label.clone(),
                        skipped: false,
                        strategy: Some(strategy.tag.to_string()),
                        attempts,
                    };
                }
                Err(err) => {
                    log.line(format!("{rpt_label}: {} failed: {err}", strategy.tag));
                    tracing::debug!(label = %rpt_label, strategy = strategy.tag, "attempt failed: {err}");
                    attempts.push(Attempt {
                        tag: strategy.tag.to_string(),
                        ok: false,
                        message: Some(err.to_string()),
                    });
                }
            }
        }

        log.line(format!(
            "{rpt_label}: all {} strategies failed",
            attempts.len()
        ));
        GeneSetOutcome {
            label: gene_set.label.clone(),
            skipped: false,
            strategy: None,
            attempts,
        }
    }
}

fn log_preparation(log: &mut JobLog, prepared: &PreparedDataset) {
    let counts = &prepared.classification.counts;
    log.line(format!("matrix: {}", prepared.matrix.display()));
    log.line(format!(
        "phenotypes: {} ({})",
        prepared.phenotypes.comparison(),
        prepared.cls.display()
    ));
    log.line(format!(
        "identifiers: {} (ensembl={}, numeric={}, other={})",
        prepared.classification.id_type, counts.ensembl, counts.numeric, counts.other
    ));
    let tags: Vec<&str> = prepared.strategies.iter().map(|s| s.tag).collect();
    log.line(format!("strategies: {}", tags.join(" -> ")));
}
