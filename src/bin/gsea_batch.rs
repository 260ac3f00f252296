use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gsea_batch::app::App;
use gsea_batch::batch::{BatchOptions, BatchReport};
use gsea_batch::classify;
use gsea_batch::config::{ConfigLoader, ResolvedConfig};
use gsea_batch::domain::DatasetId;
use gsea_batch::error::GseaError;
use gsea_batch::gallery::GalleryKind;
use gsea_batch::gsea::{DryRunGseaRunner, GseaRunner, SystemGseaRunner};
use gsea_batch::intersect;
use gsea_batch::output::{self, JsonOutput, LogSink, OutputMode};
use gsea_batch::tui::Tui;

#[derive(Parser)]
#[command(name = "gsea-batch")]
#[command(about = "Run GSEA across a directory of RNA-seq datasets and post-process the reports")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run GSEA for every dataset and gene set")]
    Run(RunArgs),
    #[command(about = "Report the identifier type of an expression matrix")]
    Classify(ClassifyArgs),
    #[command(about = "Prepare every dataset and show what would run")]
    Plan(SelectArgs),
    #[command(about = "Retitle enrichment plots and draw their statistics")]
    Annotate(ConfigArgs),
    #[command(about = "Write the significance table of the annotated plots")]
    Summarize(ConfigArgs),
    #[command(about = "Concatenate per-dataset gene set tables")]
    Concat(ConfigArgs),
    #[command(about = "Build a self-contained HTML gallery of the annotated plots")]
    Gallery(GalleryArgs),
    #[command(about = "Find leading-edge genes shared across datasets")]
    Intersect(IntersectArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[arg(long)]
    config: Option<String>,
}

#[derive(Args, Clone)]
struct SelectArgs {
    #[arg(long)]
    config: Option<String>,

    /// Restrict to these dataset ids (repeatable).
    #[arg(long = "only")]
    only: Vec<String>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    max_jobs: Option<usize>,

    /// Rerun gene sets that already have a completed report.
    #[arg(long)]
    force: bool,

    /// Log the GSEA command lines without running them.
    #[arg(long)]
    dry_run: bool,

    #[arg(long = "only")]
    only: Vec<String>,
}

#[derive(Args, Clone)]
struct ClassifyArgs {
    matrix: PathBuf,
}

#[derive(Args, Clone)]
struct GalleryArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    interactive: bool,
}

#[derive(Args, Clone)]
struct IntersectArgs {
    input: PathBuf,

    #[arg(long)]
    outdir: Option<PathBuf>,

    /// Only list exclusive intersections shared by at least this many datasets.
    #[arg(long)]
    min_degree: Option<usize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<GseaError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GseaError) -> u8 {
    match error {
        GseaError::MissingConfig
        | GseaError::ConfigRead(_)
        | GseaError::ConfigParse(_)
        | GseaError::ConfigInvalid(_)
        | GseaError::InvalidDatasetId(_)
        | GseaError::InvalidAccession(_)
        | GseaError::InvalidIdType(_)
        | GseaError::MissingMatrix(_)
        | GseaError::EmptyMatrix(_)
        | GseaError::MissingPhenotypes(_)
        | GseaError::InvalidClassFile(_)
        | GseaError::ControlMismatch { .. }
        | GseaError::InvalidTable { .. }
        | GseaError::NoLeadingEdge(_) => 2,
        GseaError::MissingTool(_) => 3,
        GseaError::BatchFailed { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_batch(args, output_mode),
        Commands::Classify(args) => run_classify(&args.matrix, output_mode),
        Commands::Plan(args) => run_plan(args, output_mode),
        Commands::Annotate(args) => run_annotate(post_app(args.config.as_deref())?, output_mode),
        Commands::Summarize(args) => run_summarize(post_app(args.config.as_deref())?, output_mode),
        Commands::Concat(args) => run_concat(post_app(args.config.as_deref())?, output_mode),
        Commands::Gallery(args) => {
            let kind = if args.interactive {
                GalleryKind::Interactive
            } else {
                GalleryKind::Static
            };
            run_gallery(post_app(args.config.as_deref())?, kind, output_mode)
        }
        Commands::Intersect(args) => run_intersect(args, output_mode),
    }
}

fn parse_only(values: &[String]) -> Result<Vec<DatasetId>, GseaError> {
    values.iter().map(|value| value.parse::<DatasetId>()).collect()
}

fn system_runner(config: &ResolvedConfig) -> SystemGseaRunner {
    SystemGseaRunner::new(config.gsea.executable.as_deref().map(|path| path.as_std_path()))
}

/// Post-processing never launches GSEA.
fn post_app(config: Option<&str>) -> miette::Result<App<DryRunGseaRunner>> {
    let resolved = ConfigLoader::resolve(config)?;
    Ok(App::new(resolved, DryRunGseaRunner))
}

fn run_batch(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let RunArgs {
        config,
        max_jobs,
        force,
        dry_run,
        only,
    } = args;

    let resolved = ConfigLoader::resolve(config.as_deref())?;
    let only = parse_only(&only)?;
    let max_jobs = max_jobs.unwrap_or(resolved.max_jobs);
    if max_jobs == 0 {
        return Err(GseaError::ConfigInvalid("--max-jobs must be at least 1".to_string()).into());
    }
    let options = BatchOptions { max_jobs, force };

    let report = if dry_run {
        execute_batch(App::new(resolved, DryRunGseaRunner), only, options, output_mode)?
    } else {
        let runner = system_runner(&resolved);
        runner.require_executable()?;
        execute_batch(App::new(resolved, runner), only, options, output_mode)?
    };

    if report.has_failures() {
        return Err(GseaError::BatchFailed {
            failed: report.failed,
            total: report.outcomes.len(),
        }
        .into());
    }
    Ok(())
}

fn execute_batch<G: GseaRunner + 'static>(
    app: App<G>,
    only: Vec<DatasetId>,
    options: BatchOptions,
    output_mode: OutputMode,
) -> miette::Result<BatchReport> {
    match output_mode {
        OutputMode::NonInteractive => {
            let report = app.run(&only, options, &JsonOutput)?;
            JsonOutput::print_batch(&report).into_diagnostic()?;
            Ok(report)
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(format!("run  max-jobs: {}", options.max_jobs));
            let report = tui.run(move |sink| app.run(&only, options, sink))?;
            output::print_batch_summary(&report);
            Ok(report)
        }
    }
}

fn run_classify(matrix: &Path, output_mode: OutputMode) -> miette::Result<()> {
    let result = classify::classify_matrix(matrix)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_classification(&result).into_diagnostic(),
        OutputMode::Interactive => {
            output::print_classification(&matrix.display().to_string(), &result);
            Ok(())
        }
    }
}

fn run_plan(args: SelectArgs, output_mode: OutputMode) -> miette::Result<()> {
    let app = post_app(args.config.as_deref())?;
    let only = parse_only(&args.only)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let plan = app.plan(&only, &JsonOutput)?;
            JsonOutput::print_plan(&plan).into_diagnostic()
        }
        OutputMode::Interactive => {
            let plan = app.plan(&only, &LogSink)?;
            output::print_plan(&plan);
            Ok(())
        }
    }
}

fn run_annotate(app: App<DryRunGseaRunner>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.annotate(&JsonOutput)?;
            JsonOutput::print_annotate(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.annotate(&LogSink)?;
            output::print_annotate(&result);
            Ok(())
        }
    }
}

fn run_summarize(app: App<DryRunGseaRunner>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.summarize(&JsonOutput)?;
            JsonOutput::print_summary(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.summarize(&LogSink)?;
            if result.records.is_empty() {
                println!("No valid GSEA results found in {}", app.layout().plots_dir());
                return Ok(());
            }
            print!("{}", result.render_text());
            println!();
            println!("Detailed results saved to: {}", app.layout().summary_csv());
            Ok(())
        }
    }
}

fn run_concat(app: App<DryRunGseaRunner>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.concat(&JsonOutput)?;
            JsonOutput::print_concat(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.concat(&LogSink)?;
            output::print_concat(&result);
            Ok(())
        }
    }
}

fn run_gallery(
    app: App<DryRunGseaRunner>,
    kind: GalleryKind,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.gallery(kind, &JsonOutput)?;
            JsonOutput::print_gallery(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.gallery(kind, &LogSink)?;
            output::print_gallery(&result);
            Ok(())
        }
    }
}

fn run_intersect(args: IntersectArgs, output_mode: OutputMode) -> miette::Result<()> {
    let result = intersect::intersect(&args.input, args.outdir.as_deref(), args.min_degree)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_intersect(&result).into_diagnostic(),
        OutputMode::Interactive => {
            output::print_intersect(&result);
            Ok(())
        }
    }
}
