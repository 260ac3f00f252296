//! Rewrites GSEA enrichment plots: a readable title and the report's
//! statistics drawn into the figure.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use regex::Regex;
use serde::Serialize;

use crate::error::GseaError;
use crate::fs_util;
use crate::report::{EnrichmentStats, ReportDir};

const TITLE_MARKER: &str = "Enrichment plot:";
const TITLE_X: &str = "63";
const DEFAULT_TITLE_STYLE: &str = "font-weight:bold; font-family:sans-serif; font-size:18px";
const STATS_GROUP_STYLE: &str = "font-family:sans-serif; font-size:12px; fill:black;";
const STATS_TEXT_STYLE: &str = "clip-path:url(#clipPath1); stroke:none;";
const STATS_X: u32 = 350;
const STATS_Y: [u32; 3] = [50, 68, 86];

static ENPLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^enplot_(.+)_\d+\.svg\.gz$").expect("valid enplot regex")
});

#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedPlot {
    pub report: String,
    pub set_name: String,
    pub output: PathBuf,
    pub stats: EnrichmentStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotateFailure {
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnotateReport {
    pub written: Vec<AnnotatedPlot>,
    pub failed: Vec<AnnotateFailure>,
}

/// Gene set name of a GSEA plot file, e.g. `enplot_UP_GENES_3.svg.gz`.
pub fn enplot_set_name(file_name: &str) -> Option<&str> {
    ENPLOT_RE
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str())
}

pub fn output_name(report_label: &str, set_name: &str) -> String {
    format!("{report_label}_{set_name}_enplot.svg")
}

/// Annotates every enrichment plot of every complete report under `results`.
/// A broken plot is recorded in `failed` and does not stop the others.
pub fn annotate_all(results: &Path, plots: &Path) -> Result<AnnotateReport, GseaError> {
    let reports = ReportDir::scan(results)?;
    fs::create_dir_all(plots).map_err(|err| fs_util::io_err(plots, err))?;

    let mut out = AnnotateReport::default();
    for report in &reports {
        for source in fs_util::find_files_with_suffix(&report.path, ".svg.gz") {
            let Some(set_name) = source
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(enplot_set_name)
                .map(str::to_string)
            else {
                continue;
            };
            match annotate_plot(report, &source, &set_name, plots) {
                Ok(plot) => {
                    tracing::debug!(output = %plot.output.display(), "annotated plot");
                    out.written.push(plot);
                }
                Err(err) => {
                    tracing::warn!(plot = %source.display(), "annotation failed: {err}");
                    out.failed.push(AnnotateFailure {
                        source,
                        error: err.to_string(),
                    });
                }
            }
        }
    }
    tracing::info!(
        written = out.written.len(),
        failed = out.failed.len(),
        "annotation finished"
    );
    Ok(out)
}

fn annotate_plot(
    report: &ReportDir,
    source: &Path,
    set_name: &str,
    plots: &Path,
) -> Result<AnnotatedPlot, GseaError> {
    let html_path = report.set_html(set_name);
    let html = fs::read_to_string(&html_path).map_err(|err| fs_util::io_err(&html_path, err))?;
    let stats = EnrichmentStats::from_html(&html);

    let svg = fs_util::read_gz_to_string(source)?;
    let title = format!("{} - {set_name} Enrichment", report.accession());
    let annotated = rewrite_svg(&svg, &title, &stats)?;

    let output = plots.join(output_name(&report.label, set_name));
    fs_util::write_atomic(&output, annotated.as_bytes())?;
    Ok(AnnotatedPlot {
        report: report.label.clone(),
        set_name: set_name.to_string(),
        output,
        stats,
    })
}

/// Streams `svg` through quick-xml, retitling the plot and appending the
/// statistics group as the last child of the first `<g>`.
pub fn rewrite_svg(svg: &str, title: &str, stats: &EnrichmentStats) -> Result<String, GseaError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::with_capacity(svg.len() + 512));
    let mut depth = 0usize;
    let mut first_group: Option<usize> = None;
    let mut stats_written = false;
    let mut title_done = false;
    let mut pending: Option<BytesStart<'static>> = None;

    loop {
        let event = reader.read_event().map_err(plot_err)?;

        if let Some(start) = pending.take() {
            if let Event::Text(text) = &event {
                if String::from_utf8_lossy(&**text).contains(TITLE_MARKER) {
                    write(&mut writer, Event::Start(retitle(&start)?))?;
                    write(&mut writer, Event::Text(BytesText::new(title)))?;
                    title_done = true;
                    continue;
                }
            }
            write(&mut writer, Event::Start(start))?;
        }

        match event {
            Event::Eof => break,
            Event::Start(start) => {
                depth += 1;
                let local = start.local_name();
                let is_group = local.as_ref() == b"g";
                let is_text = local.as_ref() == b"text";
                if is_group && first_group.is_none() {
                    first_group = Some(depth);
                }
                if is_text && !title_done {
                    pending = Some(start.into_owned());
                    continue;
                }
                write(&mut writer, Event::Start(start))?;
            }
            Event::Empty(start) if !stats_written && first_group.is_none() && start.local_name().as_ref() == b"g" => {
                write(&mut writer, Event::Start(start.to_owned()))?;
                write_stats_group(&mut writer, stats)?;
                write(&mut writer, Event::End(start.to_end().into_owned()))?;
                first_group = Some(depth + 1);
                stats_written = true;
            }
            Event::End(end) => {
                if first_group == Some(depth) && !stats_written {
                    write_stats_group(&mut writer, stats)?;
                    stats_written = true;
                }
                depth = depth.saturating_sub(1);
                write(&mut writer, Event::End(end))?;
            }
            other => write(&mut writer, other)?,
        }
    }

    if !title_done {
        tracing::debug!("plot has no title text to replace");
    }
    if !stats_written {
        return Err(GseaError::InvalidPlot(
            "no <g> element to hold statistics".to_string(),
        ));
    }
    String::from_utf8(writer.into_inner()).map_err(plot_err)
}

fn retitle(start: &BytesStart<'_>) -> Result<BytesStart<'static>, GseaError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut style = None;
    for attr in start.attributes() {
        let attr = attr.map_err(plot_err)?;
        match attr.key.as_ref() {
            b"x" => {}
            b"style" => style = Some(attr.unescape_value().map_err(plot_err)?.into_owned()),
            _ => out.push_attribute(attr),
        }
    }
    let style = match style {
        Some(style) if style.contains("font-weight:bold") => style,
        Some(style) if !style.trim().is_empty() => {
            format!("{}; font-weight:bold", style.trim().trim_end_matches(';'))
        }
        _ => DEFAULT_TITLE_STYLE.to_string(),
    };
    out.push_attribute(("x", TITLE_X));
    out.push_attribute(("style", style.as_str()));
    Ok(out)
}

fn write_stats_group(writer: &mut Writer<Vec<u8>>, stats: &EnrichmentStats) -> Result<(), GseaError> {
    let mut group = BytesStart::new("g");
    group.push_attribute(("style", STATS_GROUP_STYLE));
    write(writer, Event::Start(group))?;
    for (line, y) in stats.lines().iter().zip(STATS_Y) {
        let mut text = BytesStart::new("text");
        text.push_attribute(("x", STATS_X.to_string().as_str()));
        text.push_attribute(("y", y.to_string().as_str()));
        text.push_attribute(("style", STATS_TEXT_STYLE));
        write(writer, Event::Start(text))?;
        write(writer, Event::Text(BytesText::new(line)))?;
        write(writer, Event::End(BytesEnd::new("text")))?;
    }
    write(writer, Event::End(BytesEnd::new("g")))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), GseaError> {
    writer.write_event(event).map_err(plot_err)
}

fn plot_err(err: impl std::fmt::Display) -> GseaError {
    GseaError::InvalidPlot(err.to_string())
}
