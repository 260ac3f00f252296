//! Self-contained HTML galleries of the annotated plots. Every image is
//! embedded as a base64 data URI so the page can be moved around freely.

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use quick_xml::escape::escape;
use serde::Serialize;

use crate::config::GeneSet;
use crate::error::GseaError;
use crate::fs_util;

const SVG_DATA_PREFIX: &str = "data:image/svg+xml;base64,";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GalleryKind {
    Static,
    Interactive,
}

impl GalleryKind {
    pub fn file_name(self) -> &'static str {
        match self {
            GalleryKind::Static => "enrichment_plots_gallery.html",
            GalleryKind::Interactive => "enrichment_plots_gallery_interactive.html",
        }
    }
}

impl fmt::Display for GalleryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GalleryKind::Static => f.write_str("static"),
            GalleryKind::Interactive => f.write_str("interactive"),
        }
    }
}

/// One image slot of a dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryCell {
    pub title: String,
    pub file: Option<String>,
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryRow {
    pub dataset: String,
    pub cells: Vec<GalleryCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryResult {
    pub kind: GalleryKind,
    pub path: Utf8PathBuf,
    pub datasets: usize,
    pub plots: usize,
    pub missing: usize,
}

/// Sorted plot file names (`*.svg`) directly inside `plots`.
pub fn plot_files(plots: &Path) -> Result<Vec<String>, GseaError> {
    if !plots.exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(plots)
        .map_err(|err| fs_util::io_err(plots, err))?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.ends_with(".svg"))
        .collect();
    names.sort();
    Ok(names)
}

/// Unique leading `_` tokens of the plot names.
pub fn datasets(files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter_map(|name| name.split('_').next())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Finds `<dataset>_<label>[_<variant>]_<set>_enplot.svg`; an exact match
/// wins over a variant. Returns the file name and the variant, if any.
pub fn find_plot<'a>(files: &'a [String], dataset: &str, gene_set: &GeneSet) -> Option<(&'a str, Option<String>)> {
    let prefix = format!("{dataset}_{}", gene_set.label);
    let suffix = format!("_{}_enplot.svg", gene_set.set_name);
    let mut variant_hit = None;
    for name in files {
        if name.len() < prefix.len() + suffix.len()
            || !name.starts_with(&prefix)
            || !name.ends_with(&suffix)
        {
            continue;
        }
        let middle = &name[prefix.len()..name.len() - suffix.len()];
        if middle.is_empty() {
            return Some((name.as_str(), None));
        }
        if let Some(variant) = middle.strip_prefix('_').filter(|v| !v.is_empty()) {
            variant_hit.get_or_insert((name.as_str(), Some(variant.to_string())));
        }
    }
    variant_hit
}

fn column_title(gene_set: &GeneSet, variant: Option<&str>) -> String {
    match variant {
        Some(variant) => format!("{} ({})", gene_set.title, variant.replace('_', " ")),
        None => gene_set.title.clone(),
    }
}

fn data_uri(path: &Path) -> Result<String, GseaError> {
    let bytes = fs::read(path).map_err(|err| fs_util::io_err(path, err))?;
    Ok(format!("{SVG_DATA_PREFIX}{}", STANDARD.encode(bytes)))
}

pub fn collect_rows(plots: &Path, gene_sets: &[GeneSet]) -> Result<Vec<GalleryRow>, GseaError> {
    let files = plot_files(plots)?;
    let mut rows = Vec::new();
    for dataset in datasets(&files) {
        let mut cells = Vec::with_capacity(gene_sets.len());
        for gene_set in gene_sets {
            let cell = match find_plot(&files, &dataset, gene_set) {
                Some((file, variant)) => GalleryCell {
                    title: column_title(gene_set, variant.as_deref()),
                    file: Some(file.to_string()),
                    src: data_uri(&plots.join(file))?,
                },
                None => {
                    tracing::debug!(dataset = %dataset, gene_set = %gene_set.label, "no plot");
                    GalleryCell {
                        title: gene_set.title.clone(),
                        file: None,
                        src: String::new(),
                    }
                }
            };
            cells.push(cell);
        }
        rows.push(GalleryRow { dataset, cells });
    }
    Ok(rows)
}

pub fn build(
    plots: &Path,
    out_dir: &Utf8Path,
    gene_sets: &[GeneSet],
    kind: GalleryKind,
) -> Result<GalleryResult, GseaError> {
    let rows = collect_rows(plots, gene_sets)?;
    let plots_found = rows
        .iter()
        .flat_map(|row| &row.cells)
        .filter(|cell| cell.file.is_some())
        .count();
    let slots = rows.len() * gene_sets.len();
    let footer = format!(
        "Generated on {} | Total Datasets: {} | Total Plots: {plots_found}",
        chrono::Local::now().format("%B %-d, %Y"),
        rows.len()
    );

    let html = match kind {
        GalleryKind::Static => render_static(&rows, gene_sets, &footer),
        GalleryKind::Interactive => render_interactive(&rows, gene_sets, &footer)?,
    };
    let path = out_dir.join(kind.file_name());
    fs_util::write_atomic(path.as_std_path(), html.as_bytes())?;
    tracing::info!(path = %path, datasets = rows.len(), plots = plots_found, "gallery written");

    Ok(GalleryResult {
        kind,
        path,
        datasets: rows.len(),
        plots: plots_found,
        missing: slots - plots_found,
    })
}

pub fn render_static(rows: &[GalleryRow], gene_sets: &[GeneSet], footer: &str) -> String {
    let mut body = String::new();
    for row in rows {
        let _ = write!(
            body,
            "<div class=\"dataset-row\">\n<div class=\"dataset-header\">{}</div>\n<div class=\"plots-container\">\n",
            escape(&row.dataset)
        );
        for (index, cell) in row.cells.iter().enumerate() {
            let _ = write!(
                body,
                "<div class=\"plot-wrapper col-{}\"><div class=\"plot-title\">{}</div><img src=\"{}\" alt=\"{} {}\"></div>\n",
                index % 4,
                escape(&cell.title),
                cell.src,
                escape(&row.dataset),
                escape(&cell.title)
            );
        }
        body.push_str("</div>\n</div>\n");
    }

    let subtitle = format!("Comprehensive Analysis of {} GEO Datasets", rows.len());
    page(
        "GSEA Enrichment Plots Gallery",
        &subtitle,
        gene_sets.len(),
        &format!("<div class=\"gallery visible\">\n{body}</div>\n"),
        footer,
        "",
    )
}

pub fn render_interactive(rows: &[GalleryRow], gene_sets: &[GeneSet], footer: &str) -> Result<String, GseaError> {
    let images: serde_json::Map<String, serde_json::Value> = rows
        .iter()
        .map(|row| {
            let cells = row
                .cells
                .iter()
                .map(|cell| serde_json::json!({ "title": cell.title, "src": cell.src }))
                .collect();
            (row.dataset.clone(), serde_json::Value::Array(cells))
        })
        .collect();
    let images = serde_json::to_string(&images)
        .map_err(|err| GseaError::Filesystem(format!("encode gallery data: {err}")))?
        .replace("</", "<\\/");

    let mut options = String::new();
    for row in rows {
        let id = escape(&row.dataset);
        let _ = writeln!(
            options,
            "<div class=\"dataset-option\"><input type=\"checkbox\" id=\"ds_{id}\" value=\"{id}\" onchange=\"updateSelectionCount()\"><label for=\"ds_{id}\">{id}</label></div>"
        );
    }

    let body = format!(
        r#"<div class="selection-panel">
<h2>Select Datasets to Display</h2>
<div class="dataset-options" id="datasetOptions">
{options}</div>
<div class="button-group">
<button class="btn" onclick="selectAll()">Select All</button>
<button class="btn" onclick="clearAll()">Clear All</button>
<button class="btn" onclick="invertSelection()">Invert Selection</button>
<button class="btn btn-primary" onclick="displaySelected()">Display Selected Datasets</button>
</div>
<div class="selection-info" id="selectionCount">0 datasets selected</div>
</div>
<div class="no-selection-message visible" id="noSelectionMessage">Select datasets above to begin</div>
<div class="gallery" id="gallery"></div>
"#
    );

    let script = format!(
        r#"<script>
const datasetImages = {images};
function boxes() {{ return Array.from(document.querySelectorAll('#datasetOptions input[type="checkbox"]')); }}
function updateSelectionCount() {{
  const n = boxes().filter(cb => cb.checked).length;
  document.getElementById('selectionCount').textContent = n + ' dataset' + (n === 1 ? '' : 's') + ' selected';
}}
function selectAll() {{ boxes().forEach(cb => cb.checked = true); updateSelectionCount(); }}
function invertSelection() {{ boxes().forEach(cb => cb.checked = !cb.checked); updateSelectionCount(); }}
function clearAll() {{
  boxes().forEach(cb => cb.checked = false);
  updateSelectionCount();
  document.getElementById('gallery').classList.remove('visible');
  document.getElementById('noSelectionMessage').classList.add('visible');
}}
function escapeHtml(text) {{
  const div = document.createElement('div');
  div.textContent = text;
  return div.innerHTML;
}}
function displaySelected() {{
  const selected = boxes().filter(cb => cb.checked).map(cb => cb.value);
  if (selected.length === 0) {{ alert('Please select at least one dataset to display.'); return; }}
  let html = '';
  selected.forEach(dataset => {{
    const cells = datasetImages[dataset];
    if (!cells) return;
    html += '<div class="dataset-row"><div class="dataset-header">' + escapeHtml(dataset) + '</div><div class="plots-container">';
    cells.forEach((cell, index) => {{
      html += '<div class="plot-wrapper col-' + (index % 4) + '"><div class="plot-title">' + escapeHtml(cell.title) +
        '</div><img src="' + cell.src + '" alt="' + escapeHtml(dataset + ' ' + cell.title) + '" loading="lazy"></div>';
    }});
    html += '</div></div>';
  }});
  const gallery = document.getElementById('gallery');
  gallery.innerHTML = html;
  gallery.classList.add('visible');
  document.getElementById('noSelectionMessage').classList.remove('visible');
}}
</script>
"#
    );

    Ok(page(
        "GSEA Enrichment Plots - Interactive Gallery",
        &format!("{} datasets available", rows.len()),
        gene_sets.len(),
        &body,
        footer,
        &script,
    ))
}

fn page(title: &str, subtitle: &str, columns: usize, body: &str, footer: &str, script: &str) -> String {
    let columns = columns.clamp(1, 4);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
* {{ margin: 0; padding: 0; box-sizing: border-box; }}
body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 20px; min-height: 100vh; }}
.container {{ max-width: 1800px; margin: 0 auto; background: white; border-radius: 15px; box-shadow: 0 20px 60px rgba(0,0,0,0.3); overflow: hidden; }}
header {{ background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px; text-align: center; }}
header h1 {{ font-size: 2.5em; margin-bottom: 10px; }}
.selection-panel {{ background: #f8f9fa; padding: 30px; border-bottom: 3px solid #667eea; text-align: center; }}
.dataset-options {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(150px, 1fr)); gap: 10px; max-height: 300px; overflow-y: auto; padding: 10px; margin: 15px 0; }}
.dataset-option {{ display: flex; align-items: center; gap: 8px; padding: 8px; background: white; border: 1px solid #ddd; border-radius: 4px; }}
.button-group {{ display: flex; gap: 15px; justify-content: center; flex-wrap: wrap; }}
.btn {{ padding: 12px 30px; font-size: 1.1em; font-weight: bold; border: none; border-radius: 8px; cursor: pointer; background: #6c757d; color: white; }}
.btn-primary {{ background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); }}
.selection-info {{ margin-top: 15px; font-weight: bold; color: #667eea; }}
.no-selection-message, .gallery {{ display: none; }}
.no-selection-message.visible {{ display: block; text-align: center; padding: 60px 20px; color: #666; font-size: 1.2em; }}
.gallery.visible {{ display: block; padding: 30px; }}
.dataset-row {{ margin-bottom: 40px; border: 2px solid #e0e0e0; border-radius: 10px; overflow: hidden; background: #fafafa; }}
.dataset-header {{ background: linear-gradient(90deg, #667eea 0%, #764ba2 100%); color: white; padding: 15px 20px; font-size: 1.3em; font-weight: bold; letter-spacing: 1px; }}
.plots-container {{ display: grid; grid-template-columns: repeat({columns}, 1fr); background: white; }}
.plot-wrapper {{ border: 1px solid #e0e0e0; padding: 15px; }}
.plot-wrapper.col-0 {{ background: #ffebee; }}
.plot-wrapper.col-1 {{ background: #e3f2fd; }}
.plot-wrapper.col-2 {{ background: #fff3e0; }}
.plot-wrapper.col-3 {{ background: #f3e5f5; }}
.plot-title {{ font-weight: bold; margin-bottom: 10px; padding: 8px; background: rgba(255,255,255,0.9); border-radius: 5px; text-align: center; color: #333; }}
.plot-wrapper img {{ width: 100%; height: auto; display: block; border-radius: 5px; border: 1px solid #ddd; }}
footer {{ background: #2c3e50; color: white; padding: 20px; text-align: center; font-size: 0.9em; }}
@media (max-width: 1200px) {{ .plots-container {{ grid-template-columns: 1fr; }} }}
</style>
</head>
<body>
<div class="container">
<header>
<h1>{title}</h1>
<p>{subtitle}</p>
</header>
{body}<footer>
<p><strong>{title}</strong></p>
<p>{footer}</p>
<p>Each plot includes NES (Normalized Enrichment Score), NOM p-value, and FDR q-value annotations</p>
</footer>
</div>
{script}</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gene_set(label: &str, set_name: &str, title: &str) -> GeneSet {
        GeneSet {
            label: label.to_string(),
            gmx: Utf8PathBuf::from(format!("{set_name}.gmt")),
            set_name: set_name.to_string(),
            title: title.to_string(),
            concat_output: label.to_string(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn datasets_are_unique_leading_tokens() {
        let files = names(&["GSE2_Up_UP_enplot.svg", "GSE1_Up_UP_enplot.svg", "GSE2_Down_DOWN_enplot.svg"]);
        assert_eq!(datasets(&files), vec!["GSE1", "GSE2"]);
    }

    #[test]
    fn find_plot_prefers_exact_and_reports_variant() {
        let up = gene_set("Upregulated", "UP_GENES", "Upregulated Genes");
        let files = names(&[
            "GSE1_Upregulated_Diff_of_Classes_UP_GENES_enplot.svg",
            "GSE2_Upregulated_Diff_of_Classes_UP_GENES_enplot.svg",
            "GSE2_Upregulated_UP_GENES_enplot.svg",
        ]);

        let (file, variant) = find_plot(&files, "GSE1", &up).unwrap();
        assert_eq!(file, "GSE1_Upregulated_Diff_of_Classes_UP_GENES_enplot.svg");
        assert_eq!(variant.as_deref(), Some("Diff_of_Classes"));
        assert_eq!(column_title(&up, variant.as_deref()), "Upregulated Genes (Diff of Classes)");

        let (file, variant) = find_plot(&files, "GSE2", &up).unwrap();
        assert_eq!(file, "GSE2_Upregulated_UP_GENES_enplot.svg");
        assert!(variant.is_none());
        assert!(find_plot(&files, "GSE3", &up).is_none());
    }

    #[test]
    fn build_embeds_plots_and_marks_missing() {
        let temp = tempfile::tempdir().unwrap();
        let plots = temp.path().join("plots");
        fs::create_dir_all(&plots).unwrap();
        fs::write(plots.join("GSE1_Up_UP_enplot.svg"), "<svg/>").unwrap();
        fs::write(plots.join("GSE2_Down_DOWN_enplot.svg"), "<svg/>").unwrap();
        let sets = [gene_set("Up", "UP", "Up <genes>"), gene_set("Down", "DOWN", "Down")];
        let out = Utf8PathBuf::from_path_buf(temp.path().join("gallery")).unwrap();

        let result = build(&plots, &out, &sets, GalleryKind::Static).unwrap();
        assert_eq!(result.datasets, 2);
        assert_eq!(result.plots, 2);
        assert_eq!(result.missing, 2);

        let html = fs::read_to_string(result.path.as_std_path()).unwrap();
        let encoded = STANDARD.encode("<svg/>");
        assert!(html.contains(&format!("src=\"{SVG_DATA_PREFIX}{encoded}\"")));
        assert!(html.contains("src=\"\""));
        assert!(html.contains("Up &lt;genes&gt;"));
        assert!(html.contains("Total Datasets: 2 | Total Plots: 2"));
    }

    #[test]
    fn interactive_gallery_carries_dataset_images() {
        let temp = tempfile::tempdir().unwrap();
        let plots = temp.path().join("plots");
        fs::create_dir_all(&plots).unwrap();
        fs::write(plots.join("GSE9_Up_UP_enplot.svg"), "<svg/>").unwrap();
        let sets = [gene_set("Up", "UP", "Up")];
        let out = Utf8PathBuf::from_path_buf(temp.path().join("gallery")).unwrap();

        let result = build(&plots, &out, &sets, GalleryKind::Interactive).unwrap();
        assert!(result.path.ends_with("enrichment_plots_gallery_interactive.html"));
        let html = fs::read_to_string(result.path.as_std_path()).unwrap();
        assert!(html.contains("const datasetImages = {\"GSE9\":[{"));
        assert!(html.contains("function invertSelection()"));
        assert!(html.contains("value=\"GSE9\""));
    }
}
