use std::fs;
use std::io::Write;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use gsea_batch::app::App;
use gsea_batch::config::{Config, ConfigLoader, ResolvedConfig};
use gsea_batch::gallery::GalleryKind;
use gsea_batch::gsea::DryRunGseaRunner;
use gsea_batch::intersect;
use gsea_batch::output::JsonOutput;

const PLOT: &str = r#"<svg xmlns="http://www.w3.org/2000/svg"><g style="fill:none"><text x="10" y="20">Enrichment plot: UP_GENES</text><path d="M0 0"/></g></svg>"#;

fn stats_html(nes: &str, pval: &str, fdr: &str) -> String {
    format!(
        "<table><tr><td>Normalized Enrichment Score (NES)</td><td>{nes}</td></tr>\
         <tr><td>Nominal p-value</td><td>{pval}</td></tr>\
         <tr><td>FDR q-value</td><td>{fdr}</td></tr></table>"
    )
}

fn leading_edge(core: &[(&str, &str)]) -> String {
    let mut table = String::from("NAME\tPROBE\tSYMBOL\tRANK IN GENE LIST\tCORE ENRICHMENT\t\n");
    for (n, (symbol, flag)) in core.iter().enumerate() {
        table.push_str(&format!("row_{n}\t{symbol}\t{symbol}\t{n}\t{flag}\t\n"));
    }
    table
}

fn write_report(results: &Path, dataset: &str, nes: &str, pval: &str, fdr: &str, core: &[(&str, &str)]) {
    let report = results.join(format!("{dataset}_UP_GENES.Gsea.1700000000000"));
    fs::create_dir_all(&report).unwrap();
    fs::write(report.join("index.html"), "<html/>").unwrap();
    fs::write(report.join("UP_GENES.html"), stats_html(nes, pval, fdr)).unwrap();
    fs::write(report.join("UP_GENES.tsv"), leading_edge(core)).unwrap();

    let mut encoder = GzEncoder::new(
        fs::File::create(report.join("enplot_UP_GENES_1.svg.gz")).unwrap(),
        Compression::default(),
    );
    encoder.write_all(PLOT.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn fixture(root: &Path) -> ResolvedConfig {
    let results = root.join("out/results");
    write_report(&results, "GSE1", "1.84", "0.000", "0.012", &[("TP53", "Yes"), ("MYC", "Yes"), ("EGFR", "No")]);
    write_report(&results, "GSE2", "-0.40", "0.610", "0.900", &[("TP53", "Yes"), ("GAPDH", "Yes")]);
    // Unfinished run: no index.html.
    fs::create_dir_all(results.join("GSE3_UP_GENES.Gsea.1700000000001")).unwrap();

    let config: Config = serde_json::from_str(
        r#"{
            "datasets_root": "data",
            "output_root": "out",
            "gene_sets": [
                { "gmx": "sets/UP_GENES.gmt", "concat_output": "UP_GENES_all" },
                "sets/DOX_GENES.gmt"
            ]
        }"#,
    )
    .unwrap();
    ConfigLoader::resolve_config(config, Utf8Path::from_path(root).unwrap()).unwrap()
}

#[test]
fn annotate_then_summarize() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(fixture(temp.path()), DryRunGseaRunner);

    let annotated = app.annotate(&JsonOutput).unwrap();
    assert_eq!(annotated.written.len(), 2);
    assert!(annotated.failed.is_empty());

    let plot = app.layout().plots_dir().join("GSE1_UP_GENES_UP_GENES_enplot.svg");
    let svg = fs::read_to_string(&plot).unwrap();
    assert!(svg.contains("GSE1 - UP_GENES Enrichment"));
    assert!(svg.contains("NES: 1.84"));

    let summary = app.summarize(&JsonOutput).unwrap();
    assert_eq!(summary.records.len(), 2);
    assert_eq!(summary.datasets(), 2);
    let significant: Vec<&str> = summary.significant().map(|record| record.gse.as_str()).collect();
    assert_eq!(significant, vec!["GSE1"]);

    let csv = fs::read_to_string(app.layout().summary_csv()).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("GSE,Gene_Set,NES"));
    assert_eq!(lines.count(), 2);
}

#[test]
fn concat_feeds_intersect() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(fixture(temp.path()), DryRunGseaRunner);

    let concat = app.concat(&JsonOutput).unwrap();
    assert_eq!(concat.files_written(), 1);
    let up = &concat.outputs[0];
    assert_eq!(up.blocks, vec!["GSE1_UP_GENES".to_string(), "GSE2_UP_GENES".to_string()]);
    let dox = &concat.outputs[1];
    assert!(dox.path.is_none());

    let table = up.path.clone().unwrap();
    assert_eq!(table, app.layout().concat_dir().join("UP_GENES_all.tsv"));
    let text = fs::read_to_string(&table).unwrap();
    assert!(text.starts_with("GSE1\nNAME\t"));
    assert!(text.contains("\n\nGSE2\nNAME\t"));

    let report = intersect::intersect(table.as_std_path(), None, Some(2)).unwrap();
    assert_eq!(report.datasets, 2);
    assert_eq!(report.genes, 3);
    assert_eq!(report.max_count, 2);

    let full = fs::read_to_string(&report.full_csv).unwrap();
    assert_eq!(full.lines().nth(1), Some("TP53,2,GSE1;GSE2"));
    let max_only = fs::read_to_string(&report.max_only_csv).unwrap();
    assert_eq!(max_only.lines().count(), 2);
    assert_eq!(report.intersections, 1);
}

#[test]
fn gallery_embeds_annotated_plots() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(fixture(temp.path()), DryRunGseaRunner);
    app.annotate(&JsonOutput).unwrap();

    let gallery = app.gallery(GalleryKind::Static, &JsonOutput).unwrap();
    assert_eq!(gallery.datasets, 2);
    assert_eq!(gallery.plots, 2);
    assert_eq!(gallery.missing, 2);
    let expected = Utf8PathBuf::from_path_buf(temp.path().join("out/gallery/enrichment_plots_gallery.html")).unwrap();
    assert_eq!(gallery.path, expected);

    let html = fs::read_to_string(&gallery.path).unwrap();
    assert!(html.contains("data:image/svg+xml;base64,"));
    assert!(html.contains("GSE2"));
}
