//! Output module for exporting harvested records and run summaries
//!
//! This module handles:
//! - Writing each category's records as CSV files, markdown tables and/or
//!   XLSX workbooks
//! - Generating a markdown summary of the run
//! - Printing run statistics to the console

mod csv_output;
mod markdown;
pub mod stats;
mod traits;
mod xlsx_output;

pub use csv_output::CsvExporter;
pub use markdown::{format_markdown_summary, generate_markdown_summary, MarkdownExporter};
pub use stats::print_summary;
pub use xlsx_output::XlsxExporter;
pub use traits::{
    assign_dir_names, category_dir, safe_name, Exporter, OutputError, OutputResult,
};

use crate::config::{ExportFormat, OutputConfig};
use crate::site::Record;
use std::path::{Path, PathBuf};

/// Root directory for a site's files: `<output.directory>/<site>`
pub fn site_output_dir(config: &OutputConfig, site_name: &str) -> PathBuf {
    Path::new(&config.directory).join(site_name)
}

/// Builds one exporter per configured format, all rooted at the site's
/// output directory
pub fn build_exporters<R: Record>(
    config: &OutputConfig,
    site_name: &str,
) -> Vec<Box<dyn Exporter<R>>> {
    let root = site_output_dir(config, site_name);

    let mut formats: Vec<ExportFormat> = Vec::new();
    for format in &config.formats {
        if !formats.contains(format) {
            formats.push(*format);
        }
    }

    formats
        .into_iter()
        .map(|format| -> Box<dyn Exporter<R>> {
            match format {
                ExportFormat::Csv => Box::new(CsvExporter::new(root.clone())),
                ExportFormat::Markdown => Box::new(MarkdownExporter::new(root.clone())),
                ExportFormat::Xlsx => Box::new(XlsxExporter::new(root.clone())),
            }
        })
        .collect()
}
