//! Markdown output
//!
//! Two things are written as markdown: per-kind record tables for each
//! category, and a human-readable summary of the whole run.

use crate::crawler::{CategoryResult, RunSummary};
use crate::output::traits::{category_dir, safe_name, Exporter, OutputResult};
use crate::site::Record;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exports each kind of a category as a markdown table
#[derive(Debug, Clone)]
pub struct MarkdownExporter {
    root: PathBuf,
}

impl MarkdownExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl<R: Record> Exporter<R> for MarkdownExporter {
    fn export(&self, result: &CategoryResult<R>) -> OutputResult<()> {
        let dir = category_dir(&self.root, &result.category);
        fs::create_dir_all(&dir)?;

        for kind in &result.kinds {
            let path = dir.join(format!("{}.md", safe_name(kind.kind.as_str())));
            let title = format!("{} ({})", result.category.name, kind.kind);
            let markdown = format_records_table(&title, &kind.records);

            let mut file = File::create(&path)?;
            file.write_all(markdown.as_bytes())?;
        }

        Ok(())
    }
}

/// Formats records as a titled markdown table
pub fn format_records_table<R: Record>(title: &str, records: &[R]) -> String {
    let columns = R::columns();
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", title));
    md.push_str(&format!("Records: {}\n\n", records.len()));

    md.push_str("| ");
    md.push_str(&columns.join(" | "));
    md.push_str(" |\n");

    md.push('|');
    for _ in columns {
        md.push_str("---|");
    }
    md.push('\n');

    for record in records {
        let cells: Vec<String> = record.row().iter().map(|v| escape_cell(v)).collect();
        md.push_str("| ");
        md.push_str(&cells.join(" | "));
        md.push_str(" |\n");
    }

    md
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Writes the run summary as markdown
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Harvest Summary: {}\n\n", summary.site));

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.duration.as_secs_f64()
    ));
    if summary.interrupted {
        md.push_str("- **Status**: interrupted\n");
    } else {
        md.push_str("- **Status**: completed\n");
    }
    md.push('\n');

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!(
        "- **Categories Processed**: {}\n",
        summary.categories_processed()
    ));
    md.push_str(&format!("- **Done**: {}\n", summary.categories_done()));
    md.push_str(&format!(
        "- **Partially Failed**: {}\n",
        summary.categories_partial()
    ));
    md.push_str(&format!("- **Failed**: {}\n", summary.categories_failed()));
    md.push_str(&format!("- **Page Tasks**: {}\n", summary.total_tasks()));
    md.push_str(&format!("- **Fetch Attempts**: {}\n", summary.total_attempts()));
    md.push_str(&format!("- **Pages Failed**: {}\n", summary.pages_failed()));
    md.push_str(&format!("- **Total Records**: {}\n\n", summary.total_records()));

    // Category breakdown
    if !summary.categories.is_empty() {
        md.push_str("## Categories\n\n");
        md.push_str("| Category | State | Pages | Failed | Records |\n");
        md.push_str("|----------|-------|-------|--------|---------|\n");
        for category in &summary.categories {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                escape_cell(&category.name),
                category.state,
                category.tasks,
                category.pages_failed(),
                category.records
            ));
        }
        md.push('\n');
    }

    // Failures
    let failures: Vec<_> = summary
        .categories
        .iter()
        .flat_map(|c| c.failures.iter().map(move |f| (&c.name, f)))
        .collect();

    if !failures.is_empty() {
        md.push_str("## Failed Pages\n\n");
        for (category, failure) in failures {
            md.push_str(&format!(
                "- {} / {} page {} ({}, {} attempts): {} - `{}`\n",
                category,
                failure.kind,
                failure.page_number,
                failure.failure,
                failure.attempts,
                failure.reason,
                failure.url
            ));
        }
        md.push('\n');
    }

    let errors: Vec<_> = summary
        .categories
        .iter()
        .filter_map(|c| c.error.as_ref().map(|e| (&c.name, e)))
        .collect();

    if !errors.is_empty() {
        md.push_str("## Category Errors\n\n");
        for (category, error) in errors {
            md.push_str(&format!("- {}: {}\n", category, error));
        }
        md.push('\n');
    }

    md
}
