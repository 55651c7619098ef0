//! CSV output
//!
//! Writes `<root>/<safe-category-name>/<kind>.csv`, one file per kind, with a
//! header row taken from the record type's columns.

use crate::crawler::CategoryResult;
use crate::output::traits::{category_dir, safe_name, Exporter, OutputResult};
use crate::site::Record;
use std::fs;
use std::path::PathBuf;

/// Exports each kind of a category as a CSV file
#[derive(Debug, Clone)]
pub struct CsvExporter {
    root: PathBuf,
}

impl CsvExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl<R: Record> Exporter<R> for CsvExporter {
    fn export(&self, result: &CategoryResult<R>) -> OutputResult<()> {
        let dir = category_dir(&self.root, &result.category);
        fs::create_dir_all(&dir)?;

        for kind in &result.kinds {
            let path = dir.join(format!("{}.csv", safe_name(kind.kind.as_str())));
            let mut writer = csv::Writer::from_path(&path)?;

            writer.write_record(R::columns())?;
            for record in &kind.records {
                writer.write_record(record.row())?;
            }
            writer.flush()?;

            tracing::debug!(
                path = %path.display(),
                records = kind.records.len(),
                "Wrote CSV"
            );
        }

        Ok(())
    }
}
