//! Excel output
//!
//! Writes one workbook per category, `<root>/<dir_name>/<dir_name>.xlsx`,
//! with one worksheet per kind. Every sheet starts with a bold header row.

use crate::crawler::CategoryResult;
use crate::output::traits::{category_dir, Exporter, OutputError, OutputResult};
use crate::site::Record;
use rust_xlsxwriter::{Format, Workbook};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// Excel's limit on worksheet name length
const MAX_SHEET_NAME: usize = 31;

const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Exports each category as an XLSX workbook
#[derive(Debug, Clone)]
pub struct XlsxExporter {
    root: PathBuf,
}

impl XlsxExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Turns a kind into a worksheet name Excel accepts
///
/// Forbidden characters become `_` and the name is cut to 31 characters.
/// `taken` holds the lowercased names already in the workbook; a clash gets
/// a numeric suffix.
fn sheet_name(kind: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = kind
        .trim_matches('\'')
        .chars()
        .map(|c| if FORBIDDEN_SHEET_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_SHEET_NAME)
        .collect();
    let base = if cleaned.is_empty() {
        "sheet".to_string()
    } else {
        cleaned
    };

    let mut name = base.clone();
    let mut suffix = 2;
    while taken.contains(&name.to_lowercase()) {
        let tag = format!("_{}", suffix);
        let keep = MAX_SHEET_NAME.saturating_sub(tag.chars().count());
        name = base.chars().take(keep).collect::<String>() + &tag;
        suffix += 1;
    }

    taken.insert(name.to_lowercase());
    name
}

fn cell_position(row: usize, col: usize) -> OutputResult<(u32, u16)> {
    match (u32::try_from(row), u16::try_from(col)) {
        (Ok(row), Ok(col)) => Ok((row, col)),
        _ => Err(OutputError::Write(format!(
            "cell ({}, {}) is outside the worksheet",
            row, col
        ))),
    }
}

impl<R: Record> Exporter<R> for XlsxExporter {
    fn export(&self, result: &CategoryResult<R>) -> OutputResult<()> {
        let dir = category_dir(&self.root, &result.category);
        fs::create_dir_all(&dir)?;

        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let mut taken = HashSet::new();

        for kind in &result.kinds {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(sheet_name(kind.kind.as_str(), &mut taken))?;

            for (col, column) in R::columns().iter().enumerate() {
                let (row, col) = cell_position(0, col)?;
                worksheet.write_string_with_format(row, col, *column, &header)?;
            }

            for (index, record) in kind.records.iter().enumerate() {
                for (col, value) in record.row().into_iter().enumerate() {
                    let (row, col) = cell_position(index + 1, col)?;
                    worksheet.write_string(row, col, value)?;
                }
            }
        }

        let path = dir.join(format!("{}.xlsx", result.category.dir_name));
        workbook.save(&path)?;

        tracing::debug!(
            path = %path.display(),
            sheets = result.kinds.len(),
            records = result.total_records(),
            "Wrote workbook"
        );

        Ok(())
    }
}
