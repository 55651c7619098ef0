//! Exporter trait and output error types
//!
//! An exporter receives the merged result of one category at a time. The
//! coordinator calls it once per category that produced records, and a
//! failed export never affects other categories.

use crate::crawler::CategoryResult;
use crate::site::{Category, Record};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Trait for category exporters
///
/// Implementations must be thread-safe; categories finish concurrently.
pub trait Exporter<R: Record>: Send + Sync {
    /// Writes one category's records
    ///
    /// Every kind in `result` is written, including kinds with no records.
    fn export(&self, result: &CategoryResult<R>) -> OutputResult<()>;
}

/// Fans a category out to several exporters
///
/// Every exporter runs even if an earlier one failed; the first error is
/// returned.
impl<R: Record> Exporter<R> for Vec<Box<dyn Exporter<R>>> {
    fn export(&self, result: &CategoryResult<R>) -> OutputResult<()> {
        let mut first_error = None;

        for exporter in self {
            if let Err(e) = exporter.export(result) {
                tracing::error!(
                    category = %result.category.name,
                    error = %e,
                    "Exporter failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Lowercases a name and replaces everything but letters and digits with
/// `_`, for use as a file or directory name
pub fn safe_name(name: &str) -> String {
    name.chars()
        .flat_map(|c| {
            let replaced = if c.is_alphanumeric() { c } else { '_' };
            replaced.to_lowercase()
        })
        .collect()
}

/// Gives every category a distinct directory name
///
/// Names that sanitize to the same string get `_2`, `_3`, ... appended in
/// discovery order, so "Hip Hop" and "hip-hop" land in `hip_hop` and
/// `hip_hop_2`.
pub fn assign_dir_names(categories: &mut [Category]) {
    let mut used = HashSet::new();

    for category in categories {
        let base = safe_name(&category.name);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while used.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        if candidate != base {
            tracing::warn!(
                category = %category.name,
                dir = %candidate,
                "Directory name collision, using suffixed name"
            );
        }
        used.insert(candidate.clone());
        category.dir_name = candidate;
    }
}

/// Directory holding one category's files: `<root>/<dir_name>`
pub fn category_dir(root: &Path, category: &Category) -> PathBuf {
    root.join(&category.dir_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::KindRecords;
    use crate::site::EntityKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Plain;

    impl Record for Plain {
        fn columns() -> &'static [&'static str] {
            &["value"]
        }

        fn row(&self) -> Vec<String> {
            vec!["x".to_string()]
        }
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Exporter<Plain> for Counting {
        fn export(&self, _result: &CategoryResult<Plain>) -> OutputResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(OutputError::Write("disk full".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn result() -> CategoryResult<Plain> {
        CategoryResult {
            category: Category::new("Rock", "https://example.com/rock"),
            kinds: vec![KindRecords {
                kind: EntityKind::new("artist"),
                records: vec![Plain],
            }],
        }
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("Hip Hop"), "hip_hop");
        assert_eq!(safe_name("drum & bass"), "drum___bass");
        assert_eq!(safe_name("K-Pop"), "k_pop");
        assert_eq!(safe_name("Витамины и БАДы"), "витамины_и_бады");
    }

    #[test]
    fn test_category_dir() {
        let hip_hop = Category::new("Hip Hop", "https://example.com/hip-hop");
        let dir = category_dir(Path::new("out/musicbrainz"), &hip_hop);
        assert_eq!(dir, PathBuf::from("out/musicbrainz/hip_hop"));
    }

    #[test]
    fn test_colliding_names_get_distinct_dirs() {
        let mut categories = vec![
            Category::new("Hip Hop", "https://example.com/a"),
            Category::new("hip-hop", "https://example.com/b"),
            Category::new("Jazz", "https://example.com/c"),
            Category::new("hip hop", "https://example.com/d"),
            Category::new("hip_hop_2", "https://example.com/e"),
        ];

        assign_dir_names(&mut categories);

        let dirs: Vec<&str> = categories.iter().map(|c| c.dir_name.as_str()).collect();
        assert_eq!(
            dirs,
            vec!["hip_hop", "hip_hop_2", "jazz", "hip_hop_3", "hip_hop_2_2"]
        );
    }

    #[test]
    fn test_fan_out_runs_every_exporter() {
        let calls = Arc::new(AtomicUsize::new(0));
        let exporters: Vec<Box<dyn Exporter<Plain>>> = vec![
            Box::new(Counting {
                calls: Arc::clone(&calls),
                fail: true,
            }),
            Box::new(Counting {
                calls: Arc::clone(&calls),
                fail: false,
            }),
        ];

        let outcome = exporters.export(&result());

        assert!(matches!(outcome, Err(OutputError::Write(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
