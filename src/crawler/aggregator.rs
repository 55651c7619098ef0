//! Result aggregation
//!
//! Page tasks settle in any order. The aggregator buffers each page's records
//! under its page number and only orders them when the category is finalized,
//! so the merged output is the same no matter how the fetches interleaved.

use crate::site::{Category, EntityKind, Record};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Records of one kind, in page order
#[derive(Debug, Clone, PartialEq)]
pub struct KindRecords<R> {
    pub kind: EntityKind,
    pub records: Vec<R>,
}

/// Merged records of a category, one entry per kind in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryResult<R> {
    pub category: Category,
    pub kinds: Vec<KindRecords<R>>,
}

impl<R> CategoryResult<R> {
    pub fn total_records(&self) -> usize {
        self.kinds.iter().map(|k| k.records.len()).sum()
    }

    pub fn records(&self, kind: &EntityKind) -> Option<&[R]> {
        self.kinds
            .iter()
            .find(|k| &k.kind == kind)
            .map(|k| k.records.as_slice())
    }
}

#[derive(Debug)]
struct CategoryBuffer<R> {
    category: Category,
    kinds: Vec<EntityKind>,
    pages: HashMap<EntityKind, BTreeMap<u32, Vec<R>>>,
}

impl<R> CategoryBuffer<R> {
    fn new(category: &Category) -> Self {
        Self {
            category: category.clone(),
            kinds: Vec::new(),
            pages: HashMap::new(),
        }
    }

    fn declare(&mut self, kind: &EntityKind) {
        if !self.kinds.contains(kind) {
            self.kinds.push(kind.clone());
        }
    }
}

/// Buffers page results per category until every page has settled
#[derive(Debug)]
pub struct ResultAggregator<R> {
    buffers: Mutex<HashMap<String, CategoryBuffer<R>>>,
}

impl<R> Default for ResultAggregator<R> {
    fn default() -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
        }
    }
}

impl<R: Record> ResultAggregator<R> {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<String, CategoryBuffer<R>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declares a category's kinds, fixing their output order
    ///
    /// Kinds without any successful page still appear in the result, empty.
    pub fn register(&self, category: &Category, kinds: impl IntoIterator<Item = EntityKind>) {
        let mut buffers = self.buffers();
        let buffer = buffers
            .entry(category.name.clone())
            .or_insert_with(|| CategoryBuffer::new(category));

        for kind in kinds {
            buffer.declare(&kind);
        }
    }

    /// Stores the records of one settled page
    pub fn add(&self, category: &Category, kind: &EntityKind, page_number: u32, records: Vec<R>) {
        let mut buffers = self.buffers();
        let buffer = buffers
            .entry(category.name.clone())
            .or_insert_with(|| CategoryBuffer::new(category));
        buffer.declare(kind);

        let pages = buffer.pages.entry(kind.clone()).or_default();
        if pages.insert(page_number, records).is_some() {
            tracing::warn!(
                category = %category.name,
                %kind,
                page = page_number,
                "Page settled twice, keeping the later records"
            );
        }
    }

    /// Merges a category's pages and releases its buffer
    ///
    /// Records are ordered by page number, then by position within the page,
    /// and ranks are renumbered from 1 per kind.
    pub fn finalize(&self, category: &Category) -> CategoryResult<R> {
        let Some(mut buffer) = self.buffers().remove(&category.name) else {
            return CategoryResult {
                category: category.clone(),
                kinds: Vec::new(),
            };
        };

        let kinds = buffer
            .kinds
            .iter()
            .map(|kind| {
                let mut records: Vec<R> = buffer
                    .pages
                    .remove(kind)
                    .map(|pages| pages.into_values().flatten().collect())
                    .unwrap_or_default();

                for (position, record) in records.iter_mut().enumerate() {
                    record.assign_rank(u32::try_from(position + 1).unwrap_or(u32::MAX));
                }

                KindRecords {
                    kind: kind.clone(),
                    records,
                }
            })
            .collect();

        CategoryResult {
            category: buffer.category,
            kinds,
        }
    }
}
