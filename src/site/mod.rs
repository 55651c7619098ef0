//! Site plug-ins
//!
//! A site describes the two-level structure the harvester walks: where the
//! category index lives, which listings each category has, how a listing
//! paginates, and how records are read out of a fetched page. Everything in
//! this module is pure; fetching and scheduling live in `crawler`.

mod kworb;
mod musicbrainz;
mod rigla;

pub use kworb::{ChartVideo, Kworb};
pub use musicbrainz::{GenreEntity, MusicBrainz};
pub use rigla::{Product, Rigla};

use crate::crawler::RawDocument;
use crate::output::safe_name;
use scraper::{ElementRef, Selector};
use std::fmt;
use url::Url;

/// Names accepted in the `[site]` configuration section
pub const SITE_NAMES: &[&str] = &["musicbrainz", "kworb", "rigla"];

/// A top-level grouping to harvest (genre, chart, product category)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category {
    /// Display name, unique within a run
    pub name: String,

    /// Where the category was linked from the index page
    pub source_url: String,

    /// Output directory name, made unique per run by
    /// [`assign_dir_names`](crate::output::assign_dir_names)
    pub dir_name: String,
}

impl Category {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            dir_name: safe_name(&name),
            name,
            source_url: source_url.into(),
        }
    }
}

/// Record-kind tag within a category (e.g. `artist`, `videos`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKind(String);

impl EntityKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One paginated listing of a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub kind: EntityKind,
    pub first_page_url: String,
}

impl Listing {
    pub fn new(kind: EntityKind, first_page_url: impl Into<String>) -> Self {
        Self {
            kind,
            first_page_url: first_page_url.into(),
        }
    }
}

/// What page 1 of a listing says about the size of the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCountHint {
    /// Total number of items across all pages
    TotalItems(u64),

    /// Number of the last page
    LastPage(u32),
}

/// A typed record extracted from a page
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    /// Column names, in output order
    fn columns() -> &'static [&'static str];

    /// Values formatted for tabular output, aligned with [`Record::columns`]
    fn row(&self) -> Vec<String>;

    /// Overwrites the record's rank with its final 1-based position
    ///
    /// Records without a rank ignore this.
    fn assign_rank(&mut self, _rank: u32) {}
}

/// Site-specific discovery and extraction
pub trait Site: Send + Sync + 'static {
    type Record: Record;

    /// Short name, used for log lines and the output directory
    fn name(&self) -> &'static str;

    /// URL of the page that lists the categories
    fn index_url(&self) -> String;

    /// Reads the categories out of the index page
    fn discover_categories(&self, index: &RawDocument) -> Vec<Category>;

    /// Listings to harvest for a category, in output order
    fn listings(&self, category: &Category) -> Vec<Listing>;

    /// URL of page `page_number` (≥ 2) of a listing
    fn page_url(&self, listing: &Listing, page_number: u32) -> String {
        with_query_param(&listing.first_page_url, "page", &page_number.to_string())
    }

    /// Reads the pagination indicator from page 1, if the page has one
    fn page_count_hint(&self, _first_page: &RawDocument) -> Option<PageCountHint> {
        None
    }

    /// Extracts records from a page
    ///
    /// Must be pure: the same document always yields the same records.
    fn extract(
        &self,
        document: &RawDocument,
        category: &Category,
        kind: &EntityKind,
    ) -> Vec<Self::Record>;
}

/// Parses a CSS selector, logging instead of failing on a bad pattern
pub(crate) fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::warn!(css, error = ?e, "Invalid CSS selector");
            None
        }
    }
}

/// Element text with whitespace runs collapsed
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves an href against the page it was found on
///
/// Returns None for empty, fragment-only, and non-HTTP(S) links.
pub(crate) fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let resolved = Url::parse(base).ok()?.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Parses a number written with thousands separators ("1,234,567")
pub(crate) fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    digits.parse().ok()
}

/// Sets a query parameter, keeping any existing ones
pub(crate) fn with_query_param(url: &str, key: &str, value: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let retained: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| k != key)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            parsed
                .query_pairs_mut()
                .clear()
                .extend_pairs(retained)
                .append_pair(key, value);
            parsed.to_string()
        }
        Err(_) => format!("{}?{}={}", url, key, value),
    }
}
