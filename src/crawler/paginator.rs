//! Pagination discovery
//!
//! Page 1 of every listing is fetched once; its pagination indicator decides
//! how many page descriptors the listing expands into. The page 1 document is
//! handed back so its records can be extracted without a second request.
//!
//! Descriptors are produced lazily and no listing spans more than
//! [`MAX_PAGE_COUNT`] pages, whatever its indicator claims.

use crate::crawler::RawDocument;
use crate::site::{Category, EntityKind, Listing, PageCountHint, Site};
use regex::Regex;
use scraper::Html;
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// One fetchable page of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub category: Arc<Category>,
    pub kind: EntityKind,

    /// 1-based page number
    pub page_number: u32,
    pub url: String,
}

/// Upper bound on the pages of a single listing
pub const MAX_PAGE_COUNT: u32 = 10_000;

/// A listing's page count plus the already-fetched page 1
#[derive(Debug, Clone)]
pub struct Pagination {
    /// Pages 1..=`page_count` make up the listing
    pub page_count: u32,
    pub first_page: RawDocument,
}

/// Expands listings into page descriptors
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: u32,
    max_pages: u32,
}

impl Paginator {
    /// `max_pages` of 0 means [`MAX_PAGE_COUNT`]
    pub fn new(page_size: u32, max_pages: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages,
        }
    }

    /// Number of pages a listing spans
    ///
    /// A missing or zero indicator means a single page. The result never
    /// exceeds `max_pages` or [`MAX_PAGE_COUNT`].
    pub fn page_count(&self, hint: Option<PageCountHint>) -> u32 {
        let count = match hint {
            Some(PageCountHint::TotalItems(total)) => {
                let pages = total.div_ceil(u64::from(self.page_size));
                u32::try_from(pages).unwrap_or(u32::MAX)
            }
            Some(PageCountHint::LastPage(last)) => last,
            None => 1,
        }
        .max(1);

        let cap = match self.max_pages {
            0 => MAX_PAGE_COUNT,
            max => max.min(MAX_PAGE_COUNT),
        };

        if count > cap {
            tracing::warn!(pages = count, max_pages = cap, "Listing exceeds page cap, truncating");
            return cap;
        }

        count
    }

    /// Lazily yields descriptors for pages 1..=`page_count` of a listing
    pub fn descriptors<'a, S: Site>(
        &self,
        site: &'a S,
        category: &'a Arc<Category>,
        listing: &'a Listing,
        page_count: u32,
    ) -> impl Iterator<Item = PageDescriptor> + 'a {
        (1..=page_count).map(move |page_number| PageDescriptor {
            category: Arc::clone(category),
            kind: listing.kind.clone(),
            page_number,
            url: if page_number == 1 {
                listing.first_page_url.clone()
            } else {
                site.page_url(listing, page_number)
            },
        })
    }

    /// Fetches page 1 of a listing and sizes the listing
    ///
    /// `fetch_first` performs the page 1 request, retries included; its error
    /// is returned unchanged.
    pub async fn discover<S, F, Fut, E>(
        &self,
        site: &S,
        category: &Arc<Category>,
        listing: &Listing,
        fetch_first: F,
    ) -> Result<Pagination, E>
    where
        S: Site,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<RawDocument, E>>,
    {
        let first_page = fetch_first(listing.first_page_url.clone()).await?;
        let hint = site.page_count_hint(&first_page);
        let page_count = self.page_count(hint);

        tracing::debug!(
            category = %category.name,
            kind = %listing.kind,
            ?hint,
            pages = page_count,
            "Listing paginated"
        );

        Ok(Pagination {
            page_count,
            first_page,
        })
    }
}

/// Reads a total item count from indicator text such as "Found 1,234 artists"
///
/// Thousands separators are ignored; the first run of digits wins.
pub fn total_items_in(text: &str) -> Option<u64> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()?;

    let cleaned = text.replace(',', "");
    digits.find(&cleaned)?.as_str().parse().ok()
}

/// Reads the last page number from the elements matching `css`
///
/// Takes the largest number found, so a pager listing every page works too.
pub fn last_page_in(html: &str, css: &str) -> Option<u32> {
    let selector = crate::site::selector(css)?;
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|element| {
            crate::site::element_text(element)
                .trim()
                .parse::<u32>()
                .ok()
        })
        .max()
}
