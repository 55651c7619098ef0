//! kworb.net YouTube chart harvester
//!
//! Categories are the charts linked from the YouTube stats page. Each chart
//! is a single unpaginated table of videos.

use crate::crawler::RawDocument;
use crate::site::{
    element_text, parse_count, resolve_url, selector, Category, EntityKind, Listing, Record, Site,
};
use scraper::{ElementRef, Html, Selector};

pub const DEFAULT_BASE_URL: &str = "https://kworb.net";

const CATEGORY_LINKS: &str = ".subcontainer a";
const VIDEO_ROWS: &str = "table.addpos tbody tr";
const VIDEO_LINK: &str = "td:nth-child(1) a";
const VIEWS: &str = "td:nth-child(2)";
const DAILY_VIEWS: &str = "td:nth-child(3)";

/// A video row of a chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartVideo {
    /// Position in the chart, 1-based
    pub rank: u32,
    pub title: String,
    pub video_id: String,
    pub views: u64,
    pub daily_views: u64,
    pub url: String,
}

impl Record for ChartVideo {
    fn columns() -> &'static [&'static str] {
        &["rank", "title", "videoId", "views", "dailyViews", "url"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.rank.to_string(),
            self.title.clone(),
            self.video_id.clone(),
            self.views.to_string(),
            self.daily_views.to_string(),
            self.url.clone(),
        ]
    }

    fn assign_rank(&mut self, rank: u32) {
        self.rank = rank;
    }
}

#[derive(Debug, Clone)]
pub struct Kworb {
    base_url: String,
}

impl Kworb {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// `video/<id>.html` → `<id>`
fn video_id(href: &str) -> String {
    let id = href.rsplit('/').next().unwrap_or(href);
    id.strip_suffix(".html").unwrap_or(id).to_string()
}

impl Site for Kworb {
    type Record = ChartVideo;

    fn name(&self) -> &'static str {
        "kworb"
    }

    fn index_url(&self) -> String {
        format!("{}/youtube/stats.html", self.base_url)
    }

    fn discover_categories(&self, index: &RawDocument) -> Vec<Category> {
        let Some(links) = selector(CATEGORY_LINKS) else {
            return Vec::new();
        };
        let document = Html::parse_document(&index.body);

        document
            .select(&links)
            .filter_map(|link| {
                let url = resolve_url(&index.url, link.value().attr("href")?)?;
                // In-page anchors are not charts
                if url.contains('#') {
                    return None;
                }
                let name = element_text(link);
                (!name.is_empty()).then(|| Category::new(name, url))
            })
            .collect()
    }

    fn listings(&self, category: &Category) -> Vec<Listing> {
        vec![Listing::new(
            EntityKind::new("videos"),
            category.source_url.clone(),
        )]
    }

    fn extract(
        &self,
        document: &RawDocument,
        _category: &Category,
        _kind: &EntityKind,
    ) -> Vec<ChartVideo> {
        let (Some(rows), Some(link), Some(views), Some(daily)) = (
            selector(VIDEO_ROWS),
            selector(VIDEO_LINK),
            selector(VIEWS),
            selector(DAILY_VIEWS),
        ) else {
            return Vec::new();
        };

        let html = Html::parse_document(&document.body);
        let cell_count = |row: ElementRef<'_>, cell: &Selector| {
            row.select(cell)
                .next()
                .and_then(|c| parse_count(&element_text(c)))
                .unwrap_or(0)
        };

        html.select(&rows)
            .filter_map(|row| {
                let anchor = row.select(&link).next()?;
                let id = video_id(anchor.value().attr("href")?);
                if id.is_empty() {
                    return None;
                }

                Some(ChartVideo {
                    rank: 0,
                    title: element_text(anchor),
                    url: format!("https://youtube.com/watch?v={}", id),
                    video_id: id,
                    views: cell_count(row, &views),
                    daily_views: cell_count(row, &daily),
                })
            })
            .enumerate()
            .map(|(position, mut video)| {
                video.rank = position as u32 + 1;
                video
            })
            .collect()
    }
}
