//! MusicBrainz genre harvester
//!
//! Categories are the genres on `/genres`. Each genre has four tag listings
//! (artists, releases, release groups, recordings) paginated 25 per page with
//! a total count in the first paragraph of the page.

use crate::crawler::{total_items_in, RawDocument};
use crate::site::{
    element_text, resolve_url, selector, Category, EntityKind, Listing, PageCountHint, Record,
    Site,
};
use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://musicbrainz.org";

const ENTITY_KINDS: [&str; 4] = ["artist", "release", "release-group", "recording"];

const GENRE_LINKS: &str = r#"#content ul > li a[href^="/genre/"]"#;
const ENTITY_COUNT: &str = "#content > p:first-child";
const ENTITY_ITEMS: &str = "#content ul > li";

/// An entity tagged with a genre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreEntity {
    /// MBID
    pub id: String,
    pub name: String,

    /// Tag vote count
    pub count: u64,
    pub url: String,

    /// Credited artist page, for kinds other than `artist`
    pub related: Option<String>,
}

impl Record for GenreEntity {
    fn columns() -> &'static [&'static str] {
        &["id", "name", "count", "url", "related"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.count.to_string(),
            self.url.clone(),
            self.related.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct MusicBrainz {
    base_url: String,
}

impl MusicBrainz {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/tag/<genre>/<kind>`, with the genre name percent-encoded
    fn tag_url(&self, genre: &str, kind: &str) -> String {
        if let Ok(mut url) = Url::parse(&self.base_url) {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push("tag").push(genre).push(kind);
            }
            return url.to_string();
        }
        format!("{}/tag/{}/{}", self.base_url, genre, kind)
    }
}

impl Site for MusicBrainz {
    type Record = GenreEntity;

    fn name(&self) -> &'static str {
        "musicbrainz"
    }

    fn index_url(&self) -> String {
        format!("{}/genres", self.base_url)
    }

    fn discover_categories(&self, index: &RawDocument) -> Vec<Category> {
        let Some(links) = selector(GENRE_LINKS) else {
            return Vec::new();
        };
        let Some(bdi) = selector("bdi") else {
            return Vec::new();
        };
        let document = Html::parse_document(&index.body);

        document
            .select(&links)
            .filter_map(|link| {
                let href = link.value().attr("href")?;
                let name = link
                    .select(&bdi)
                    .next()
                    .map(element_text)
                    .unwrap_or_else(|| element_text(link));
                if name.is_empty() {
                    return None;
                }
                Some(Category::new(name, resolve_url(&index.url, href)?))
            })
            .collect()
    }

    fn listings(&self, category: &Category) -> Vec<Listing> {
        ENTITY_KINDS
            .iter()
            .map(|kind| Listing::new(EntityKind::new(*kind), self.tag_url(&category.name, kind)))
            .collect()
    }

    fn page_count_hint(&self, first_page: &RawDocument) -> Option<PageCountHint> {
        let count = selector(ENTITY_COUNT)?;
        let document = Html::parse_document(&first_page.body);
        let text = document.select(&count).next().map(element_text)?;

        total_items_in(&text).map(PageCountHint::TotalItems)
    }

    fn extract(
        &self,
        document: &RawDocument,
        _category: &Category,
        kind: &EntityKind,
    ) -> Vec<GenreEntity> {
        let entity_link = format!(r#"a[href^="/{}/"]"#, kind);
        let (Some(items), Some(link_selector), Some(artist_selector), Some(bdi)) = (
            selector(ENTITY_ITEMS),
            selector(&entity_link),
            selector(r#"a[href^="/artist/"]"#),
            selector("bdi"),
        ) else {
            return Vec::new();
        };

        let html = Html::parse_document(&document.body);

        html.select(&items)
            .filter_map(|item| {
                let link = item.select(&link_selector).next()?;
                let href = link.value().attr("href")?;
                let id = href.split('/').nth(2)?.to_string();

                let name = link
                    .select(&bdi)
                    .next()
                    .map(element_text)
                    .unwrap_or_else(|| element_text(link));

                let count = trailing_count(&element_text(item)).unwrap_or(0);

                let related = if kind.as_str() == "artist" {
                    None
                } else {
                    item.select(&artist_selector)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                        .and_then(|href| resolve_url(&document.url, href))
                };

                Some(GenreEntity {
                    id,
                    name,
                    count,
                    url: resolve_url(&document.url, href)?,
                    related,
                })
            })
            .collect()
    }
}

/// Last number in an entry's text; the vote count follows the names
fn trailing_count(text: &str) -> Option<u64> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"\d[\d,]*").ok()).as_ref()?;

    number
        .find_iter(text)
        .last()
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENRES_PAGE: &str = r#"
        <html><body><div id="content">
            <h2>Genres</h2>
            <ul>
                <li><a href="/genre/a1b2"><bdi>hip hop</bdi></a></li>
                <li><a href="/genre/c3d4"><bdi>rock</bdi></a></li>
                <li><a href="/genre/e5f6"><bdi></bdi></a></li>
                <li><a href="/artist/zzzz"><bdi>not a genre</bdi></a></li>
            </ul>
        </div></body></html>
    "#;

    const RELEASE_PAGE: &str = r#"
        <html><body><div id="content">
            <p>Found 1,137 releases tagged with rock</p>
            <ul>
                <li><a href="/release/r-1"><bdi>Blink-182</bdi></a> by
                    <a href="/artist/a-1"><bdi>blink-182</bdi></a> (42)</li>
                <li><a href="/release/r-2"><bdi>Abbey Road</bdi></a> by
                    <a href="/artist/a-2"><bdi>The Beatles</bdi></a> (7)</li>
                <li><a href="/release-group/rg-1"><bdi>Other kind</bdi></a> (3)</li>
            </ul>
        </div></body></html>
    "#;

    fn site() -> MusicBrainz {
        MusicBrainz::new(None)
    }

    fn rock() -> Category {
        Category::new("rock", "https://musicbrainz.org/genre/c3d4")
    }

    #[test]
    fn test_discover_categories() {
        let index = RawDocument::new("https://musicbrainz.org/genres", GENRES_PAGE);
        let categories = site().discover_categories(&index);

        assert_eq!(
            categories,
            vec![
                Category::new("hip hop", "https://musicbrainz.org/genre/a1b2"),
                Category::new("rock", "https://musicbrainz.org/genre/c3d4"),
            ]
        );
    }

    #[test]
    fn test_listings_cover_every_kind() {
        let listings = site().listings(&Category::new("hip hop", ""));
        let kinds: Vec<&str> = listings.iter().map(|l| l.kind.as_str()).collect();

        assert_eq!(kinds, ENTITY_KINDS.to_vec());
        assert_eq!(
            listings[0].first_page_url,
            "https://musicbrainz.org/tag/hip%20hop/artist"
        );
    }

    #[test]
    fn test_page_url() {
        let site = site();
        let listing = &site.listings(&rock())[2];
        assert_eq!(
            site.page_url(listing, 4),
            "https://musicbrainz.org/tag/rock/release-group?page=4"
        );
    }

    #[test]
    fn test_page_count_hint() {
        let page = RawDocument::new("https://musicbrainz.org/tag/rock/release", RELEASE_PAGE);
        assert_eq!(
            site().page_count_hint(&page),
            Some(PageCountHint::TotalItems(1137))
        );

        let empty = RawDocument::new("https://musicbrainz.org/tag/rock/release", "<div></div>");
        assert_eq!(site().page_count_hint(&empty), None);
    }

    #[test]
    fn test_extract_releases() {
        let page = RawDocument::new("https://musicbrainz.org/tag/rock/release", RELEASE_PAGE);
        let records = site().extract(&page, &rock(), &EntityKind::new("release"));

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            GenreEntity {
                id: "r-1".to_string(),
                name: "Blink-182".to_string(),
                count: 42,
                url: "https://musicbrainz.org/release/r-1".to_string(),
                related: Some("https://musicbrainz.org/artist/a-1".to_string()),
            }
        );
        assert_eq!(records[1].name, "Abbey Road");
        assert_eq!(records[1].count, 7);
    }

    #[test]
    fn test_extract_is_idempotent() {
        let page = RawDocument::new("https://musicbrainz.org/tag/rock/release", RELEASE_PAGE);
        let kind = EntityKind::new("release");

        assert_eq!(
            site().extract(&page, &rock(), &kind),
            site().extract(&page, &rock(), &kind)
        );
    }

    #[test]
    fn test_extract_empty_page() {
        let page = RawDocument::new("https://musicbrainz.org/tag/x/artist", "<p>None</p>");
        assert!(site()
            .extract(&page, &rock(), &EntityKind::new("artist"))
            .is_empty());
    }

    #[test]
    fn test_trailing_count() {
        assert_eq!(trailing_count("Blink-182 by blink-182 (42)"), Some(42));
        assert_eq!(trailing_count("Queen (1,024)"), Some(1024));
        assert_eq!(trailing_count("No votes"), None);
    }

    #[test]
    fn test_base_url_override() {
        let site = MusicBrainz::new(Some("http://127.0.0.1:8080/".to_string()));
        assert_eq!(site.index_url(), "http://127.0.0.1:8080/genres");
        assert_eq!(
            site.listings(&rock())[0].first_page_url,
            "http://127.0.0.1:8080/tag/rock/artist"
        );
    }
}
