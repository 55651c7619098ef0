//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for a site and run the full
//! discover, paginate, fetch, aggregate and export cycle end-to-end.

use std::fs;
use std::path::Path;
use sumi_harvest::config::{
    Config, CrawlerConfig, ExportFormat, OutputConfig, SiteConfig, UserAgentConfig,
};
use sumi_harvest::crawler::{harvest, FailureKind};
use sumi_harvest::{CategoryState, HarvestError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing the given site at the mock server
fn create_test_config(site: &str, base_url: &str, output_dir: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            concurrency_outer: 2,
            concurrency_inner: 3,
            min_interval_ms: 10, // Very short for testing
            carryover: true,
            max_retries: 1,
            retry_delay_ms: 10,
            request_timeout_ms: 2000,
            page_size: 25,
            max_pages: 0,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            directory: output_dir.display().to_string(),
            formats: vec![ExportFormat::Csv, ExportFormat::Markdown, ExportFormat::Xlsx],
        },
        site: SiteConfig {
            name: site.to_string(),
            base_url: Some(base_url.to_string()),
        },
    }
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.into())
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn product_card(name: &str, price: &str) -> String {
    format!(
        r#"<div class="product">
            <a class="product__title">{}</a>
            <span class="product__active-price-number">{}</span>
            <a class="product-brand__link">Brand</a>
            <span class="stock-type">In stock</span>
            <img class="product__img" src="/img/{}.jpg">
        </div>"#,
        name, price, name
    )
}

fn catalogue_page(products: &[(&str, &str)], last_page: Option<u32>) -> String {
    let cards: String = products
        .iter()
        .map(|(name, price)| product_card(name, price))
        .collect();
    let pager = last_page
        .map(|n| format!(r#"<ul><li class="pagination__item _last">{}</li></ul>"#, n))
        .unwrap_or_default();

    format!("<html><body>{}{}</body></html>", cards, pager)
}

/// Mounts a pharmacy home page with two catalogue sections and a promo link
async fn mount_rigla_home(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body><nav>
                <div class="navigation-item"><a href="/catalog/vitamins">Vitamins</a></div>
                <div class="navigation-item"><a href="/catalog/cosmetics">Cosmetics</a></div>
                <div class="navigation-item"><a href="/sales">Sales</a></div>
            </nav></body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sales"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(server)
        .await;
}

fn read_csv_rows(file: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(file).expect("Failed to open CSV");
    reader
        .records()
        .map(|r| r.expect("Bad CSV row").iter().map(String::from).collect())
        .collect()
}

#[tokio::test]
async fn test_full_harvest_exports_every_category() {
    let server = MockServer::start().await;
    mount_rigla_home(&server).await;

    // Mounted before the page-1 mock so the query match takes precedence
    Mock::given(method("GET"))
        .and(path("/catalog/vitamins"))
        .and(query_param("page", "2"))
        .respond_with(html(catalogue_page(&[("Omega", "499")], Some(2))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/catalog/vitamins"))
        .respond_with(html(catalogue_page(
            &[("Vitamin C", "249"), ("Zinc", "199")],
            Some(2),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/catalog/cosmetics"))
        .respond_with(html(catalogue_page(&[("Hand cream", "150")], None)))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config("rigla", &server.uri(), output.path());

    let summary = harvest(&config, CancellationToken::new())
        .await
        .expect("Harvest failed");

    assert!(!summary.interrupted);
    assert_eq!(summary.categories_processed(), 2);
    assert_eq!(summary.categories_done(), 2);
    assert_eq!(summary.total_tasks(), 3);
    assert_eq!(summary.total_records(), 4);

    let vitamins = summary.category("Vitamins").expect("Missing report");
    assert_eq!(vitamins.state, CategoryState::Done);
    assert_eq!(vitamins.pages_succeeded, 2);
    assert_eq!(vitamins.attempts, 2);

    // Records come out in page order
    let site_dir = output.path().join("rigla");
    let rows = read_csv_rows(&site_dir.join("vitamins").join("products.csv"));
    let names: Vec<&str> = rows.iter().map(|row| row[0].as_str()).collect();
    assert_eq!(names, vec!["Vitamin C", "Zinc", "Omega"]);
    assert!(rows[0][4].ends_with("/img/Vitamin%20C.jpg"));
    assert_eq!(rows[0][5], "Vitamins");

    assert!(site_dir.join("cosmetics").join("products.md").exists());
    assert!(site_dir.join("vitamins").join("vitamins.xlsx").exists());

    let summary_md = fs::read_to_string(site_dir.join("summary.md")).expect("Missing summary");
    assert!(summary_md.contains("# Harvest Summary: rigla"));
    assert!(summary_md.contains("- **Total Records**: 4"));
}

#[tokio::test]
async fn test_failed_page_is_contained() {
    let server = MockServer::start().await;
    mount_rigla_home(&server).await;

    // Page 2 keeps failing: one attempt plus one retry
    Mock::given(method("GET"))
        .and(path("/catalog/vitamins"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/catalog/vitamins"))
        .respond_with(html(catalogue_page(&[("Vitamin C", "249")], Some(2))))
        .mount(&server)
        .await;

    // Client errors are not retried
    Mock::given(method("GET"))
        .and(path("/catalog/cosmetics"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config("rigla", &server.uri(), output.path());

    let summary = harvest(&config, CancellationToken::new())
        .await
        .expect("Page failures must not fail the run");

    let vitamins = summary.category("Vitamins").expect("Missing report");
    assert_eq!(vitamins.state, CategoryState::PartiallyFailed);
    assert_eq!(vitamins.pages_succeeded, 1);
    assert_eq!(vitamins.failures.len(), 1);
    assert_eq!(vitamins.failures[0].page_number, 2);
    assert_eq!(vitamins.failures[0].attempts, 2);
    assert_eq!(vitamins.failures[0].failure, FailureKind::PermanentHttp);

    let cosmetics = summary.category("Cosmetics").expect("Missing report");
    assert_eq!(cosmetics.state, CategoryState::Failed);
    assert_eq!(cosmetics.failures[0].failure, FailureKind::DiscoveryFailure);

    // Partial results are still exported, failed categories are not
    let site_dir = output.path().join("rigla");
    let rows = read_csv_rows(&site_dir.join("vitamins").join("products.csv"));
    assert_eq!(rows.len(), 1);
    assert!(!site_dir.join("cosmetics").exists());
}

#[tokio::test]
async fn test_unreachable_index_fails_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/stats.html"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let output = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config("kworb", &server.uri(), output.path());

    let result = harvest(&config, CancellationToken::new()).await;

    assert!(
        matches!(result, Err(HarvestError::Discovery { .. })),
        "Expected a discovery error, got {:?}",
        result.map(|s| s.categories_processed())
    );
    assert!(!output.path().join("kworb").join("summary.md").exists());
}

#[tokio::test]
async fn test_unpaginated_chart_harvest() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/stats.html"))
        .respond_with(html(
            r##"<html><body><div class="subcontainer">
                <a href="trending.html">Trending</a>
                <a href="#notes">Notes</a>
            </div></body></html>"##,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/youtube/trending.html"))
        .respond_with(html(
            r#"<html><body><table class="addpos"><tbody>
                <tr><td><a href="video/aaa.html">First</a></td><td>3,000</td><td>30</td></tr>
                <tr><td><a href="video/bbb.html">Second</a></td><td>2,000</td><td>20</td></tr>
            </tbody></table></body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config("kworb", &server.uri(), output.path());

    let summary = harvest(&config, CancellationToken::new())
        .await
        .expect("Harvest failed");

    assert_eq!(summary.categories_done(), 1);

    let rows = read_csv_rows(
        &output
            .path()
            .join("kworb")
            .join("trending")
            .join("videos.csv"),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][..4], ["1", "First", "aaa", "3000"]);
    assert_eq!(rows[1][0], "2");
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let server = MockServer::start().await;
    mount_rigla_home(&server).await;

    let output = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config("rigla", &server.uri(), output.path());

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    assert!(matches!(
        harvest(&config, shutdown).await,
        Err(HarvestError::Cancelled)
    ));
    assert!(!output.path().join("rigla").exists());
}
