//! rigla.ru pharmacy catalogue harvester
//!
//! Categories come from the main navigation, minus the sales and discounts
//! sections. Category pages are paginated with `?page=N` and show the last
//! page number in the pager.

use crate::crawler::{last_page_in, RawDocument};
use crate::site::{
    element_text, resolve_url, selector, Category, EntityKind, Listing, PageCountHint, Record,
    Site,
};
use scraper::{ElementRef, Html, Selector};

pub const DEFAULT_BASE_URL: &str = "https://www.rigla.ru";

const NAVIGATION_LINKS: &str = ".navigation-item a";
const LAST_PAGE: &str = ".pagination__item._last";
const PRODUCTS: &str = ".product";

const EXCLUDED_SECTIONS: [&str; 2] = ["sales", "discounts"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,

    /// Price as displayed, currency formatting included
    pub price: String,
    pub brand: String,
    pub availability: String,
    pub image_url: String,
    pub category: String,
}

impl Record for Product {
    fn columns() -> &'static [&'static str] {
        &["name", "price", "brand", "availability", "imageUrl", "category"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.price.clone(),
            self.brand.clone(),
            self.availability.clone(),
            self.image_url.clone(),
            self.category.clone(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Rigla {
    base_url: String,
}

impl Rigla {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

struct ProductSelectors {
    title: Selector,
    price: Selector,
    brand: Selector,
    stock: Selector,
    image: Selector,
}

impl ProductSelectors {
    fn new() -> Option<Self> {
        Some(Self {
            title: selector(".product__title")?,
            price: selector(".product__active-price-number")?,
            brand: selector(".product-brand__link")?,
            stock: selector(".stock-type")?,
            image: selector(".product__img")?,
        })
    }
}

fn text_of(product: ElementRef<'_>, selector: &Selector) -> String {
    product
        .select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

impl Site for Rigla {
    type Record = Product;

    fn name(&self) -> &'static str {
        "rigla"
    }

    fn index_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn discover_categories(&self, index: &RawDocument) -> Vec<Category> {
        let Some(links) = selector(NAVIGATION_LINKS) else {
            return Vec::new();
        };
        let document = Html::parse_document(&index.body);

        document
            .select(&links)
            .filter_map(|link| {
                let url = resolve_url(&index.url, link.value().attr("href")?)?;
                if EXCLUDED_SECTIONS.iter().any(|section| url.contains(section)) {
                    return None;
                }
                let name = element_text(link);
                (!name.is_empty()).then(|| Category::new(name, url))
            })
            .collect()
    }

    fn listings(&self, category: &Category) -> Vec<Listing> {
        vec![Listing::new(
            EntityKind::new("products"),
            category.source_url.clone(),
        )]
    }

    fn page_count_hint(&self, first_page: &RawDocument) -> Option<PageCountHint> {
        last_page_in(&first_page.body, LAST_PAGE).map(PageCountHint::LastPage)
    }

    fn extract(
        &self,
        document: &RawDocument,
        category: &Category,
        _kind: &EntityKind,
    ) -> Vec<Product> {
        let (Some(products), Some(selectors)) = (selector(PRODUCTS), ProductSelectors::new())
        else {
            return Vec::new();
        };

        let html = Html::parse_document(&document.body);

        html.select(&products)
            .map(|product| Product {
                name: text_of(product, &selectors.title),
                price: text_of(product, &selectors.price),
                brand: text_of(product, &selectors.brand),
                availability: text_of(product, &selectors.stock),
                image_url: product
                    .select(&selectors.image)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .and_then(|src| resolve_url(&document.url, src))
                    .unwrap_or_default(),
                category: category.name.clone(),
            })
            .filter(|product| !product.name.is_empty())
            .collect()
    }
}
