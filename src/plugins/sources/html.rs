use futures::stream::{self, StreamExt};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::models::RawItem;
use crate::plugins::traits::{ItemStream, SourceAdapter};
use crate::utils::error::{AppError, Result};
use crate::utils::price::{absolute_url, extract_price, extract_price_opt};

/// Declarative description of one clearance listing site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HtmlSourceConfig {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Prefix that relative listing links are resolved against.
    pub domain: String,
    /// Page address with a `{page}` placeholder.
    pub page_url: String,
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    /// Added to `{page}` for every following page. Offset-paged listings
    /// (`?start=0&sz=48`) set this to the page size.
    #[serde(default = "default_page_step")]
    pub page_step: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Element on the first page whose number is the total page count.
    /// The last match wins.
    #[serde(default)]
    pub page_count_selector: Option<String>,
    pub item_selector: String,
    pub title_selector: String,
    /// Tried in order inside each item; the first match wins.
    pub price_selectors: Vec<String>,
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    /// Overrides the scraper-wide inter-page delay.
    #[serde(default)]
    pub page_delay_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_first_page() -> u32 {
    1
}

fn default_page_step() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    50
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

impl HtmlSourceConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("source id must not be empty".to_string());
        }
        if !self.page_url.contains("{page}") {
            return Err(format!("source {}: page_url must contain {{page}}", self.id));
        }
        if Url::parse(&self.page_url.replace("{page}", "1")).is_err() {
            return Err(format!("source {}: invalid page_url", self.id));
        }
        if Url::parse(&self.domain).is_err() {
            return Err(format!("source {}: invalid domain", self.id));
        }
        if self.max_pages == 0 {
            return Err(format!("source {}: max_pages must be greater than 0", self.id));
        }
        if self.page_step == 0 {
            return Err(format!("source {}: page_step must be greater than 0", self.id));
        }
        if self.price_selectors.is_empty() {
            return Err(format!("source {}: at least one price selector is required", self.id));
        }

        let selectors = [&self.item_selector, &self.title_selector, &self.link_selector]
            .into_iter()
            .chain(self.price_selectors.iter())
            .chain(self.page_count_selector.iter());
        for selector in selectors {
            if Selector::parse(selector).is_err() {
                return Err(format!("source {}: invalid CSS selector '{}'", self.id, selector));
            }
        }

        Ok(())
    }
}

struct CompiledSelectors {
    item: Selector,
    title: Selector,
    prices: Vec<Selector>,
    link: Selector,
    page_count: Option<Selector>,
}

/// What one listing page yielded.
#[derive(Debug, Default)]
pub struct ListingPage {
    pub items: Vec<RawItem>,
    pub page_count: Option<u32>,
}

struct PageCursor {
    index: u32,
    limit: u32,
    previous_titles: Vec<String>,
}

fn compile(source_id: &str, selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Parse {
        message: format!("source {}: invalid CSS selector '{}': {:?}", source_id, selector, e),
    })
}

/// Scrapes a paginated HTML listing with CSS selectors.
pub struct HtmlSourceAdapter {
    config: HtmlSourceConfig,
    domain: Url,
    selectors: CompiledSelectors,
    client: Client,
    page_delay: Duration,
}

impl HtmlSourceAdapter {
    pub fn new(config: HtmlSourceConfig, client: Client, default_page_delay: Duration) -> Result<Self> {
        let domain = Url::parse(&config.domain).map_err(|e| AppError::Parse {
            message: format!("source {}: invalid domain '{}': {}", config.id, config.domain, e),
        })?;

        let selectors = CompiledSelectors {
            item: compile(&config.id, &config.item_selector)?,
            title: compile(&config.id, &config.title_selector)?,
            prices: config
                .price_selectors
                .iter()
                .map(|s| compile(&config.id, s))
                .collect::<Result<Vec<_>>>()?,
            link: compile(&config.id, &config.link_selector)?,
            page_count: config
                .page_count_selector
                .as_deref()
                .map(|s| compile(&config.id, s))
                .transpose()?,
        };

        let page_delay = config
            .page_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(default_page_delay);

        Ok(Self {
            config,
            domain,
            selectors,
            client,
            page_delay,
        })
    }

    fn page_number(&self, index: u32) -> u32 {
        self.config
            .first_page
            .saturating_add(index.saturating_mul(self.config.page_step))
    }

    fn page_url(&self, page: u32) -> String {
        self.config.page_url.replace("{page}", &page.to_string())
    }

    async fn fetch_page(&self, page: u32) -> Result<ListingPage> {
        let url = self.page_url(page);
        tracing::debug!("Fetching {} page {}: {}", self.config.id, page, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::source_failure(&self.config.id, format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::source_failure(
                &self.config.id,
                format!("GET {} returned {}", url, status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::source_failure(&self.config.id, format!("reading {} failed: {}", url, e)))?;

        Ok(self.parse_page(&body))
    }

    /// Extract every listing on one page. The DOM never outlives this call.
    pub fn parse_page(&self, html: &str) -> ListingPage {
        let document = Html::parse_document(html);

        let items = document
            .select(&self.selectors.item)
            .map(|element| self.parse_item(element))
            .collect();

        let page_count = self.selectors.page_count.as_ref().and_then(|selector| {
            let text = document.select(selector).last().map(element_text)?;
            extract_price(&text).trunc().to_u32().filter(|count| *count > 0)
        });

        ListingPage { items, page_count }
    }

    fn parse_item(&self, element: ElementRef<'_>) -> RawItem {
        let title = element
            .select(&self.selectors.title)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let price_text = self
            .selectors
            .prices
            .iter()
            .find_map(|selector| element.select(selector).next())
            .map(element_text);

        let href = element.value().attr("href").or_else(|| {
            element
                .select(&self.selectors.link)
                .next()
                .and_then(|link| link.value().attr("href"))
        });

        RawItem {
            title,
            price: extract_price_opt(price_text.as_deref()),
            url: absolute_url(&self.domain, href),
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

impl SourceAdapter for HtmlSourceAdapter {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn fetch(&self) -> ItemStream<'_> {
        let cursor = PageCursor {
            index: 0,
            limit: self.config.max_pages,
            previous_titles: Vec::new(),
        };

        stream::unfold(Some(cursor), move |cursor| async move {
            let mut cursor = cursor?;
            if cursor.index >= cursor.limit {
                return None;
            }
            let page = self.page_number(cursor.index);

            // Self-throttle between pages
            if cursor.index > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let listing = match self.fetch_page(page).await {
                Ok(listing) => listing,
                // Keep what earlier pages produced, stop here
                Err(e) => return Some((vec![Err(e)], None)),
            };

            if listing.items.is_empty() {
                tracing::debug!("{} page {} is empty, stopping", self.config.id, page);
                return None;
            }

            // Listings that clamp out-of-range pages serve the last page again
            let titles: Vec<String> = listing.items.iter().map(|item| item.title.clone()).collect();
            if titles == cursor.previous_titles {
                tracing::debug!("{} page {} repeats the previous page, stopping", self.config.id, page);
                return None;
            }

            if cursor.index == 0 {
                if let Some(count) = listing.page_count {
                    tracing::debug!("{} reports {} pages", self.config.id, count);
                    cursor.limit = cursor.limit.min(count);
                }
            }

            tracing::debug!("{} page {}: {} items", self.config.id, page, listing.items.len());
            cursor.index += 1;
            cursor.previous_titles = titles;

            let batch: Vec<Result<RawItem>> = listing.items.into_iter().map(Ok).collect();
            Some((batch, Some(cursor)))
        })
        .flat_map(stream::iter)
        .boxed()
    }
}
