// Source adapter implementations
pub mod html;

pub use html::{HtmlSourceAdapter, HtmlSourceConfig};

use reqwest::Client;
use std::time::Duration;

use crate::config::ScraperConfig;
use crate::plugins::traits::SourceAdapter;
use crate::utils::error::Result;

pub type SourceAdapterBox = Box<dyn SourceAdapter>;

/// Build one adapter per enabled source, in configuration order, sharing a
/// single HTTP client.
pub fn build_sources<'a>(
    sources: impl IntoIterator<Item = &'a HtmlSourceConfig>,
    scraper: &ScraperConfig,
) -> Result<Vec<SourceAdapterBox>> {
    let client = Client::builder()
        .user_agent(&scraper.user_agent)
        .timeout(Duration::from_secs(scraper.request_timeout))
        .build()?;
    let page_delay = Duration::from_millis(scraper.page_delay_ms);

    sources
        .into_iter()
        .filter(|source| source.enabled)
        .map(|source| {
            let adapter = HtmlSourceAdapter::new(source.clone(), client.clone(), page_delay)?;
            Ok(Box::new(adapter) as SourceAdapterBox)
        })
        .collect()
}
