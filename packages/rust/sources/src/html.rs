//! Retailer search-page scraper.
//!
//! Fetches `search_url` with `{query}` replaced by the URL-encoded search term
//! and reads the price from the first element matching a CSS selector.

use std::time::Duration;

use async_trait::async_trait;
use pricebot_shared::config::QUERY_PLACEHOLDER;
use pricebot_shared::{PriceBotError, Quote, SourceError};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::debug;

use crate::{PriceSource, parse_price, to_cents};

/// Maximum number of redirects to follow on a search page.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for retailer requests.
const USER_AGENT: &str = concat!("pricebot/", env!("CARGO_PKG_VERSION"));

pub struct HtmlPriceSource {
    name: String,
    search_url: String,
    selector: Selector,
    client: Client,
}

impl HtmlPriceSource {
    /// Build a source with its own HTTP client; `timeout` bounds every request.
    pub fn new(
        name: impl Into<String>,
        search_url: impl Into<String>,
        price_selector: &str,
        timeout: Duration,
    ) -> pricebot_shared::Result<Self> {
        let name = name.into();
        let search_url = search_url.into();

        if !search_url.contains(QUERY_PLACEHOLDER) {
            return Err(PriceBotError::config(format!(
                "source '{name}': search_url must contain {QUERY_PLACEHOLDER}"
            )));
        }

        let selector = Selector::parse(price_selector).map_err(|e| {
            PriceBotError::config(format!(
                "source '{name}': invalid price_selector '{price_selector}': {e}"
            ))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| PriceBotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name,
            search_url,
            selector,
            client,
        })
    }

    fn url_for(&self, search_term: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(search_term.as_bytes()).collect();
        self.search_url.replace(QUERY_PLACEHOLDER, &encoded)
    }

    async fn fetch(&self, url: &str) -> Result<String, SourceError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::timeout(&self.name, format!("{url}: {e}"))
            } else {
                SourceError::network(&self.name, format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::not_found(&self.name, format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SourceError::network(&self.name, format!("{url}: HTTP {status}")));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::timeout(&self.name, format!("{url}: {e}"))
            } else {
                SourceError::network(&self.name, format!("{url}: failed to read body: {e}"))
            }
        })
    }
}

#[async_trait]
impl PriceSource for HtmlPriceSource {
    async fn quote(&self, search_term: &str) -> Result<Quote, SourceError> {
        let url = self.url_for(search_term);
        debug!(source = %self.name, %url, "fetching search page");

        let body = self.fetch(&url).await?;

        let text = first_match_text(&body, &self.selector).ok_or_else(|| {
            SourceError::not_found(&self.name, format!("no price element for '{search_term}'"))
        })?;

        let price = parse_price(&text).ok_or_else(|| {
            SourceError::parse(&self.name, format!("unreadable price text '{text}'"))
        })?;

        Ok(Quote::now(&self.name, to_cents(price)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Text of the first non-empty element matching `selector`.
///
/// Kept synchronous: `Html` is not `Send` and must not live across an await.
fn first_match_text(html: &str, selector: &Selector) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
}
