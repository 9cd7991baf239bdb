//! Scraping boundary.
//!
//! The extraction stage only sees the [`Scraper`] trait: give it a URL, get
//! back product listings or reviews. "Nothing found" and "something broke"
//! both come back as an empty list; the error is logged here.
//!
//! [`SiteScraper`] is the shipped implementation:
//!
//! - products come from the scraping agent ([`AgentClient`]), a service that
//!   takes a URL plus a plain-language description of each wanted field and
//!   returns JSON records;
//! - reviews are first pulled straight from the product page HTML
//!   ([`HtmlReviewFetcher`]) and only fall back to the agent when the page
//!   yields nothing.

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::{ExtractionConfig, ScraperConfig};
use crate::models::{ScrapedProduct, ScrapedReview};

/// Field name → description sent to the agent for listing pages.
pub const PRODUCT_FIELDS: &[(&str, &str)] = &[
    ("product_name", "Product name"),
    ("product_url", "Product URL or link"),
    ("product_reviews_count", "Number of reviews"),
];

/// Field name → description sent to the agent for product pages.
pub const REVIEW_FIELDS: &[(&str, &str)] = &[
    ("review_text", "ONLY review text"),
    ("review_date", "Review date"),
];

const REVIEW_SELECTORS: &[&str] = &[
    "[itemprop='review']",
    ".review",
    ".comments",
    ".product-review",
    ".review-item",
    "div[class*=review]",
    "li[class*=review]",
    "div.comment",
];

const REVIEW_HEADING_MARKER: &str = "відгук";
const DEDUP_PREFIX_CHARS: usize = 200;

static REVIEW_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,2}\s+\w+\s+\d{4}|\d{1,2}\.\d{1,2}\.\d{4}|\d{4}-\d{2}-\d{2}").unwrap()
});

static FIRST_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch_products(&self, url: &str) -> Vec<ScrapedProduct>;
    async fn fetch_reviews(&self, url: &str) -> Vec<ScrapedReview>;
}

// ============ Agent ============

/// HTTP client for the scraping agent.
pub struct AgentClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AgentClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Ask the agent for records with the given fields.
    pub async fn fetch(&self, url: &str, fields: &[(&str, &str)]) -> Result<Vec<Value>> {
        let elements: serde_json::Map<String, Value> = fields
            .iter()
            .map(|(name, description)| (name.to_string(), Value::from(*description)))
            .collect();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url, "elements": elements }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Scraping agent error {}: {}", status, body);
        }

        let json: Value = response.json().await?;
        records_from_response(json)
    }
}

/// Accept either a bare JSON array or `{"data": [...]}`.
fn records_from_response(json: Value) -> Result<Vec<Value>> {
    match json {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(records)) => Ok(records),
            _ => bail!("Invalid agent response: expected an array of records"),
        },
        Value::Null => Ok(Vec::new()),
        _ => bail!("Invalid agent response: expected an array of records"),
    }
}

/// Review counts arrive as numbers or as text like "12 відгуків".
pub fn parse_review_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => FIRST_INTEGER
            .find(s)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0),
        _ => 0,
    }
}

fn string_field(record: &Value, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub fn products_from_records(records: &[Value]) -> Vec<ScrapedProduct> {
    records
        .iter()
        .map(|record| ScrapedProduct {
            name: string_field(record, "product_name"),
            url: string_field(record, "product_url"),
            review_count: record
                .get("product_reviews_count")
                .map(parse_review_count)
                .unwrap_or(0),
        })
        .collect()
}

pub fn reviews_from_records(records: &[Value]) -> Vec<ScrapedReview> {
    records
        .iter()
        .map(|record| ScrapedReview {
            text: string_field(record, "review_text"),
            date: string_field(record, "review_date"),
        })
        .filter(|r| !r.text.is_empty())
        .collect()
}

// ============ HTML fallback ============

/// Plain GET + CSS selectors for review blocks.
pub struct HtmlReviewFetcher {
    client: reqwest::Client,
}

impl HtmlReviewFetcher {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<ScrapedReview>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let body = response.text().await?;
        Ok(extract_reviews_from_html(&body))
    }
}

/// Find review blocks in a product page and pull a date out of each.
///
/// Blocks matching any of the review selectors are used; if there are none,
/// the siblings following a "Відгуки" heading (up to the next heading) are.
/// Results are de-duplicated on (first 200 chars of text, date).
pub fn extract_reviews_from_html(html: &str) -> Vec<ScrapedReview> {
    let document = Html::parse_document(html);

    let mut blocks: Vec<ElementRef> = Vec::new();
    for css in REVIEW_SELECTORS {
        if let Ok(selector) = Selector::parse(css) {
            blocks.extend(document.select(&selector));
        }
    }

    if blocks.is_empty() {
        blocks = blocks_after_review_heading(&document);
    }

    let mut seen = HashSet::new();
    let mut reviews = Vec::new();
    for block in blocks {
        let text = element_text(&block);
        if text.is_empty() {
            continue;
        }
        let date = REVIEW_DATE
            .find(&text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let key: (String, String) = (text.chars().take(DEDUP_PREFIX_CHARS).collect(), date.clone());
        if !seen.insert(key) {
            continue;
        }
        reviews.push(ScrapedReview { text, date });
    }
    reviews
}

fn is_heading(element: &ElementRef) -> bool {
    matches!(element.value().name(), "h2" | "h3" | "h4")
}

fn blocks_after_review_heading(document: &Html) -> Vec<ElementRef<'_>> {
    let Ok(headings) = Selector::parse("h2, h3, h4") else {
        return Vec::new();
    };

    let Some(heading) = document
        .select(&headings)
        .find(|h| element_text(h).to_lowercase().contains(REVIEW_HEADING_MARKER))
    else {
        return Vec::new();
    };

    heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|sibling| !is_heading(sibling))
        .collect()
}

/// Text content with whitespace-separated, trimmed text nodes.
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============ Composite ============

/// Agent for listings, HTML first and agent second for reviews.
pub struct SiteScraper {
    agent: Option<AgentClient>,
    html: HtmlReviewFetcher,
}

impl SiteScraper {
    pub fn new(scraper: &ScraperConfig, extraction: &ExtractionConfig) -> Result<Self> {
        let agent = match &scraper.endpoint {
            Some(endpoint) => Some(AgentClient::new(endpoint, scraper.timeout_secs)?),
            None => None,
        };
        Ok(Self {
            agent,
            html: HtmlReviewFetcher::new(extraction)?,
        })
    }
}

#[async_trait]
impl Scraper for SiteScraper {
    async fn fetch_products(&self, url: &str) -> Vec<ScrapedProduct> {
        let Some(agent) = &self.agent else {
            tracing::warn!("no scraping agent configured; cannot list products for {}", url);
            return Vec::new();
        };

        match agent.fetch(url, PRODUCT_FIELDS).await {
            Ok(records) => {
                let products = products_from_records(&records);
                tracing::info!(url, count = products.len(), "fetched products");
                products
            }
            Err(e) => {
                tracing::warn!(url, "product fetch failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_reviews(&self, url: &str) -> Vec<ScrapedReview> {
        match self.html.fetch(url).await {
            Ok(reviews) if !reviews.is_empty() => {
                tracing::info!(url, count = reviews.len(), "fetched reviews via HTTP");
                return reviews;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(url, "HTTP review parse failed: {}", e),
        }

        let Some(agent) = &self.agent else {
            return Vec::new();
        };

        match agent.fetch(url, REVIEW_FIELDS).await {
            Ok(records) => {
                let reviews = reviews_from_records(&records);
                tracing::info!(url, count = reviews.len(), "fetched reviews via agent");
                reviews
            }
            Err(e) => {
                tracing::warn!(url, "review fetch failed: {}", e);
                Vec::new()
            }
        }
    }
}
