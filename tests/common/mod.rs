//! Shared fixtures for the integration tests: a config pointing at temp
//! stores, and in-memory stand-ins for the scraper and the classifier.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use review_retl::classify::Classifier;
use review_retl::config::Config;
use review_retl::models::{ScrapedProduct, ScrapedReview};
use review_retl::scrape::Scraper;

pub const SOURCE_A: &str = "source-a";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
}

pub fn test_config(tmp: &TempDir) -> Config {
    let root = tmp.path();
    let content = format!(
        r#"
[db]
path = "{}/retl.sqlite"

[reporting]
path = "{}/reporting.sqlite"

[[sources]]
name = "{}"
url = "https://a.example/search?q=chanel"
domain = "https://a.example"
"#,
        root.display(),
        root.display(),
        SOURCE_A
    );
    toml::from_str(&content).unwrap()
}

pub fn product(name: &str, url: &str, review_count: i64) -> ScrapedProduct {
    ScrapedProduct {
        name: name.to_string(),
        url: url.to_string(),
        review_count,
    }
}

pub fn review(text: &str, date: &str) -> ScrapedReview {
    ScrapedReview {
        text: text.to_string(),
        date: date.to_string(),
    }
}

/// Returns the same listing on every call, and the same reviews for every
/// product page.
pub struct StubScraper {
    pub products: Vec<ScrapedProduct>,
    pub reviews: Vec<ScrapedReview>,
    pub review_fetches: AtomicUsize,
}

impl StubScraper {
    pub fn new(products: Vec<ScrapedProduct>, reviews: Vec<ScrapedReview>) -> Self {
        Self {
            products,
            reviews,
            review_fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Scraper for StubScraper {
    async fn fetch_products(&self, _url: &str) -> Vec<ScrapedProduct> {
        self.products.clone()
    }

    async fn fetch_reviews(&self, _url: &str) -> Vec<ScrapedReview> {
        self.review_fetches.fetch_add(1, Ordering::SeqCst);
        self.reviews.clone()
    }
}

/// How the stub answers product confirmation prompts.
pub enum Confirm {
    AllYes,
    AllNo,
    Fail,
}

/// Answers sentiment prompts with a fixed string and confirmation prompts
/// per [`Confirm`], counting both kinds of call.
pub struct StubClassifier {
    sentiment_answer: Option<String>,
    confirm: Confirm,
    pub sentiment_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
}

impl StubClassifier {
    pub fn new(sentiment_answer: &str, confirm: Confirm) -> Self {
        Self {
            sentiment_answer: Some(sentiment_answer.to_string()),
            confirm,
            sentiment_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
        }
    }

    /// Every call errors.
    pub fn failing() -> Self {
        Self {
            sentiment_answer: None,
            confirm: Confirm::Fail,
            sentiment_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
        }
    }

    pub fn sentiment_calls(&self) -> usize {
        self.sentiment_calls.load(Ordering::SeqCst)
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }
}

fn is_confirmation_prompt(prompt: &str) -> bool {
    prompt.starts_with("For each numbered pair")
}

fn numbered_pairs(prompt: &str) -> usize {
    prompt
        .lines()
        .filter(|line| {
            let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
            !digits.is_empty() && line[digits.len()..].starts_with(". ")
        })
        .count()
}

#[async_trait]
impl Classifier for StubClassifier {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if is_confirmation_prompt(prompt) {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            let verdict = match self.confirm {
                Confirm::AllYes => "yes",
                Confirm::AllNo => "no",
                Confirm::Fail => bail!("stub confirmation failure"),
            };
            return Ok((1..=numbered_pairs(prompt))
                .map(|i| format!("{}: {}", i, verdict))
                .collect::<Vec<_>>()
                .join("\n"));
        }

        self.sentiment_calls.fetch_add(1, Ordering::SeqCst);
        match &self.sentiment_answer {
            Some(answer) => Ok(answer.clone()),
            None => bail!("stub sentiment failure"),
        }
    }
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
