//! Core data models used throughout the pipeline.
//!
//! Scraped records come in from the scraper, become raw rows scoped to one
//! extract, and are resolved into canonical rows by the transform stage.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Dates are stored as ISO calendar dates in TEXT columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(value, DATE_FORMAT)?)
}

/// Lifecycle state of one extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractStatus {
    Pending,
    Success,
    Failed,
}

impl ExtractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractStatus::Pending => "pending",
            ExtractStatus::Success => "success",
            ExtractStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExtractStatus::Pending)
    }
}

impl FromStr for ExtractStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ExtractStatus::Pending),
            "success" => Ok(ExtractStatus::Success),
            "failed" => Ok(ExtractStatus::Failed),
            other => bail!("unknown extract status: '{}'", other),
        }
    }
}

impl fmt::Display for ExtractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
        }
    }
}

impl FromStr for Sentiment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            "positive" => Ok(Sentiment::Positive),
            other => bail!("unknown sentiment: '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Importance {
    High,
    Low,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::High => "high",
            Importance::Low => "low",
        }
    }
}

impl FromStr for Importance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high" => Ok(Importance::High),
            "low" => Ok(Importance::Low),
            other => bail!("unknown importance: '{}'", other),
        }
    }
}

/// Classification labels attached to a canonical review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
    pub sentiment: Sentiment,
    pub importance: Importance,
}

impl Default for Labels {
    /// `(neutral, low)`: what a review gets when classification fails.
    fn default() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            importance: Importance::Low,
        }
    }
}

/// Product listing as returned by the scraper.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedProduct {
    pub name: String,
    pub url: String,
    pub review_count: i64,
}

/// Review as returned by the scraper; `date` is the site's free-form text.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedReview {
    pub text: String,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Extract {
    pub id: i64,
    pub source_id: i64,
    pub created_at: i64,
    pub status: ExtractStatus,
    pub transformed_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RawProduct {
    pub id: i64,
    pub extract_id: i64,
    pub name: String,
    pub review_count: i64,
    pub first_seen: i64,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RawReview {
    pub id: i64,
    pub product_id: i64,
    pub text: String,
    pub date: NaiveDate,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalProduct {
    pub id: i64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CanonicalReview {
    pub id: i64,
    pub product_id: i64,
    pub source_id: i64,
    pub text: String,
    pub date: NaiveDate,
    pub labels: Labels,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_terminality() {
        for status in [
            ExtractStatus::Pending,
            ExtractStatus::Success,
            ExtractStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExtractStatus>().unwrap(), status);
        }
        assert!(!ExtractStatus::Pending.is_terminal());
        assert!(ExtractStatus::Success.is_terminal());
        assert!("transformed".parse::<ExtractStatus>().is_err());
    }

    #[test]
    fn test_default_labels_are_conservative() {
        let labels = Labels::default();
        assert_eq!(labels.sentiment, Sentiment::Neutral);
        assert_eq!(labels.importance, Importance::Low);
    }

    #[test]
    fn test_date_text_format() {
        let date = NaiveDate::from_ymd_opt(2022, 8, 6).unwrap();
        assert_eq!(format_date(date), "2022-08-06");
        assert_eq!(parse_date("2022-08-06").unwrap(), date);
    }
}
