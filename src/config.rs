//! TOML configuration parsing and validation.
//!
//! One file supplies both store locations, the classification service
//! settings, the resolver threshold, extraction filters, the scraping
//! agent endpoint, and the list of retail sources to harvest.
//!
//! ```toml
//! [db]
//! path = "./data/retl.sqlite"
//!
//! [reporting]
//! path = "./data/reporting.sqlite"
//!
//! [classifier]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [[sources]]
//! name = "makeup.com.ua"
//! url = "https://makeup.com.ua/ua/search/?q=chanel"
//! domain = "https://makeup.com.ua"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub reporting: DbConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Inline key. When absent the key is read from `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_classifier_timeout(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
        }
    }
}

impl ClassifierConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_classifier_timeout() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: u8,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_similarity_threshold() -> u8 {
    crate::resolve::DEFAULT_SIMILARITY_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Listings whose name contains any of these (case-insensitive) are
    /// accessories or generic category tiles, not products.
    #[serde(default = "default_noise_words")]
    pub noise_words: Vec<String>,
    #[serde(default = "default_min_review_count")]
    pub min_review_count: i64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            noise_words: default_noise_words(),
            min_review_count: default_min_review_count(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_noise_words() -> Vec<String> {
    [
        "parfum",
        "eau",
        "ml",
        "для жінок",
        "для чоловіків",
        "духи",
        "туалетна вода",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}
fn default_min_review_count() -> i64 {
    1
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; retl-bot/1.0)".to_string()
}
fn default_http_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    /// Scraping agent endpoint. Without it only the HTML fallback runs.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_scraper_timeout")]
    pub timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_scraper_timeout(),
        }
    }
}

fn default_scraper_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Display name, stored as the unique `Sources.source_desc`.
    pub name: String,
    /// Listing page the product fetch starts from.
    pub url: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl Config {
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.resolver.similarity_threshold > 100 {
        anyhow::bail!("resolver.similarity_threshold must be in [0, 100]");
    }

    match config.classifier.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.classifier.model.is_none() {
                anyhow::bail!(
                    "classifier.model must be specified when provider is '{}'",
                    config.classifier.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown classifier provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.extraction.min_review_count < 0 {
        anyhow::bail!("extraction.min_review_count must be >= 0");
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if source.name.trim().is_empty() {
            anyhow::bail!("sources[].name must not be empty");
        }
        if !seen.insert(source.name.as_str()) {
            anyhow::bail!("duplicate source name: '{}'", source.name);
        }
    }

    Ok(())
}
