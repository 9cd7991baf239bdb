//! Classification service abstraction and implementations.
//!
//! The pipeline treats the language model as a text-in/text-out capability.
//! Everything that gives the text structure lives on this side of the
//! boundary: prompt construction and defensive parsing of the answer.
//!
//! - **[`DisabledClassifier`]** always errors; callers fall back to their
//!   conservative defaults (`neutral, low`, "no confirmed match").
//! - **[`OpenAiClassifier`]** calls an OpenAI-compatible chat completions
//!   endpoint with retry and backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::ClassifierConfig;
use crate::models::{Importance, Labels, Sentiment};

/// A free-text completion capability.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Send one prompt, return the raw answer text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the classifier selected by `[classifier].provider`.
pub fn create_classifier(config: &ClassifierConfig) -> Result<Box<dyn Classifier>> {
    if !config.is_enabled() {
        tracing::warn!("classifier disabled: reviews default to neutral/low, no product is matched");
    }
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledClassifier)),
        "openai" => Ok(Box::new(OpenAiClassifier::new(config)?)),
        other => bail!("Unknown classifier provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Classifier is disabled")
    }
}

// ============ OpenAI-compatible ============

/// Chat completions client for OpenAI or any compatible gateway
/// (OpenRouter, a local proxy) selected through `base_url`.
pub struct OpenAiClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAiClassifier {
    /// # Errors
    ///
    /// Returns an error if `model` is not set, or if neither `api_key` nor
    /// the `api_key_env` variable provides a key.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("classifier.model required for OpenAI provider"))?;

        let api_key = match &config.api_key {
            Some(key) => key.clone(),
            None => std::env::var(&config.api_key_env).map_err(|_| {
                anyhow::anyhow!("{} environment variable not set", config.api_key_env)
            })?,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model,
            api_key,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_tokens,
            "temperature": 0,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Classifier API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Classifier API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Classification failed after retries")))
    }
}

/// Pull `choices[0].message.content` out of a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

// ============ Sentiment ============

pub fn sentiment_prompt(review_text: &str) -> String {
    format!(
        "Analyze the sentiment of this customer review:\n\n\"{}\"\n\n\
         Determine:\n\
         1. Sentiment: negative, neutral, or positive\n\
         2. Importance: high or low\n\n\
         Answer only in the format sentiment,importance\n\
         For example: positive,high",
        review_text
    )
}

/// Parse a `sentiment,importance` answer. Anything else, including labels
/// outside the closed sets, yields `(neutral, low)`.
pub fn parse_labels(response: &str) -> Labels {
    let normalized = response.trim().to_lowercase();
    let parts: Vec<&str> = normalized.split(',').map(|p| p.trim()).collect();

    if let [sentiment, importance] = parts.as_slice() {
        let sentiment = sentiment.trim_matches(|c: char| !c.is_alphabetic());
        let importance = importance.trim_matches(|c: char| !c.is_alphabetic());
        if let (Ok(sentiment), Ok(importance)) =
            (sentiment.parse::<Sentiment>(), importance.parse::<Importance>())
        {
            return Labels {
                sentiment,
                importance,
            };
        }
    }

    Labels::default()
}

/// Classify one review. Service errors degrade to the default labels.
pub async fn classify_review(classifier: &dyn Classifier, review_text: &str) -> Labels {
    match classifier.complete(&sentiment_prompt(review_text)).await {
        Ok(answer) => parse_labels(&answer),
        Err(e) => {
            tracing::warn!("sentiment classification failed, using neutral/low: {}", e);
            Labels::default()
        }
    }
}

// ============ Same-product confirmation ============

/// One numbered question per pair; the answer is expected as `<n>: yes|no`.
pub fn confirmation_prompt(pairs: &[(&str, &str)]) -> String {
    let mut prompt = String::from(
        "For each numbered pair of product names below, decide whether both names \
         denote the same real-world product.\n\
         Answer with exactly one line per pair in the form `<number>: yes` or \
         `<number>: no`, without explanations.\n\n",
    );
    for (i, (a, b)) in pairs.iter().enumerate() {
        prompt.push_str(&format!("{}. \"{}\" | \"{}\"\n", i + 1, a, b));
    }
    prompt
}

static VERDICT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\W*(\d+)\s*[:.)\-]\s*\W*(yes|no|так|ні)\b").unwrap()
});

/// Parse per-pair verdicts. Index `i` is `true` only if the answer holds an
/// explicit yes for pair `i + 1`; missing or unreadable lines are `false`.
/// When a pair number repeats, the first verdict wins.
pub fn parse_confirmations(response: &str, pair_count: usize) -> Vec<bool> {
    let mut verdicts = vec![None; pair_count];

    for line in response.lines() {
        let Some(caps) = VERDICT_LINE.captures(line.trim()) else {
            continue;
        };
        let Ok(number) = caps[1].parse::<usize>() else {
            continue;
        };
        if number == 0 || number > pair_count {
            continue;
        }
        let slot = &mut verdicts[number - 1];
        if slot.is_none() {
            let answer = caps[2].to_lowercase();
            *slot = Some(answer == "yes" || answer == "так");
        }
    }

    verdicts.into_iter().map(|v| v.unwrap_or(false)).collect()
}
