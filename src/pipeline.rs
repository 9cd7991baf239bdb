//! Orchestrator: extract → transform → load.
//!
//! Each stage is a gate. The run stops after extraction when no source
//! produced a successful extract, and stops after a failed transform
//! without loading. A source that fails never stops the other sources.
//!
//! Store handles are opened here, passed down explicitly and closed on
//! every exit path.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::fmt;

use crate::classify::Classifier;
use crate::config::{Config, ExtractionConfig, SourceConfig};
use crate::db;
use crate::extract::{run_extraction, ExtractionOutcome};
use crate::load::{run_load, LoadSummary};
use crate::migrate::{migrate_primary, migrate_reporting};
use crate::scrape::Scraper;
use crate::transform::{run_transform, TransformSummary};

const BANNER_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
        })
    }
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub extractions: Vec<ExtractionOutcome>,
    pub transform: Option<TransformSummary>,
    pub load: Option<LoadSummary>,
    /// Stage at which the run stopped, if it did not finish.
    pub stopped_at: Option<Stage>,
    pub error: Option<String>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.stopped_at.is_none()
    }

    fn stop(&mut self, stage: Stage, error: Option<String>) {
        self.stopped_at = Some(stage);
        self.error = error;
    }
}

fn banner(title: &str) {
    tracing::info!("{}", "=".repeat(BANNER_WIDTH));
    tracing::info!("{}", title);
    tracing::info!("{}", "=".repeat(BANNER_WIDTH));
}

/// Run one extraction per source, in order.
///
/// A source whose run errors is recorded as failed and the loop moves on.
pub async fn extract_sources(
    pool: &SqlitePool,
    scraper: &dyn Scraper,
    sources: &[SourceConfig],
    config: &ExtractionConfig,
    today: NaiveDate,
) -> Vec<ExtractionOutcome> {
    let mut outcomes = Vec::with_capacity(sources.len());

    for source in sources {
        tracing::info!(source = %source.name, url = %source.url, "extracting");
        let outcome = match run_extraction(pool, scraper, source, config, today).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(source = %source.name, "extraction failed: {:#}", e);
                ExtractionOutcome::errored(&source.name, &e)
            }
        };
        outcomes.push(outcome);
    }

    tracing::info!("Extraction summary:");
    for outcome in &outcomes {
        let mark = if outcome.is_success() { "✓" } else { "✗" };
        tracing::info!("  {} {}: {}", mark, outcome.source, outcome.status);
    }

    outcomes
}

/// Mirror canonical data into the reporting store.
pub async fn load_reporting(config: &Config, primary: &SqlitePool) -> Result<LoadSummary> {
    let reporting = db::connect_reporting(config).await?;
    let result = async {
        migrate_reporting(&reporting).await?;
        run_load(primary, &reporting).await
    }
    .await;
    reporting.close().await;
    result
}

pub async fn run_pipeline(
    config: &Config,
    scraper: &dyn Scraper,
    classifier: &dyn Classifier,
    today: NaiveDate,
) -> Result<PipelineReport> {
    let started = chrono::Local::now();
    banner(&format!(
        "RETL PIPELINE STARTED: {}",
        started.format("%Y-%m-%d %H:%M:%S")
    ));

    let primary = db::connect_primary(config).await?;
    let result = run_stages(config, &primary, scraper, classifier, today).await;
    primary.close().await;
    let report = result?;

    if report.is_success() {
        let elapsed = chrono::Local::now() - started;
        banner(&format!(
            "RETL PIPELINE COMPLETED in {}s",
            elapsed.num_seconds()
        ));
    } else if let Some(stage) = report.stopped_at {
        tracing::warn!(stage = %stage, "pipeline stopped");
    }

    Ok(report)
}

async fn run_stages(
    config: &Config,
    primary: &SqlitePool,
    scraper: &dyn Scraper,
    classifier: &dyn Classifier,
    today: NaiveDate,
) -> Result<PipelineReport> {
    migrate_primary(primary).await?;
    let mut report = PipelineReport::default();

    banner("STAGE 1: EXTRACTION");
    report.extractions =
        extract_sources(primary, scraper, &config.sources, &config.extraction, today).await;

    if !report.extractions.iter().any(|o| o.is_success()) {
        tracing::warn!("No successful extractions. Pipeline stopped.");
        report.stop(Stage::Extract, None);
        return Ok(report);
    }

    banner("STAGE 2: TRANSFORMATION");
    match run_transform(primary, classifier, config.resolver.similarity_threshold).await {
        Ok(summary) => {
            tracing::info!("✓ Transformation completed");
            report.transform = Some(summary);
        }
        Err(e) => {
            tracing::error!("✗ Transformation failed: {:#}", e);
            report.stop(Stage::Transform, Some(format!("{:#}", e)));
            return Ok(report);
        }
    }

    banner("STAGE 3: LOAD");
    match load_reporting(config, primary).await {
        Ok(summary) => {
            tracing::info!("✓ Load completed");
            report.load = Some(summary);
        }
        Err(e) => {
            tracing::error!("✗ Load failed: {:#}", e);
            report.stop(Stage::Load, Some(format!("{:#}", e)));
        }
    }

    Ok(report)
}
