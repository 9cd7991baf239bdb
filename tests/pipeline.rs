//! Extract → transform → load against temp SQLite stores with stub
//! scraper and classifier.

mod common;

use chrono::Duration;
use sqlx::SqlitePool;
use tempfile::TempDir;

use common::{count, product, review, test_config, today, Confirm, StubClassifier, StubScraper};
use review_retl::config::Config;
use review_retl::db;
use review_retl::extract::run_extraction;
use review_retl::fingerprint::review_hash;
use review_retl::lifecycle::{extract_status, pending_transform};
use review_retl::load::load_canonical_reviews;
use review_retl::migrate::run_migrations;
use review_retl::models::{ExtractStatus, Importance, Sentiment};
use review_retl::pipeline::{run_pipeline, Stage};
use review_retl::transform::{load_catalog, run_transform};

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    run_migrations(&cfg).await.unwrap();
    let pool = db::connect_primary(&cfg).await.unwrap();
    (tmp, cfg, pool)
}

fn chanel_scraper() -> StubScraper {
    StubScraper::new(
        vec![product("Chanel No5 EDP", "/ua/p/1/", 3)],
        vec![review("Дуже подобається", "2 дні тому")],
    )
}

#[tokio::test]
async fn test_end_to_end_and_rerun_is_idempotent() {
    let (_tmp, cfg, pool) = setup().await;
    let scraper = chanel_scraper();
    let classifier = StubClassifier::new("positive,low", Confirm::AllYes);

    let report = run_pipeline(&cfg, &scraper, &classifier, today())
        .await
        .unwrap();
    assert!(report.is_success(), "stopped at {:?}", report.stopped_at);
    assert_eq!(report.extractions.len(), 1);
    assert_eq!(report.extractions[0].reviews, 1);

    let catalog = load_catalog(&pool).await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].description, "Chanel No5 EDP");
    // Empty catalog: nothing to confirm.
    assert_eq!(classifier.confirm_calls(), 0);

    let reviews = load_canonical_reviews(&pool).await.unwrap();
    assert_eq!(reviews.len(), 1);
    let expected_date = today() - Duration::days(2);
    assert_eq!(reviews[0].date, expected_date);
    assert_eq!(reviews[0].product_id, catalog[0].id);
    assert_eq!(reviews[0].labels.sentiment, Sentiment::Positive);
    assert_eq!(reviews[0].labels.importance, Importance::Low);
    assert_eq!(reviews[0].hash, review_hash("Дуже подобається", expected_date));
    assert_eq!(classifier.sentiment_calls(), 1);

    let reporting = db::connect_reporting(&cfg).await.unwrap();
    assert_eq!(count(&reporting, "Sources").await, 1);
    assert_eq!(count(&reporting, "Product_CORE").await, 1);
    assert_eq!(count(&reporting, "Review_CORE").await, 1);

    // Same scrape again.
    let report = run_pipeline(&cfg, &scraper, &classifier, today())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.extractions[0].reviews, 0);

    assert_eq!(count(&pool, "Review_RAW").await, 1);
    assert_eq!(count(&pool, "Review_CORE").await, 1);
    assert_eq!(count(&pool, "Product_CORE").await, 1);
    assert_eq!(classifier.confirm_calls(), 1);
    assert_eq!(classifier.sentiment_calls(), 1);

    assert_eq!(count(&reporting, "Product_CORE").await, 1);
    assert_eq!(count(&reporting, "Review_CORE").await, 1);
    reporting.close().await;
}

#[tokio::test]
async fn test_no_products_stops_after_extraction() {
    let (_tmp, cfg, pool) = setup().await;
    let scraper = StubScraper::new(vec![], vec![]);
    let classifier = StubClassifier::new("positive,low", Confirm::AllYes);

    let report = run_pipeline(&cfg, &scraper, &classifier, today())
        .await
        .unwrap();

    assert_eq!(report.stopped_at, Some(Stage::Extract));
    assert!(report.transform.is_none());
    assert!(report.load.is_none());

    let outcome = &report.extractions[0];
    assert_eq!(outcome.status, ExtractStatus::Failed);
    assert!(outcome.error.is_none());
    assert_eq!(
        extract_status(&pool, outcome.extract_id.unwrap()).await.unwrap(),
        Some(ExtractStatus::Failed)
    );
    assert_eq!(count(&pool, "Product_RAW").await, 0);
}

#[tokio::test]
async fn test_only_noise_listings_fail_the_extract() {
    let (_tmp, cfg, pool) = setup().await;
    let scraper = StubScraper::new(
        vec![
            product("Chanel Eau Tendre", "/p/1", 5),
            product("Chanel No5 EDP", "/p/2", 0),
        ],
        vec![review("Гарний", "вчора")],
    );

    let outcome = run_extraction(&pool, &scraper, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();

    assert_eq!(outcome.status, ExtractStatus::Failed);
    assert_eq!(outcome.products, 0);
    assert_eq!(count(&pool, "Product_RAW").await, 0);
    assert_eq!(count(&pool, "Review_RAW").await, 0);
    assert_eq!(scraper.review_fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_same_review_under_another_product_is_rejected() {
    let (_tmp, cfg, pool) = setup().await;
    let first = StubScraper::new(
        vec![product("Chanel No5 EDP", "/p/1", 3)],
        vec![review("Чудово", "06 серпня 2022")],
    );
    let second = StubScraper::new(
        vec![product("Chanel Coco Mademoiselle", "/p/2", 3)],
        vec![review("Чудово", "2022-08-06")],
    );

    let a = run_extraction(&pool, &first, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();
    let b = run_extraction(&pool, &second, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();

    assert_eq!(a.reviews, 1);
    // Same text and same normalized date: the raw hash collides.
    assert_eq!(b.reviews, 0);
    assert_eq!(b.status, ExtractStatus::Success);
    assert_eq!(count(&pool, "Review_RAW").await, 1);
}

#[tokio::test]
async fn test_transform_runs_each_extract_once() {
    let (_tmp, cfg, pool) = setup().await;
    let scraper = chanel_scraper();
    let classifier = StubClassifier::new("negative,high", Confirm::AllYes);

    run_extraction(&pool, &scraper, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();

    let first = run_transform(&pool, &classifier, 90).await.unwrap();
    assert_eq!(first.extracts, 1);
    assert_eq!(first.products_created, 1);
    assert_eq!(first.reviews_inserted, 1);

    let second = run_transform(&pool, &classifier, 90).await.unwrap();
    assert_eq!(second.extracts, 0);
    assert_eq!(count(&pool, "Product_CORE").await, 1);
    assert_eq!(classifier.sentiment_calls(), 1);
}

#[tokio::test]
async fn test_already_canonical_review_is_not_reclassified() {
    let (_tmp, cfg, pool) = setup().await;
    let classifier = StubClassifier::new("positive,low", Confirm::AllNo);

    // Two extracts carrying the same review under different listings; the
    // raw gate is bypassed by clearing Review_RAW between runs.
    let scraper = chanel_scraper();
    run_extraction(&pool, &scraper, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();
    run_transform(&pool, &classifier, 90).await.unwrap();

    sqlx::query("DELETE FROM Review_RAW").execute(&pool).await.unwrap();
    run_extraction(&pool, &scraper, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();
    let summary = run_transform(&pool, &classifier, 90).await.unwrap();

    assert_eq!(summary.reviews_inserted, 0);
    assert_eq!(summary.reviews_skipped, 1);
    assert_eq!(count(&pool, "Review_CORE").await, 1);
    assert_eq!(classifier.sentiment_calls(), 1);
}

#[tokio::test]
async fn test_identical_names_in_one_extract_share_a_product() {
    let (_tmp, cfg, pool) = setup().await;
    let scraper = StubScraper::new(
        vec![
            product("Chanel No5 EDP", "/p/1", 3),
            product("Chanel No5 EDP", "/p/2", 3),
        ],
        vec![review("Стійкий", "сьогодні"), review("Не сподобався", "вчора")],
    );
    let classifier = StubClassifier::new("neutral,high", Confirm::AllYes);

    let outcome = run_extraction(&pool, &scraper, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();
    // The second listing's reviews collide with the first's.
    assert_eq!(outcome.products, 2);
    assert_eq!(outcome.reviews, 2);

    let summary = run_transform(&pool, &classifier, 90).await.unwrap();
    assert_eq!(summary.products_created, 1);
    assert_eq!(summary.reviews_inserted, 2);
    assert_eq!(classifier.confirm_calls(), 0);
}

#[tokio::test]
async fn test_classifier_outage_degrades_to_defaults() {
    let (_tmp, cfg, pool) = setup().await;
    let scraper = chanel_scraper();
    let classifier = StubClassifier::failing();

    run_extraction(&pool, &scraper, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();
    let summary = run_transform(&pool, &classifier, 90).await.unwrap();

    assert_eq!(summary.reviews_inserted, 1);
    let reviews = load_canonical_reviews(&pool).await.unwrap();
    assert_eq!(reviews[0].labels.sentiment, Sentiment::Neutral);
    assert_eq!(reviews[0].labels.importance, Importance::Low);
}

#[tokio::test]
async fn test_transform_resumes_after_stopping_mid_extract() {
    let (_tmp, cfg, pool) = setup().await;
    let scraper = StubScraper::new(
        vec![
            product("Chanel No5 EDP", "/ua/p/1/", 3),
            product("Dior Sauvage EDT", "/ua/p/2/", 3),
        ],
        vec![review("Гарний", "вчора")],
    );
    run_extraction(&pool, &scraper, &cfg.sources[0], &cfg.extraction, today())
        .await
        .unwrap();

    // Names commit in sorted order: Chanel lands, Dior is refused.
    sqlx::query(
        r#"
        CREATE TRIGGER refuse_dior BEFORE INSERT ON Product_CORE
        WHEN NEW.pc_desc = 'Dior Sauvage EDT'
        BEGIN
            SELECT RAISE(ABORT, 'refused');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    // Confirmation always fails, so nothing would ever match on a rerun.
    let classifier = StubClassifier::failing();
    assert!(run_transform(&pool, &classifier, 90).await.is_err());
    assert_eq!(count(&pool, "Product_CORE").await, 1);
    assert_eq!(pending_transform(&pool).await.unwrap().len(), 1);

    sqlx::query("DROP TRIGGER refuse_dior")
        .execute(&pool)
        .await
        .unwrap();
    let summary = run_transform(&pool, &classifier, 90).await.unwrap();

    assert_eq!(summary.products_created, 1);
    let descriptions: Vec<String> = load_catalog(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.description)
        .collect();
    assert_eq!(descriptions, vec!["Chanel No5 EDP", "Dior Sauvage EDT"]);
    assert!(pending_transform(&pool).await.unwrap().is_empty());
}
