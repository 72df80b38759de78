//! PostgreSQL end-to-end tests
//!
//! Run the pipeline against a throwaway PostgreSQL container with the default
//! table layout (`langstrings` -> `langstrings-langs`).

use anyhow::Result;
use langdetect_pipeline::classify::{ClassificationStage, NgramClassifier, RegexCleaner};
use langdetect_pipeline::config::{SourceTable, TargetTable};
use langdetect_pipeline::store::{PgRecordStore, RecordStore};
use langdetect_pipeline::{
    ClassifyError, LanguageCode, Pipeline, PipelineOptions, SelectionMode,
};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,langdetect_pipeline=debug")),
        )
        .with_test_writer()
        .try_init();
}

async fn setup_database() -> Result<(ContainerAsync<Postgres>, PgPool)> {
    let postgres_container = Postgres::default().with_tag("16-alpine").start().await?;

    let host = postgres_container.get_host().await?;
    let port = postgres_container.get_host_port_ipv4(5432).await?;
    let conn_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&conn_string)
        .await?;

    sqlx::query("CREATE TABLE langstrings (id INTEGER PRIMARY KEY, str TEXT, source TEXT)")
        .execute(&pool)
        .await?;
    sqlx::query(
        r#"CREATE TABLE "langstrings-langs" (
            langstring_id BIGINT PRIMARY KEY,
            str_clean TEXT NOT NULL,
            ngram_lang VARCHAR(8) NOT NULL
        )"#,
    )
    .execute(&pool)
    .await?;

    Ok((postgres_container, pool))
}

async fn seed(pool: &PgPool, rows: &[(i32, Option<&str>, &str)]) -> Result<()> {
    for (id, text, source) in rows {
        sqlx::query("INSERT INTO langstrings (id, str, source) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(text)
            .bind(source)
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn results(pool: &PgPool) -> Result<Vec<(i64, String, String)>> {
    Ok(sqlx::query_as(
        r#"SELECT langstring_id, str_clean, ngram_lang FROM "langstrings-langs" ORDER BY langstring_id"#,
    )
    .fetch_all(pool)
    .await?)
}

fn english_stage() -> Result<ClassificationStage> {
    Ok(ClassificationStage::new(
        RegexCleaner::new("[0-9]")?,
        |_: &str| -> Result<LanguageCode, ClassifyError> { Ok("en".into()) },
    ))
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_offset_run_writes_one_row_per_source() -> Result<()> {
    init_tracing();
    let (_container, pool) = setup_database().await?;
    seed(
        &pool,
        &[
            (1, Some("abc123"), "web"),
            (2, Some("9"), "web"),
            (3, Some("hello"), "web"),
            (4, None, "web"),
        ],
    )
    .await?;

    let store = PgRecordStore::new(pool.clone(), SourceTable::default(), TargetTable::default(), None);
    let options = PipelineOptions {
        page_size: 3,
        batch_size: 2,
        ..PipelineOptions::default()
    };

    let summary = Pipeline::new(&store, english_stage()?, options).run().await?;
    info!(?summary, "Run finished");

    assert_eq!(summary.processed, 4);
    assert_eq!(
        results(&pool).await?,
        vec![
            (1, "abc".to_string(), "en".to_string()),
            (2, String::new(), String::new()),
            (3, "hello".to_string(), "en".to_string()),
            (4, String::new(), String::new()),
        ]
    );

    // A second run finds nothing left to do
    let summary = Pipeline::new(&store, english_stage()?, options).run().await?;
    assert_eq!(summary.processed, 0);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_exclusion_run_with_filter() -> Result<()> {
    init_tracing();
    let (_container, pool) = setup_database().await?;
    seed(
        &pool,
        &[
            (1, Some("the weather is nice today"), "web"),
            (2, Some("das wetter ist heute schön"), "mail"),
            (3, Some("il fait beau aujourd'hui"), "web"),
            (4, Some("where is the station"), "web"),
            (5, Some("hoy hace buen tiempo"), "web"),
        ],
    )
    .await?;

    // Pretend an earlier run already handled id 3
    sqlx::query(r#"INSERT INTO "langstrings-langs" VALUES (3, 'il fait beau aujourd''hui', 'fr')"#)
        .execute(&pool)
        .await?;

    let store = PgRecordStore::new(
        pool.clone(),
        SourceTable::default(),
        TargetTable::default(),
        Some("s.source = 'web'".to_string()),
    );
    assert_eq!(store.count_sources().await?, 4);
    assert_eq!(store.count_results().await?, 1);

    let stage = ClassificationStage::new(RegexCleaner::new("[0-9]")?, NgramClassifier::new());
    let options = PipelineOptions {
        page_size: 2,
        batch_size: 3,
        selection: SelectionMode::Exclusion,
        ..PipelineOptions::default()
    };

    let summary = Pipeline::new(&store, stage, options).run().await?;
    assert_eq!(summary.processed, 3);

    let ids: Vec<i64> = results(&pool).await?.into_iter().map(|(id, _, _)| id).collect();
    assert_eq!(ids, vec![1, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Docker
async fn test_large_batch_is_chunked_in_one_transaction() -> Result<()> {
    init_tracing();
    let (_container, pool) = setup_database().await?;

    sqlx::query("INSERT INTO langstrings (id, str, source) SELECT g, 'row ' || g, 'bulk' FROM generate_series(1, 25000) AS g")
        .execute(&pool)
        .await?;

    let store = PgRecordStore::new(pool.clone(), SourceTable::default(), TargetTable::default(), None);
    let options = PipelineOptions {
        page_size: 25_000,
        batch_size: 25_000,
        ..PipelineOptions::default()
    };

    let summary = Pipeline::new(&store, english_stage()?, options).run().await?;
    assert_eq!(summary.batches_flushed, 1);
    assert_eq!(store.count_results().await?, 25_000);
    Ok(())
}
