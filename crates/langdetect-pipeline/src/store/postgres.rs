//! PostgreSQL record store
//!
//! Table and column names come from configuration and are quoted as
//! identifiers (`langstrings-langs` is a legal target name). The filter is an
//! operator-supplied SQL predicate and is embedded verbatim, so it must come
//! from a trusted source.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::RecordStore;
use crate::config::{PipelineConfig, SourceTable, TargetTable};
use crate::error::StoreResult;
use crate::types::{ResultRecord, SourceRecord};

/// PostgreSQL caps a statement at 65535 bind parameters; three per row.
const MAX_ROWS_PER_STATEMENT: usize = 10_000;

/// Record store backed by a PostgreSQL pool
pub struct PgRecordStore {
    pool: PgPool,
    source: SourceTable,
    target: TargetTable,
    filter: Option<String>,
    sql: Statements,
}

/// SQL text prepared once per store
#[derive(Debug)]
struct Statements {
    count_results: String,
    count_sources: String,
    fetch_page: String,
    fetch_page_excluding: String,
    insert_prefix: String,
}

impl PgRecordStore {
    pub fn new(
        pool: PgPool,
        source: SourceTable,
        target: TargetTable,
        filter: Option<String>,
    ) -> Self {
        let sql = Statements::build(&source, &target, filter.as_deref());
        Self {
            pool,
            source,
            target,
            filter,
            sql,
        }
    }

    pub fn from_config(pool: PgPool, config: &PipelineConfig) -> Self {
        Self::new(
            pool,
            config.source.clone(),
            config.target.clone(),
            config.filter.clone(),
        )
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Statements {
    fn build(source: &SourceTable, target: &TargetTable, filter: Option<&str>) -> Self {
        let source_table = quote_qualified(&source.table);
        let target_table = quote_qualified(&target.table);
        let id = quote_ident(&source.id_column);
        let text = quote_ident(&source.text_column);
        let target_id = quote_ident(&target.source_id_column);

        let select = format!(
            "SELECT s.{id}::BIGINT AS id, COALESCE(s.{text}::TEXT, '') AS text \
             FROM {source_table} AS s"
        );
        let anti_join = format!(
            "NOT EXISTS (SELECT 1 FROM {target_table} AS t WHERE t.{target_id} = s.{id})"
        );

        let (count_sources, fetch_page, fetch_page_excluding) = match filter {
            Some(filter) => (
                format!("SELECT COUNT(*) FROM {source_table} AS s WHERE ({filter})"),
                format!("{select} WHERE ({filter}) ORDER BY s.{id} LIMIT $1 OFFSET $2"),
                format!("{select} WHERE ({filter}) AND {anti_join} ORDER BY s.{id} LIMIT $1"),
            ),
            None => (
                format!("SELECT COUNT(*) FROM {source_table} AS s"),
                format!("{select} ORDER BY s.{id} LIMIT $1 OFFSET $2"),
                format!("{select} WHERE {anti_join} ORDER BY s.{id} LIMIT $1"),
            ),
        };

        Self {
            count_results: format!("SELECT COUNT(*) FROM {target_table}"),
            count_sources,
            fetch_page,
            fetch_page_excluding,
            insert_prefix: format!(
                "INSERT INTO {target_table} ({target_id}, {}, {}) ",
                quote_ident(&target.cleaned_text_column),
                quote_ident(&target.language_column),
            ),
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self), fields(table = %self.target.table))]
    async fn count_results(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(&self.sql.count_results)
            .fetch_one(&self.pool)
            .await?;
        tracing::info!(count, "Counted existing results");
        Ok(count)
    }

    #[instrument(skip(self), fields(table = %self.source.table, filter = ?self.filter))]
    async fn count_sources(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(&self.sql.count_sources)
            .fetch_one(&self.pool)
            .await?;
        tracing::info!(count, "Counted matching source rows");
        Ok(count)
    }

    #[instrument(skip(self), fields(table = %self.source.table))]
    async fn fetch_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<SourceRecord>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(&self.sql.fetch_page)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        tracing::info!(rows = rows.len(), "Fetched source page");
        Ok(into_records(rows))
    }

    #[instrument(skip(self), fields(table = %self.source.table, excluding = %self.target.table))]
    async fn fetch_page_excluding(&self, limit: i64) -> StoreResult<Vec<SourceRecord>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(&self.sql.fetch_page_excluding)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        tracing::info!(rows = rows.len(), "Fetched unprocessed source page");
        Ok(into_records(rows))
    }

    #[instrument(skip(self, rows), fields(table = %self.target.table, rows = rows.len()))]
    async fn insert_many(&self, rows: &[ResultRecord]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(&self.sql.insert_prefix);

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.source_id)
                    .push_bind(row.cleaned_text.as_str())
                    .push_bind(row.language_str());
            });

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::info!("Inserted results");
        Ok(())
    }
}

fn into_records(rows: Vec<(i64, String)>) -> Vec<SourceRecord> {
    rows.into_iter()
        .map(|(id, text)| SourceRecord { id, text })
        .collect()
}

/// Quote a single SQL identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name, e.g. `public.langstrings`
fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}
