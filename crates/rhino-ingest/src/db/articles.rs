// Article graph queries
//
// All ingestion writes go through a single caller-owned transaction so the
// next-ingestion-number computation and the subsequent inserts are atomic
// with respect to concurrent ingestions of the same article (the schema's
// UNIQUE (article_id, ingestion_number) backs this up).

use crate::db::{ArticleRow, FileRow, IngestionRow, ItemRow, JournalRow};
use chrono::NaiveDate;
use rhino_common::types::Doi;
use sqlx::{PgPool, Postgres, Transaction};

const FIRST_INGESTION_NUMBER: i32 = 1;

/// Look up the article row for a DOI, creating it if absent (idempotent).
///
/// The upsert takes a row lock on the article either way, held until the
/// transaction ends. Concurrent ingestions of the same article therefore
/// serialize here, and each one sees every committed ingestion number when
/// computing its own.
pub async fn find_or_create_article(
    tx: &mut Transaction<'_, Postgres>,
    doi: &Doi,
) -> sqlx::Result<ArticleRow> {
    sqlx::query_as(
        r#"
        INSERT INTO article (doi)
        VALUES ($1)
        ON CONFLICT (doi) DO UPDATE SET doi = EXCLUDED.doi
        RETURNING article_id, doi
        "#,
    )
    .bind(doi.name())
    .fetch_one(&mut **tx)
    .await
}

pub async fn find_article_by_doi(pool: &PgPool, doi: &Doi) -> sqlx::Result<Option<ArticleRow>> {
    sqlx::query_as("SELECT article_id, doi FROM article WHERE doi = $1")
        .bind(doi.name())
        .fetch_optional(pool)
        .await
}

pub async fn find_journal_by_eissn(
    tx: &mut Transaction<'_, Postgres>,
    eissn: &str,
) -> sqlx::Result<Option<JournalRow>> {
    sqlx::query_as(
        "SELECT journal_id, journal_key, eissn, title FROM journal WHERE eissn = $1",
    )
    .bind(eissn)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn insert_journal(
    pool: &PgPool,
    journal_key: &str,
    eissn: &str,
    title: &str,
) -> sqlx::Result<JournalRow> {
    sqlx::query_as(
        r#"
        INSERT INTO journal (journal_key, eissn, title)
        VALUES ($1, $2, $3)
        ON CONFLICT (eissn) DO UPDATE SET journal_key = EXCLUDED.journal_key,
                                          title = EXCLUDED.title
        RETURNING journal_id, journal_key, eissn, title
        "#,
    )
    .bind(journal_key)
    .bind(eissn)
    .bind(title)
    .fetch_one(pool)
    .await
}

/// The next sequential ingestion number for an article, starting at 1.
/// Must run inside the same transaction as the ingestion insert.
pub async fn next_ingestion_number(
    tx: &mut Transaction<'_, Postgres>,
    article_id: i64,
) -> sqlx::Result<i32> {
    let max: Option<i32> = sqlx::query_scalar(
        "SELECT MAX(ingestion_number) FROM article_ingestion WHERE article_id = $1",
    )
    .bind(article_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(max.map_or(FIRST_INGESTION_NUMBER, |n| n + 1))
}

/// Field bundle for a new ingestion row.
#[derive(Debug, Clone)]
pub struct NewIngestion<'a> {
    pub article_id: i64,
    pub ingestion_number: i32,
    pub title: &'a str,
    pub publication_date: NaiveDate,
    pub revision_date: Option<NaiveDate>,
    pub publication_stage: Option<&'a str>,
    pub article_type: &'a str,
    pub journal_id: i64,
}

pub async fn insert_ingestion(
    tx: &mut Transaction<'_, Postgres>,
    ingestion: &NewIngestion<'_>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        r#"
        INSERT INTO article_ingestion (
            article_id, ingestion_number, title, publication_date,
            revision_date, publication_stage, article_type, journal_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING ingestion_id
        "#,
    )
    .bind(ingestion.article_id)
    .bind(ingestion.ingestion_number)
    .bind(ingestion.title)
    .bind(ingestion.publication_date)
    .bind(ingestion.revision_date)
    .bind(ingestion.publication_stage)
    .bind(ingestion.article_type)
    .bind(ingestion.journal_id)
    .fetch_one(&mut **tx)
    .await
}

pub async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    ingestion_id: i64,
    doi: &Doi,
    item_type: &str,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        r#"
        INSERT INTO article_item (ingestion_id, doi, item_type)
        VALUES ($1, $2, $3)
        RETURNING item_id
        "#,
    )
    .bind(ingestion_id)
    .bind(doi.name())
    .bind(item_type)
    .fetch_one(&mut **tx)
    .await
}

/// Field bundle for a new file row.
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub ingestion_id: i64,
    pub item_id: Option<i64>,
    pub file_type: Option<&'a str>,
    pub bucket: &'a str,
    pub object_key: &'a str,
    pub object_version: &'a str,
    pub file_size: i64,
    pub content_type: Option<&'a str>,
    pub ingested_file_name: &'a str,
}

pub async fn insert_file(
    tx: &mut Transaction<'_, Postgres>,
    file: &NewFile<'_>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        r#"
        INSERT INTO article_file (
            ingestion_id, item_id, file_type, bucket, object_key,
            object_version, file_size, content_type, ingested_file_name
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING file_id
        "#,
    )
    .bind(file.ingestion_id)
    .bind(file.item_id)
    .bind(file.file_type)
    .bind(file.bucket)
    .bind(file.object_key)
    .bind(file.object_version)
    .bind(file.file_size)
    .bind(file.content_type)
    .bind(file.ingested_file_name)
    .fetch_one(&mut **tx)
    .await
}

pub async fn set_striking_image(
    tx: &mut Transaction<'_, Postgres>,
    ingestion_id: i64,
    item_id: i64,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE article_ingestion SET striking_image_item_id = $1 WHERE ingestion_id = $2")
        .bind(item_id)
        .bind(ingestion_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Reload an ingestion row, picking up server-assigned timestamps.
pub async fn get_ingestion(pool: &PgPool, ingestion_id: i64) -> sqlx::Result<IngestionRow> {
    sqlx::query_as(
        r#"
        SELECT ingestion_id, article_id, ingestion_number, title, publication_date,
               revision_date, publication_stage, article_type, journal_id,
               striking_image_item_id, created_at
        FROM article_ingestion
        WHERE ingestion_id = $1
        "#,
    )
    .bind(ingestion_id)
    .fetch_one(pool)
    .await
}

pub async fn find_ingestion(
    pool: &PgPool,
    article_id: i64,
    ingestion_number: i32,
) -> sqlx::Result<Option<IngestionRow>> {
    sqlx::query_as(
        r#"
        SELECT ingestion_id, article_id, ingestion_number, title, publication_date,
               revision_date, publication_stage, article_type, journal_id,
               striking_image_item_id, created_at
        FROM article_ingestion
        WHERE article_id = $1 AND ingestion_number = $2
        "#,
    )
    .bind(article_id)
    .bind(ingestion_number)
    .fetch_optional(pool)
    .await
}

pub async fn list_items(pool: &PgPool, ingestion_id: i64) -> sqlx::Result<Vec<ItemRow>> {
    sqlx::query_as(
        r#"
        SELECT item_id, ingestion_id, doi, item_type
        FROM article_item
        WHERE ingestion_id = $1
        ORDER BY item_id
        "#,
    )
    .bind(ingestion_id)
    .fetch_all(pool)
    .await
}

pub async fn list_files(pool: &PgPool, ingestion_id: i64) -> sqlx::Result<Vec<FileRow>> {
    sqlx::query_as(
        r#"
        SELECT file_id, ingestion_id, item_id, file_type, bucket, object_key,
               object_version, file_size, content_type, ingested_file_name
        FROM article_file
        WHERE ingestion_id = $1
        ORDER BY file_id
        "#,
    )
    .bind(ingestion_id)
    .fetch_all(pool)
    .await
}

/// Distinct DOIs of articles that already own an item with the given DOI,
/// across every persisted ingestion. Used by the asset-uniqueness validator.
pub async fn parent_article_dois_for_item(
    pool: &PgPool,
    item_doi: &Doi,
) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT a.doi
        FROM article_item it
        JOIN article_ingestion ing ON ing.ingestion_id = it.ingestion_id
        JOIN article a ON a.article_id = ing.article_id
        WHERE it.doi = $1
        "#,
    )
    .bind(item_doi.name())
    .fetch_all(pool)
    .await
}
