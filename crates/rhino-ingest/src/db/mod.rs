//! Database pool setup and row models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub mod articles;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/rhino".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_secs: env_parse(
                "DATABASE_CONNECT_TIMEOUT",
                defaults.connect_timeout_secs,
            ),
            idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT", defaults.idle_timeout_secs),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Create the connection pool.
pub async fn connect(config: &DatabaseConfig) -> sqlx::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    info!("Database pool connected");
    Ok(pool)
}

/// Apply pending migrations from the crate's migrations directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// ============================================================================
// Row models
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArticleRow {
    pub article_id: i64,
    pub doi: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalRow {
    pub journal_id: i64,
    pub journal_key: String,
    pub eissn: String,
    pub title: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestionRow {
    pub ingestion_id: i64,
    pub article_id: i64,
    pub ingestion_number: i32,
    pub title: String,
    pub publication_date: NaiveDate,
    pub revision_date: Option<NaiveDate>,
    pub publication_stage: Option<String>,
    pub article_type: String,
    pub journal_id: i64,
    pub striking_image_item_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub item_id: i64,
    pub ingestion_id: i64,
    pub doi: String,
    pub item_type: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRow {
    pub file_id: i64,
    pub ingestion_id: i64,
    pub item_id: Option<i64>,
    pub file_type: Option<String>,
    pub bucket: String,
    pub object_key: String,
    pub object_version: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub ingested_file_name: String,
}
