//! Configuration management
//!
//! All configuration is loaded once at process start from environment
//! variables (with `.env` support via dotenvy) into plain structs that are
//! passed down explicitly. There are no global configuration singletons.

use crate::db::DatabaseConfig;
use crate::storage::StorageConfig;
use rhino_common::{Result, RhinoError};
use serde::{Deserialize, Serialize};

/// Default corpus bucket name.
pub const DEFAULT_CORPUS_BUCKET: &str = "corpus";

/// Top-level configuration for the ingestion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RhinoConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub corpus: CorpusConfig,
}

impl RhinoConfig {
    /// Load configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database: DatabaseConfig::from_env(),
            storage: StorageConfig::from_env()
                .map_err(|e| RhinoError::Config(e.to_string()))?,
            corpus: CorpusConfig::from_env(),
        })
    }
}

/// The set of object-store buckets ingestions may write to, plus the
/// default used when the caller does not pick one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub default_bucket: String,
    pub all_buckets: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            default_bucket: DEFAULT_CORPUS_BUCKET.to_string(),
            all_buckets: vec![DEFAULT_CORPUS_BUCKET.to_string()],
        }
    }
}

impl CorpusConfig {
    /// Environment variables:
    /// - `CORPUS_DEFAULT_BUCKET`: destination bucket when none is requested
    /// - `CORPUS_BUCKETS`: comma-separated allowed bucket names (always
    ///   includes the default)
    pub fn from_env() -> Self {
        let default_bucket = std::env::var("CORPUS_DEFAULT_BUCKET")
            .unwrap_or_else(|_| DEFAULT_CORPUS_BUCKET.to_string());

        let mut all_buckets: Vec<String> = std::env::var("CORPUS_BUCKETS")
            .map(|value| {
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if !all_buckets.contains(&default_bucket) {
            all_buckets.insert(0, default_bucket.clone());
        }

        Self {
            default_bucket,
            all_buckets,
        }
    }

    pub fn is_allowed(&self, bucket: &str) -> bool {
        self.all_buckets.iter().any(|b| b == bucket)
    }
}
