//! Rhino Ingest Library
//!
//! The article ingestion core of the Rhino scholarly-publishing backend.
//!
//! An ingestion takes a zip archive containing a JATS manuscript and a
//! `manifest.xml`, reconciles the manifest's declared files against the
//! archive's actual contents and the asset references in the manuscript
//! body, classifies every asset into a type and its files into roles,
//! uploads the resolved objects to an S3-compatible store, and persists the
//! resulting article / ingestion / item / file graph in one PostgreSQL
//! transaction.
//!
//! # Example
//!
//! ```no_run
//! use rhino_ingest::config::RhinoConfig;
//! use rhino_ingest::ingest::archive::Archive;
//! use rhino_ingest::ingest::pipeline::IngestionService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RhinoConfig::from_env()?;
//!     let db = rhino_ingest::db::connect(&config.database).await?;
//!     let store = rhino_ingest::storage::ObjectStore::new(config.storage.clone()).await?;
//!
//!     let archive = Archive::open_zip_file("package.zip")?;
//!     let service = IngestionService::new(db, store, config.corpus.clone());
//!     let receipt = service.ingest(&archive, None).await?;
//!     println!("{}", serde_json::to_string_pretty(&receipt)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod ingest;
pub mod storage;

pub use config::RhinoConfig;
pub use ingest::pipeline::IngestionService;
pub use ingest::{IngestError, Result};
