//! Rhino Ingest - article ingestion tool

use anyhow::Result;
use clap::Parser;
use rhino_common::logging::{init_logging, LogConfig, LogLevel};
use rhino_common::types::{Doi, IngestionId};
use rhino_ingest::config::RhinoConfig;
use rhino_ingest::db;
use rhino_ingest::ingest::archive::Archive;
use rhino_ingest::ingest::pipeline::IngestionService;
use rhino_ingest::ingest::repack::RepackService;
use rhino_ingest::storage::ObjectStore;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rhino-ingest")]
#[command(author, version, about = "Rhino article ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Ingest an article package zip
    Ingest {
        /// Path to the ingestion archive
        zip: PathBuf,

        /// Destination corpus bucket (defaults to the configured bucket)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Rebuild an ingestion archive from persisted state
    Repack {
        /// Article DOI
        doi: String,

        /// Ingestion number
        ingestion_number: i32,

        /// Output zip path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Register a journal so manuscripts can resolve to it by e-ISSN
    JournalAdd {
        /// Short journal key, e.g. "PLoSBiology"
        journal_key: String,

        /// Electronic ISSN
        eissn: String,

        /// Journal display title
        title: String,
    },

    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("rhino-ingest".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let config = RhinoConfig::from_env()?;
    let pool = db::connect(&config.database).await?;

    match cli.command {
        Command::Ingest { zip, bucket } => {
            info!(path = %zip.display(), "Ingesting article package");
            let store = ObjectStore::new(config.storage.clone()).await?;
            let service = IngestionService::new(pool, store, config.corpus.clone());

            let archive = Archive::open_zip_file(&zip)?;
            let receipt = service.ingest(&archive, bucket.as_deref()).await?;

            println!("{}", serde_json::to_string_pretty(&receipt)?);
        },
        Command::Repack {
            doi,
            ingestion_number,
            output,
        } => {
            info!(%doi, ingestion_number, "Repacking ingestion");
            let store = ObjectStore::new(config.storage.clone()).await?;
            let service = RepackService::new(pool, store);

            let id = IngestionId::new(Doi::create(&doi), ingestion_number);
            let archive = service.repack(&id).await?;
            let file = std::fs::File::create(&output)?;
            archive.write_zip(file)?;

            info!(path = %output.display(), "Wrote repacked archive");
        },
        Command::JournalAdd {
            journal_key,
            eissn,
            title,
        } => {
            let journal = db::articles::insert_journal(&pool, &journal_key, &eissn, &title).await?;
            info!(
                journal_key = %journal.journal_key,
                eissn = %journal.eissn,
                "Journal registered"
            );
        },
        Command::Migrate => {
            db::run_migrations(&pool).await?;
            info!("Migrations applied");
        },
    }

    Ok(())
}
