// Ingestion Pipeline Orchestration
//
// Runs one article ingestion end-to-end:
//
// 1. Parse manifest.xml and reconcile it against the archive contents.
// 2. Parse the manuscript named by the manifest's article asset.
// 3. Classify assets and build the article package.
// 4. Validate asset completeness and cross-article DOI uniqueness.
// 5. Persist (uploads + one database transaction).
//
// Every validation failure aborts before any upload or insert happens.

use crate::config::CorpusConfig;
use crate::ingest::archive::Archive;
use crate::ingest::manifest::Manifest;
use crate::ingest::manuscript::Manuscript;
use crate::ingest::package::{ArticlePackage, ArticlePackageBuilder};
use crate::ingest::persist::{PersistedIngestion, PersistenceService};
use crate::ingest::validate;
use crate::ingest::{IngestError, Result};
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use rhino_common::types::Doi;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};

/// The archive entry every ingestion package must contain.
pub const MANIFEST_ENTRY: &str = "manifest.xml";

/// The terminal outcome of a successful ingestion, serialized for callers.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReceipt {
    pub doi: String,
    pub ingestion_number: i32,
    pub title: String,
    pub article_type: String,
    pub journal_eissn: String,
    pub items: Vec<ReceiptItem>,
    pub striking_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptItem {
    pub doi: String,
    pub item_type: String,
    pub files: Vec<String>,
}

/// Article ingestion service.
pub struct IngestionService {
    db: PgPool,
    store: ObjectStore,
    corpus: CorpusConfig,
}

impl IngestionService {
    pub fn new(db: PgPool, store: ObjectStore, corpus: CorpusConfig) -> Self {
        Self { db, store, corpus }
    }

    /// Ingest one archive, optionally into a caller-chosen bucket.
    #[instrument(skip_all, fields(archive = %archive.name()))]
    pub async fn ingest(
        &self,
        archive: &Archive,
        bucket: Option<&str>,
    ) -> Result<IngestionReceipt> {
        let bucket = self.resolve_bucket(bucket)?;

        info!("Step 1/5: Parsing and validating manifest");
        let manifest = read_manifest(archive)?;
        validate::validate_manifest_completeness(&manifest, archive)?;

        info!("Step 2/5: Parsing manuscript");
        let manuscript = read_manuscript(archive, &manifest)?;
        validate_doi_consistency(&manifest, &manuscript)?;

        info!("Step 3/5: Building article package");
        let package = ArticlePackageBuilder::new(bucket, &manifest, &manuscript).build()?;

        info!("Step 4/5: Validating package");
        validate::validate_asset_completeness(&manuscript.asset_refs, &package)?;
        validate::validate_asset_uniqueness(&self.db, package.doi(), &package).await?;

        info!("Step 5/5: Persisting ingestion");
        let persistence = PersistenceService::new(self.db.clone(), self.store.clone());
        let persisted = persistence
            .persist(archive, &package, &manuscript.metadata)
            .await?;

        Ok(build_receipt(&manuscript, &package, persisted))
    }

    /// Validate the requested bucket against the allowed set, or supply the
    /// configured default.
    fn resolve_bucket(&self, bucket: Option<&str>) -> Result<String> {
        let Some(requested) = bucket else {
            return Ok(self.corpus.default_bucket.clone());
        };
        if !self.corpus.is_allowed(requested) {
            return Err(IngestError::InvalidPackage(format!(
                "Invalid bucket name: {}. Allowed values are: {:?}.",
                requested, self.corpus.all_buckets
            )));
        }
        Ok(requested.to_string())
    }
}

fn read_manifest(archive: &Archive) -> Result<Manifest> {
    if !archive.contains_entry(MANIFEST_ENTRY) {
        return Err(IngestError::MalformedManifest(
            "Archive has no manifest file".to_string(),
        ));
    }
    Manifest::parse(archive.read_entry(MANIFEST_ENTRY)?)
}

fn read_manuscript(archive: &Archive, manifest: &Manifest) -> Result<Manuscript> {
    let article_asset = manifest.article_asset()?;
    let manuscript_repr = article_asset.representation("manuscript").ok_or_else(|| {
        IngestError::MalformedManifest("Manuscript entry not found in manifest".to_string())
    })?;

    let manuscript_entry = &manuscript_repr.file.entry;
    if !archive.contains_entry(manuscript_entry) {
        return Err(IngestError::InvalidPackage(format!(
            "Manuscript file not found in archive: {manuscript_entry}"
        )));
    }

    Manuscript::parse(archive.read_entry(manuscript_entry)?)
}

/// The manifest's article asset URI and the manuscript's own DOI must agree.
fn validate_doi_consistency(manifest: &Manifest, manuscript: &Manuscript) -> Result<()> {
    let manifest_doi = &manifest.article_asset()?.uri;
    let manuscript_doi = &manuscript.metadata.doi;
    if manifest_doi != manuscript_doi {
        return Err(IngestError::InvalidPackage(format!(
            "Article DOI is inconsistent. From manifest: \"{manifest_doi}\" \
             From manuscript: \"{manuscript_doi}\""
        )));
    }
    Ok(())
}

fn build_receipt(
    manuscript: &Manuscript,
    package: &ArticlePackage,
    persisted: PersistedIngestion,
) -> IngestionReceipt {
    let items = package
        .all_items()
        .map(|item| ReceiptItem {
            doi: item.doi.name().to_string(),
            item_type: item.asset_type.identifier().to_string(),
            files: item
                .files
                .keys()
                .map(|file_type| file_type.identifier().to_string())
                .collect(),
        })
        .collect();

    IngestionReceipt {
        doi: package.doi().name().to_string(),
        ingestion_number: persisted.ingestion.ingestion_number,
        title: persisted.ingestion.title,
        article_type: persisted.ingestion.article_type,
        journal_eissn: manuscript.metadata.eissn.clone(),
        items,
        striking_image: persisted
            .striking_image
            .map(|item| Doi::create(&item.doi).name().to_string()),
        created_at: persisted.ingestion.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::manuscript::{ArticleMetadata, AssetRefs};
    use chrono::NaiveDate;

    fn manifest(article_uri: &str) -> Manifest {
        let xml = format!(
            r#"<manifest><articleBundle>
                <article uri="{article_uri}">
                  <representation name="manuscript" entry="manuscript.xml"/>
                </article>
            </articleBundle></manifest>"#
        );
        Manifest::parse(xml.as_bytes()).unwrap()
    }

    fn manuscript(doi: &str) -> Manuscript {
        Manuscript {
            metadata: ArticleMetadata {
                doi: Doi::create(doi),
                title: "Title".to_string(),
                article_type: "research-article".to_string(),
                eissn: "1545-7885".to_string(),
                publication_date: NaiveDate::from_ymd_opt(2003, 10, 13).unwrap(),
                revision_date: None,
                publication_stage: None,
            },
            asset_refs: AssetRefs::default(),
        }
    }

    #[test]
    fn test_doi_consistency_ok() {
        let manifest = manifest("info:doi/10.1371/journal.pbio.0000001");
        let manuscript = manuscript("10.1371/journal.pbio.0000001");
        assert!(validate_doi_consistency(&manifest, &manuscript).is_ok());
    }

    #[test]
    fn test_doi_consistency_mismatch() {
        let manifest = manifest("info:doi/10.1371/journal.pbio.0000001");
        let manuscript = manuscript("10.1371/journal.pbio.0000002");
        let err = validate_doi_consistency(&manifest, &manuscript).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("inconsistent"));
        assert!(message.contains("10.1371/journal.pbio.0000001"));
        assert!(message.contains("10.1371/journal.pbio.0000002"));
    }

    #[test]
    fn test_missing_manifest_entry() {
        let archive = Archive::from_entries(
            "bare.zip",
            [("manuscript.xml".to_string(), b"<article/>".to_vec())],
        );
        let err = read_manifest(&archive).unwrap_err();
        assert!(err.to_string().contains("no manifest file"));
    }

    #[test]
    fn test_manuscript_entry_missing_from_archive() {
        let archive = Archive::from_entries(
            "bare.zip",
            [(
                "manifest.xml".to_string(),
                br#"<manifest><articleBundle>
                    <article uri="info:doi/10.1371/x">
                      <representation name="manuscript" entry="manuscript.xml"/>
                    </article>
                </articleBundle></manifest>"#
                    .to_vec(),
            )],
        );
        let manifest = read_manifest(&archive).unwrap();
        let err = read_manuscript(&archive, &manifest).unwrap_err();
        assert!(err
            .to_string()
            .contains("Manuscript file not found in archive"));
    }
}
