// Persistence Orchestrator
//
// The only stage with external side effects. One forward pass, no retries:
//
// 1. Look up or create the article row (idempotent).
// 2. Resolve the journal by the manuscript's e-ISSN.
// 3. Compute the next ingestion number and insert the ingestion row.
// 4. Upload every item file and insert item + file rows.
// 5. Upload and insert ancillary file rows.
// 6. Link the striking image.
// 7. Commit, then reload the ingestion for server-assigned timestamps.
//
// Steps 1-6 share one transaction; any failure rolls back every row. Object
// uploads cannot be rolled back. Objects written before a failure are
// orphaned, but their keys are deterministic and create-if-absent, so a
// retry reuses them (see DESIGN.md).

use crate::db::{articles, IngestionRow, ItemRow};
use crate::ingest::archive::Archive;
use crate::ingest::manuscript::ArticleMetadata;
use crate::ingest::package::{ArticleFileInput, ArticlePackage};
use crate::ingest::{IngestError, Result};
use crate::storage::{ObjectStore, StoredObject};
use rhino_common::types::Doi;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

/// The outcome of a successful persistence pass.
#[derive(Debug, Clone)]
pub struct PersistedIngestion {
    pub ingestion: IngestionRow,
    pub items: Vec<ItemRow>,
    pub striking_image: Option<ItemRow>,
}

/// Writes one validated article package to the database and object store.
pub struct PersistenceService {
    db: PgPool,
    store: ObjectStore,
}

impl PersistenceService {
    pub fn new(db: PgPool, store: ObjectStore) -> Self {
        Self { db, store }
    }

    #[instrument(skip_all, fields(doi = %package.doi()))]
    pub async fn persist(
        &self,
        archive: &Archive,
        package: &ArticlePackage,
        metadata: &ArticleMetadata,
    ) -> Result<PersistedIngestion> {
        let mut tx = self.db.begin().await?;

        let article = articles::find_or_create_article(&mut tx, package.doi()).await?;

        let journal = articles::find_journal_by_eissn(&mut tx, &metadata.eissn)
            .await?
            .ok_or_else(|| {
                IngestError::InvalidPackage(format!(
                    "XML contained eIssn that was not matched to a journal: {}",
                    metadata.eissn
                ))
            })?;

        let ingestion_number =
            articles::next_ingestion_number(&mut tx, article.article_id).await?;
        let ingestion_id = articles::insert_ingestion(
            &mut tx,
            &articles::NewIngestion {
                article_id: article.article_id,
                ingestion_number,
                title: &metadata.title,
                publication_date: metadata.publication_date,
                revision_date: metadata.revision_date,
                publication_stage: metadata.publication_stage.as_deref(),
                article_type: &metadata.article_type,
                journal_id: journal.journal_id,
            },
        )
        .await?;
        debug!(ingestion_number, "Ingestion row created");

        let mut items = Vec::new();
        for item_input in package.all_items() {
            let item_id = articles::insert_item(
                &mut tx,
                ingestion_id,
                &item_input.doi,
                item_input.asset_type.identifier(),
            )
            .await?;

            for (file_type, file_input) in &item_input.files {
                let stored = self.upload(archive, package.bucket(), file_input).await?;
                articles::insert_file(
                    &mut tx,
                    &articles::NewFile {
                        ingestion_id,
                        item_id: Some(item_id),
                        file_type: Some(file_type.identifier()),
                        bucket: &stored.bucket,
                        object_key: &stored.key,
                        object_version: &stored.version,
                        file_size: stored.size,
                        content_type: Some(&file_input.content_type),
                        ingested_file_name: &file_input.entry,
                    },
                )
                .await?;
            }

            items.push(ItemRow {
                item_id,
                ingestion_id,
                doi: item_input.doi.name().to_string(),
                item_type: item_input.asset_type.identifier().to_string(),
            });
        }

        for file_input in package.ancillary_files() {
            let stored = self.upload(archive, package.bucket(), file_input).await?;
            articles::insert_file(
                &mut tx,
                &articles::NewFile {
                    ingestion_id,
                    item_id: None,
                    file_type: None,
                    bucket: &stored.bucket,
                    object_key: &stored.key,
                    object_version: &stored.version,
                    file_size: stored.size,
                    content_type: Some(&file_input.content_type),
                    ingested_file_name: &file_input.entry,
                },
            )
            .await?;
        }

        let striking_image =
            link_striking_image(&mut tx, ingestion_id, package, &items).await?;

        tx.commit().await?;

        // Reload to pick up the server-assigned timestamp.
        let ingestion = articles::get_ingestion(&self.db, ingestion_id).await?;

        info!(
            doi = %package.doi(),
            ingestion_number = ingestion.ingestion_number,
            items = items.len(),
            "Ingestion persisted"
        );

        Ok(PersistedIngestion {
            ingestion,
            items,
            striking_image,
        })
    }

    async fn upload(
        &self,
        archive: &Archive,
        bucket: &str,
        file: &ArticleFileInput,
    ) -> Result<StoredObject> {
        let bytes = archive.read_entry(&file.entry)?.to_vec();
        self.store
            .put_object(
                bucket,
                &file.key,
                bytes,
                &file.content_type,
                &file.download_name,
            )
            .await
            .map_err(IngestError::ObjectStore)
    }
}

/// Set the ingestion's striking image to the item created for the asset the
/// manifest flagged. The manifest was already validated, so a missing item
/// here is an internal fault, not a client error.
async fn link_striking_image(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ingestion_id: i64,
    package: &ArticlePackage,
    items: &[ItemRow],
) -> Result<Option<ItemRow>> {
    let Some(striking_doi) = package.striking_image_doi() else {
        return Ok(None);
    };

    let item = items
        .iter()
        .find(|item| &Doi::create(&item.doi) == striking_doi)
        .cloned()
        .ok_or_else(|| {
            IngestError::Internal(
                "Striking image from manifest not found (should have been created by now)"
                    .to_string(),
            )
        })?;

    articles::set_striking_image(tx, ingestion_id, item.item_id).await?;
    Ok(Some(item))
}
