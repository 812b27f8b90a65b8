// Repack: rebuild an ingestion archive from persisted state
//
// The inverse of ingestion: given an article DOI and ingestion number, load
// the item/file graph, download every stored object, regenerate manifest.xml,
// and return an Archive ready to be written as a zip.
//
// Representation names are reconstructed: the article item's files keep
// their role names ("manuscript", "printable"), which are also valid
// representation names; asset files take the uppercased extension of their
// ingested file name, which is how package entries are conventionally named
// ("pbio.0000001.g001.PNG_S" -> "PNG_S"). A repacked archive therefore
// re-ingests cleanly.

use crate::db::{articles, FileRow, IngestionRow, ItemRow};
use crate::ingest::archive::Archive;
use crate::ingest::pipeline::MANIFEST_ENTRY;
use crate::ingest::{IngestError, Result};
use crate::storage::ObjectStore;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use rhino_common::types::{Doi, IngestionId};
use sqlx::PgPool;
use tracing::{info, instrument};

const ARTICLE_ITEM_TYPE: &str = "article";

/// Rebuilds ingestion archives from the database and object store.
pub struct RepackService {
    db: PgPool,
    store: ObjectStore,
}

impl RepackService {
    pub fn new(db: PgPool, store: ObjectStore) -> Self {
        Self { db, store }
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn repack(&self, id: &IngestionId) -> Result<Archive> {
        let article = articles::find_article_by_doi(&self.db, &id.doi)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("Article not found: {}", id.doi)))?;
        let ingestion =
            articles::find_ingestion(&self.db, article.article_id, id.ingestion_number)
                .await?
                .ok_or_else(|| IngestError::NotFound(format!("Ingestion not found: {id}")))?;

        let items = articles::list_items(&self.db, ingestion.ingestion_id).await?;
        let files = articles::list_files(&self.db, ingestion.ingestion_id).await?;

        let manifest_xml = build_manifest_xml(&ingestion, &items, &files)?;

        let mut entries = vec![(MANIFEST_ENTRY.to_string(), manifest_xml)];
        for file in &files {
            if file.ingested_file_name == MANIFEST_ENTRY {
                // Regenerated above; don't fetch the stored copy.
                continue;
            }
            let bytes = self
                .store
                .download(&file.bucket, &file.object_key)
                .await
                .map_err(IngestError::ObjectStore)?;
            entries.push((file.ingested_file_name.clone(), bytes));
        }

        info!(entries = entries.len(), "Repacked ingestion archive");

        Ok(Archive::from_entries(
            format!("{}.zip", id.doi.short_name()),
            entries,
        ))
    }
}

/// Regenerate manifest.xml from the persisted item/file graph.
fn build_manifest_xml(
    ingestion: &IngestionRow,
    items: &[ItemRow],
    files: &[FileRow],
) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write(&mut writer, Event::Start(BytesStart::new("manifest")))?;
    write(&mut writer, Event::Start(BytesStart::new("articleBundle")))?;

    for item in items {
        let tag = if item.item_type == ARTICLE_ITEM_TYPE {
            "article"
        } else {
            "object"
        };
        let mut element = BytesStart::new(tag);
        element.push_attribute(("uri", Doi::create(&item.doi).as_uri().as_str()));
        if ingestion.striking_image_item_id == Some(item.item_id) {
            element.push_attribute(("strkImage", "True"));
        }
        write(&mut writer, Event::Start(element))?;

        for file in files.iter().filter(|f| f.item_id == Some(item.item_id)) {
            let mut representation = BytesStart::new("representation");
            representation.push_attribute((
                "name",
                representation_name(&item.item_type, file).as_str(),
            ));
            push_file_attributes(&mut representation, file);
            write(&mut writer, Event::Empty(representation))?;
        }

        write(&mut writer, Event::End(BytesEnd::new(tag)))?;
    }

    write(&mut writer, Event::Start(BytesStart::new("ancillary")))?;
    for file in files
        .iter()
        .filter(|f| f.item_id.is_none() && f.ingested_file_name != MANIFEST_ENTRY)
    {
        let mut element = BytesStart::new("file");
        push_file_attributes(&mut element, file);
        write(&mut writer, Event::Empty(element))?;
    }
    // The manifest describes every archive entry, itself included.
    let mut self_entry = BytesStart::new("file");
    self_entry.push_attribute(("entry", MANIFEST_ENTRY));
    self_entry.push_attribute(("mimetype", "text/xml"));
    write(&mut writer, Event::Empty(self_entry))?;
    write(&mut writer, Event::End(BytesEnd::new("ancillary")))?;

    write(&mut writer, Event::End(BytesEnd::new("articleBundle")))?;
    write(&mut writer, Event::End(BytesEnd::new("manifest")))?;

    Ok(writer.into_inner())
}

fn push_file_attributes(element: &mut BytesStart<'_>, file: &FileRow) {
    element.push_attribute(("entry", file.ingested_file_name.as_str()));
    if let Some(content_type) = &file.content_type {
        element.push_attribute(("mimetype", content_type.as_str()));
    }
    element.push_attribute(("key", file.object_key.as_str()));
}

fn representation_name(item_type: &str, file: &FileRow) -> String {
    if item_type == ARTICLE_ITEM_TYPE {
        if let Some(file_type) = &file.file_type {
            return file_type.clone();
        }
    }
    file.ingested_file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_uppercase())
        .or_else(|| file.file_type.clone())
        .unwrap_or_else(|| "file".to_string())
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| IngestError::Internal(format!("Failed to write manifest XML: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::manifest::{AssetTagName, Manifest};
    use chrono::{NaiveDate, Utc};

    fn ingestion(striking_image_item_id: Option<i64>) -> IngestionRow {
        IngestionRow {
            ingestion_id: 10,
            article_id: 1,
            ingestion_number: 1,
            title: "Title".to_string(),
            publication_date: NaiveDate::from_ymd_opt(2003, 10, 13).unwrap(),
            revision_date: None,
            publication_stage: None,
            article_type: "research-article".to_string(),
            journal_id: 1,
            striking_image_item_id,
            created_at: Utc::now(),
        }
    }

    fn item(item_id: i64, doi: &str, item_type: &str) -> ItemRow {
        ItemRow {
            item_id,
            ingestion_id: 10,
            doi: doi.to_string(),
            item_type: item_type.to_string(),
        }
    }

    fn file(item_id: Option<i64>, file_type: Option<&str>, name: &str, key: &str) -> FileRow {
        FileRow {
            file_id: 0,
            ingestion_id: 10,
            item_id,
            file_type: file_type.map(str::to_string),
            bucket: "corpus".to_string(),
            object_key: key.to_string(),
            object_version: "v1".to_string(),
            file_size: 4,
            content_type: Some("application/octet-stream".to_string()),
            ingested_file_name: name.to_string(),
        }
    }

    #[test]
    fn test_manifest_round_trips_through_parser() {
        let items = vec![
            item(1, "10.1371/journal.pbio.0000001", "article"),
            item(2, "10.1371/journal.pbio.0000001.g001", "figure"),
        ];
        let files = vec![
            file(Some(1), Some("manuscript"), "pbio.0000001.xml", "manuscript/pbio.0000001"),
            file(Some(2), Some("original"), "pbio.0000001.g001.tif", "original/pbio.0000001.g001"),
            file(Some(2), Some("small"), "pbio.0000001.g001.PNG_S", "small/pbio.0000001.g001"),
            file(None, None, "dataset.csv", "ancillary/dataset.csv"),
        ];

        let xml = build_manifest_xml(&ingestion(Some(2)), &items, &files).unwrap();
        let manifest = Manifest::parse(&xml).unwrap();

        let article = manifest.article_asset().unwrap();
        assert_eq!(article.uri.name(), "10.1371/journal.pbio.0000001");
        assert!(article.representation("manuscript").is_some());

        let figure = manifest
            .assets()
            .iter()
            .find(|a| a.tag == AssetTagName::Object)
            .unwrap();
        assert!(figure.striking_image);
        assert_eq!(
            figure.representation("TIF").unwrap().file.key,
            "original/pbio.0000001.g001"
        );
        assert!(figure.representation("PNG_S").is_some());

        // Ancillary: the dataset plus the manifest's own entry
        let ancillary: Vec<&str> = manifest
            .ancillary_files()
            .iter()
            .map(|f| f.entry.as_str())
            .collect();
        assert_eq!(ancillary, vec!["dataset.csv", "manifest.xml"]);
    }

    #[test]
    fn test_representation_names() {
        assert_eq!(
            representation_name(
                "article",
                &file(Some(1), Some("manuscript"), "pbio.0000001.xml", "k")
            ),
            "manuscript"
        );
        assert_eq!(
            representation_name(
                "figure",
                &file(Some(2), Some("original"), "pbio.0000001.g001.tif", "k")
            ),
            "TIF"
        );
        assert_eq!(
            representation_name(
                "figure",
                &file(Some(2), Some("small"), "pbio.0000001.g001.PNG_S", "k")
            ),
            "PNG_S"
        );
    }
}
