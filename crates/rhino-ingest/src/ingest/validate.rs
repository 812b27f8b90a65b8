// Ingestion Validators
//
// Three independent, order-insensitive checks. Each raises a client error
// at the point of detection and is otherwise a no-op:
//
// 1. Manifest completeness: manifest entries == archive entries, exactly.
// 2. Asset completeness: every DOI the manuscript references has an item in
//    the built package.
// 3. Asset uniqueness: no incoming asset DOI may already belong to a
//    different article in the database.
//
// The first two are pure; the third queries persisted items but writes
// nothing. All three run before any upload or insert happens.

use crate::db;
use crate::ingest::archive::Archive;
use crate::ingest::manifest::Manifest;
use crate::ingest::manuscript::AssetRefs;
use crate::ingest::package::ArticlePackage;
use crate::ingest::{IngestError, Result};
use rhino_common::types::Doi;
use sqlx::PgPool;
use std::collections::BTreeSet;

/// The set of archive entry names referenced by the manifest must exactly
/// equal the set of entries actually present in the archive.
pub fn validate_manifest_completeness(manifest: &Manifest, archive: &Archive) -> Result<()> {
    let manifest_entries: BTreeSet<&str> =
        manifest.manifest_files().map(|f| f.entry.as_str()).collect();
    let archive_entries: BTreeSet<&str> = archive.entry_names().collect();

    let missing_from_archive: Vec<&str> = manifest_entries
        .difference(&archive_entries)
        .copied()
        .collect();
    let missing_from_manifest: Vec<&str> = archive_entries
        .difference(&manifest_entries)
        .copied()
        .collect();

    if missing_from_archive.is_empty() && missing_from_manifest.is_empty() {
        return Ok(());
    }

    let mut message = "Manifest is not consistent with files in archive.".to_string();
    if !missing_from_archive.is_empty() {
        message.push_str(&format!(
            " Files in manifest not included in archive: {missing_from_archive:?}."
        ));
    }
    if !missing_from_manifest.is_empty() {
        message.push_str(&format!(
            " Files in archive not described in manifest: {missing_from_manifest:?}."
        ));
    }
    Err(IngestError::InvalidPackage(message))
}

/// Every asset DOI referenced in the manuscript body must have a
/// corresponding item in the built package.
pub fn validate_asset_completeness(refs: &AssetRefs, package: &ArticlePackage) -> Result<()> {
    let package_dois: BTreeSet<&Doi> = package.all_items().map(|item| &item.doi).collect();
    let missing: Vec<&str> = refs
        .dois()
        .filter(|doi| !package_dois.contains(doi))
        .map(Doi::name)
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    let mut missing = missing;
    missing.sort_unstable();
    Err(IngestError::InvalidPackage(format!(
        "Asset DOIs mentioned in manuscript are not included in package: {missing:?}"
    )))
}

/// An asset DOI must never be shared across two distinct parent articles.
/// Queries existing persisted items for every DOI in the incoming package.
pub async fn validate_asset_uniqueness(
    pool: &PgPool,
    article_doi: &Doi,
    package: &ArticlePackage,
) -> Result<()> {
    for item in package.all_items() {
        let parent_dois = db::articles::parent_article_dois_for_item(pool, &item.doi).await?;
        check_uniqueness(article_doi, &item.doi, &parent_dois)?;
    }
    Ok(())
}

fn check_uniqueness(article_doi: &Doi, item_doi: &Doi, parent_dois: &[String]) -> Result<()> {
    for parent in parent_dois {
        if &Doi::create(parent) != article_doi {
            return Err(IngestError::InvalidPackage(format!(
                "Incoming article ingestion (doi:{article_doi}) has a duplicate article asset \
                 (doi:{item_doi}). Duplicate asset belongs to article doi: {parent}."
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::manuscript::{ArticleMetadata, Manuscript};
    use crate::ingest::package::ArticlePackageBuilder;
    use chrono::NaiveDate;

    fn manifest() -> Manifest {
        let xml = r#"<manifest><articleBundle>
            <article uri="info:doi/10.1371/journal.pbio.0000001">
              <representation name="manuscript" entry="manuscript.xml"/>
            </article>
            <object uri="info:doi/10.1371/journal.pbio.0000001.g001">
              <representation name="TIF" entry="fig1.tif"/>
            </object>
            <ancillary>
              <file entry="data.csv"/>
            </ancillary>
        </articleBundle></manifest>"#;
        Manifest::parse(xml.as_bytes()).unwrap()
    }

    fn manuscript(ref_entries: &[(&str, &str)]) -> Manuscript {
        let mut refs = AssetRefs::default();
        for (doi, element) in ref_entries {
            refs.insert(Doi::create(doi), element.to_string());
        }
        Manuscript {
            metadata: ArticleMetadata {
                doi: Doi::create("10.1371/journal.pbio.0000001"),
                title: "Title".to_string(),
                article_type: "research-article".to_string(),
                eissn: "1545-7885".to_string(),
                publication_date: NaiveDate::from_ymd_opt(2003, 10, 13).unwrap(),
                revision_date: None,
                publication_stage: None,
            },
            asset_refs: refs,
        }
    }

    fn archive(entries: &[&str]) -> Archive {
        Archive::from_entries(
            "test.zip",
            entries
                .iter()
                .map(|name| (name.to_string(), b"bytes".to_vec())),
        )
    }

    // ========================================================================
    // Manifest completeness
    // ========================================================================

    #[test]
    fn test_manifest_completeness_ok() {
        let result = validate_manifest_completeness(
            &manifest(),
            &archive(&["manuscript.xml", "fig1.tif", "data.csv"]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_manifest_entry_missing_from_archive() {
        let err = validate_manifest_completeness(
            &manifest(),
            &archive(&["manuscript.xml", "data.csv"]),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("not included in archive"));
        assert!(message.contains("fig1.tif"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_archive_entry_missing_from_manifest() {
        let err = validate_manifest_completeness(
            &manifest(),
            &archive(&["manuscript.xml", "fig1.tif", "data.csv", "extra.bin"]),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("not described in manifest"));
        assert!(message.contains("extra.bin"));
    }

    #[test]
    fn test_both_directions_reported() {
        let err = validate_manifest_completeness(
            &manifest(),
            &archive(&["manuscript.xml", "data.csv", "extra.bin"]),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("fig1.tif"));
        assert!(message.contains("extra.bin"));
    }

    // ========================================================================
    // Asset completeness
    // ========================================================================

    #[test]
    fn test_asset_completeness_ok() {
        let manuscript = manuscript(&[("10.1371/journal.pbio.0000001.g001", "fig")]);
        let package = ArticlePackageBuilder::new("corpus", &manifest(), &manuscript)
            .build()
            .unwrap();
        assert!(validate_asset_completeness(&manuscript.asset_refs, &package).is_ok());
    }

    #[test]
    fn test_asset_completeness_missing_doi() {
        // The manuscript references a second figure the manifest never
        // declared; the package is missing an item for it.
        let manuscript = manuscript(&[
            ("10.1371/journal.pbio.0000001.g001", "fig"),
            ("10.1371/journal.pbio.0000001.g002", "fig"),
        ]);
        let package = ArticlePackageBuilder::new("corpus", &manifest(), &manuscript)
            .build()
            .unwrap();
        let err = validate_asset_completeness(&manuscript.asset_refs, &package).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("not included in package"));
        assert!(message.contains("10.1371/journal.pbio.0000001.g002"));
        assert!(!message.contains("g001\""));
    }

    // ========================================================================
    // Asset uniqueness
    // ========================================================================

    #[test]
    fn test_uniqueness_passes_for_same_article() {
        let article = Doi::create("10.1371/journal.pbio.0000001");
        let item = Doi::create("10.1371/journal.pbio.0000001.g001");
        let parents = vec!["10.1371/journal.pbio.0000001".to_string()];
        assert!(check_uniqueness(&article, &item, &parents).is_ok());
    }

    #[test]
    fn test_uniqueness_passes_for_unseen_doi() {
        let article = Doi::create("10.1371/journal.pbio.0000001");
        let item = Doi::create("10.1371/journal.pbio.0000001.g001");
        assert!(check_uniqueness(&article, &item, &[]).is_ok());
    }

    #[test]
    fn test_uniqueness_fails_across_articles() {
        let article = Doi::create("10.1371/journal.pbio.0000002");
        let item = Doi::create("10.1371/journal.pbio.0000001.g001");
        let parents = vec!["10.1371/journal.pbio.0000001".to_string()];
        let err = check_uniqueness(&article, &item, &parents).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("duplicate article asset"));
        assert!(message.contains("10.1371/journal.pbio.0000001"));
        assert!(err.is_client_error());
    }
}
