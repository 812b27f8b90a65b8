// Article Ingestion Module
//
// One ingestion runs end-to-end through these stages:
//
// - archive: zip container abstraction (entry names + per-entry bytes)
// - manifest: parse manifest.xml into assets/representations/files
// - manuscript: parse the JATS XML into metadata + asset references
// - package: classify assets and build the in-memory article package
// - validate: completeness and uniqueness checks
// - persist: object-store uploads + one database transaction
// - pipeline: the IngestionService tying the stages together
// - repack: the inverse operation, rebuilding a zip from a stored ingestion
//
// Everything upstream of persist is a pure transformation over in-memory
// structures; persist is the only stage with external side effects.

pub mod archive;
pub mod content_type;
pub mod manifest;
pub mod manuscript;
pub mod package;
pub mod persist;
pub mod pipeline;
pub mod repack;
pub mod validate;

// Re-export main types
pub use archive::Archive;
pub use manifest::{AssetTagName, Manifest, ManifestAsset, ManifestFile, Representation};
pub use manuscript::{ArticleMetadata, AssetRefs, Manuscript};
pub use package::{ArticleFileInput, ArticleItemInput, ArticlePackage, AssetType, FileType};
pub use pipeline::{IngestionReceipt, IngestionService, MANIFEST_ENTRY};

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for article ingestion
///
/// Client/input errors (bad archive contents) are distinguished from
/// infrastructure errors (database, object store) and internal consistency
/// faults. `is_client_error` is what a transport layer consults to pick a
/// 4xx or 5xx status.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Invalid manuscript XML: {0}")]
    InvalidManuscript(String),

    #[error("Invalid article package: {0}")]
    InvalidPackage(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Object store error: {0}")]
    ObjectStore(anyhow::Error),

    #[error("Internal consistency error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Whether this failure was caused by the submitted package rather than
    /// by infrastructure. Client errors are never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::MalformedManifest(_)
                | IngestError::InvalidManuscript(_)
                | IngestError::InvalidPackage(_)
                | IngestError::Archive(_)
                | IngestError::NotFound(_)
        )
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::Archive(err.to_string())
    }
}
