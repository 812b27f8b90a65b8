// Asset Classifier & Article Package Builder
//
// Matches manifest assets against the manuscript's asset-reference nodes to
// assign each asset a type, maps each representation name to the file role
// it plays for that type, and assembles the immutable ArticlePackage handed
// to the persistence stage. File inputs are lazy descriptors; no archive
// bytes are touched here.

use crate::ingest::content_type::infer_content_type;
use crate::ingest::manifest::{AssetTagName, Manifest, ManifestAsset, ManifestFile};
use crate::ingest::manuscript::{AssetRefs, Manuscript};
use crate::ingest::{IngestError, Result};
use rhino_common::types::Doi;
use serde::Serialize;
use std::collections::BTreeMap;

/// The storage role a file plays within its owning item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub enum FileType {
    // Root-level files that belong to the article itself
    Manuscript,
    Printable,

    // The source representation of an image
    Original,

    // The single display format for an asset without thumbnail sizes
    Thumbnail,

    // Display formats at different sizes for figures and tables
    Small,
    Medium,
    Inline,
    Large,

    // A supplementary information file
    Supplementary,

    // A standalone striking image's single file
    StrikingImage,
}

impl FileType {
    /// The role string persisted on article_file rows.
    pub fn identifier(self) -> &'static str {
        match self {
            FileType::Manuscript => "manuscript",
            FileType::Printable => "printable",
            FileType::Original => "original",
            FileType::Thumbnail => "thumbnail",
            FileType::Small => "small",
            FileType::Medium => "medium",
            FileType::Inline => "inline",
            FileType::Large => "large",
            FileType::Supplementary => "supplementary",
            FileType::StrikingImage => "strikingImage",
        }
    }
}

impl From<FileType> for String {
    fn from(file_type: FileType) -> Self {
        file_type.identifier().to_string()
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// The type of an asset, determined by where its DOI is referenced in the
/// manuscript of its parent article.
///
/// Each variant owns its representation-name lookup table and its
/// supported/required file-role sets, resolved by `match` below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum AssetType {
    Article,
    Figure,
    Table,
    Graphic,
    SupplementaryMaterial,
    StandaloneStrikingImage,
}

// Shared by Figure and Table
const STANDARD_THUMBNAIL_FILE_TYPES: [FileType; 5] = [
    FileType::Original,
    FileType::Small,
    FileType::Inline,
    FileType::Medium,
    FileType::Large,
];

impl AssetType {
    /// The item-type string persisted on article_item rows.
    pub fn identifier(self) -> &'static str {
        match self {
            AssetType::Article => "article",
            AssetType::Figure => "figure",
            AssetType::Table => "table",
            AssetType::Graphic => "graphic",
            AssetType::SupplementaryMaterial => "supplementaryMaterial",
            AssetType::StandaloneStrikingImage => "standaloneStrikingImage",
        }
    }

    /// The manuscript element names that imply each asset type.
    pub fn from_element_name(element_name: &str) -> Option<Self> {
        match element_name {
            "fig" => Some(AssetType::Figure),
            "table-wrap" => Some(AssetType::Table),
            "graphic" | "disp-formula" | "inline-formula" => Some(AssetType::Graphic),
            "supplementary-material" => Some(AssetType::SupplementaryMaterial),
            _ => None,
        }
    }

    /// The set of file roles this asset type may produce from
    /// [`AssetType::file_type`].
    pub fn supported_file_types(self) -> &'static [FileType] {
        match self {
            AssetType::Article => &[FileType::Manuscript, FileType::Printable],
            AssetType::Figure | AssetType::Table => &STANDARD_THUMBNAIL_FILE_TYPES,
            AssetType::Graphic => &[FileType::Original, FileType::Thumbnail],
            AssetType::SupplementaryMaterial => &[FileType::Supplementary],
            AssetType::StandaloneStrikingImage => &[FileType::StrikingImage],
        }
    }

    /// The subset of file roles an ingestible must supply for an asset of
    /// this type.
    pub fn required_file_types(self) -> &'static [FileType] {
        match self {
            AssetType::Article => &[FileType::Manuscript],
            AssetType::Figure | AssetType::Table | AssetType::Graphic => &[FileType::Original],
            AssetType::SupplementaryMaterial => &[FileType::Supplementary],
            AssetType::StandaloneStrikingImage => &[FileType::StrikingImage],
        }
    }

    /// Map a representation name to the file role it plays for this asset
    /// type. An unlisted name is a client error.
    pub fn file_type(self, repr_name: &str) -> Result<FileType> {
        let file_type = match self {
            AssetType::Article => match repr_name {
                "manuscript" => Some(FileType::Manuscript),
                "printable" => Some(FileType::Printable),
                _ => None,
            },
            AssetType::Figure | AssetType::Table => match repr_name {
                "TIF" | "TIFF" => Some(FileType::Original),
                "PNG_S" => Some(FileType::Small),
                "PNG_I" => Some(FileType::Inline),
                "PNG_M" => Some(FileType::Medium),
                "PNG_L" => Some(FileType::Large),
                _ => None,
            },
            AssetType::Graphic => match repr_name {
                "TIF" | "GIF" => Some(FileType::Original),
                "PNG" => Some(FileType::Thumbnail),
                _ => None,
            },
            // These accept any representation name; each asset of these
            // types holds a single file.
            AssetType::SupplementaryMaterial => Some(FileType::Supplementary),
            AssetType::StandaloneStrikingImage => Some(FileType::StrikingImage),
        };
        file_type.ok_or_else(|| {
            IngestError::InvalidPackage(format!(
                "Representation not matched to a file type for {}: {}",
                self.identifier(),
                repr_name
            ))
        })
    }
}

impl From<AssetType> for String {
    fn from(asset_type: AssetType) -> Self {
        asset_type.identifier().to_string()
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Determine an asset's type from the manuscript nodes that reference its
/// DOI.
pub fn classify_asset(asset: &ManifestAsset, refs: &AssetRefs) -> Result<AssetType> {
    if asset.tag == AssetTagName::Article {
        return Ok(AssetType::Article);
    }

    if !refs.contains(&asset.uri) {
        if asset.striking_image {
            return Ok(AssetType::StandaloneStrikingImage);
        }
        return Err(IngestError::InvalidPackage(format!(
            "Asset not mentioned in manuscript: {}",
            asset.uri
        )));
    }

    let mut identified: Option<AssetType> = None;
    for element_name in refs.element_names(&asset.uri) {
        let Some(candidate) = AssetType::from_element_name(element_name) else {
            continue;
        };
        match identified {
            None => identified = Some(candidate),
            Some(existing) if existing != candidate => {
                return Err(IngestError::InvalidPackage(format!(
                    "Ambiguous asset type for {}: {}, {}",
                    asset.uri,
                    existing.identifier(),
                    candidate.identifier()
                )));
            },
            Some(_) => {},
        }
    }

    identified.ok_or_else(|| {
        IngestError::InvalidPackage(format!("Asset type not recognized for {}", asset.uri))
    })
}

/// A lazy upload descriptor: which archive entry to read and how to store it.
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleFileInput {
    /// Archive entry name holding the bytes
    pub entry: String,
    /// Destination object-store key
    pub key: String,
    pub content_type: String,
    pub download_name: String,
}

/// The resolved output unit for one asset: its DOI, its type, and one file
/// descriptor per resolved role.
#[derive(Debug, Clone)]
pub struct ArticleItemInput {
    pub doi: Doi,
    pub asset_type: AssetType,
    pub files: BTreeMap<FileType, ArticleFileInput>,
}

/// The completed package for one ingestion: the article item, every other
/// asset item, and the ancillary files. Immutable once built.
#[derive(Debug, Clone)]
pub struct ArticlePackage {
    article_item: ArticleItemInput,
    asset_items: Vec<ArticleItemInput>,
    ancillary_files: Vec<ArticleFileInput>,
    striking_image_doi: Option<Doi>,
    bucket: String,
}

impl ArticlePackage {
    /// The article's own DOI.
    pub fn doi(&self) -> &Doi {
        &self.article_item.doi
    }

    /// All items: the article item first, then every asset item.
    pub fn all_items(&self) -> impl Iterator<Item = &ArticleItemInput> {
        std::iter::once(&self.article_item).chain(self.asset_items.iter())
    }

    pub fn ancillary_files(&self) -> &[ArticleFileInput] {
        &self.ancillary_files
    }

    /// The DOI of the asset the manifest flagged as the striking image.
    pub fn striking_image_doi(&self) -> Option<&Doi> {
        self.striking_image_doi.as_ref()
    }

    /// Destination object-store bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Builds an [`ArticlePackage`] from a parsed manifest and manuscript.
pub struct ArticlePackageBuilder<'a> {
    bucket: String,
    manifest: &'a Manifest,
    manuscript: &'a Manuscript,
}

impl<'a> ArticlePackageBuilder<'a> {
    pub fn new(
        bucket: impl Into<String>,
        manifest: &'a Manifest,
        manuscript: &'a Manuscript,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            manifest,
            manuscript,
        }
    }

    pub fn build(self) -> Result<ArticlePackage> {
        let article_item = self.build_article_item()?;
        let asset_items = self.build_asset_items()?;
        let ancillary_files = self
            .manifest
            .ancillary_files()
            .iter()
            .map(build_ancillary_input)
            .collect();

        Ok(ArticlePackage {
            article_item,
            asset_items,
            ancillary_files,
            striking_image_doi: self
                .manifest
                .striking_image_asset()
                .map(|asset| asset.uri.clone()),
            bucket: self.bucket,
        })
    }

    fn build_article_item(&self) -> Result<ArticleItemInput> {
        let article_asset = self.manifest.article_asset()?;
        let mut files = BTreeMap::new();
        for representation in &article_asset.representations {
            let file_type = AssetType::Article.file_type(&representation.name)?;
            let input = build_asset_input(&article_asset.uri, &representation.file);
            insert_unique(&mut files, &article_asset.uri, file_type, input)?;
        }
        if !files.contains_key(&FileType::Manuscript) {
            return Err(IngestError::MalformedManifest(
                "Article asset has no manuscript representation".to_string(),
            ));
        }
        Ok(ArticleItemInput {
            doi: article_asset.uri.clone(),
            asset_type: AssetType::Article,
            files,
        })
    }

    fn build_asset_items(&self) -> Result<Vec<ArticleItemInput>> {
        let mut items = Vec::new();
        for asset in self.manifest.assets() {
            let asset_type = classify_asset(asset, &self.manuscript.asset_refs)?;
            if asset_type == AssetType::Article {
                continue;
            }
            let mut files = BTreeMap::new();
            for representation in &asset.representations {
                let file_type = asset_type.file_type(&representation.name)?;
                let input = build_asset_input(&asset.uri, &representation.file);
                insert_unique(&mut files, &asset.uri, file_type, input)?;
            }
            items.push(ArticleItemInput {
                doi: asset.uri.clone(),
                asset_type,
                files,
            });
        }
        Ok(items)
    }
}

fn insert_unique(
    files: &mut BTreeMap<FileType, ArticleFileInput>,
    doi: &Doi,
    file_type: FileType,
    input: ArticleFileInput,
) -> Result<()> {
    if files.insert(file_type, input).is_some() {
        return Err(IngestError::InvalidPackage(format!(
            "Duplicate file type for asset {doi}: {file_type}"
        )));
    }
    Ok(())
}

fn build_asset_input(doi: &Doi, file: &ManifestFile) -> ArticleFileInput {
    let content_type = file
        .mimetype
        .clone()
        .unwrap_or_else(|| infer_content_type(&file.entry).to_string());
    ArticleFileInput {
        entry: file.entry.clone(),
        key: file.key.clone(),
        content_type,
        download_name: generate_download_name(doi, &file.entry),
    }
}

fn build_ancillary_input(file: &ManifestFile) -> ArticleFileInput {
    let content_type = file
        .mimetype
        .clone()
        .unwrap_or_else(|| infer_content_type(&file.entry).to_string());
    ArticleFileInput {
        entry: file.entry.clone(),
        key: file.key.clone(),
        content_type,
        // Ancillary files download under their original entry name.
        download_name: file.entry.clone(),
    }
}

/// The file name offered to readers downloading this file: the DOI's last
/// token plus the entry's extension, with thumbnail extensions like "PNG_S"
/// collapsed to "PNG".
fn generate_download_name(doi: &Doi, entry: &str) -> String {
    let extension = entry.rsplit('/').next().unwrap_or(entry);
    let extension = extension
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("");
    if extension.is_empty() {
        return doi.short_name().to_string();
    }
    format!("{}.{}", doi.short_name(), sanitize_png_extension(extension))
}

fn sanitize_png_extension(extension: &str) -> &str {
    let Some((prefix, rest)) = extension.split_at_checked(4) else {
        return extension;
    };
    if prefix.eq_ignore_ascii_case("png_")
        && !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        &extension[..3]
    } else {
        extension
    }
}
