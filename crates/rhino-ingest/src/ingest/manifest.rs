// Manifest Parser
//
// Parses manifest.xml, the file inside an ingestion archive that declares
// every asset, each asset's representations, and any ancillary files:
//
//   <manifest>
//     <articleBundle>
//       <article uri="info:doi/10.1371/journal.pbio.0000001">
//         <representation name="manuscript" entry="manuscript.xml"
//                         mimetype="application/xml" key="..."/>
//         <representation name="printable" entry="print.pdf"/>
//       </article>
//       <object uri="info:doi/10.1371/journal.pbio.0000001.g001" strkImage="True">
//         <representation name="TIF" entry="fig1.tif"/>
//       </object>
//       <ancillary>
//         <file entry="data.csv" mimetype="text/csv"/>
//       </ancillary>
//     </articleBundle>
//   </manifest>
//
// Parsing is a pure transformation; nothing here touches the archive.

use crate::ingest::{IngestError, Result};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rhino_common::types::Doi;

/// One physical file declaration: an archive entry name, an optional
/// declared MIME type, and the destination storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub entry: String,
    pub mimetype: Option<String>,
    pub key: String,
}

/// A named variant of an asset's content ("manuscript", "TIF", "PNG_S", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub name: String,
    pub file: ManifestFile,
}

/// Which manifest tag declared an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetTagName {
    Article,
    Object,
}

/// A DOI-identified unit with an ordered set of representations.
#[derive(Debug, Clone)]
pub struct ManifestAsset {
    pub tag: AssetTagName,
    pub uri: Doi,
    pub striking_image: bool,
    pub representations: Vec<Representation>,
}

impl ManifestAsset {
    /// Look up a representation by its name.
    pub fn representation(&self, name: &str) -> Option<&Representation> {
        self.representations.iter().find(|r| r.name == name)
    }
}

/// The parsed manifest of an article ingestion archive.
#[derive(Debug, Clone)]
pub struct Manifest {
    assets: Vec<ManifestAsset>,
    ancillary: Vec<ManifestFile>,
}

impl Manifest {
    /// Parse a manifest document from raw bytes.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();

        let mut assets: Vec<ManifestAsset> = Vec::new();
        let mut ancillary: Vec<ManifestFile> = Vec::new();
        let mut current_asset: Option<ManifestAsset> = None;
        let mut in_ancillary = false;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| IngestError::MalformedManifest(e.to_string()))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(&event, Event::Empty(_));
                    match e.name().as_ref() {
                        b"article" | b"object" => {
                            let asset = parse_asset_start(e)?;
                            if is_empty {
                                assets.push(asset);
                            } else {
                                if current_asset.is_some() {
                                    return Err(IngestError::MalformedManifest(
                                        "Nested asset elements".to_string(),
                                    ));
                                }
                                current_asset = Some(asset);
                            }
                        },
                        b"representation" => {
                            let asset = current_asset.as_mut().ok_or_else(|| {
                                IngestError::MalformedManifest(
                                    "Representation outside of an asset element".to_string(),
                                )
                            })?;
                            asset.representations.push(parse_representation(e)?);
                        },
                        b"ancillary" => in_ancillary = true,
                        b"file" => {
                            if !in_ancillary {
                                return Err(IngestError::MalformedManifest(
                                    "File element outside of the ancillary section".to_string(),
                                ));
                            }
                            ancillary.push(parse_manifest_file(e, b"file")?);
                        },
                        _ => {},
                    }
                },
                Event::End(ref e) => match e.name().as_ref() {
                    b"article" | b"object" => {
                        if let Some(asset) = current_asset.take() {
                            assets.push(asset);
                        }
                    },
                    b"ancillary" => in_ancillary = false,
                    _ => {},
                },
                Event::Eof => {
                    if current_asset.is_some() {
                        return Err(IngestError::MalformedManifest(
                            "Document ends inside an asset element".to_string(),
                        ));
                    }
                    break;
                },
                _ => {},
            }
            buf.clear();
        }

        Ok(Self { assets, ancillary })
    }

    /// All declared assets, in manifest order. The article asset comes
    /// wherever the manifest put it.
    pub fn assets(&self) -> &[ManifestAsset] {
        &self.assets
    }

    /// The manifest's top-level article asset. The manifest must declare
    /// exactly one.
    pub fn article_asset(&self) -> Result<&ManifestAsset> {
        let mut articles = self
            .assets
            .iter()
            .filter(|a| a.tag == AssetTagName::Article);
        let first = articles.next().ok_or_else(|| {
            IngestError::MalformedManifest("Manifest has no article asset".to_string())
        })?;
        if articles.next().is_some() {
            return Err(IngestError::MalformedManifest(
                "Manifest has more than one article asset".to_string(),
            ));
        }
        Ok(first)
    }

    /// Files in the archive not tied to any asset.
    pub fn ancillary_files(&self) -> &[ManifestFile] {
        &self.ancillary
    }

    /// Every file the manifest mentions: all representations of all assets,
    /// then the ancillary files.
    pub fn manifest_files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.assets
            .iter()
            .flat_map(|a| a.representations.iter().map(|r| &r.file))
            .chain(self.ancillary.iter())
    }

    /// The asset flagged as the article's striking image, if any.
    pub fn striking_image_asset(&self) -> Option<&ManifestAsset> {
        self.assets.iter().find(|a| a.striking_image)
    }
}

fn parse_asset_start(e: &BytesStart<'_>) -> Result<ManifestAsset> {
    let tag = match e.name().as_ref() {
        b"article" => AssetTagName::Article,
        _ => AssetTagName::Object,
    };

    let mut uri = None;
    let mut striking_image = false;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| IngestError::MalformedManifest(e.to_string()))?;
        match attr.key.as_ref() {
            b"uri" => uri = Some(attr_text(&attr)?),
            b"strkImage" => striking_image = attr_text(&attr)?.eq_ignore_ascii_case("true"),
            _ => {},
        }
    }

    let uri = uri.ok_or_else(|| {
        IngestError::MalformedManifest("Asset element has no uri attribute".to_string())
    })?;

    Ok(ManifestAsset {
        tag,
        uri: Doi::create(&uri),
        striking_image,
        representations: Vec::new(),
    })
}

fn parse_representation(e: &BytesStart<'_>) -> Result<Representation> {
    let mut name = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| IngestError::MalformedManifest(e.to_string()))?;
        if attr.key.as_ref() == b"name" {
            name = Some(attr_text(&attr)?);
        }
    }
    let name = name.ok_or_else(|| {
        IngestError::MalformedManifest("Representation has no name attribute".to_string())
    })?;

    Ok(Representation {
        name,
        file: parse_manifest_file(e, b"representation")?,
    })
}

fn parse_manifest_file(e: &BytesStart<'_>, context: &[u8]) -> Result<ManifestFile> {
    let mut entry = None;
    let mut mimetype = None;
    let mut key = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| IngestError::MalformedManifest(e.to_string()))?;
        match attr.key.as_ref() {
            b"entry" => entry = Some(attr_text(&attr)?),
            b"mimetype" => mimetype = Some(attr_text(&attr)?),
            b"key" => key = Some(attr_text(&attr)?),
            _ => {},
        }
    }

    let entry = entry.ok_or_else(|| {
        IngestError::MalformedManifest(format!(
            "{} element has no entry attribute",
            String::from_utf8_lossy(context)
        ))
    })?;
    // The storage key defaults to the entry name when the manifest omits it.
    let key = key.unwrap_or_else(|| entry.clone());

    Ok(ManifestFile {
        entry,
        mimetype,
        key,
    })
}

fn attr_text(attr: &Attribute<'_>) -> Result<String> {
    attr.unescape_value()
        .map(|v| v.into_owned())
        .map_err(|e| IngestError::MalformedManifest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest>
  <articleBundle>
    <article uri="info:doi/10.1371/journal.pbio.0000001">
      <representation name="manuscript" entry="manuscript.xml" mimetype="application/xml" key="manuscript/pbio.0000001.xml"/>
      <representation name="printable" entry="print.pdf" mimetype="application/pdf"/>
    </article>
    <object uri="info:doi/10.1371/journal.pbio.0000001.g001" strkImage="True">
      <representation name="TIF" entry="fig1.tif"/>
      <representation name="PNG_S" entry="fig1_small.png"/>
    </object>
    <ancillary>
      <file entry="data.csv" mimetype="text/csv"/>
    </ancillary>
  </articleBundle>
</manifest>
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(manifest.assets().len(), 2);

        let article = manifest.article_asset().unwrap();
        assert_eq!(article.uri.name(), "10.1371/journal.pbio.0000001");
        assert_eq!(article.representations.len(), 2);

        let manuscript = article.representation("manuscript").unwrap();
        assert_eq!(manuscript.file.entry, "manuscript.xml");
        assert_eq!(manuscript.file.key, "manuscript/pbio.0000001.xml");
        assert_eq!(
            manuscript.file.mimetype.as_deref(),
            Some("application/xml")
        );

        let figure = &manifest.assets()[1];
        assert_eq!(figure.tag, AssetTagName::Object);
        assert!(figure.striking_image);
        assert_eq!(figure.representation("TIF").unwrap().file.entry, "fig1.tif");
    }

    #[test]
    fn test_key_defaults_to_entry() {
        let manifest = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        let figure = &manifest.assets()[1];
        assert_eq!(figure.representation("TIF").unwrap().file.key, "fig1.tif");
    }

    #[test]
    fn test_ancillary_files() {
        let manifest = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(manifest.ancillary_files().len(), 1);
        assert_eq!(manifest.ancillary_files()[0].entry, "data.csv");
    }

    #[test]
    fn test_manifest_files_covers_everything() {
        let manifest = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        let entries: Vec<&str> = manifest.manifest_files().map(|f| f.entry.as_str()).collect();
        assert_eq!(
            entries,
            vec![
                "manuscript.xml",
                "print.pdf",
                "fig1.tif",
                "fig1_small.png",
                "data.csv"
            ]
        );
    }

    #[test]
    fn test_striking_image_asset() {
        let manifest = Manifest::parse(SAMPLE.as_bytes()).unwrap();
        let strk = manifest.striking_image_asset().unwrap();
        assert_eq!(strk.uri.name(), "10.1371/journal.pbio.0000001.g001");
    }

    #[test]
    fn test_missing_article_asset() {
        let xml = r#"<manifest><articleBundle>
            <object uri="info:doi/10.1371/x.g001">
              <representation name="TIF" entry="fig1.tif"/>
            </object>
        </articleBundle></manifest>"#;
        let manifest = Manifest::parse(xml.as_bytes()).unwrap();
        let err = manifest.article_asset().unwrap_err();
        assert!(matches!(err, IngestError::MalformedManifest(_)));
        assert!(err.to_string().contains("no article asset"));
    }

    #[test]
    fn test_duplicate_article_asset() {
        let xml = r#"<manifest><articleBundle>
            <article uri="info:doi/10.1371/a"><representation name="manuscript" entry="a.xml"/></article>
            <article uri="info:doi/10.1371/b"><representation name="manuscript" entry="b.xml"/></article>
        </articleBundle></manifest>"#;
        let manifest = Manifest::parse(xml.as_bytes()).unwrap();
        let err = manifest.article_asset().unwrap_err();
        assert!(err.to_string().contains("more than one article asset"));
    }

    #[test]
    fn test_asset_without_uri_fails() {
        let xml = r#"<manifest><articleBundle>
            <object><representation name="TIF" entry="fig1.tif"/></object>
        </articleBundle></manifest>"#;
        let err = Manifest::parse(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedManifest(_)));
    }

    #[test]
    fn test_representation_without_entry_fails() {
        let xml = r#"<manifest><articleBundle>
            <object uri="info:doi/10.1371/x.g001"><representation name="TIF"/></object>
        </articleBundle></manifest>"#;
        let err = Manifest::parse(xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("entry attribute"));
    }

    #[test]
    fn test_truncated_document_fails() {
        let xml = r#"<manifest><articleBundle><article uri="info:doi/10.1371/a">"#;
        // quick-xml reports the dangling open tags at EOF
        assert!(Manifest::parse(xml.as_bytes()).is_err());
    }
}
