// Manuscript Parser
//
// Parses the JATS/NLM manuscript XML in a single pass, producing:
//
// 1. ArticleMetadata: DOI, title, article type, journal e-ISSN, publication
//    date, plus optional revision date and publication stage from the
//    custom-meta group.
// 2. AssetRefs: a multimap from asset DOI to the manuscript elements that
//    referenced it (fig, table-wrap, graphic, disp-formula, inline-formula,
//    supplementary-material). fig and table-wrap carry their DOI in an
//    <object-id pub-id-type="doi"> child; the others carry it in an
//    xlink:href attribute, possibly on a nested element such as
//    <inline-graphic>. A reference element nested inside another reference
//    element (a <graphic> inside its <fig>) is not recorded separately.
//
// All failures here are client errors: the submitted XML was invalid.

use crate::ingest::{IngestError, Result};
use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rhino_common::types::Doi;
use std::collections::HashMap;
use tracing::warn;

/// Metadata extracted from the manuscript front matter.
#[derive(Debug, Clone)]
pub struct ArticleMetadata {
    pub doi: Doi,
    pub title: String,
    pub article_type: String,
    pub eissn: String,
    pub publication_date: NaiveDate,
    pub revision_date: Option<NaiveDate>,
    pub publication_stage: Option<String>,
}

/// Asset-reference multimap: DOI -> element names that referenced it, with
/// DOIs kept in document order.
#[derive(Debug, Clone, Default)]
pub struct AssetRefs {
    order: Vec<Doi>,
    nodes: HashMap<Doi, Vec<String>>,
}

impl AssetRefs {
    pub(crate) fn insert(&mut self, doi: Doi, element_name: String) {
        let entry = self.nodes.entry(doi.clone()).or_default();
        if entry.is_empty() {
            self.order.push(doi);
        }
        entry.push(element_name);
    }

    /// Asset DOIs in the order they first appear in the document.
    pub fn dois(&self) -> impl Iterator<Item = &Doi> {
        self.order.iter()
    }

    pub fn contains(&self, doi: &Doi) -> bool {
        self.nodes.contains_key(doi)
    }

    /// The element names that referenced a DOI. Empty if the DOI was never
    /// referenced.
    pub fn element_names(&self, doi: &Doi) -> &[String] {
        self.nodes.get(doi).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of reference nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A parsed manuscript: front-matter metadata plus body asset references.
#[derive(Debug, Clone)]
pub struct Manuscript {
    pub metadata: ArticleMetadata,
    pub asset_refs: AssetRefs,
}

// Reference elements that carry their DOI in an <object-id> child.
const ASSET_WITH_OBJECT_ID: [&str; 2] = ["fig", "table-wrap"];
// Reference elements that carry their DOI in an xlink:href attribute.
const ASSET_WITH_HREF: [&str; 4] = [
    "graphic",
    "disp-formula",
    "inline-formula",
    "supplementary-material",
];

fn is_reference_element(name: &str) -> bool {
    ASSET_WITH_OBJECT_ID.contains(&name) || ASSET_WITH_HREF.contains(&name)
}

/// What scalar text the parser is currently accumulating, together with the
/// element depth at which accumulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Doi,
    Title,
    Eissn,
    Year,
    Month,
    Day,
    MetaName,
    MetaValue,
    ObjectIdDoi,
}

/// One open reference element in the body. Only the outermost frame is
/// recorded; nested frames exist to keep the stack balanced.
#[derive(Debug)]
struct RefFrame {
    element: String,
    doi: Option<String>,
    recorded: bool,
}

#[derive(Debug, Default)]
struct ParseState {
    path: Vec<String>,
    capture: Option<(Capture, usize)>,
    text: String,

    doi: Option<String>,
    title: Option<String>,
    article_type: Option<String>,
    eissn: Option<String>,
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
    in_epub_date: bool,
    meta_name: Option<String>,
    meta_value: Option<String>,
    revision_date: Option<String>,
    publication_stage: Option<String>,

    ref_stack: Vec<RefFrame>,
    refs: AssetRefs,
}

impl Manuscript {
    /// Parse a manuscript document from raw bytes.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut state = ParseState::default();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| IngestError::InvalidManuscript(e.to_string()))?;
            match event {
                Event::Start(ref e) => {
                    let name = element_name(e);
                    state.path.push(name.clone());
                    state.on_element_start(&name, e, false)?;
                },
                Event::Empty(ref e) => {
                    let name = element_name(e);
                    state.path.push(name.clone());
                    state.on_element_start(&name, e, true)?;
                    // A self-closing reference element never pushed a frame,
                    // so only the non-frame end bookkeeping runs here.
                    if name == "pub-date" {
                        state.in_epub_date = false;
                    }
                    state.path.pop();
                    if let Some((_, depth)) = state.capture {
                        if state.path.len() < depth {
                            state.commit_capture();
                        }
                    }
                },
                Event::End(ref e) => {
                    let name =
                        String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                    state.on_element_end(&name);
                    state.path.pop();
                    if let Some((_, depth)) = state.capture {
                        if state.path.len() < depth {
                            state.commit_capture();
                        }
                    }
                },
                Event::Text(ref t) => {
                    if state.capture.is_some() {
                        let text = t
                            .unescape()
                            .map_err(|e| IngestError::InvalidManuscript(e.to_string()))?;
                        state.text.push_str(&text);
                    }
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }

        let refs = std::mem::take(&mut state.refs);
        let metadata = state.build_metadata()?;
        Ok(Self {
            metadata,
            asset_refs: refs,
        })
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned()
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| IngestError::InvalidManuscript(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| IngestError::InvalidManuscript(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

impl ParseState {
    fn path_is(&self, expected: &[&str]) -> bool {
        self.path.len() == expected.len()
            && self.path.iter().map(String::as_str).eq(expected.iter().copied())
    }

    fn begin_capture(&mut self, capture: Capture) {
        self.capture = Some((capture, self.path.len()));
        self.text.clear();
    }

    fn on_element_start(
        &mut self,
        name: &str,
        e: &BytesStart<'_>,
        self_closing: bool,
    ) -> Result<()> {
        // Root element attribute
        if self.path_is(&["article"]) {
            self.article_type = attr_value(e, b"article-type")?;
        }

        // Front-matter scalars
        if self.path_is(&["article", "front", "article-meta", "article-id"])
            && attr_value(e, b"pub-id-type")?.as_deref() == Some("doi")
        {
            self.begin_capture(Capture::Doi);
        } else if self.path_is(&[
            "article",
            "front",
            "article-meta",
            "title-group",
            "article-title",
        ]) {
            self.begin_capture(Capture::Title);
        } else if self.path_is(&["article", "front", "journal-meta", "issn"])
            && attr_value(e, b"pub-type")?.as_deref() == Some("epub")
        {
            self.begin_capture(Capture::Eissn);
        } else if self.path_is(&["article", "front", "article-meta", "pub-date"]) {
            self.in_epub_date = attr_value(e, b"pub-type")?.as_deref() == Some("epub");
        } else if self.in_epub_date && self.path.len() == 5 {
            match name {
                "year" => self.begin_capture(Capture::Year),
                "month" => self.begin_capture(Capture::Month),
                "day" => self.begin_capture(Capture::Day),
                _ => {},
            }
        } else if is_custom_meta_child(&self.path, "meta-name") {
            self.begin_capture(Capture::MetaName);
        } else if is_custom_meta_child(&self.path, "meta-value") {
            self.begin_capture(Capture::MetaValue);
        }

        // Body asset references
        if is_reference_element(name) {
            let recorded = self.ref_stack.is_empty();
            let mut frame = RefFrame {
                element: name.to_string(),
                doi: None,
                recorded,
            };
            if ASSET_WITH_HREF.contains(&name) {
                frame.doi = attr_value(e, b"xlink:href")?;
            }
            // A nested reference node can still be the outer node's DOI
            // source, e.g. a located <graphic> inside an href-carrying
            // wrapper that omitted its own attribute.
            if !recorded {
                self.donate_href_to_outer(frame.doi.clone());
            }
            if self_closing {
                // No children will follow, so the frame resolves immediately.
                self.resolve_frame(frame);
            } else {
                self.ref_stack.push(frame);
            }
            return Ok(());
        }

        // Inside an open reference element, look for its DOI source.
        if !self.ref_stack.is_empty() {
            let outer_element = self.ref_stack[0].element.clone();
            if self.ref_stack[0].doi.is_none() {
                if ASSET_WITH_OBJECT_ID.contains(&outer_element.as_str())
                    && name == "object-id"
                    && attr_value(e, b"pub-id-type")?.as_deref() == Some("doi")
                {
                    self.begin_capture(Capture::ObjectIdDoi);
                } else if ASSET_WITH_HREF.contains(&outer_element.as_str()) {
                    // e.g. <inline-formula><inline-graphic xlink:href="..."/>
                    self.donate_href_to_outer(attr_value(e, b"xlink:href")?);
                }
            }
        }

        Ok(())
    }

    fn donate_href_to_outer(&mut self, href: Option<String>) {
        let Some(href) = href else { return };
        if let Some(outer) = self.ref_stack.first_mut() {
            if outer.doi.is_none() && ASSET_WITH_HREF.contains(&outer.element.as_str()) {
                outer.doi = Some(href);
            }
        }
    }

    fn on_element_end(&mut self, name: &str) {
        if name == "pub-date" {
            self.in_epub_date = false;
        }

        if is_reference_element(name) {
            if let Some(position) = self
                .ref_stack
                .iter()
                .rposition(|frame| frame.element == name)
            {
                let frame = self.ref_stack.remove(position);
                self.resolve_frame(frame);
            }
        }
    }

    fn resolve_frame(&mut self, frame: RefFrame) {
        if !frame.recorded {
            return;
        }
        match frame.doi {
            Some(doi) => {
                self.refs.insert(Doi::create(doi.trim()), frame.element);
            },
            None => {
                warn!(element = %frame.element, "Asset reference node has no DOI; skipping");
            },
        }
    }

    fn commit_capture(&mut self) {
        let Some((capture, _)) = self.capture.take() else {
            return;
        };
        let text = self.text.trim().to_string();
        self.text.clear();

        match capture {
            Capture::Doi => self.doi = Some(text),
            Capture::Title => self.title = Some(text),
            Capture::Eissn => self.eissn = Some(text),
            Capture::Year => self.year = Some(text),
            Capture::Month => self.month = Some(text),
            Capture::Day => self.day = Some(text),
            Capture::MetaName => self.meta_name = Some(text),
            Capture::MetaValue => {
                self.meta_value = Some(text);
                self.commit_custom_meta();
            },
            Capture::ObjectIdDoi => {
                if let Some(outer) = self.ref_stack.first_mut() {
                    if outer.doi.is_none() {
                        outer.doi = Some(text);
                    }
                }
            },
        }
    }

    fn commit_custom_meta(&mut self) {
        let (Some(name), Some(value)) = (self.meta_name.take(), self.meta_value.take()) else {
            return;
        };
        match name.as_str() {
            "revision-date" => self.revision_date = Some(value),
            "publication-stage" => self.publication_stage = Some(value),
            _ => {},
        }
    }

    fn build_metadata(self) -> Result<ArticleMetadata> {
        // Missing DOI is fatal; the rest are required but reported by field.
        let doi = self
            .doi
            .filter(|d| !d.is_empty())
            .ok_or_else(|| IngestError::InvalidManuscript("DOI not found".to_string()))?;
        let title = self
            .title
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IngestError::InvalidManuscript("Article title not found".to_string()))?;
        let article_type = self.article_type.filter(|t| !t.is_empty()).ok_or_else(|| {
            IngestError::InvalidManuscript("article-type attribute not found".to_string())
        })?;
        let eissn = self.eissn.filter(|e| !e.is_empty()).ok_or_else(|| {
            IngestError::InvalidManuscript("Journal eIssn (epub issn) not found".to_string())
        })?;

        let publication_date = parse_date_fields(self.year, self.month, self.day)?;
        let revision_date = self
            .revision_date
            .map(|value| {
                NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
                    IngestError::InvalidManuscript(format!("Invalid revision-date: {value}"))
                })
            })
            .transpose()?;

        Ok(ArticleMetadata {
            doi: Doi::create(&doi),
            title,
            article_type,
            eissn,
            publication_date,
            revision_date,
            publication_stage: self.publication_stage,
        })
    }
}

fn parse_date_fields(
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
) -> Result<NaiveDate> {
    let (Some(year), Some(month), Some(day)) = (year, month, day) else {
        return Err(IngestError::InvalidManuscript(
            "Publication date (epub pub-date) not found".to_string(),
        ));
    };
    let parse = |field: &str, value: &str| {
        value.parse::<u32>().map_err(|_| {
            IngestError::InvalidManuscript(format!(
                "Expected a number for date field {field}: {value}"
            ))
        })
    };
    let year = parse("year", &year)? as i32;
    let month = parse("month", &month)?;
    let day = parse("day", &day)?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        IngestError::InvalidManuscript(format!("Invalid publication date: {year}-{month}-{day}"))
    })
}

// The custom-meta group may appear with or without the custom-meta-group
// wrapper, so only the immediate parent is checked.
fn is_custom_meta_child(path: &[String], child: &str) -> bool {
    let n = path.len();
    n >= 2 && path[n - 1] == child && path[n - 2] == "custom-meta"
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<article xmlns:xlink="http://www.w3.org/1999/xlink" article-type="research-article">
  <front>
    <journal-meta>
      <issn pub-type="ppub">1544-9165</issn>
      <issn pub-type="epub">1545-7885</issn>
    </journal-meta>
    <article-meta>
      <article-id pub-id-type="doi">10.1371/journal.pbio.0000001</article-id>
      <title-group>
        <article-title>A Study of <italic>Caenorhabditis</italic> Behavior</article-title>
      </title-group>
      <pub-date pub-type="epub">
        <day>13</day>
        <month>10</month>
        <year>2003</year>
      </pub-date>
      <custom-meta-group>
        <custom-meta>
          <meta-name>revision-date</meta-name>
          <meta-value>2003-11-04</meta-value>
        </custom-meta>
        <custom-meta>
          <meta-name>publication-stage</meta-name>
          <meta-value>vor-update-to-uncorrected-proof</meta-value>
        </custom-meta>
      </custom-meta-group>
    </article-meta>
  </front>
  <body>
    <fig id="pbio-0000001-g001">
      <object-id pub-id-type="doi">10.1371/journal.pbio.0000001.g001</object-id>
      <graphic xlink:href="info:doi/10.1371/journal.pbio.0000001.g001"/>
    </fig>
    <p>See <inline-formula><inline-graphic xlink:href="info:doi/10.1371/journal.pbio.0000001.e001"/></inline-formula>.</p>
    <supplementary-material xlink:href="info:doi/10.1371/journal.pbio.0000001.sd001" mimetype="application/zip"/>
  </body>
</article>
"#;

    #[test]
    fn test_parse_metadata() {
        let manuscript = Manuscript::parse(SAMPLE.as_bytes()).unwrap();
        let meta = &manuscript.metadata;
        assert_eq!(meta.doi.name(), "10.1371/journal.pbio.0000001");
        assert_eq!(meta.title, "A Study of Caenorhabditis Behavior");
        assert_eq!(meta.article_type, "research-article");
        assert_eq!(meta.eissn, "1545-7885");
        assert_eq!(
            meta.publication_date,
            NaiveDate::from_ymd_opt(2003, 10, 13).unwrap()
        );
        assert_eq!(
            meta.revision_date,
            Some(NaiveDate::from_ymd_opt(2003, 11, 4).unwrap())
        );
        assert_eq!(
            meta.publication_stage.as_deref(),
            Some("vor-update-to-uncorrected-proof")
        );
    }

    #[test]
    fn test_asset_refs() {
        let manuscript = Manuscript::parse(SAMPLE.as_bytes()).unwrap();
        let refs = &manuscript.asset_refs;

        let dois: Vec<&str> = refs.dois().map(Doi::name).collect();
        assert_eq!(
            dois,
            vec![
                "10.1371/journal.pbio.0000001.g001",
                "10.1371/journal.pbio.0000001.e001",
                "10.1371/journal.pbio.0000001.sd001",
            ]
        );

        let fig_doi = Doi::create("10.1371/journal.pbio.0000001.g001");
        assert_eq!(refs.element_names(&fig_doi), &["fig".to_string()]);

        let formula_doi = Doi::create("10.1371/journal.pbio.0000001.e001");
        assert_eq!(
            refs.element_names(&formula_doi),
            &["inline-formula".to_string()]
        );

        let supp_doi = Doi::create("10.1371/journal.pbio.0000001.sd001");
        assert_eq!(
            refs.element_names(&supp_doi),
            &["supplementary-material".to_string()]
        );
    }

    #[test]
    fn test_nested_graphic_is_not_recorded_separately() {
        // The <graphic> inside the <fig> must not produce a second node for
        // the figure DOI, or classification would see fig + graphic and call
        // the asset ambiguous.
        let manuscript = Manuscript::parse(SAMPLE.as_bytes()).unwrap();
        let fig_doi = Doi::create("10.1371/journal.pbio.0000001.g001");
        assert_eq!(manuscript.asset_refs.element_names(&fig_doi).len(), 1);
    }

    #[test]
    fn test_multiple_nodes_same_doi() {
        let xml = r#"<article xmlns:xlink="http://www.w3.org/1999/xlink" article-type="research-article">
  <front>
    <journal-meta><issn pub-type="epub">1545-7885</issn></journal-meta>
    <article-meta>
      <article-id pub-id-type="doi">10.1371/journal.pbio.0000001</article-id>
      <title-group><article-title>T</article-title></title-group>
      <pub-date pub-type="epub"><day>1</day><month>1</month><year>2003</year></pub-date>
    </article-meta>
  </front>
  <body>
    <fig><object-id pub-id-type="doi">10.1371/journal.pbio.0000001.t001</object-id></fig>
    <table-wrap><object-id pub-id-type="doi">10.1371/journal.pbio.0000001.t001</object-id></table-wrap>
  </body>
</article>"#;
        let manuscript = Manuscript::parse(xml.as_bytes()).unwrap();
        let doi = Doi::create("10.1371/journal.pbio.0000001.t001");
        assert_eq!(
            manuscript.asset_refs.element_names(&doi),
            &["fig".to_string(), "table-wrap".to_string()]
        );
        assert_eq!(manuscript.asset_refs.node_count(), 2);
    }

    #[test]
    fn test_missing_doi_is_fatal() {
        let xml = r#"<article article-type="research-article">
  <front>
    <journal-meta><issn pub-type="epub">1545-7885</issn></journal-meta>
    <article-meta>
      <title-group><article-title>T</article-title></title-group>
      <pub-date pub-type="epub"><day>1</day><month>1</month><year>2003</year></pub-date>
    </article-meta>
  </front>
</article>"#;
        let err = Manuscript::parse(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidManuscript(_)));
        assert!(err.to_string().contains("DOI not found"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_missing_eissn_reported() {
        let xml = r#"<article article-type="research-article">
  <front>
    <article-meta>
      <article-id pub-id-type="doi">10.1371/journal.pbio.0000001</article-id>
      <title-group><article-title>T</article-title></title-group>
      <pub-date pub-type="epub"><day>1</day><month>1</month><year>2003</year></pub-date>
    </article-meta>
  </front>
</article>"#;
        let err = Manuscript::parse(xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("eIssn"));
    }

    #[test]
    fn test_non_numeric_date_field() {
        let xml = r#"<article article-type="research-article">
  <front>
    <journal-meta><issn pub-type="epub">1545-7885</issn></journal-meta>
    <article-meta>
      <article-id pub-id-type="doi">10.1371/journal.pbio.0000001</article-id>
      <title-group><article-title>T</article-title></title-group>
      <pub-date pub-type="epub"><day>1</day><month>October</month><year>2003</year></pub-date>
    </article-meta>
  </front>
</article>"#;
        let err = Manuscript::parse(xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("date field month"));
    }

    #[test]
    fn test_invalid_xml_is_client_error() {
        let err = Manuscript::parse(b"<article><unclosed").unwrap_err();
        assert!(matches!(err, IngestError::InvalidManuscript(_)));
    }
}
