//! Common identifier types used across Rhino

use serde::{Deserialize, Serialize};

/// A Digital Object Identifier naming an article or one of its assets.
///
/// DOIs arrive in several syntaxes ("info:doi/10.1371/...", "doi:10.1371/...",
/// or the bare name). All of them normalize to the bare name, and equality,
/// hashing, and ordering are defined on the normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Doi {
    name: String,
}

const DOI_SCHEMES: [&str; 2] = ["info:doi/", "doi:"];

impl Doi {
    /// Create a DOI from any accepted syntax, stripping a leading scheme.
    pub fn create(input: &str) -> Self {
        let name = DOI_SCHEMES
            .iter()
            .find_map(|scheme| input.strip_prefix(scheme))
            .unwrap_or(input);
        Self {
            name: name.to_string(),
        }
    }

    /// The bare DOI name, without any scheme prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The DOI in "info:doi/" URI syntax, as written in manifest files.
    pub fn as_uri(&self) -> String {
        format!("info:doi/{}", self.name)
    }

    /// The token after the last slash, e.g. "journal.pbio.0000001.g001".
    /// Used when generating download file names.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl std::fmt::Display for Doi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Identifies one ingestion of one article: the article DOI plus the
/// sequential ingestion number assigned at persistence time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestionId {
    pub doi: Doi,
    pub ingestion_number: i32,
}

impl IngestionId {
    pub fn new(doi: Doi, ingestion_number: i32) -> Self {
        Self {
            doi,
            ingestion_number,
        }
    }
}

impl std::fmt::Display for IngestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.doi, self.ingestion_number)
    }
}
