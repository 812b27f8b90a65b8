// Archive abstraction over a .zip ingestion package
//
// Entries are read eagerly into memory when the archive is opened; an
// ingestion package is a manuscript plus a handful of figure/supplementary
// files, well within memory. Entry names are case-sensitively unique (zip
// semantics) and the map is ordered so iteration is deterministic.

use crate::ingest::{IngestError, Result};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::debug;

/// An opaque, named bundle of entries, read-only once constructed.
#[derive(Debug, Clone)]
pub struct Archive {
    name: String,
    entries: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    /// Read a zip archive from a file on disk.
    pub fn open_zip_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.zip".to_string());
        let file = std::fs::File::open(path)?;
        Self::read_zip(name, file)
    }

    /// Read a zip archive from any seekable stream.
    pub fn read_zip(name: impl Into<String>, reader: impl Read + Seek) -> Result<Self> {
        let name = name.into();
        let mut zip = zip::ZipArchive::new(reader)?;

        let mut entries = BTreeMap::new();
        for index in 0..zip.len() {
            let mut file = zip.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let entry_name = file.name().to_string();
            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)?;
            entries.insert(entry_name, content);
        }

        debug!(archive = %name, entries = entries.len(), "Read zip archive");
        Ok(Self { name, entries })
    }

    /// Read a zip archive from an in-memory buffer.
    pub fn read_zip_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        Self::read_zip(name, Cursor::new(bytes))
    }

    /// Build an archive directly from named entries (used by tests and by
    /// the repack operation).
    pub fn from_entries(
        name: impl Into<String>,
        entries: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Self {
        Self {
            name: name.into(),
            entries: entries.into_iter().collect(),
        }
    }

    /// The name of the zip file this archive represents.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterate over the entry names, in sorted order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains_entry(&self, entry_name: &str) -> bool {
        self.entries.contains_key(entry_name)
    }

    /// The bytes of one entry. The entry must exist.
    pub fn read_entry(&self, entry_name: &str) -> Result<&[u8]> {
        self.entries
            .get(entry_name)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                IngestError::Archive(format!(
                    "Archive does not contain an entry named: {entry_name}"
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the archive out as a zip stream.
    pub fn write_zip(&self, writer: impl Write + Seek) -> Result<()> {
        let mut zip = zip::ZipWriter::new(writer);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (entry_name, content) in &self.entries {
            zip.start_file(entry_name, options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }
}
