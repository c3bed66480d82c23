//! A WordprocessingML package opened for editing
//!
//! [`WordPackage`] unpacks the archive and parses the parts the stamper
//! edits into [`XmlTree`]s. Everything else stays as raw bytes in the
//! archive. Parsed parts are written back when the package is serialized.

use std::io::{Seek, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::archive::OoxmlArchive;
use crate::error::Result;
use crate::media::content_type_for_extension;
use crate::relationships::Relationships;
use crate::tree::XmlTree;

/// Main document part
pub const DOCUMENT_PART: &str = "word/document.xml";
/// Relationships of the main document part
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
/// Comment bodies
pub const COMMENTS_PART: &str = "word/comments.xml";
/// Footnote bodies
pub const FOOTNOTES_PART: &str = "word/footnotes.xml";
/// Endnote bodies
pub const ENDNOTES_PART: &str = "word/endnotes.xml";
/// Package content type registry
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Folder of the main document; relationship targets are relative to it
const WORD_FOLDER: &str = "word/";

/// A header or footer part
#[derive(Debug, Clone)]
pub struct HeaderFooterPart {
    /// Archive path, e.g. `word/header1.xml`
    pub path: String,
    /// Parsed content
    pub tree: XmlTree,
}

/// An unpacked DOCX package with its editable parts parsed
#[derive(Debug, Clone)]
pub struct WordPackage {
    archive: OoxmlArchive,
    relationships: Relationships,
    /// `word/document.xml`
    pub document: XmlTree,
    /// `word/comments.xml`, when the package has comments
    pub comments: Option<XmlTree>,
    /// `word/footnotes.xml`
    pub footnotes: Option<XmlTree>,
    /// `word/endnotes.xml`
    pub endnotes: Option<XmlTree>,
    /// Header and footer parts referenced by the main document
    pub headers_footers: Vec<HeaderFooterPart>,
}

impl WordPackage {
    /// Open a package from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_archive(OoxmlArchive::open(path)?)
    }

    /// Open a package held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_archive(OoxmlArchive::from_bytes(bytes)?)
    }

    /// Parse the editable parts of an unpacked archive
    pub fn from_archive(archive: OoxmlArchive) -> Result<Self> {
        let document = XmlTree::parse(archive.require(DOCUMENT_PART)?)?;
        let relationships = match archive.get(DOCUMENT_RELS_PART) {
            Some(bytes) => Relationships::parse(bytes)?,
            None => Relationships::new(),
        };

        let optional = |path: &str| -> Result<Option<XmlTree>> {
            archive.get(path).map(XmlTree::parse).transpose()
        };
        let comments = optional(COMMENTS_PART)?;
        let footnotes = optional(FOOTNOTES_PART)?;
        let endnotes = optional(ENDNOTES_PART)?;

        let mut headers_footers = Vec::new();
        let targets = relationships
            .targets_of_type(Relationships::TYPE_HEADER)
            .chain(relationships.targets_of_type(Relationships::TYPE_FOOTER));
        for target in targets {
            let path = part_path(target);
            if let Some(bytes) = archive.get(&path) {
                headers_footers.push(HeaderFooterPart {
                    tree: XmlTree::parse(bytes)?,
                    path,
                });
            }
        }

        debug!(
            comments = comments.is_some(),
            headers_footers = headers_footers.len(),
            "opened word package"
        );

        Ok(Self {
            archive,
            relationships,
            document,
            comments,
            footnotes,
            endnotes,
            headers_footers,
        })
    }

    /// The underlying archive (parsed parts are stale until serialization)
    pub fn archive(&self) -> &OoxmlArchive {
        &self.archive
    }

    /// Relationships of the main document part
    pub fn relationships(&self) -> &Relationships {
        &self.relationships
    }

    /// Archive path and bytes of the media an `r:embed` id points at
    pub fn media(&self, rel_id: &str) -> Option<(String, &[u8])> {
        let rel = self.relationships.get(rel_id)?;
        if rel.rel_type != Relationships::TYPE_IMAGE || rel.target_mode.is_some() {
            return None;
        }
        let path = part_path(&rel.target);
        let bytes = self.archive.get(&path)?;
        Some((path, bytes))
    }

    /// Store an image and return the id of the relationship pointing at it
    ///
    /// Media is named after a digest of its content, so adding the same
    /// bytes twice reuses one part and one relationship.
    pub fn add_media(&mut self, bytes: &[u8], extension: &str) -> String {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        let digest = Sha256::digest(bytes);
        let hash: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        let target = format!("media/stamp_{hash}.{extension}");

        if let Some(id) = self.relationships.find(&target, Relationships::TYPE_IMAGE) {
            return id.to_string();
        }

        self.archive.set(part_path(&target), bytes.to_vec());
        self.register_content_type(&extension);
        let id = self.relationships.add(target, Relationships::TYPE_IMAGE);
        debug!(rel_id = %id, extension = %extension, "added media");
        id
    }

    /// Register a `<Default>` content type for an extension if it is missing
    fn register_content_type(&mut self, extension: &str) {
        let Some(content_types) = self.archive.get_string(CONTENT_TYPES_PART) else {
            return;
        };
        let marker = format!("extension=\"{extension}\"");
        if content_types.to_ascii_lowercase().contains(&marker) {
            return;
        }
        let updated = content_types.replace(
            "</Types>",
            &format!(
                "<Default Extension=\"{extension}\" ContentType=\"{}\"/></Types>",
                content_type_for_extension(extension)
            ),
        );
        self.archive.set_string(CONTENT_TYPES_PART, updated);
    }

    /// Write every parsed part back into the archive
    pub fn flush(&mut self) -> Result<()> {
        self.archive.set(DOCUMENT_PART, self.document.to_xml()?);
        if let Some(comments) = &self.comments {
            self.archive.set(COMMENTS_PART, comments.to_xml()?);
        }
        if let Some(footnotes) = &self.footnotes {
            self.archive.set(FOOTNOTES_PART, footnotes.to_xml()?);
        }
        if let Some(endnotes) = &self.endnotes {
            self.archive.set(ENDNOTES_PART, endnotes.to_xml()?);
        }
        for part in &self.headers_footers {
            self.archive.set(part.path.clone(), part.tree.to_xml()?);
        }
        if self.archive.contains(DOCUMENT_RELS_PART) || !self.relationships.is_empty() {
            self.archive
                .set_string(DOCUMENT_RELS_PART, self.relationships.to_xml());
        }
        Ok(())
    }

    /// Serialize the package into bytes
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.flush()?;
        self.archive.to_bytes()
    }

    /// Serialize the package into any seekable writer
    pub fn write_to<W: Write + Seek>(&mut self, writer: W) -> Result<()> {
        self.flush()?;
        self.archive.write_to(writer)
    }

    /// Serialize the package to disk
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.flush()?;
        self.archive.write_to_file(path)
    }
}

/// Archive path of a target relative to the main document folder
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{WORD_FOLDER}{target}"),
    }
}
