//! Shared test fixtures for docstamp crates
//!
//! [`DocxBuilder`] assembles a minimal but valid DOCX package in memory from
//! body XML plus optional comments, footnotes and headers. The free functions
//! produce the WordprocessingML snippets templates are made of.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Namespace declarations placed on every generated root element
pub const NAMESPACES: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#
);

/// Builder for in-memory DOCX fixtures
#[derive(Debug, Clone, Default)]
pub struct DocxBuilder {
    body: String,
    comments: Vec<(u32, String)>,
    footnotes: Vec<(u32, String)>,
    headers: Vec<String>,
    media: Vec<(String, Vec<u8>)>,
}

impl DocxBuilder {
    /// Start a package whose `<w:body>` holds `body`
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Add a comment body holding `text` as a single paragraph
    pub fn comment(mut self, id: u32, text: &str) -> Self {
        self.comments.push((id, text.to_string()));
        self
    }

    /// Add a normal footnote holding `text`
    pub fn footnote(mut self, id: u32, text: &str) -> Self {
        self.footnotes.push((id, text.to_string()));
        self
    }

    /// Add a header part (`word/header<n>.xml`) holding `body`
    pub fn header(mut self, body: impl Into<String>) -> Self {
        self.headers.push(body.into());
        self
    }

    /// Add an image under `word/media/<name>`, referenced as `rIdImg<n>`
    /// in insertion order starting at 1
    pub fn image(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.media.push((name.to_string(), bytes));
        self
    }

    /// Assemble the ZIP package
    pub fn build(&self) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        let mut overrides = String::from(
            r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        );
        let mut rels = String::new();

        if !self.comments.is_empty() {
            overrides.push_str(r#"<Override PartName="/word/comments.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml"/>"#);
            rels.push_str(r#"<Relationship Id="rIdComments" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments" Target="comments.xml"/>"#);
        }
        if !self.footnotes.is_empty() {
            overrides.push_str(r#"<Override PartName="/word/footnotes.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.footnotes+xml"/>"#);
            rels.push_str(r#"<Relationship Id="rIdFootnotes" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footnotes" Target="footnotes.xml"/>"#);
        }
        for index in 1..=self.headers.len() {
            overrides.push_str(&format!(r#"<Override PartName="/word/header{index}.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/>"#));
            rels.push_str(&format!(r#"<Relationship Id="rIdHeader{index}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header{index}.xml"/>"#));
        }
        for (index, (name, _)) in self.media.iter().enumerate() {
            rels.push_str(&format!(
                r#"<Relationship Id="rIdImg{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{name}"/>"#,
                index + 1
            ));
        }

        zip.start_file("[Content_Types].xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
        )
        .unwrap();

        zip.start_file("_rels/.rels", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
        )
        .unwrap();

        zip.start_file("word/_rels/document.xml.rels", options)
            .unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        )
        .unwrap();

        zip.start_file("word/document.xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document {NAMESPACES}><w:body>{}</w:body></w:document>"#,
            self.body
        )
        .unwrap();

        if !self.comments.is_empty() {
            let bodies: String = self
                .comments
                .iter()
                .map(|(id, text)| {
                    format!(
                        r#"<w:comment w:id="{id}" w:author="docstamp" w:initials="ds">{}</w:comment>"#,
                        paragraph(text)
                    )
                })
                .collect();
            zip.start_file("word/comments.xml", options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:comments {NAMESPACES}>{bodies}</w:comments>"#
            )
            .unwrap();
        }

        if !self.footnotes.is_empty() {
            let notes: String = self
                .footnotes
                .iter()
                .map(|(id, text)| format!(r#"<w:footnote w:id="{id}">{}</w:footnote>"#, paragraph(text)))
                .collect();
            zip.start_file("word/footnotes.xml", options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:footnotes {NAMESPACES}><w:footnote w:type="separator" w:id="-1"><w:p><w:r><w:separator/></w:r></w:p></w:footnote><w:footnote w:type="continuationSeparator" w:id="0"><w:p><w:r><w:continuationSeparator/></w:r></w:p></w:footnote>{notes}</w:footnotes>"#
            )
            .unwrap();
        }

        for (index, header) in self.headers.iter().enumerate() {
            zip.start_file(format!("word/header{}.xml", index + 1), options)
                .unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr {NAMESPACES}>{header}</w:hdr>"#
            )
            .unwrap();
        }

        for (name, bytes) in &self.media {
            zip.start_file(format!("word/media/{name}"), options)
                .unwrap();
            zip.write_all(bytes).unwrap();
        }

        zip.finish().unwrap();
        buffer.into_inner()
    }
}

/// Escape character data for inclusion in a snippet
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `<w:r>` holding `text`
pub fn run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, escape(text))
}

/// `<w:r>` holding bold `text`
pub fn bold_run(text: &str) -> String {
    format!(
        r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
        escape(text)
    )
}

/// `<w:p>` holding a single run of `text`
pub fn paragraph(text: &str) -> String {
    format!("<w:p>{}</w:p>", run(text))
}

/// `<w:commentRangeStart>` for a comment id
pub fn comment_start(id: u32) -> String {
    format!(r#"<w:commentRangeStart w:id="{id}"/>"#)
}

/// `<w:commentRangeEnd>` for a comment id
pub fn comment_end(id: u32) -> String {
    format!(r#"<w:commentRangeEnd w:id="{id}"/>"#)
}

/// Run holding the `<w:commentReference>` of a comment id
pub fn comment_reference(id: u32) -> String {
    format!(r#"<w:r><w:commentReference w:id="{id}"/></w:r>"#)
}

/// Paragraph whose whole content is covered by a comment
pub fn commented_paragraph(id: u32, text: &str) -> String {
    format!(
        "<w:p>{}{}{}{}</w:p>",
        comment_start(id),
        run(text),
        comment_end(id),
        comment_reference(id)
    )
}

/// Table row with one cell per text
pub fn row(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|text| format!("<w:tc>{}</w:tc>", paragraph(text)))
        .collect();
    format!("<w:tr>{cells}</w:tr>")
}

/// Table row whose first cell paragraph is covered by a comment
pub fn commented_row(id: u32, cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .enumerate()
        .map(|(index, text)| {
            if index == 0 {
                format!("<w:tc>{}</w:tc>", commented_paragraph(id, text))
            } else {
                format!("<w:tc>{}</w:tc>", paragraph(text))
            }
        })
        .collect();
    format!("<w:tr>{cells}</w:tr>")
}

/// Table wrapping rows
pub fn table(rows: &[String]) -> String {
    format!("<w:tbl>{}</w:tbl>", rows.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::OoxmlArchive;

    #[test]
    fn test_builder_produces_parts() {
        let bytes = DocxBuilder::new(paragraph("x"))
            .comment(1, "a < b")
            .footnote(2, "note")
            .header(paragraph("h"))
            .image("pic.png", vec![1, 2])
            .build();
        let archive = OoxmlArchive::from_bytes(&bytes).unwrap();

        for part in [
            "word/document.xml",
            "word/comments.xml",
            "word/footnotes.xml",
            "word/header1.xml",
            "word/media/pic.png",
        ] {
            assert!(archive.contains(part), "missing {part}");
        }
        assert!(archive
            .get_string("word/comments.xml")
            .unwrap()
            .contains("a &lt; b"));
    }
}
