//! Part relationships (`_rels/*.rels`)
//!
//! Relationship files map the `r:id`/`r:embed` identifiers used inside a part
//! to targets: images, headers, footers, comments and so on. Stamping reads
//! them to locate header/footer parts and writes them when media is imported.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{OoxmlError, Result};

/// OOXML namespace for relationships
pub const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Relationship type URIs used by the stamper
impl Relationships {
    /// Image relationship type
    pub const TYPE_IMAGE: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    /// Header part relationship type
    pub const TYPE_HEADER: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
    /// Footer part relationship type
    pub const TYPE_FOOTER: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
    /// Comments part relationship type
    pub const TYPE_COMMENTS: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
}

/// A single relationship entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Target path (relative to the owning part's folder) or URL
    pub target: String,
    /// Relationship type URI
    pub rel_type: String,
    /// `External` for URLs, absent for package-internal targets
    pub target_mode: Option<String>,
}

/// Parsed relationships of one part, in document order
#[derive(Debug, Clone)]
pub struct Relationships {
    order: Vec<String>,
    map: HashMap<String, Relationship>,
    next_id: u32,
}

impl Default for Relationships {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            map: HashMap::new(),
            next_id: 1,
        }
    }
}

impl Relationships {
    /// Create an empty relationship set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `.rels` part
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut rels = Self::new();
        let mut highest = 0u32;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(ref e) | Event::Start(ref e)
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let mut id = None;
                    let mut target = None;
                    let mut rel_type = String::new();
                    let mut target_mode = None;

                    for attr in e.attributes() {
                        let attr = attr.map_err(|err| OoxmlError::Attribute(err.to_string()))?;
                        let value = attr.unescape_value()?.into_owned();
                        match attr.key.as_ref() {
                            b"Id" => id = Some(value),
                            b"Target" => target = Some(value),
                            b"Type" => rel_type = value,
                            b"TargetMode" => target_mode = Some(value),
                            _ => {}
                        }
                    }

                    if let (Some(id), Some(target)) = (id, target) {
                        if let Some(number) = id_number(&id) {
                            highest = highest.max(number);
                        }
                        rels.order.push(id.clone());
                        rels.map.insert(
                            id,
                            Relationship {
                                target,
                                rel_type,
                                target_mode,
                            },
                        );
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        rels.next_id = highest + 1;
        Ok(rels)
    }

    /// Register a package-internal target and return its fresh id
    pub fn add(&mut self, target: impl Into<String>, rel_type: impl Into<String>) -> String {
        let id = format!("rId{}", self.next_id);
        self.next_id += 1;
        self.order.push(id.clone());
        self.map.insert(
            id.clone(),
            Relationship {
                target: target.into(),
                rel_type: rel_type.into(),
                target_mode: None,
            },
        );
        id
    }

    /// Target of a relationship id
    pub fn target(&self, id: &str) -> Option<&str> {
        self.map.get(id).map(|rel| rel.target.as_str())
    }

    /// Full entry of a relationship id
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.map.get(id)
    }

    /// Id of the first relationship with this type pointing at `target`
    pub fn find(&self, target: &str, rel_type: &str) -> Option<&str> {
        self.iter()
            .find(|(_, rel)| rel.target == target && rel.rel_type == rel_type)
            .map(|(id, _)| id)
    }

    /// Targets of every relationship of a type, in document order
    pub fn targets_of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a str> {
        self.iter()
            .filter(move |(_, rel)| rel.rel_type == rel_type)
            .map(|(_, rel)| rel.target.as_str())
    }

    /// Number of relationships
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate in document order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.order
            .iter()
            .filter_map(|id| self.map.get(id).map(|rel| (id.as_str(), rel)))
    }

    /// Serialize to a `.rels` part
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(&format!("\n<Relationships xmlns=\"{RELATIONSHIPS_NS}\">"));
        for (id, rel) in self.iter() {
            xml.push_str(&format!(
                "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"",
                escape_attr(id),
                escape_attr(&rel.rel_type),
                escape_attr(&rel.target)
            ));
            if let Some(mode) = &rel.target_mode {
                xml.push_str(&format!(" TargetMode=\"{}\"", escape_attr(mode)));
            }
            xml.push_str("/>");
        }
        xml.push_str("</Relationships>");
        xml
    }
}

/// Numeric part of an id such as `rId12`
fn id_number(id: &str) -> Option<u32> {
    id.get(3..)
        .filter(|_| id[..3].eq_ignore_ascii_case("rid"))
        .and_then(|digits| digits.parse().ok())
}

fn escape_attr(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
        <Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
            <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>
            <Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
        </Relationships>"#;

    #[test]
    fn test_parse_relationships() {
        let rels = Relationships::parse(RELS).unwrap();

        assert_eq!(rels.len(), 3);
        assert_eq!(rels.target("rId8"), Some("media/image1.png"));
        assert_eq!(
            rels.targets_of_type(Relationships::TYPE_HEADER).collect::<Vec<_>>(),
            vec!["header1.xml"]
        );
    }

    #[test]
    fn test_add_continues_after_highest_id() {
        let mut rels = Relationships::parse(RELS).unwrap();
        let id = rels.add("media/stamp.png", Relationships::TYPE_IMAGE);

        assert_eq!(id, "rId9");
        assert_eq!(rels.find("media/stamp.png", Relationships::TYPE_IMAGE), Some("rId9"));
    }

    #[test]
    fn test_to_xml_reparses() {
        let mut rels = Relationships::new();
        rels.add("a & b.xml", Relationships::TYPE_COMMENTS);

        let xml = rels.to_xml();
        assert!(xml.contains("a &amp; b.xml"));

        let reparsed = Relationships::parse(xml.as_bytes()).unwrap();
        assert_eq!(reparsed.target("rId1"), Some("a & b.xml"));
    }

    #[test]
    fn test_id_number() {
        assert_eq!(id_number("rId12"), Some(12));
        assert_eq!(id_number("RID3"), Some(3));
        assert_eq!(id_number("image"), None);
        assert_eq!(id_number("rIdx"), None);
    }
}
