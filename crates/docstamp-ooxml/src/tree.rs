//! Arena-backed XML tree for WordprocessingML parts
//!
//! Every XML part the stamper edits (`word/document.xml`, comments, notes,
//! headers and footers) is parsed into an [`XmlTree`]: a flat arena of nodes
//! addressed by [`NodeId`]. Parent links are plain indices, so a subtree can
//! be cloned, moved or detached without shared ownership. Detached nodes stay
//! in the arena until the tree is dropped; only nodes reachable from the root
//! are serialized.
//!
//! Elements keep their qualified names (`w:p`, `w:r`, ...) and attributes
//! verbatim, so anything the stamper does not understand is written back
//! unchanged.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{OoxmlError, Result};

/// Qualified name of the wrapper element marking a promoted directive
pub const HOOK_ELEMENT: &str = "stamp:hook";

/// Prefix of every attribute and element owned by the stamper
pub const STAMP_PREFIX: &str = "stamp:";

/// Handle of a node inside one [`XmlTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index of this node
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// An element with its qualified name and attributes in source order
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    /// Character data
    Text(String),
}

/// Typed discrimination of the nodes the stamper cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Paragraph,
    Run,
    Text,
    Table,
    Row,
    Cell,
    CommentRangeStart,
    CommentRangeEnd,
    CommentReference,
    DirectiveWrapper,
    Break,
    Drawing,
    StructuredWrapper,
    /// Any element without special meaning to the stamper
    Other,
    /// Character data node
    CharacterData,
}

impl NodeType {
    /// Classify an element by its qualified name
    pub fn from_name(name: &str) -> Self {
        match name {
            "w:p" => Self::Paragraph,
            "w:r" => Self::Run,
            "w:t" => Self::Text,
            "w:tbl" => Self::Table,
            "w:tr" => Self::Row,
            "w:tc" => Self::Cell,
            "w:commentRangeStart" => Self::CommentRangeStart,
            "w:commentRangeEnd" => Self::CommentRangeEnd,
            "w:commentReference" => Self::CommentReference,
            HOOK_ELEMENT => Self::DirectiveWrapper,
            "w:br" => Self::Break,
            "w:drawing" => Self::Drawing,
            "w:sdt" => Self::StructuredWrapper,
            _ => Self::Other,
        }
    }

    /// Whether nodes of this kind may own children
    pub fn has_children(self) -> bool {
        !matches!(
            self,
            Self::CommentRangeStart
                | Self::CommentRangeEnd
                | Self::CommentReference
                | Self::Break
                | Self::CharacterData
        )
    }

    /// Whether this is one of the three comment marker kinds
    pub fn is_comment_marker(self) -> bool {
        matches!(
            self,
            Self::CommentRangeStart | Self::CommentRangeEnd | Self::CommentReference
        )
    }
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed XML part
#[derive(Debug, Clone)]
pub struct XmlTree {
    slots: Vec<Slot>,
    root: NodeId,
    declaration: bool,
}

impl XmlTree {
    /// Create a tree holding a single empty root element
    pub fn new(root_name: &str) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            root: NodeId(0),
            declaration: true,
        };
        tree.root = tree.create_element(root_name, &[]);
        tree
    }

    /// Parse an XML part
    ///
    /// Whitespace-only character data is dropped unless it sits inside a
    /// text-carrying element (`w:t`, `w:instrText`, `w:delText`).
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);

        let mut tree = Self {
            slots: Vec::new(),
            root: NodeId(0),
            declaration: false,
        };
        let mut root = None;
        let mut open: Vec<NodeId> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Decl(_) => tree.declaration = true,
                Event::Start(ref e) => {
                    let id = tree.push_element(e)?;
                    tree.attach_parsed(id, open.last().copied(), &mut root)?;
                    open.push(id);
                }
                Event::Empty(ref e) => {
                    let id = tree.push_element(e)?;
                    tree.attach_parsed(id, open.last().copied(), &mut root)?;
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Text(ref e) => {
                    if let Some(&parent) = open.last() {
                        let text = e.unescape()?;
                        if !text.trim().is_empty() || tree.preserves_whitespace(parent) {
                            let id = tree.create_text(text.into_owned());
                            tree.append_child(parent, id);
                        }
                    }
                }
                Event::CData(ref e) => {
                    if let Some(&parent) = open.last() {
                        let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                        let id = tree.create_text(text);
                        tree.append_child(parent, id);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        tree.root =
            root.ok_or_else(|| {
                OoxmlError::InvalidStructure("XML part has no root element".into())
            })?;
        Ok(tree)
    }

    fn push_element(&mut self, start: &BytesStart) -> Result<NodeId> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| OoxmlError::Attribute(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(self.push(NodeData::Element { name, attributes }))
    }

    fn attach_parsed(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        root: &mut Option<NodeId>,
    ) -> Result<()> {
        match (parent, root.is_some()) {
            (Some(parent), _) => self.append_child(parent, id),
            (None, false) => *root = Some(id),
            (None, true) => {
                return Err(OoxmlError::InvalidStructure(
                    "XML part has more than one root element".into(),
                ))
            }
        }
        Ok(())
    }

    fn preserves_whitespace(&self, id: NodeId) -> bool {
        matches!(
            self.name(id),
            Some("w:t" | "w:instrText" | "w:delText" | "w:delInstrText")
        )
    }

    /// Serialize the tree back to XML bytes
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        if self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        }
        self.write_node(&mut writer, self.root)?;
        Ok(writer.into_inner())
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        let slot = &self.slots[id.0];
        match &slot.data {
            NodeData::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            NodeData::Element { name, attributes } => {
                let mut start = BytesStart::new(name.as_str());
                for (key, value) in attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if slot.children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for &child in &slot.children {
                        self.write_node(writer, child)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// Root element of the part
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Payload of a node
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.slots[id.0].data
    }

    /// Qualified element name, `None` for character data
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.slots[id.0].data {
            NodeData::Element { name, .. } => Some(name),
            NodeData::Text(_) => None,
        }
    }

    /// Typed discrimination of a node
    pub fn node_type(&self, id: NodeId) -> NodeType {
        match &self.slots[id.0].data {
            NodeData::Element { name, .. } => NodeType::from_name(name),
            NodeData::Text(_) => NodeType::CharacterData,
        }
    }

    /// Whether a node is of the given kind
    pub fn is(&self, id: NodeId, kind: NodeType) -> bool {
        self.node_type(id) == kind
    }

    /// Character data of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.slots[id.0].data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    /// Concatenated character data of a whole subtree
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.slots[id.0].data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { .. } => {
                for &child in &self.slots[id.0].children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Parent of a node, `None` for the root and detached nodes
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    /// Children of a node in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slots[id.0].children
    }

    /// Position of a node among its siblings
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    /// Sibling directly after a node
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Sibling directly before a node
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// First direct child with the given qualified name
    pub fn child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&child| self.name(child) == Some(name))
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&node| self.parent(node))
    }

    /// Nearest ancestor of a kind (the node itself excluded)
    pub fn ancestor_of_type(&self, id: NodeId, kind: NodeType) -> Option<NodeId> {
        self.ancestors(id).find(|&node| self.is(node, kind))
    }

    /// Whether `ancestor` lies on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|node| node == ancestor)
    }

    /// Whether a node is still reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).last() == Some(self.root)
    }

    /// Attribute value by qualified name
    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.slots[id.0].data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> NodeId {
        self.push(NodeData::Element {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Replace the character data of a text node
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let NodeData::Text(existing) = &mut self.slots[id.0].data {
            *existing = text.into();
        }
    }

    /// Set or replace an attribute
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        if let NodeData::Element { attributes, .. } = &mut self.slots[id.0].data {
            let value = value.into();
            match attributes.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => attributes.push((key.to_string(), value)),
            }
        }
    }

    /// Remove an attribute, returning its value
    pub fn remove_attr(&mut self, id: NodeId, key: &str) -> Option<String> {
        match &mut self.slots[id.0].data {
            NodeData::Element { attributes, .. } => {
                let index = attributes.iter().position(|(k, _)| k == key)?;
                Some(attributes.remove(index).1)
            }
            NodeData::Text(_) => None,
        }
    }

    /// Remove every attribute whose name starts with `prefix`
    pub fn remove_attrs_with_prefix(&mut self, id: NodeId, prefix: &str) -> usize {
        match &mut self.slots[id.0].data {
            NodeData::Element { attributes, .. } => {
                let before = attributes.len();
                attributes.retain(|(k, _)| !k.starts_with(prefix));
                before - attributes.len()
            }
            NodeData::Text(_) => 0,
        }
    }

    /// Unlink a node from its parent; the subtree stays intact
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.slots[id.0].parent.take() {
            self.slots[parent.0].children.retain(|&child| child != id);
        }
    }

    /// Append a node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.slots[child.0].parent = Some(parent);
        self.slots[parent.0].children.push(child);
    }

    /// Insert a node at a child position of `parent`
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.slots[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.slots[child.0].parent = Some(parent);
    }

    /// Insert a node as the sibling directly before `anchor`
    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) -> Result<()> {
        self.detach(node);
        let parent = self.parent(anchor).ok_or_else(|| {
            OoxmlError::InvalidStructure("cannot insert next to a detached node".into())
        })?;
        let index = self.index_in_parent(anchor).unwrap_or(0);
        self.insert_child(parent, index, node);
        Ok(())
    }

    /// Insert a node as the sibling directly after `anchor`
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) -> Result<()> {
        self.detach(node);
        let parent = self.parent(anchor).ok_or_else(|| {
            OoxmlError::InvalidStructure("cannot insert next to a detached node".into())
        })?;
        let index = self.index_in_parent(anchor).map_or(0, |i| i + 1);
        self.insert_child(parent, index, node);
        Ok(())
    }

    /// Replace an element by its own children, in place
    pub fn unwrap_node(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        let index = self.index_in_parent(id).unwrap_or(0);
        let children = std::mem::take(&mut self.slots[id.0].children);
        self.detach(id);
        for (offset, child) in children.into_iter().enumerate() {
            self.slots[child.0].parent = None;
            self.insert_child(parent, index + offset, child);
        }
    }

    /// Deep-copy a subtree; the copy is detached
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let data = self.slots[id.0].data.clone();
        let copy = self.push(data);
        let children = self.slots[id.0].children.clone();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Deep-copy a subtree of another tree into this arena; the copy is detached
    pub fn import(&mut self, other: &XmlTree, id: NodeId) -> NodeId {
        let copy = self.push(other.data(id).clone());
        for &child in other.children(id) {
            let child_copy = self.import(other, child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Parse a standalone snippet and import its root element, detached
    ///
    /// The snippet must declare every prefix it uses so that it parses as a
    /// document of its own; namespace declarations are kept on the element.
    pub fn import_fragment(&mut self, xml: &str) -> Result<NodeId> {
        let fragment = XmlTree::parse(xml.as_bytes())?;
        Ok(self.import(&fragment, fragment.root()))
    }
}
