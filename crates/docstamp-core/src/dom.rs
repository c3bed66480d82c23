//! Small structural helpers shared by the stamping passes

use docstamp_ooxml::{NodeId, NodeType, XmlTree};

use crate::iter::{ResettableIterator, TreeIter};

/// Attribute holding comment, note and drawing ids
pub const ID_ATTR: &str = "w:id";

/// Id carried by a comment marker or note
pub fn marker_id(tree: &XmlTree, node: NodeId) -> Option<&str> {
    tree.attr(node, ID_ATTR)
}

/// Whether a run holds nothing but run properties
pub fn is_empty_run(tree: &XmlTree, run: NodeId) -> bool {
    tree.children(run)
        .iter()
        .all(|&child| tree.name(child) == Some("w:rPr"))
}

/// Detach a node; a run left empty by the removal goes too
pub fn remove_inline(tree: &mut XmlTree, node: NodeId) {
    let parent = tree.parent(node);
    tree.detach(node);
    if let Some(run) = parent.filter(|&p| tree.is(p, NodeType::Run)) {
        if is_empty_run(tree, run) {
            tree.detach(run);
        }
    }
}

/// Detach a block-level node, keeping its table cell valid
pub fn remove_block(tree: &mut XmlTree, node: NodeId) {
    let parent = tree.parent(node);
    tree.detach(node);
    if let Some(parent) = parent {
        ensure_cell_content(tree, parent);
    }
}

/// Remove a table left without rows; returns whether it was removed
pub fn remove_table_if_rowless(tree: &mut XmlTree, table: NodeId) -> bool {
    if !tree.is(table, NodeType::Table) || !tree.is_attached(table) {
        return false;
    }
    let has_row = tree
        .children(table)
        .iter()
        .any(|&child| tree.is(child, NodeType::Row));
    if !has_row {
        remove_block(tree, table);
    }
    !has_row
}

/// A cell must end with at least one paragraph or table
pub fn ensure_cell_content(tree: &mut XmlTree, node: NodeId) {
    if !tree.is(node, NodeType::Cell) {
        return;
    }
    let has_block = tree
        .children(node)
        .iter()
        .any(|&child| tree.is(child, NodeType::Paragraph) || tree.is(child, NodeType::Table));
    if !has_block {
        let paragraph = tree.create_element("w:p", &[]);
        tree.append_child(node, paragraph);
    }
}

/// Every node of a kind in document order
pub fn collect_of_type(tree: &XmlTree, origin: NodeId, kind: NodeType) -> Vec<NodeId> {
    TreeIter::new(tree, origin)
        .filtered(|&id| tree.is(id, kind))
        .collect()
}

/// Every element with a qualified name in document order
pub fn collect_named(tree: &XmlTree, origin: NodeId, name: &str) -> Vec<NodeId> {
    TreeIter::new(tree, origin)
        .filtered(|&id| tree.name(id) == Some(name))
        .collect()
}

/// The node itself or its nearest ancestor of a kind
pub fn self_or_ancestor(tree: &XmlTree, node: NodeId, kind: NodeType) -> Option<NodeId> {
    if tree.is(node, kind) {
        Some(node)
    } else {
        tree.ancestor_of_type(node, kind)
    }
}

/// `w:body` of a main document part
pub fn body(tree: &XmlTree) -> Option<NodeId> {
    tree.child_named(tree.root(), "w:body")
}

/// Section properties carried by a paragraph, if any
pub fn paragraph_section(tree: &XmlTree, paragraph: NodeId) -> Option<NodeId> {
    if !tree.is(paragraph, NodeType::Paragraph) {
        return None;
    }
    let properties = tree.child_named(paragraph, "w:pPr")?;
    tree.child_named(properties, "w:sectPr")
}
