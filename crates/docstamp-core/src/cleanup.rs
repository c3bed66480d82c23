//! Final pass removing everything stamping left dangling

use std::collections::HashSet;

use docstamp_ooxml::{NodeId, NodeType, WordPackage, XmlTree, STAMP_PREFIX};
use serde::Serialize;
use tracing::debug;

use crate::dom::{collect_named, collect_of_type, marker_id, remove_inline, ID_ATTR};
use crate::iter::TreeIter;

/// What the cleanup pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed_notes: usize,
    pub removed_markers: usize,
    pub removed_comments: usize,
    pub unwrapped_hooks: usize,
}

/// Note types Word requires whether referenced or not
const SPECIAL_NOTE_TYPES: &[&str] = &["separator", "continuationSeparator", "continuationNotice"];

pub fn cleanup(package: &mut WordPackage) -> CleanupReport {
    let mut report = CleanupReport::default();

    let footnote_refs = referenced_ids(&package.document, "w:footnoteReference");
    if let Some(footnotes) = package.footnotes.as_mut() {
        report.removed_notes += remove_unreferenced_notes(footnotes, "w:footnote", &footnote_refs);
    }
    let endnote_refs = referenced_ids(&package.document, "w:endnoteReference");
    if let Some(endnotes) = package.endnotes.as_mut() {
        report.removed_notes += remove_unreferenced_notes(endnotes, "w:endnote", &endnote_refs);
    }

    report.removed_markers = remove_orphan_markers(&mut package.document);

    let mut used: HashSet<String> = comment_marker_ids(&package.document);
    for part in &package.headers_footers {
        used.extend(comment_marker_ids(&part.tree));
    }
    if let Some(comments) = package.comments.as_mut() {
        report.removed_comments = remove_unused_comments(comments, &used);
    }

    report.unwrapped_hooks = strip_stamp_markup(&mut package.document);
    for part in &mut package.headers_footers {
        report.unwrapped_hooks += strip_stamp_markup(&mut part.tree);
    }

    debug!(?report, "cleanup finished");
    report
}

fn referenced_ids(tree: &XmlTree, reference: &str) -> HashSet<String> {
    collect_named(tree, tree.root(), reference)
        .into_iter()
        .filter_map(|node| marker_id(tree, node).map(str::to_string))
        .collect()
}

/// Drop normal notes no reference points at
fn remove_unreferenced_notes(
    notes: &mut XmlTree,
    element: &str,
    referenced: &HashSet<String>,
) -> usize {
    let root = notes.root();
    let doomed: Vec<NodeId> = notes
        .children(root)
        .iter()
        .copied()
        .filter(|&node| notes.name(node) == Some(element))
        .filter(|&node| {
            !notes
                .attr(node, "w:type")
                .is_some_and(|kind| SPECIAL_NOTE_TYPES.contains(&kind))
        })
        .filter(|&node| {
            !marker_id(notes, node).is_some_and(|id| referenced.contains(id))
        })
        .collect();
    for &node in &doomed {
        notes.detach(node);
    }
    doomed.len()
}

/// Remove range ends and references whose range start is gone
fn remove_orphan_markers(tree: &mut XmlTree) -> usize {
    let starts: HashSet<String> = collect_of_type(tree, tree.root(), NodeType::CommentRangeStart)
        .into_iter()
        .filter_map(|node| marker_id(tree, node).map(str::to_string))
        .collect();
    let doomed: Vec<NodeId> = TreeIter::document(tree)
        .filter(|&node| {
            tree.is(node, NodeType::CommentRangeEnd) || tree.is(node, NodeType::CommentReference)
        })
        .filter(|&node| !marker_id(tree, node).is_some_and(|id| starts.contains(id)))
        .collect();
    for &node in &doomed {
        remove_inline(tree, node);
    }
    doomed.len()
}

fn comment_marker_ids(tree: &XmlTree) -> HashSet<String> {
    TreeIter::document(tree)
        .filter(|&node| tree.node_type(node).is_comment_marker())
        .filter_map(|node| marker_id(tree, node).map(str::to_string))
        .collect()
}

fn remove_unused_comments(comments: &mut XmlTree, used: &HashSet<String>) -> usize {
    let root = comments.root();
    let doomed: Vec<NodeId> = comments
        .children(root)
        .iter()
        .copied()
        .filter(|&node| comments.name(node) == Some("w:comment"))
        .filter(|&node| !comments.attr(node, ID_ATTR).is_some_and(|id| used.contains(id)))
        .collect();
    for &node in &doomed {
        comments.detach(node);
    }
    doomed.len()
}

/// Unwrap hooks and drop every `stamp:` attribute
fn strip_stamp_markup(tree: &mut XmlTree) -> usize {
    let hooks = collect_of_type(tree, tree.root(), NodeType::DirectiveWrapper);
    for &hook in &hooks {
        tree.unwrap_node(hook);
    }
    let nodes: Vec<NodeId> = TreeIter::document(tree).collect();
    for node in nodes {
        tree.remove_attrs_with_prefix(node, STAMP_PREFIX);
    }
    hooks.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstamp_ooxml::test_utils::*;

    fn package(builder: DocxBuilder) -> WordPackage {
        WordPackage::from_bytes(&builder.build()).unwrap()
    }

    #[test]
    fn test_unreferenced_footnotes_removed() {
        let body = format!(
            r#"<w:p>{}<w:r><w:footnoteReference w:id="1"/></w:r></w:p>"#,
            run("text")
        );
        let mut package = package(DocxBuilder::new(body).footnote(1, "kept").footnote(2, "orphan"));

        let report = cleanup(&mut package);
        assert_eq!(report.removed_notes, 1);

        let footnotes = package.footnotes.as_ref().unwrap();
        let ids: Vec<&str> = footnotes
            .children(footnotes.root())
            .iter()
            .filter_map(|&node| marker_id(footnotes, node))
            .collect();
        assert_eq!(ids, vec!["-1", "0", "1"]);
    }

    #[test]
    fn test_orphan_markers_and_comments_removed() {
        let body = format!(
            "<w:p>{}{}{}</w:p>{}",
            run("x"),
            comment_end(7),
            comment_reference(7),
            commented_paragraph(1, "y")
        );
        let mut package = package(
            DocxBuilder::new(body)
                .comment(1, "name")
                .comment(7, "gone")
                .comment(9, "unused"),
        );

        let report = cleanup(&mut package);
        assert_eq!(report.removed_markers, 2);
        assert_eq!(report.removed_comments, 2);
        let comments = package.comments.as_ref().unwrap();
        assert_eq!(comments.children(comments.root()).len(), 1);
    }

    #[test]
    fn test_hooks_unwrapped() {
        let mut tree = XmlTree::parse(
            format!(
                r#"<w:document {NAMESPACES}><w:body><w:p stamp:branch="2"><stamp:hook stamp:id="1" stamp:branch="0"><w:commentRangeStart w:id="1"/></stamp:hook></w:p></w:body></w:document>"#
            )
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(strip_stamp_markup(&mut tree), 1);
        let xml = String::from_utf8(tree.to_xml().unwrap()).unwrap();
        assert!(!xml.contains("stamp:"), "{xml}");
        assert!(xml.contains(r#"<w:commentRangeStart w:id="1"/>"#));
    }
}
