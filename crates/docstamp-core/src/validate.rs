//! Detection and repair of malformed comment directives
//!
//! A directive is a comment range: a `w:commentRangeStart`, a matching
//! `w:commentRangeEnd`, usually a `w:commentReference` run, and a comment
//! body in `word/comments.xml`. Templates edited by hand routinely lose one
//! of those pieces. Before anything is stamped, every marker whose id cannot
//! form a complete directive is removed, along with its comment body.
//!
//! Ranges that interleave (`start 1, start 2, end 1`) make containment
//! undecidable and abort stamping.

use std::collections::{BTreeSet, HashSet};

use docstamp_ooxml::{NodeType, WordPackage, XmlTree};
use serde::Serialize;
use tracing::warn;

use crate::directive::comment_texts;
use crate::dom::{marker_id, remove_inline, ID_ATTR};
use crate::error::{Result, StampError};
use crate::iter::{ResettableIterator, TreeIter};

/// Outcome of the repair pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Ids whose markers and comment bodies were removed
    pub malformed: BTreeSet<String>,
    /// Number of markers removed from the document
    pub removed_markers: usize,
    /// Number of comment bodies removed
    pub removed_comments: usize,
}

impl RepairReport {
    /// Whether the template needed no repair
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty()
    }
}

/// Compute the ids that cannot form a complete directive
///
/// An id is malformed when its start is never closed, its end has nothing
/// open, or no comment body carries it. A start closed by a different id is
/// an ambiguous nesting and fails with [`StampError::MalformedDirective`].
pub fn find_malformed(tree: &XmlTree, bodies: &HashSet<String>) -> Result<BTreeSet<String>> {
    let markers: Vec<(NodeType, String)> = TreeIter::document(tree)
        .filtered(|&id| tree.node_type(id).is_comment_marker())
        .mapped(|id| {
            let kind = tree.node_type(id);
            (kind, marker_id(tree, id).unwrap_or_default().to_string())
        })
        .collect();

    let starts: HashSet<&str> = markers
        .iter()
        .filter(|(kind, _)| *kind == NodeType::CommentRangeStart)
        .map(|(_, id)| id.as_str())
        .collect();
    let ends: HashSet<&str> = markers
        .iter()
        .filter(|(kind, _)| *kind == NodeType::CommentRangeEnd)
        .map(|(_, id)| id.as_str())
        .collect();

    let mut malformed = BTreeSet::new();
    let mut open: Vec<&str> = Vec::new();

    for (kind, id) in &markers {
        match kind {
            NodeType::CommentRangeStart => {
                if ends.contains(id.as_str()) {
                    open.push(id.as_str());
                } else {
                    malformed.insert(id.clone());
                }
            }
            NodeType::CommentRangeEnd => {
                if !starts.contains(id.as_str()) {
                    malformed.insert(id.clone());
                    continue;
                }
                match open.pop() {
                    None => {
                        malformed.insert(id.clone());
                    }
                    Some(popped) if popped != id.as_str() => {
                        return Err(StampError::MalformedDirective(format!(
                            "comment range {popped} is closed by the end marker of comment {id}"
                        )));
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }
    }

    malformed.extend(open.into_iter().map(str::to_string));
    malformed.extend(
        markers
            .iter()
            .filter(|(_, id)| !bodies.contains(id))
            .map(|(_, id)| id.clone()),
    );
    Ok(malformed)
}

/// Remove every malformed directive from the document and comments part
pub fn repair(package: &mut WordPackage) -> Result<RepairReport> {
    let bodies: HashSet<String> = comment_texts(package.comments.as_ref())
        .into_keys()
        .collect();
    let malformed = find_malformed(&package.document, &bodies)?;

    let mut report = RepairReport::default();
    if malformed.is_empty() {
        return Ok(report);
    }

    // The two markers of a broken pair may sit in different containers, so
    // each marker kind gets its own pass.
    for kind in [
        NodeType::CommentReference,
        NodeType::CommentRangeStart,
        NodeType::CommentRangeEnd,
    ] {
        let tree = &package.document;
        let doomed: Vec<_> = TreeIter::document(tree)
            .filtered(|&id| {
                tree.is(id, kind)
                    && marker_id(tree, id).is_some_and(|marker| malformed.contains(marker))
            })
            .collect();
        report.removed_markers += doomed.len();
        for node in doomed {
            remove_inline(&mut package.document, node);
        }
    }

    if let Some(comments) = package.comments.as_mut() {
        let root = comments.root();
        let doomed: Vec<_> = comments
            .children(root)
            .iter()
            .copied()
            .filter(|&id| {
                comments.name(id) == Some("w:comment")
                    && comments
                        .attr(id, ID_ATTR)
                        .is_some_and(|comment| malformed.contains(comment))
            })
            .collect();
        report.removed_comments = doomed.len();
        for node in doomed {
            comments.detach(node);
        }
    }

    warn!(
        ids = ?malformed,
        markers = report.removed_markers,
        comments = report.removed_comments,
        "removed malformed directives"
    );
    report.malformed = malformed;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstamp_ooxml::test_utils::*;

    fn bodies(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn document(body: &str) -> XmlTree {
        XmlTree::parse(
            format!("<w:document {NAMESPACES}><w:body>{body}</w:body></w:document>").as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_well_formed_directive() {
        let tree = document(&commented_paragraph(1, "x"));
        assert!(find_malformed(&tree, &bodies(&["1"])).unwrap().is_empty());
    }

    #[test]
    fn test_unclosed_start_is_malformed() {
        let body = format!(
            "<w:p>{}{}</w:p>{}",
            comment_start(5),
            run("dangling"),
            commented_paragraph(1, "x")
        );
        let tree = document(&body);

        let malformed = find_malformed(&tree, &bodies(&["1", "5"])).unwrap();
        assert_eq!(malformed, BTreeSet::from(["5".to_string()]));
    }

    #[test]
    fn test_stray_end_is_malformed() {
        let body = format!("<w:p>{}{}{}</w:p>", comment_end(3), comment_start(3), run("x"));
        let tree = document(&body);

        let malformed = find_malformed(&tree, &bodies(&["3"])).unwrap();
        assert!(malformed.contains("3"));
    }

    #[test]
    fn test_missing_body_is_malformed() {
        let tree = document(&commented_paragraph(2, "x"));
        let malformed = find_malformed(&tree, &bodies(&[])).unwrap();
        assert_eq!(malformed, BTreeSet::from(["2".to_string()]));
    }

    #[test]
    fn test_interleaved_ranges_are_fatal() {
        let body = format!(
            "<w:p>{}{}{}{}</w:p>",
            comment_start(1),
            comment_start(2),
            comment_end(1),
            comment_end(2)
        );
        let tree = document(&body);

        let err = find_malformed(&tree, &bodies(&["1", "2"])).unwrap_err();
        assert!(matches!(err, StampError::MalformedDirective(_)));
    }

    #[test]
    fn test_nested_ranges_are_valid() {
        let body = format!(
            "<w:p>{}{}{}{}{}</w:p>",
            comment_start(1),
            comment_start(2),
            run("inner"),
            comment_end(2),
            comment_end(1)
        );
        let tree = document(&body);
        assert!(find_malformed(&tree, &bodies(&["1", "2"])).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_set_is_independent_of_marker_order() {
        let dangling_start = format!("<w:p>{}{}</w:p>", comment_start(7), run("a"));
        let dangling_end = format!("<w:p>{}{}</w:p>", comment_end(9), comment_reference(4));
        let balanced = commented_paragraph(1, "b");

        let forward = document(&format!("{dangling_start}{balanced}{dangling_end}"));
        let swapped = document(&format!("{dangling_end}{balanced}{dangling_start}"));
        let in_cells = document(&table(&[format!(
            "<w:tr><w:tc>{dangling_end}</w:tc><w:tc>{balanced}</w:tc><w:tc>{dangling_start}</w:tc></w:tr>"
        )]));

        let expected = BTreeSet::from(["7".to_string(), "9".to_string()]);
        for tree in [&forward, &swapped, &in_cells] {
            assert_eq!(find_malformed(tree, &bodies(&["1", "4"])).unwrap(), expected);
        }
    }
}
