//! Comment directives: promotion to hooks and resolution
//!
//! After repair every remaining `w:commentRangeStart` is wrapped in a
//! `<stamp:hook stamp:id=".." stamp:branch="..">` element. Hooks mark the
//! managed regions for the rest of the pipeline, survive cloning, and carry
//! the branch a directive is evaluated against.
//!
//! A hook is resolved into a [`Directive`] right before it is processed, by
//! locating its end marker and reference in the current tree.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use docstamp_ooxml::{NodeId, NodeType, XmlTree, HOOK_ELEMENT};
use regex::Regex;

use crate::branch::{BranchKey, BRANCH_ATTR};
use crate::dom::{body, collect_of_type, marker_id, remove_inline, self_or_ancestor, ID_ATTR};
use crate::error::{Result, StampError};
use crate::iter::{ResettableIterator, TreeIter};
use crate::splice::{offset_of, paragraph_text};

/// Attribute carrying the comment id on a hook
pub const HOOK_ID_ATTR: &str = "stamp:id";

/// Expression text of every comment body, keyed by comment id
pub fn comment_texts(comments: Option<&XmlTree>) -> HashMap<String, String> {
    let Some(comments) = comments else {
        return HashMap::new();
    };
    let root = comments.root();
    comments
        .children(root)
        .iter()
        .copied()
        .filter(|&node| comments.name(node) == Some("w:comment"))
        .filter_map(|node| {
            let id = comments.attr(node, ID_ATTR)?.to_string();
            let text = collect_of_type(comments, node, NodeType::Paragraph)
                .into_iter()
                .map(|p| paragraph_text(comments, p))
                .collect::<Vec<_>>()
                .join("\n");
            Some((id, text.trim().to_string()))
        })
        .collect()
}

/// Wrap every range start that has a comment body in a hook bound to `base`
///
/// Returns the number of hooks created.
pub fn promote(
    tree: &mut XmlTree,
    comments: &HashMap<String, String>,
    base: BranchKey,
) -> Result<usize> {
    let Some(origin) = body(tree) else {
        return Ok(0);
    };
    let starts: Vec<NodeId> = collect_of_type(tree, origin, NodeType::CommentRangeStart)
        .into_iter()
        .filter(|&start| {
            tree.parent(start)
                .is_some_and(|p| !tree.is(p, NodeType::DirectiveWrapper))
                && marker_id(tree, start).is_some_and(|id| comments.contains_key(id))
        })
        .collect();

    for &start in &starts {
        let id = marker_id(tree, start).unwrap_or_default().to_string();
        let hook = tree.create_element(
            HOOK_ELEMENT,
            &[
                (HOOK_ID_ATTR, id.as_str()),
                (BRANCH_ATTR, base.to_attr().as_str()),
            ],
        );
        tree.insert_before(start, hook)?;
        tree.append_child(hook, start);
    }
    Ok(starts.len())
}

/// First hook in document order
pub fn first_hook(tree: &XmlTree) -> Option<NodeId> {
    TreeIter::document(tree)
        .filtered(|&node| tree.is(node, NodeType::DirectiveWrapper))
        .next()
}

/// Point every hook under `origin` at a branch
pub fn rebind_hooks(tree: &mut XmlTree, origin: NodeId, branch: BranchKey) {
    for hook in collect_of_type(tree, origin, NodeType::DirectiveWrapper) {
        tree.set_attr(hook, BRANCH_ATTR, branch.to_attr());
    }
}

/// A comment-range directive located in the tree
///
/// Positions are captured at resolution time, so they stay usable after the
/// markers are stripped.
#[derive(Debug, Clone)]
pub struct Directive {
    pub id: String,
    /// Comment body text
    pub expression: String,
    /// Branch the expression is evaluated against
    pub branch: BranchKey,
    pub hook: NodeId,
    pub start: NodeId,
    pub end: NodeId,
    pub reference: Option<NodeId>,
    /// Nodes from the start marker through the end marker in document order
    pub slice: Vec<NodeId>,
    /// Element holding the hook
    pub container: Option<NodeId>,
    /// Paragraph holding the start marker
    pub paragraph: Option<NodeId>,
    /// Paragraph holding the end marker
    pub end_paragraph: Option<NodeId>,
    /// Text offset of the start marker in [`Directive::paragraph`]
    pub start_offset: Option<usize>,
    /// Text offset of the end marker in [`Directive::end_paragraph`]
    pub end_offset: Option<usize>,
    /// Largest removable nodes strictly inside the range
    pub enclosed: Vec<NodeId>,
    /// Block-level siblings spanned by the range
    pub blocks: Vec<NodeId>,
}

impl Directive {
    /// Resolve a hook against the current tree
    pub fn resolve(
        tree: &XmlTree,
        hook: NodeId,
        comments: &HashMap<String, String>,
    ) -> Result<Self> {
        let start = tree
            .children(hook)
            .iter()
            .copied()
            .find(|&node| tree.is(node, NodeType::CommentRangeStart))
            .ok_or_else(|| {
                StampError::MalformedDirective("directive hook without a range start".into())
            })?;
        let id = marker_id(tree, start).unwrap_or_default().to_string();
        let branch = tree
            .attr(hook, BRANCH_ATTR)
            .and_then(BranchKey::from_attr)
            .unwrap_or(BranchKey::ROOT);

        let is_marker = |node: NodeId, kind: NodeType| {
            tree.is(node, kind) && marker_id(tree, node) == Some(id.as_str())
        };
        let end = TreeIter::document(tree)
            .skip_while(|&node| node != start)
            .find(|&node| is_marker(node, NodeType::CommentRangeEnd))
            .ok_or_else(|| {
                StampError::MalformedDirective(format!(
                    "comment {id} has no range end after its start"
                ))
            })?;
        let reference = TreeIter::document(tree)
            .skip_while(|&node| node != end)
            .find(|&node| is_marker(node, NodeType::CommentReference));
        let slice: Vec<NodeId> = TreeIter::document(tree).sliced(start, end).collect();

        let expression = comments.get(&id).cloned().ok_or_else(|| {
            StampError::MalformedDirective(format!("comment {id} has no comment body"))
        })?;

        let paragraph = self_or_ancestor(tree, start, NodeType::Paragraph);
        let end_paragraph = self_or_ancestor(tree, end, NodeType::Paragraph);
        let enclosed = enclosed_roots(tree, &slice, start, end);
        let blocks = block_range(tree, start, end);

        Ok(Self {
            container: tree.parent(hook),
            start_offset: paragraph.and_then(|p| offset_of(tree, p, start)),
            end_offset: end_paragraph.and_then(|p| offset_of(tree, p, end)),
            paragraph,
            end_paragraph,
            enclosed,
            blocks,
            id,
            expression,
            branch,
            hook,
            start,
            end,
            reference,
            slice,
        })
    }

    /// Text range inside one paragraph, when both markers share it
    pub fn word_range(&self) -> Option<(NodeId, usize, usize)> {
        let paragraph = self.paragraph?;
        if self.end_paragraph != Some(paragraph) {
            return None;
        }
        Some((paragraph, self.start_offset?, self.end_offset?))
    }

    /// Block-level anchors still attached to the tree
    pub fn attached_blocks(&self, tree: &XmlTree) -> Vec<NodeId> {
        self.blocks
            .iter()
            .copied()
            .filter(|&node| tree.is_attached(node))
            .collect()
    }

    /// Remove the hook, both range markers and the reference from the tree
    pub fn strip_markers(&self, tree: &mut XmlTree) {
        tree.detach(self.start);
        tree.detach(self.hook);
        remove_inline(tree, self.end);
        if let Some(reference) = self.reference {
            remove_inline(tree, reference);
        }
    }
}

/// Every slice node whose parent lies outside the range, minus the markers
/// and the containers of the end marker
fn enclosed_roots(tree: &XmlTree, slice: &[NodeId], start: NodeId, end: NodeId) -> Vec<NodeId> {
    let inside: HashSet<NodeId> = slice
        .iter()
        .copied()
        .filter(|&node| !tree.is_ancestor(node, end))
        .collect();
    slice
        .iter()
        .copied()
        .filter(|&node| node != start && node != end)
        .filter(|node| inside.contains(node))
        .filter(|&node| tree.parent(node).is_some_and(|p| !inside.contains(&p)))
        .collect()
}

/// Siblings of the innermost block container holding both markers, from the
/// one holding `start` through the one holding `end`
fn block_range(tree: &XmlTree, start: NodeId, end: NodeId) -> Vec<NodeId> {
    let start_line: Vec<NodeId> = std::iter::once(start).chain(tree.ancestors(start)).collect();
    let Some(mut container) = std::iter::once(end)
        .chain(tree.ancestors(end))
        .find(|node| start_line.contains(node))
    else {
        return Vec::new();
    };

    // Blocks live in bodies, cells and content controls, never inside
    // paragraphs or directly in rows and tables
    while matches!(
        tree.node_type(container),
        NodeType::Paragraph | NodeType::Run | NodeType::Row | NodeType::Table
    ) || tree.ancestor_of_type(container, NodeType::Paragraph).is_some()
        || container == start
    {
        match tree.parent(container) {
            Some(parent) => container = parent,
            None => return Vec::new(),
        }
    }

    let child_of = |node: NodeId| {
        std::iter::once(node)
            .chain(tree.ancestors(node))
            .find(|&n| tree.parent(n) == Some(container))
    };
    let (Some(first), Some(last)) = (child_of(start), child_of(end)) else {
        return Vec::new();
    };
    let children = tree.children(container);
    let (Some(from), Some(to)) = (
        children.iter().position(|&n| n == first),
        children.iter().position(|&n| n == last),
    ) else {
        return Vec::new();
    };
    children[from..=to].to_vec()
}

/// A directive expression split into processor name and argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub argument: String,
}

/// Split `name(argument)`; anything else is a plain expression
pub fn parse_invocation(expression: &str) -> Option<Invocation> {
    static INVOCATION_RE: OnceLock<Regex> = OnceLock::new();
    let re = INVOCATION_RE
        .get_or_init(|| Regex::new(r"(?s)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*$").unwrap());
    let caps = re.captures(expression)?;
    Some(Invocation {
        name: caps[1].to_string(),
        argument: caps[2].trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstamp_ooxml::test_utils::*;

    fn document(body: &str) -> XmlTree {
        XmlTree::parse(
            format!("<w:document {NAMESPACES}><w:body>{body}</w:body></w:document>").as_bytes(),
        )
        .unwrap()
    }

    fn comments(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(id, text)| (id.to_string(), text.to_string()))
            .collect()
    }

    #[test]
    fn test_comment_texts() {
        let tree = XmlTree::parse(
            format!(
                r#"<w:comments {NAMESPACES}><w:comment w:id="3"><w:p><w:r><w:annotationRef/></w:r>{}</w:p><w:p>{}</w:p></w:comment></w:comments>"#,
                run(" repeatParagraph("),
                run("items) ")
            )
            .as_bytes(),
        )
        .unwrap();

        let texts = comment_texts(Some(&tree));
        assert_eq!(texts["3"], "repeatParagraph(\nitems)");
        assert!(comment_texts(None).is_empty());
    }

    #[test]
    fn test_promote_wraps_starts() {
        let mut tree = document(&format!(
            "{}{}",
            commented_paragraph(1, "a"),
            commented_paragraph(2, "b")
        ));
        let count = promote(&mut tree, &comments(&[("1", "x")]), BranchKey::ROOT).unwrap();
        assert_eq!(count, 1);

        let hook = first_hook(&tree).unwrap();
        assert_eq!(tree.attr(hook, HOOK_ID_ATTR), Some("1"));
        assert_eq!(tree.attr(hook, BRANCH_ATTR), Some("0"));
        assert!(tree.is(tree.children(hook)[0], NodeType::CommentRangeStart));

        // Promotion is idempotent
        assert_eq!(promote(&mut tree, &comments(&[("1", "x")]), BranchKey::ROOT).unwrap(), 0);
    }

    #[test]
    fn test_resolve_directive() {
        let mut tree = document(&format!(
            "<w:p>{}{}{}{}{}</w:p>",
            run("before "),
            comment_start(4),
            run("inside"),
            comment_end(4),
            comment_reference(4)
        ));
        let texts = comments(&[("4", "displayWordsIf(false)")]);
        promote(&mut tree, &texts, BranchKey::ROOT).unwrap();
        let hook = first_hook(&tree).unwrap();

        let directive = Directive::resolve(&tree, hook, &texts).unwrap();
        assert_eq!(directive.id, "4");
        assert_eq!(directive.expression, "displayWordsIf(false)");
        assert_eq!(directive.branch, BranchKey::ROOT);
        assert!(directive.reference.is_some());
        assert_eq!(directive.paragraph, directive.end_paragraph);
        assert_eq!(directive.slice.first(), Some(&directive.start));
        assert_eq!(directive.slice.last(), Some(&directive.end));

        assert_eq!(directive.enclosed.len(), 1);
        assert_eq!(tree.text_content(directive.enclosed[0]), "inside");
        assert_eq!(directive.word_range().map(|(_, s, e)| (s, e)), Some((7, 13)));
        assert_eq!(directive.blocks, vec![directive.paragraph.unwrap()]);

        let paragraph = directive.paragraph.unwrap();
        directive.strip_markers(&mut tree);
        assert_eq!(tree.text_content(paragraph), "before inside");
        assert!(first_hook(&tree).is_none());
        assert_eq!(tree.children(paragraph).len(), 2);
    }

    #[test]
    fn test_enclosed_roots_across_paragraphs() {
        let mut tree = document(&format!(
            "<w:p>{}{}</w:p>{}<w:p>{}{}</w:p>",
            comment_start(1),
            run("a"),
            paragraph("b"),
            run("c"),
            comment_end(1)
        ));
        let texts = comments(&[("1", "x")]);
        promote(&mut tree, &texts, BranchKey::ROOT).unwrap();
        let directive = Directive::resolve(&tree, first_hook(&tree).unwrap(), &texts).unwrap();

        let texts: Vec<String> = directive
            .enclosed
            .iter()
            .map(|&node| tree.text_content(node))
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_ne!(directive.paragraph, directive.end_paragraph);
        assert!(directive.word_range().is_none());
        assert_eq!(directive.blocks.len(), 3);
    }

    #[test]
    fn test_blocks_inside_a_cell() {
        let cell_body = format!(
            "<w:p>{}{}</w:p><w:p>{}{}</w:p>",
            comment_start(2),
            run("x"),
            run("y"),
            comment_end(2)
        );
        let mut tree = document(&table(&[format!("<w:tr><w:tc>{cell_body}</w:tc></w:tr>")]));
        let texts = comments(&[("2", "repeatParagraph(items)")]);
        promote(&mut tree, &texts, BranchKey::ROOT).unwrap();
        let directive = Directive::resolve(&tree, first_hook(&tree).unwrap(), &texts).unwrap();

        assert_eq!(directive.blocks.len(), 2);
        for &block in &directive.blocks {
            assert!(tree.is(block, NodeType::Paragraph));
            assert!(tree.is(tree.parent(block).unwrap(), NodeType::Cell));
        }
    }

    #[test]
    fn test_missing_end_is_malformed() {
        let mut tree = document(&format!("<w:p>{}{}</w:p>", comment_start(9), run("x")));
        let texts = comments(&[("9", "x")]);
        promote(&mut tree, &texts, BranchKey::ROOT).unwrap();
        let err = Directive::resolve(&tree, first_hook(&tree).unwrap(), &texts).unwrap_err();
        assert!(matches!(err, StampError::MalformedDirective(_)));
    }

    #[test]
    fn test_parse_invocation() {
        assert_eq!(
            parse_invocation("repeatTableRow(people)"),
            Some(Invocation {
                name: "repeatTableRow".into(),
                argument: "people".into()
            })
        );
        assert_eq!(
            parse_invocation(" displayParagraphIf( a && (b || c) ) ").unwrap().argument,
            "a && (b || c)"
        );
        assert_eq!(parse_invocation("person.name"), None);
        assert_eq!(parse_invocation("1 + f(x)"), None);
    }
}
