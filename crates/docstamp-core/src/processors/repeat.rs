//! `repeatTableRow` and `repeatParagraph`

use docstamp_ooxml::{NodeId, NodeType, XmlTree};
use rhai::Dynamic;
use tracing::debug;

use super::{require_blocks, ProcessorContext};
use crate::branch::{BranchKey, BRANCH_ATTR};
use crate::directive::{rebind_hooks, Directive};
use crate::dom::{
    collect_named, ensure_cell_content, paragraph_section, remove_table_if_rowless,
    self_or_ancestor,
};
use crate::error::{Result, StampError};

/// Repeat the table row holding the directive once per item
pub fn repeat_table_row(
    ctx: &mut ProcessorContext<'_>,
    directive: &Directive,
    argument: &str,
) -> Result<()> {
    let row = directive
        .container
        .and_then(|node| self_or_ancestor(&ctx.package.document, node, NodeType::Row))
        .ok_or_else(|| {
            StampError::StructuralMismatch(format!(
                "repeatTableRow (comment {}) is not inside a table row",
                directive.id
            ))
        })?;
    let Some(items) = ctx.iterable(directive, argument)? else {
        return Ok(());
    };
    repeat_blocks(ctx, directive.branch, &[row], items)
}

/// Repeat the paragraphs spanned by the directive once per item
pub fn repeat_paragraph(
    ctx: &mut ProcessorContext<'_>,
    directive: &Directive,
    argument: &str,
) -> Result<()> {
    let blocks = require_blocks(ctx, directive, "repeatParagraph")?;
    let Some(items) = ctx.iterable(directive, argument)? else {
        return Ok(());
    };
    repeat_blocks(ctx, directive.branch, &blocks, items)
}

/// Clone `anchor` once per item in front of it, then remove the anchor
///
/// Every clone root is bound to a new branch holding its item, and hooks
/// inside the clone are rebound to that branch.
pub(crate) fn repeat_blocks(
    ctx: &mut ProcessorContext<'_>,
    parent: BranchKey,
    anchor: &[NodeId],
    items: Vec<Dynamic>,
) -> Result<()> {
    let Some(&first) = anchor.first() else {
        return Ok(());
    };
    let count = items.len();
    let tree = &mut ctx.package.document;
    let section = section_break_source(tree, anchor);
    let container = tree.parent(first);

    let mut last_copy = None;
    for item in items {
        let key = ctx.branches.fork(parent, item);
        for &node in anchor {
            let copy = tree.deep_clone(node);
            tree.set_attr(copy, BRANCH_ATTR, key.to_attr());
            rebind_hooks(tree, copy, key);
            tree.insert_before(first, copy)?;
            last_copy = Some(copy);
        }
    }

    if let (Some(section), Some(last_copy)) = (section, last_copy) {
        apply_section_break(tree, section, last_copy)?;
    }
    for &node in anchor {
        tree.detach(node);
    }
    if let Some(container) = container {
        ensure_cell_content(tree, container);
        remove_table_if_rowless(tree, container);
    }

    debug!(items = count, anchors = anchor.len(), "repeated content");
    Ok(())
}

/// Section properties the repeated content must end with
///
/// When the anchor holds an odd number of section breaks, repeating it
/// would shift the section that follows it; the next paragraph's section
/// properties are then re-applied once after the last copy.
pub(crate) fn section_break_source(tree: &XmlTree, anchor: &[NodeId]) -> Option<NodeId> {
    let last = *anchor.last()?;
    let next = tree.next_sibling(last)?;
    let section = paragraph_section(tree, next)?;
    let breaks: usize = anchor
        .iter()
        .map(|&node| collect_named(tree, node, "w:sectPr").len())
        .sum();
    (breaks % 2 == 1).then_some(section)
}

/// Give the last copy a copy of `section`
pub(crate) fn apply_section_break(
    tree: &mut XmlTree,
    section: NodeId,
    last_copy: NodeId,
) -> Result<()> {
    let copy = tree.deep_clone(section);
    if tree.is(last_copy, NodeType::Paragraph) {
        let properties = match tree.child_named(last_copy, "w:pPr") {
            Some(properties) => properties,
            None => {
                let properties = tree.create_element("w:pPr", &[]);
                tree.insert_child(last_copy, 0, properties);
                properties
            }
        };
        if let Some(existing) = tree.child_named(properties, "w:sectPr") {
            tree.detach(existing);
        }
        tree.append_child(properties, copy);
    } else {
        let paragraph = tree.create_element("w:p", &[]);
        let properties = tree.create_element("w:pPr", &[]);
        tree.append_child(paragraph, properties);
        tree.append_child(properties, copy);
        tree.insert_after(last_copy, paragraph)?;
    }
    Ok(())
}
