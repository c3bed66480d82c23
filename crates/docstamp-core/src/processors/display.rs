//! Conditional display directives
//!
//! `display<Target>If(condition)` keeps its target when the condition is
//! true. The `IfPresent` and `IfAbsent` variants test whether an expression
//! yields a value; an expression that cannot be evaluated counts as absent.

use docstamp_ooxml::{NodeId, NodeType, XmlTree};
use tracing::debug;

use super::{require_blocks, ProcessorContext, ProcessorTable};
use crate::directive::Directive;
use crate::dom::{remove_block, remove_inline, remove_table_if_rowless, self_or_ancestor};
use crate::error::{Result, StampError};

/// What a display directive removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Paragraph,
    TableRow,
    Table,
    Words,
    DocPart,
}

impl Target {
    fn label(self) -> &'static str {
        match self {
            Target::Paragraph => "paragraph",
            Target::TableRow => "table row",
            Target::Table => "table",
            Target::Words => "words",
            Target::DocPart => "document part",
        }
    }
}

/// How the argument decides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Test {
    /// Boolean condition
    If,
    /// Value is neither null nor unresolvable
    Present,
    /// Value is null or unresolvable
    Absent,
}

pub(crate) fn register(table: &mut ProcessorTable) {
    table.add("displayParagraphIf", |c, d, a| display(c, d, a, Target::Paragraph, Test::If));
    table.add("displayParagraphIfPresent", |c, d, a| {
        display(c, d, a, Target::Paragraph, Test::Present)
    });
    table.add("displayParagraphIfAbsent", |c, d, a| {
        display(c, d, a, Target::Paragraph, Test::Absent)
    });
    table.add("displayTableRowIf", |c, d, a| display(c, d, a, Target::TableRow, Test::If));
    table.add("displayTableRowIfPresent", |c, d, a| {
        display(c, d, a, Target::TableRow, Test::Present)
    });
    table.add("displayTableRowIfAbsent", |c, d, a| {
        display(c, d, a, Target::TableRow, Test::Absent)
    });
    table.add("displayTableIf", |c, d, a| display(c, d, a, Target::Table, Test::If));
    table.add("displayTableIfPresent", |c, d, a| display(c, d, a, Target::Table, Test::Present));
    table.add("displayTableIfAbsent", |c, d, a| display(c, d, a, Target::Table, Test::Absent));
    table.add("displayWordsIf", |c, d, a| display(c, d, a, Target::Words, Test::If));
    table.add("displayWordsIfPresent", |c, d, a| display(c, d, a, Target::Words, Test::Present));
    table.add("displayWordsIfAbsent", |c, d, a| display(c, d, a, Target::Words, Test::Absent));
    table.add("displayDocPartIf", |c, d, a| display(c, d, a, Target::DocPart, Test::If));
    table.add("displayDocPartIfPresent", |c, d, a| {
        display(c, d, a, Target::DocPart, Test::Present)
    });
    table.add("displayDocPartIfAbsent", |c, d, a| display(c, d, a, Target::DocPart, Test::Absent));
}

/// Keep or remove a directive's target
pub fn display(
    ctx: &mut ProcessorContext<'_>,
    directive: &Directive,
    argument: &str,
    target: Target,
    test: Test,
) -> Result<()> {
    let nodes = target_nodes(ctx, directive, target)?;

    let keep = match test {
        Test::If => match ctx.condition(directive, argument)? {
            Some(keep) => keep,
            None => return Ok(()),
        },
        Test::Present => ctx
            .evaluate(directive, argument)
            .is_ok_and(|value| !value.is_unit()),
        Test::Absent => ctx
            .evaluate(directive, argument)
            .map_or(true, |value| value.is_unit()),
    };
    if keep {
        return Ok(());
    }

    debug!(id = %directive.id, target = target.label(), "removing hidden content");
    let tree = &mut ctx.package.document;
    match target {
        Target::Words => {
            for node in nodes {
                if is_block(tree, node) {
                    remove_block(tree, node);
                } else {
                    remove_inline(tree, node);
                }
            }
        }
        Target::TableRow => {
            for row in nodes {
                let table = tree.parent(row);
                tree.detach(row);
                if let Some(table) = table {
                    remove_table_if_rowless(tree, table);
                }
            }
        }
        Target::Paragraph | Target::Table | Target::DocPart => {
            for node in nodes {
                remove_block(tree, node);
            }
        }
    }
    Ok(())
}

fn is_block(tree: &XmlTree, node: NodeId) -> bool {
    tree.is(node, NodeType::Paragraph) || tree.is(node, NodeType::Table)
}

/// Nodes removed when the target is hidden
fn target_nodes(
    ctx: &ProcessorContext<'_>,
    directive: &Directive,
    target: Target,
) -> Result<Vec<NodeId>> {
    let tree = &ctx.package.document;
    let enclosing = |kind: NodeType| {
        directive
            .container
            .and_then(|node| self_or_ancestor(tree, node, kind))
            .map(|node| vec![node])
            .ok_or_else(|| {
                StampError::StructuralMismatch(format!(
                    "display directive for a {} (comment {}) is not inside one",
                    target.label(),
                    directive.id
                ))
            })
    };
    match target {
        Target::Paragraph => enclosing(NodeType::Paragraph),
        Target::TableRow => enclosing(NodeType::Row),
        Target::Table => enclosing(NodeType::Table),
        Target::Words => Ok(directive
            .enclosed
            .iter()
            .copied()
            .filter(|&node| tree.is_attached(node))
            .collect()),
        Target::DocPart => require_blocks(ctx, directive, "displayDocPartIf"),
    }
}
