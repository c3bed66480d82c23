//! Replacement of commented words

use docstamp_ooxml::NodeType;

use super::ProcessorContext;
use crate::directive::Directive;
use crate::dom::{remove_block, remove_inline};
use crate::error::{Result, StampError};
use crate::placeholder::{splice_rendered, Resolution};

/// `replaceWith(expression)`
pub fn replace_with(
    ctx: &mut ProcessorContext<'_>,
    directive: &Directive,
    argument: &str,
) -> Result<()> {
    replace_expression(ctx, directive, argument)
}

/// Replace the commented range by the rendered value of `expression`
///
/// A range inside one paragraph is replaced in place, keeping the first
/// run's formatting. A range spanning paragraphs is emptied and the value
/// inserted where the range started.
pub fn replace_expression(
    ctx: &mut ProcessorContext<'_>,
    directive: &Directive,
    expression: &str,
) -> Result<()> {
    let chain = ctx.chain(directive.branch);
    let resolver = ctx.resolver();
    let resolution = resolver.resolve(
        expression,
        &directive.expression,
        &chain,
        Some(&mut *ctx.package),
    )?;
    let Resolution::Replace(rendered) = resolution else {
        return Ok(());
    };

    let tree = &mut ctx.package.document;
    if let Some((paragraph, start, end)) = directive.word_range() {
        return splice_rendered(tree, paragraph, start, end, rendered);
    }

    let (Some(paragraph), Some(start)) = (directive.paragraph, directive.start_offset) else {
        return Err(StampError::StructuralMismatch(format!(
            "replacement (comment {}) does not start inside a paragraph",
            directive.id
        )));
    };
    for &node in &directive.enclosed {
        if !tree.is_attached(node) {
            continue;
        }
        if tree.is(node, NodeType::Paragraph) || tree.is(node, NodeType::Table) {
            remove_block(tree, node);
        } else {
            remove_inline(tree, node);
        }
    }
    splice_rendered(tree, paragraph, start, start, rendered)
}
