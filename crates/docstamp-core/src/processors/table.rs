//! `resolveTable`: fill a table from a `{ headers, records }` object
//!
//! The table's first row is the header template and its second row the
//! record template. Each generated row is a copy of its template with the
//! template's first cell repeated once per column.

use docstamp_ooxml::{NodeId, NodeType, XmlTree};
use rhai::{Array, Dynamic, Map};
use tracing::debug;

use super::ProcessorContext;
use crate::directive::Directive;
use crate::dom::{remove_block, remove_table_if_rowless, self_or_ancestor};
use crate::error::{Result, StampError};
use crate::splice::{paragraph_text, replace_text};

pub fn resolve_table(
    ctx: &mut ProcessorContext<'_>,
    directive: &Directive,
    argument: &str,
) -> Result<()> {
    let tree = &ctx.package.document;
    let table = directive
        .container
        .and_then(|node| self_or_ancestor(tree, node, NodeType::Table))
        .ok_or_else(|| {
            StampError::StructuralMismatch(format!(
                "resolveTable (comment {}) is not inside a table",
                directive.id
            ))
        })?;

    let value = match ctx.evaluate(directive, argument) {
        Ok(value) => value,
        Err(reason) => return ctx.skip_unresolved(argument, &reason),
    };
    if value.is_unit() {
        remove_block(&mut ctx.package.document, table);
        return Ok(());
    }
    let Some(object) = value.clone().try_cast::<Map>() else {
        let reason = format!("expected a table object, found {}", value.type_name());
        return ctx.skip_unresolved(argument, &reason);
    };

    let tree = &mut ctx.package.document;
    let rows: Vec<NodeId> = tree
        .children(table)
        .iter()
        .copied()
        .filter(|&node| tree.is(node, NodeType::Row))
        .collect();
    let [header_template, record_template, ..] = rows[..] else {
        return Err(StampError::StructuralMismatch(format!(
            "resolveTable (comment {}) needs a header row and a record row",
            directive.id
        )));
    };

    let headers = list(object.get("headers"));
    let records = list(object.get("records"));

    if !headers.is_empty() {
        let texts: Vec<String> = headers.iter().map(cell_text).collect();
        let row = build_row(tree, header_template, &texts)?;
        tree.insert_before(header_template, row)?;
    }
    for record in &records {
        let texts: Vec<String> = match record.clone().try_cast::<Array>() {
            Some(values) => values.iter().map(cell_text).collect(),
            None => vec![cell_text(record)],
        };
        let row = build_row(tree, record_template, &texts)?;
        tree.insert_before(header_template, row)?;
    }

    for row in rows {
        tree.detach(row);
    }
    remove_table_if_rowless(tree, table);
    debug!(headers = headers.len(), records = records.len(), "resolved table");
    Ok(())
}

fn list(value: Option<&Dynamic>) -> Array {
    value
        .and_then(|value| value.clone().try_cast::<Array>())
        .unwrap_or_default()
}

fn cell_text(value: &Dynamic) -> String {
    if value.is_unit() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Copy of `template` holding one cell per text
fn build_row(tree: &mut XmlTree, template: NodeId, texts: &[String]) -> Result<NodeId> {
    let first_cell = tree
        .children(template)
        .iter()
        .copied()
        .find(|&node| tree.is(node, NodeType::Cell))
        .ok_or_else(|| StampError::StructuralMismatch("table template row has no cells".into()))?;

    let row = tree.deep_clone(template);
    let cells: Vec<NodeId> = tree
        .children(row)
        .iter()
        .copied()
        .filter(|&node| tree.is(node, NodeType::Cell))
        .collect();
    for cell in cells {
        tree.detach(cell);
    }

    for text in texts {
        let cell = tree.deep_clone(first_cell);
        set_cell_text(tree, cell, text)?;
        tree.append_child(row, cell);
    }
    Ok(row)
}

/// Reduce a cell to a single paragraph holding `text`
fn set_cell_text(tree: &mut XmlTree, cell: NodeId, text: &str) -> Result<()> {
    let blocks: Vec<NodeId> = tree
        .children(cell)
        .iter()
        .copied()
        .filter(|&node| tree.is(node, NodeType::Paragraph) || tree.is(node, NodeType::Table))
        .collect();
    let paragraph = match blocks.iter().copied().find(|&node| tree.is(node, NodeType::Paragraph)) {
        Some(paragraph) => paragraph,
        None => {
            let paragraph = tree.create_element("w:p", &[]);
            tree.append_child(cell, paragraph);
            paragraph
        }
    };
    for block in blocks.into_iter().filter(|&node| node != paragraph) {
        tree.detach(block);
    }

    let length = paragraph_text(tree, paragraph).len();
    replace_text(tree, paragraph, 0, length, text)
}
