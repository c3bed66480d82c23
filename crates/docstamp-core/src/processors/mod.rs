//! Directive processors
//!
//! A directive's comment text is either `name(argument)`, where `name` is a
//! registered processor, or a bare expression replacing the commented words.
//! Processors receive the directive after its markers have been stripped;
//! every position they need was captured when the hook was resolved.

pub mod display;
pub mod repeat;
pub mod replace;
pub mod table;

use std::collections::HashMap;

use docstamp_ooxml::{NodeId, WordPackage};
use rhai::{Array, Dynamic};
use tracing::{debug, warn};

use crate::branch::{BranchKey, Branches};
use crate::directive::{first_hook, parse_invocation, Directive};
use crate::error::{Result, StampError};
use crate::placeholder::Resolver;
use crate::stamper::Stamper;

/// Signature shared by every directive processor
///
/// The last argument is the text between the processor's parentheses.
pub type ProcessorFn = fn(&mut ProcessorContext<'_>, &Directive, &str) -> Result<()>;

/// Processor names mapped to their implementations
#[derive(Clone)]
pub struct ProcessorTable {
    entries: HashMap<String, ProcessorFn>,
}

impl std::fmt::Debug for ProcessorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ProcessorTable").field("names", &names).finish()
    }
}

impl Default for ProcessorTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProcessorTable {
    /// A table without any processor; every directive becomes a replacement
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The built-in processors
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.add("repeatTableRow", repeat::repeat_table_row);
        table.add("repeatRow", repeat::repeat_table_row);
        table.add("repeatParagraph", repeat::repeat_paragraph);
        table.add("repeatDocPart", crate::docpart::repeat_doc_part);
        table.add("replaceWith", replace::replace_with);
        table.add("replaceWordWith", replace::replace_with);
        table.add("resolveTable", table::resolve_table);
        display::register(&mut table);
        table
    }

    /// Register or override a processor
    pub fn add(&mut self, name: impl Into<String>, processor: ProcessorFn) {
        self.entries.insert(name.into(), processor);
    }

    pub fn get(&self, name: &str) -> Option<ProcessorFn> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Counters collected while processing directives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub directives: usize,
    pub sub_documents: usize,
}

/// Mutable state of one stamping call, shared by all processors
pub struct ProcessorContext<'a> {
    pub package: &'a mut WordPackage,
    pub branches: Branches,
    pub stamper: &'a Stamper,
    pub comments: HashMap<String, String>,
    pub stats: ProcessorStats,
}

impl<'a> ProcessorContext<'a> {
    pub fn new(
        package: &'a mut WordPackage,
        branches: Branches,
        stamper: &'a Stamper,
        comments: HashMap<String, String>,
    ) -> Self {
        Self {
            package,
            branches,
            stamper,
            comments,
            stats: ProcessorStats::default(),
        }
    }

    /// Process hooks in document order until none is left
    ///
    /// Content created by a processor (clones, imported sub-documents) is
    /// picked up by later iterations.
    pub fn run(&mut self, table: &ProcessorTable) -> Result<()> {
        while let Some(hook) = first_hook(&self.package.document) {
            let directive = Directive::resolve(&self.package.document, hook, &self.comments)?;
            debug!(
                id = %directive.id,
                expression = %directive.expression,
                branch = %directive.branch.to_attr(),
                "processing directive"
            );
            directive.strip_markers(&mut self.package.document);
            self.stats.directives += 1;

            let invocation = parse_invocation(&directive.expression)
                .and_then(|inv| table.get(&inv.name).map(|processor| (processor, inv.argument)));
            match invocation {
                Some((processor, argument)) => processor(self, &directive, &argument)?,
                None => replace::replace_expression(self, &directive, &directive.expression)?,
            }
        }
        Ok(())
    }

    /// Evaluation chain of a branch
    pub fn chain(&self, branch: BranchKey) -> Vec<Dynamic> {
        self.branches.chain(branch)
    }

    /// Evaluate an expression in the directive's branch
    pub fn evaluate(
        &self,
        directive: &Directive,
        expression: &str,
    ) -> std::result::Result<Dynamic, String> {
        self.stamper
            .evaluator()
            .evaluate(expression, &self.chain(directive.branch))
    }

    pub fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.stamper.evaluator(), self.stamper.config())
    }

    /// Unresolved policy for directives that shape structure rather than
    /// produce text: fail, or leave the anchor untouched
    pub fn skip_unresolved(&self, expression: &str, reason: &str) -> Result<()> {
        if self.stamper.config().fail_on_unresolved {
            return Err(StampError::unresolved(expression, reason));
        }
        warn!(expression, reason, "skipping directive with unresolved expression");
        Ok(())
    }

    /// Evaluate a repetition source; `None` means the directive is skipped
    ///
    /// Null counts as an empty collection.
    pub fn iterable(
        &self,
        directive: &Directive,
        expression: &str,
    ) -> Result<Option<Vec<Dynamic>>> {
        let value = match self.evaluate(directive, expression) {
            Ok(value) => value,
            Err(reason) => return self.skip_unresolved(expression, &reason).map(|_| None),
        };
        if value.is_unit() {
            return Ok(Some(Vec::new()));
        }
        if value.is_array() {
            return Ok(Some(value.cast::<Array>()));
        }
        if let Some(range) = value.clone().try_cast::<std::ops::Range<i64>>() {
            return Ok(Some(range.map(Dynamic::from).collect()));
        }
        let reason = format!("expected a collection, found {}", value.type_name());
        self.skip_unresolved(expression, &reason).map(|_| None)
    }

    /// Evaluate a condition; `None` means the directive is skipped
    pub fn condition(&self, directive: &Directive, expression: &str) -> Result<Option<bool>> {
        match self.evaluate(directive, expression) {
            Ok(value) => match value.as_bool() {
                Ok(flag) => Ok(Some(flag)),
                Err(found) => {
                    let reason = format!("expected a boolean, found {found}");
                    self.skip_unresolved(expression, &reason).map(|_| None)
                }
            },
            Err(reason) => self.skip_unresolved(expression, &reason).map(|_| None),
        }
    }
}

/// Block anchors of a directive, failing when the range covers none
pub(crate) fn require_blocks(
    ctx: &ProcessorContext<'_>,
    directive: &Directive,
    name: &str,
) -> Result<Vec<NodeId>> {
    let blocks = directive.attached_blocks(&ctx.package.document);
    if blocks.is_empty() {
        return Err(StampError::StructuralMismatch(format!(
            "{name} (comment {}) does not span any paragraph or table",
            directive.id
        )));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let table = ProcessorTable::standard();
        for name in [
            "repeatTableRow",
            "repeatRow",
            "repeatParagraph",
            "repeatDocPart",
            "displayParagraphIf",
            "displayParagraphIfAbsent",
            "displayTableRowIfPresent",
            "displayTableIf",
            "displayWordsIf",
            "displayDocPartIf",
            "replaceWith",
            "replaceWordWith",
            "resolveTable",
        ] {
            assert!(table.contains(name), "missing {name}");
        }
        assert!(!table.contains("person"));
        assert!(ProcessorTable::empty().names().next().is_none());
    }
}
