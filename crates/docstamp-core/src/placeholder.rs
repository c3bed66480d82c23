//! `${expression}` placeholders and the unresolved-expression policy

use docstamp_ooxml::{NodeId, WordPackage, XmlTree};
use rhai::Dynamic;
use tracing::warn;

use crate::config::StampConfig;
use crate::error::{Result, StampError};
use crate::eval::Evaluator;
use crate::render::{Rendered, Renderer};
use crate::splice::{paragraph_text, replace_fragments, replace_text};

/// A placeholder found in a paragraph's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte offset of `$`
    pub start: usize,
    /// Byte offset just past the closing `}`
    pub end: usize,
    /// Text between the braces
    pub expression: String,
}

/// Find every brace-balanced `${...}` in a text
///
/// Braces inside double-quoted strings do not count. An opening `${`
/// without its closing brace is not a placeholder.
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find("${") {
        let start = cursor + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut close = None;

        for (index, &byte) in bytes.iter().enumerate().skip(start + 1) {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(index);
                        break;
                    }
                }
                _ => {}
            }
        }

        match close {
            Some(close) => {
                found.push(Placeholder {
                    start,
                    end: close + 1,
                    expression: text[start + 2..close].to_string(),
                });
                cursor = close + 1;
            }
            None => cursor = start + 2,
        }
    }
    found
}

/// What to do with one expression occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Substitute rendered content
    Replace(Rendered),
    /// Keep the template text untouched
    Leave,
}

/// A part holding paragraphs to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    /// `word/document.xml`
    Document,
    /// Index into [`WordPackage::headers_footers`]
    HeaderFooter(usize),
}

impl Part {
    /// The part's tree inside a package
    pub fn tree_mut(self, package: &mut WordPackage) -> Option<&mut XmlTree> {
        match self {
            Part::Document => Some(&mut package.document),
            Part::HeaderFooter(index) => package
                .headers_footers
                .get_mut(index)
                .map(|part| &mut part.tree),
        }
    }
}

/// Evaluates and renders expressions under the configured policy
pub struct Resolver<'a> {
    evaluator: &'a Evaluator,
    config: &'a StampConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(evaluator: &'a Evaluator, config: &'a StampConfig) -> Self {
        Self { evaluator, config }
    }

    /// Evaluate and render one expression
    ///
    /// `literal` is the template text shown by diagnostic placeholders.
    /// Images can only be embedded when `media` is given.
    pub fn resolve(
        &self,
        expression: &str,
        literal: &str,
        chain: &[Dynamic],
        media: Option<&mut WordPackage>,
    ) -> Result<Resolution> {
        let rendered = self
            .evaluator
            .evaluate(expression, chain)
            .and_then(|value| Renderer::new(self.config, media).render(value));
        match rendered {
            Ok(rendered) => Ok(Resolution::Replace(rendered)),
            Err(reason) => self.unresolved(expression, literal, &reason),
        }
    }

    /// Apply the unresolved policy: fail, then default, then diagnostic,
    /// then leave as is
    pub fn unresolved(&self, expression: &str, literal: &str, reason: &str) -> Result<Resolution> {
        if self.config.fail_on_unresolved {
            return Err(StampError::unresolved(expression, reason));
        }
        if let Some(default) = &self.config.unresolved_default {
            return Ok(Resolution::Replace(Rendered::Text(default.clone())));
        }
        if self.config.diagnostic_placeholders {
            return Ok(Resolution::Replace(Rendered::Text(format!(
                "[[{literal}: {reason}]]"
            ))));
        }
        warn!(expression, reason, "leaving unresolved expression in place");
        Ok(Resolution::Leave)
    }

    /// Resolve every placeholder of a paragraph; returns how many were
    /// replaced
    pub fn resolve_paragraph(
        &self,
        package: &mut WordPackage,
        part: Part,
        paragraph: NodeId,
        chain: &[Dynamic],
    ) -> Result<usize> {
        let Some(tree) = part.tree_mut(package) else {
            return Ok(0);
        };
        let placeholders = find_placeholders(&paragraph_text(tree, paragraph));
        let mut replaced = 0;

        // Right to left, so earlier offsets stay valid
        for placeholder in placeholders.into_iter().rev() {
            let literal = format!("${{{}}}", placeholder.expression);
            let media = match part {
                Part::Document => Some(&mut *package),
                Part::HeaderFooter(_) => None,
            };
            let resolution = self.resolve(placeholder.expression.trim(), &literal, chain, media)?;
            let Resolution::Replace(rendered) = resolution else {
                continue;
            };
            let Some(tree) = part.tree_mut(package) else {
                break;
            };
            splice_rendered(tree, paragraph, placeholder.start, placeholder.end, rendered)?;
            replaced += 1;
        }
        Ok(replaced)
    }
}

/// Write rendered content over a range of a paragraph
pub fn splice_rendered(
    tree: &mut XmlTree,
    paragraph: NodeId,
    start: usize,
    end: usize,
    rendered: Rendered,
) -> Result<()> {
    match rendered {
        Rendered::Text(text) => replace_text(tree, paragraph, start, end, &text),
        Rendered::Rich(fragments) => replace_fragments(tree, paragraph, start, end, &fragments),
    }
}
