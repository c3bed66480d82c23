//! The stamping pipeline
//!
//! 1. repair: malformed comment directives are removed
//! 2. promotion: remaining range starts are wrapped in hooks
//! 3. directives: hooks are processed in document order until none is left
//! 4. placeholders: `${...}` in the document, headers and footers
//! 5. cleanup: orphaned notes, markers and comments; stamper markup

use std::io::Write;
use std::path::Path;

use docstamp_ooxml::{NodeId, NodeType, WordPackage, XmlTree};
use rhai::{Dynamic, Engine};
use serde::Serialize;
use tracing::info;

use crate::branch::{BranchKey, Branches, BRANCH_ATTR};
use crate::cleanup::{cleanup, CleanupReport};
use crate::config::StampConfig;
use crate::directive::{comment_texts, parse_invocation, promote};
use crate::dom::{collect_of_type, marker_id};
use crate::error::Result;
use crate::eval::Evaluator;
use crate::placeholder::{find_placeholders, Part, Resolver};
use crate::processors::{ProcessorContext, ProcessorFn, ProcessorTable};
use crate::splice::paragraph_text;
use crate::validate::{find_malformed, repair, RepairReport};

/// Summary of one stamping call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StampReport {
    pub repair: RepairReport,
    pub directives: usize,
    pub placeholders: usize,
    pub sub_documents: usize,
    pub cleanup: CleanupReport,
}

/// A directive found by [`Stamper::check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveSummary {
    pub id: String,
    pub expression: String,
    /// Processor handling the directive; `None` for a plain replacement
    pub processor: Option<String>,
}

/// Directives and placeholders of a template, without stamping it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Comment ids that stamping would discard as malformed
    pub malformed: Vec<String>,
    pub directives: Vec<DirectiveSummary>,
    pub placeholders: Vec<String>,
}

/// Stamps DOCX templates with data
#[derive(Debug)]
pub struct Stamper {
    config: StampConfig,
    evaluator: Evaluator,
    processors: ProcessorTable,
}

impl Default for Stamper {
    fn default() -> Self {
        Self::new(StampConfig::default())
    }
}

impl Stamper {
    pub fn new(config: StampConfig) -> Self {
        let evaluator = Evaluator::new(&config.evaluator);
        Self {
            config,
            evaluator,
            processors: ProcessorTable::standard(),
        }
    }

    pub fn config(&self) -> &StampConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Engine access for registering custom functions
    pub fn engine_mut(&mut self) -> &mut Engine {
        self.evaluator.engine_mut()
    }

    /// Register a custom directive processor
    pub fn register_processor(&mut self, name: impl Into<String>, processor: ProcessorFn) {
        self.processors.add(name, processor);
    }

    /// Stamp a template held in memory and write the result to `output`
    pub fn stamp<W: Write>(
        &self,
        template: &[u8],
        data: &serde_json::Value,
        mut output: W,
    ) -> Result<StampReport> {
        let mut package = WordPackage::from_bytes(template)?;
        let report = self.stamp_package(&mut package, data)?;
        let bytes = package.to_bytes()?;
        output.write_all(&bytes)?;
        Ok(report)
    }

    /// Stamp a template file into an output file
    pub fn stamp_file(
        &self,
        template: impl AsRef<Path>,
        data: &serde_json::Value,
        output: impl AsRef<Path>,
    ) -> Result<StampReport> {
        let mut package = WordPackage::open(template.as_ref())?;
        let report = self.stamp_package(&mut package, data)?;
        package.save(output.as_ref())?;
        info!(output = %output.as_ref().display(), "wrote stamped document");
        Ok(report)
    }

    /// Stamp an opened package in place
    pub fn stamp_package(
        &self,
        package: &mut WordPackage,
        data: &serde_json::Value,
    ) -> Result<StampReport> {
        let root = Evaluator::to_dynamic(data)?;
        self.stamp_chain(package, vec![root])
    }

    /// Stamp against an inherited chain of data items, outermost first
    ///
    /// Content without a branch of its own evaluates against the innermost
    /// item, which is how sub-documents see the item they were stamped for.
    pub(crate) fn stamp_chain(
        &self,
        package: &mut WordPackage,
        chain: Vec<Dynamic>,
    ) -> Result<StampReport> {
        let depth = chain.len();
        let (branches, base) = Branches::from_chain(chain);

        let repair = repair(package)?;
        let comments = comment_texts(package.comments.as_ref());
        let promoted = promote(&mut package.document, &comments, base)?;
        info!(
            depth,
            directives = promoted,
            malformed = repair.malformed.len(),
            "stamping template"
        );

        let mut ctx = ProcessorContext::new(package, branches, self, comments);
        ctx.run(&self.processors)?;
        let stats = ctx.stats;
        let branches = ctx.branches;

        let placeholders = self.resolve_placeholders(package, &branches, base)?;
        let cleanup = cleanup(package);

        let report = StampReport {
            repair,
            directives: stats.directives,
            placeholders,
            sub_documents: stats.sub_documents,
            cleanup,
        };
        info!(
            depth,
            directives = report.directives,
            placeholders = report.placeholders,
            sub_documents = report.sub_documents,
            "stamping finished"
        );
        Ok(report)
    }

    /// Resolve `${...}` placeholders in every part
    ///
    /// Document paragraphs evaluate against the nearest enclosing branch;
    /// headers and footers against `base`, and cannot embed images.
    fn resolve_placeholders(
        &self,
        package: &mut WordPackage,
        branches: &Branches,
        base: BranchKey,
    ) -> Result<usize> {
        let resolver = Resolver::new(&self.evaluator, &self.config);
        let mut resolved = 0;

        for paragraph in placeholder_paragraphs(&package.document) {
            let branch = branch_of(&package.document, paragraph).unwrap_or(base);
            let chain = branches.chain(branch);
            resolved += resolver.resolve_paragraph(package, Part::Document, paragraph, &chain)?;
        }

        let chain = branches.chain(base);
        for index in 0..package.headers_footers.len() {
            for paragraph in placeholder_paragraphs(&package.headers_footers[index].tree) {
                resolved += resolver.resolve_paragraph(
                    package,
                    Part::HeaderFooter(index),
                    paragraph,
                    &chain,
                )?;
            }
        }
        Ok(resolved)
    }

    /// List a template's directives and placeholders without stamping
    pub fn check(&self, template: &[u8]) -> Result<CheckReport> {
        let package = WordPackage::from_bytes(template)?;
        let comments = comment_texts(package.comments.as_ref());
        let bodies = comments.keys().cloned().collect();
        let malformed = find_malformed(&package.document, &bodies)?;

        let tree = &package.document;
        let directives = collect_of_type(tree, tree.root(), NodeType::CommentRangeStart)
            .into_iter()
            .filter_map(|start| marker_id(tree, start))
            .filter(|id| !malformed.contains(*id))
            .filter_map(|id| {
                let expression = comments.get(id)?.clone();
                let processor = parse_invocation(&expression)
                    .map(|invocation| invocation.name)
                    .filter(|name| self.processors.contains(name));
                Some(DirectiveSummary {
                    id: id.to_string(),
                    expression,
                    processor,
                })
            })
            .collect();

        let mut placeholders = Vec::new();
        let trees = std::iter::once(&package.document)
            .chain(package.headers_footers.iter().map(|part| &part.tree));
        for tree in trees {
            for paragraph in collect_of_type(tree, tree.root(), NodeType::Paragraph) {
                let text = paragraph_text(tree, paragraph);
                placeholders.extend(find_placeholders(&text).into_iter().map(|p| p.expression));
            }
        }

        Ok(CheckReport {
            malformed: malformed.into_iter().collect(),
            directives,
            placeholders,
        })
    }
}

/// Paragraphs whose text holds a placeholder opener
fn placeholder_paragraphs(tree: &XmlTree) -> Vec<NodeId> {
    collect_of_type(tree, tree.root(), NodeType::Paragraph)
        .into_iter()
        .filter(|&paragraph| paragraph_text(tree, paragraph).contains("${"))
        .collect()
}

/// Branch bound to the node or its nearest ancestor
fn branch_of(tree: &XmlTree, node: NodeId) -> Option<BranchKey> {
    std::iter::once(node)
        .chain(tree.ancestors(node))
        .find_map(|n| tree.attr(n, BRANCH_ATTR))
        .and_then(BranchKey::from_attr)
}
