//! # docstamp-ooxml
//!
//! DOCX package access for docstamp.
//!
//! This crate provides:
//! - ZIP container reading and deterministic writing ([`OoxmlArchive`])
//! - An arena XML tree with parent links for in-place editing ([`XmlTree`])
//! - A package view exposing the parts the stamper edits ([`WordPackage`])
//! - Relationship and media bookkeeping for embedded images
//!
//! ## Example: Editing a Document
//!
//! ```no_run
//! use docstamp_ooxml::{NodeType, WordPackage};
//!
//! let mut package = WordPackage::open("template.docx")?;
//! let root = package.document.root();
//! let paragraphs = package
//!     .document
//!     .children(root)
//!     .iter()
//!     .filter(|&&id| package.document.is(id, NodeType::Paragraph))
//!     .count();
//! println!("{paragraphs} top-level paragraphs");
//! package.save("copy.docx")?;
//! # Ok::<(), docstamp_ooxml::OoxmlError>(())
//! ```

pub mod archive;
pub mod error;
pub mod media;
pub mod package;
pub mod relationships;
#[doc(hidden)]
pub mod test_utils;
pub mod tree;

pub use archive::OoxmlArchive;
pub use error::{OoxmlError, Result};
pub use package::{HeaderFooterPart, WordPackage};
pub use relationships::{Relationship, Relationships};
pub use tree::{NodeData, NodeId, NodeType, XmlTree, HOOK_ELEMENT, STAMP_PREFIX};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
