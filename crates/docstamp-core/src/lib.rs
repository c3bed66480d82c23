//! # docstamp-core
//!
//! Comment-directive DOCX template stamping.
//!
//! Templates are ordinary Word documents. A comment attached to a range of
//! content is a directive: `repeatTableRow(people)` repeats the commented
//! row once per person, `displayParagraphIf(total > 0)` keeps a paragraph
//! only when the condition holds, and a bare expression such as
//! `customer.name` replaces the commented words. `${...}` placeholders in
//! any paragraph, header or footer are replaced by their value.
//!
//! ## Example
//!
//! ```no_run
//! use docstamp_core::{StampConfig, Stamper};
//! use serde_json::json;
//!
//! let stamper = Stamper::new(StampConfig::default());
//! let data = json!({ "customer": { "name": "ACME" }, "items": [] });
//! let report = stamper.stamp_file("invoice.docx", &data, "out.docx")?;
//! println!("{} directives processed", report.directives);
//! # Ok::<(), docstamp_core::StampError>(())
//! ```

pub mod branch;
pub mod cleanup;
pub mod config;
pub mod directive;
pub mod docpart;
pub mod dom;
pub mod error;
pub mod eval;
pub mod iter;
pub mod placeholder;
pub mod processors;
pub mod render;
pub mod splice;
pub mod stamper;
pub mod validate;

pub use branch::{BranchKey, Branches};
pub use cleanup::CleanupReport;
pub use config::{EvaluatorSettings, StampConfig};
pub use directive::Directive;
pub use error::{Result, StampError};
pub use eval::{Evaluator, ImageValue, StyledText, TextStyle};
pub use iter::{ResettableIterator, TreeIter};
pub use processors::{ProcessorContext, ProcessorFn, ProcessorTable};
pub use stamper::{CheckReport, DirectiveSummary, StampReport, Stamper};
pub use validate::RepairReport;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
