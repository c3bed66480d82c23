//! docstamp CLI - Command-line interface library
//!
//! - Stamp: fill a DOCX template with data from a JSON, CSV, Excel or
//!   properties file
//! - Check: list a template's directives and placeholders
//!
//! # Library Usage
//!
//! ```ignore
//! use docstamp_cli::{check_command, stamp_command, OutputFormat, StampArgs};
//!
//! let report = stamp_command(&StampArgs::new("invoice.docx", "invoice.json"))?;
//! check_command(Path::new("invoice.docx"), OutputFormat::Json, false)?;
//! ```
//!
//! # Binary Usage
//!
//! ```bash
//! # Stamp a template
//! docstamp stamp invoice.docx --data invoice.json --output out.docx
//!
//! # Inspect a template
//! docstamp check invoice.docx --format json
//! ```

pub mod app;

pub use app::{check_command, format_check_report, load_data, run_cli, stamp_command};
pub use app::{OutputFormat, StampArgs};
