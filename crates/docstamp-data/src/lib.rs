//! # docstamp-data
//!
//! Loads template data for docstamp from JSON, CSV/TSV, Excel workbooks and
//! `.properties` files. Every source produces a `serde_json::Value`; tabular
//! sources become an array of records keyed by their header row.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docstamp_data::{load_path, CsvOptions, CsvSource, DataSource};
//!
//! // Pick an adapter from the file extension
//! let data = load_path("customer.json")?;
//!
//! // Or configure one explicitly
//! let rows = CsvSource::with_options("items.csv", CsvOptions::semicolon())?.load()?;
//! ```

pub mod error;
pub mod sources;

use std::path::Path;

use serde_json::Value;
use tracing::debug;

pub use error::{DataError, Result};
pub use sources::{CsvOptions, CsvSource, DataSource, ExcelSource, JsonSource, PropertiesSource};

/// File extensions [`load_path`] understands
pub const SUPPORTED_EXTENSIONS: &[&str] = &["json", "csv", "tsv", "xlsx", "xlsm", "properties"];

/// Adapter for a data file, chosen by extension
pub fn source_for(path: impl AsRef<Path>) -> Result<Box<dyn DataSource>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let source: Box<dyn DataSource> = match extension.as_str() {
        "json" => Box::new(JsonSource::new(path)?),
        "csv" => Box::new(CsvSource::new(path)?),
        "tsv" => Box::new(CsvSource::with_options(path, CsvOptions::tsv())?),
        "xlsx" | "xlsm" => Box::new(ExcelSource::new(path)?),
        "properties" => Box::new(PropertiesSource::new(path)?),
        _ => return Err(DataError::UnsupportedFormat(path.display().to_string())),
    };
    Ok(source)
}

/// Load a data file, choosing the adapter by extension
pub fn load_path(path: impl AsRef<Path>) -> Result<Value> {
    let source = source_for(path)?;
    let value = source.load()?;
    debug!(source = %source.describe(), "loaded template data");
    Ok(value)
}
