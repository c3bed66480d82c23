//! CSV data source.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{DataError, Result};
use crate::sources::{infer_value, rows_to_objects, DataSource};

/// Options for CSV parsing
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: comma)
    pub delimiter: u8,
    /// Whether the CSV has a header row
    pub has_header: bool,
    /// Quote character (default: double quote)
    pub quote: u8,
    /// Whether to trim whitespace from fields
    pub trim: bool,
    /// Whether to allow flexible column counts
    pub flexible: bool,
    /// Turn numeric and boolean fields into typed values
    pub infer_types: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            quote: b'"',
            trim: true,
            flexible: false,
            infer_types: true,
        }
    }
}

impl CsvOptions {
    /// Create options for tab-separated values (TSV)
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Default::default()
        }
    }

    /// Create options for semicolon-separated values (common in European locales)
    pub fn semicolon() -> Self {
        Self {
            delimiter: b';',
            ..Default::default()
        }
    }

    /// Create options without header row
    pub fn without_header() -> Self {
        Self {
            has_header: false,
            ..Default::default()
        }
    }
}

/// CSV file data source
///
/// With a header row every record becomes an object keyed by the header;
/// without one every record becomes an array of fields.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    options: CsvOptions,
}

impl CsvSource {
    /// Create a new CSV source from a file path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, CsvOptions::default())
    }

    /// Create a new CSV source with custom options
    pub fn with_options(path: impl AsRef<Path>, options: CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::FileNotFound(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            options,
        })
    }

    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    /// Parse CSV from any reader
    pub fn parse<R: Read>(reader: R, options: &CsvOptions) -> Result<Value> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .quote(options.quote)
            .has_headers(false)
            .trim(if options.trim { csv::Trim::All } else { csv::Trim::None })
            .flexible(options.flexible)
            .from_reader(reader);

        let mut records = csv_reader.records();
        let header: Option<Vec<String>> = if options.has_header {
            match records.next() {
                Some(record) => Some(record?.iter().map(str::to_string).collect()),
                None => return Ok(Value::Array(Vec::new())),
            }
        } else {
            None
        };

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            let row: Vec<Value> = record
                .iter()
                .map(|field| {
                    if options.infer_types {
                        infer_value(field)
                    } else {
                        Value::String(field.to_string())
                    }
                })
                .collect();
            rows.push(row);
        }

        Ok(match header {
            Some(header) => rows_to_objects(&header, rows),
            None => Value::Array(rows.into_iter().map(Value::Array).collect()),
        })
    }
}

impl DataSource for CsvSource {
    fn load(&self) -> Result<Value> {
        let file = File::open(&self.path)?;
        Self::parse(BufReader::new(file), &self.options)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}
