//! Excel/XLSX data source using calamine.

use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Range, Reader, Xlsx, XlsxError};
use serde_json::Value;

use crate::error::{DataError, Result};
use crate::sources::{rows_to_objects, DataSource};

/// Excel workbook data source
///
/// Loads one sheet (the first unless another is selected), using its first
/// row as the header.
#[derive(Debug, Clone)]
pub struct ExcelSource {
    path: PathBuf,
    sheet_names: Vec<String>,
    sheet: Option<String>,
    range: Option<String>,
}

impl ExcelSource {
    /// Create a new Excel source from a file path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::FileNotFound(path.display().to_string()));
        }

        let workbook: Xlsx<_> =
            open_workbook(path).map_err(|e: XlsxError| DataError::WorkbookOpen(e.to_string()))?;
        let sheet_names = workbook.sheet_names().to_vec();

        Ok(Self {
            path: path.to_path_buf(),
            sheet_names,
            sheet: None,
            range: None,
        })
    }

    /// Select the sheet to load
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Result<Self> {
        let sheet = sheet.into();
        if !self.sheet_names.contains(&sheet) {
            return Err(DataError::SheetNotFound(sheet));
        }
        self.sheet = Some(sheet);
        Ok(self)
    }

    /// Restrict loading to a range such as `A1:C10`
    pub fn with_range(mut self, range: impl Into<String>) -> Result<Self> {
        let range = range.into();
        parse_range(&range)?;
        self.range = Some(range);
        Ok(self)
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// Sheet that [`DataSource::load`] reads
    pub fn selected_sheet(&self) -> Option<&str> {
        self.sheet
            .as_deref()
            .or_else(|| self.sheet_names.first().map(String::as_str))
    }

    /// Rows of the selected sheet as typed values
    pub fn read_rows(&self) -> Result<Vec<Vec<Value>>> {
        let sheet = self
            .selected_sheet()
            .ok_or_else(|| DataError::SheetNotFound("workbook has no sheets".into()))?;

        let mut workbook: Xlsx<_> = open_workbook(&self.path)
            .map_err(|e: XlsxError| DataError::WorkbookOpen(e.to_string()))?;
        let sheet_range = workbook.worksheet_range(sheet)?;

        let rows = match &self.range {
            Some(range) => {
                let (start_row, start_col, end_row, end_col) = parse_range(range)?;
                let sub = sheet_range.range((start_row, start_col), (end_row, end_col));
                range_rows(&sub)
            }
            None => range_rows(&sheet_range),
        };
        Ok(rows)
    }
}

impl DataSource for ExcelSource {
    fn load(&self) -> Result<Value> {
        let mut rows = self.read_rows()?.into_iter();
        let Some(header) = rows.next() else {
            return Ok(Value::Array(Vec::new()));
        };
        let header: Vec<String> = header.iter().map(header_name).collect();
        let records = rows.filter(|row| row.iter().any(|cell| !cell.is_null()));
        Ok(rows_to_objects(&header, records))
    }

    fn describe(&self) -> String {
        match self.selected_sheet() {
            Some(sheet) => format!("excel:{}#{}", self.path.display(), sheet),
            None => format!("excel:{}", self.path.display()),
        }
    }
}

fn range_rows(range: &Range<Data>) -> Vec<Vec<Value>> {
    range.rows().map(|row| row.iter().map(cell_to_value).collect()).collect()
}

fn header_name(cell: &Value) -> String {
    match cell {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a range string like "A1:C10" into (start_row, start_col, end_row, end_col)
pub fn parse_range(range: &str) -> Result<(u32, u32, u32, u32)> {
    let Some((start, end)) = range.split_once(':') else {
        return Err(DataError::InvalidRange(format!(
            "Expected format 'A1:B2', got '{}'",
            range
        )));
    };
    let (start_col, start_row) = parse_cell_ref(start)?;
    let (end_col, end_row) = parse_cell_ref(end)?;
    if end_row < start_row || end_col < start_col {
        return Err(DataError::InvalidRange(format!("Range '{}' is reversed", range)));
    }
    Ok((start_row, start_col, end_row, end_col))
}

/// Parse a cell reference like "A1" into (column, row) as 0-indexed
fn parse_cell_ref(cell: &str) -> Result<(u32, u32)> {
    let cell = cell.trim().to_uppercase();
    if cell.is_empty() {
        return Err(DataError::InvalidRange("Empty cell reference".to_string()));
    }

    let split = cell.find(|c: char| c.is_ascii_digit()).unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty()
        || digits.is_empty()
        || !letters.chars().all(|c| c.is_ascii_alphabetic())
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(DataError::InvalidRange(format!(
            "Invalid cell reference '{}'",
            cell
        )));
    }

    let col = letters
        .chars()
        .fold(0u32, |acc, c| acc * 26 + (c as u32 - 'A' as u32 + 1))
        - 1;
    let row: u32 = digits
        .parse()
        .map_err(|_| DataError::InvalidRange(format!("Invalid row number '{}'", digits)))?;
    if row == 0 {
        return Err(DataError::InvalidRange("Row number must be >= 1".to_string()));
    }
    Ok((col, row - 1))
}

/// Convert a calamine cell to a JSON value
pub fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::from(*f as i64)
            } else {
                Value::from(*f)
            }
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::Error(_) => Value::Null,
        Data::DateTime(dt) => Value::String(dt.to_string()),
        Data::DateTimeIso(s) => Value::String(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
    }
}
