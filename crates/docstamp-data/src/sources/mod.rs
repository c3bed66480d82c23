//! Data source implementations.
//!
//! Every adapter turns a file into the JSON value templates are stamped
//! with. Tabular sources (CSV, Excel) produce an array of objects keyed by
//! their header row.

pub mod csv;
pub mod excel;
pub mod json;
pub mod properties;

pub use csv::{CsvOptions, CsvSource};
pub use excel::ExcelSource;
pub use json::JsonSource;
pub use properties::PropertiesSource;

use serde_json::Value;

use crate::error::Result;

/// Trait for sources of template data
pub trait DataSource {
    /// Load the whole source as a JSON value
    fn load(&self) -> Result<Value>;

    /// Short description used in logs
    fn describe(&self) -> String;
}

/// Typed JSON value for a tabular cell
///
/// Integers, floats and booleans are recognised; everything else stays a
/// string. Empty cells become null.
pub(crate) fn infer_value(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = text.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    match text {
        "true" | "TRUE" | "True" => Value::Bool(true),
        "false" | "FALSE" | "False" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

/// Array of objects from a header row and data rows
pub(crate) fn rows_to_objects(
    header: &[String],
    rows: impl IntoIterator<Item = Vec<Value>>,
) -> Value {
    let records = rows
        .into_iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (index, key) in header.iter().enumerate() {
                let value = row.get(index).cloned().unwrap_or(Value::Null);
                object.insert(key.clone(), value);
            }
            Value::Object(object)
        })
        .collect();
    Value::Array(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_value() {
        assert_eq!(infer_value(""), Value::Null);
        assert_eq!(infer_value("42"), json!(42));
        assert_eq!(infer_value("-1.5"), json!(-1.5));
        assert_eq!(infer_value("true"), json!(true));
        assert_eq!(infer_value("NaN"), json!("NaN"));
        assert_eq!(infer_value("Alice"), json!("Alice"));
    }

    #[test]
    fn test_rows_to_objects_pads_short_rows() {
        let header = vec!["a".to_string(), "b".to_string()];
        let value = rows_to_objects(&header, vec![vec![json!(1)]]);
        assert_eq!(value, json!([{"a": 1, "b": null}]));
    }
}
