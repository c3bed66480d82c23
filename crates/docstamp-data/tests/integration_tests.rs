//! Integration tests for docstamp-data

use std::io::Write;

use docstamp_data::{load_path, source_for, DataError, DataSource, ExcelSource};
use serde_json::json;
use tempfile::{Builder, NamedTempFile};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn temp_file(suffix: &str, content: &[u8]) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

/// Minimal workbook with one inline-string sheet
fn workbook(sheet_name: &str, rows: &[&[&str]]) -> Vec<u8> {
    let mut sheet_data = String::new();
    for (r, row) in rows.iter().enumerate() {
        sheet_data.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", (b'A' + c as u8) as char, r + 1);
            if cell.parse::<f64>().is_ok() {
                sheet_data.push_str(&format!(r#"<c r="{reference}"><v>{cell}</v></c>"#));
            } else {
                sheet_data.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{cell}</t></is></c>"#
                ));
            }
        }
        sheet_data.push_str("</row>");
    }

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{sheet_name}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_data}</sheetData></worksheet>"#
            ),
        ),
    ];

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in parts {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_load_json_by_extension() {
    let file = temp_file(".json", br#"{"customer": {"name": "ACME"}}"#);
    assert_eq!(load_path(file.path()).unwrap(), json!({"customer": {"name": "ACME"}}));
}

#[test]
fn test_load_csv_records() {
    let file = temp_file(".csv", b"name,price\nBolt,1.25\nNut,0.5\n");
    assert_eq!(
        load_path(file.path()).unwrap(),
        json!([{"name": "Bolt", "price": 1.25}, {"name": "Nut", "price": 0.5}])
    );
}

#[test]
fn test_load_tsv_records() {
    let file = temp_file(".tsv", b"a\tb\n1\tx\n");
    assert_eq!(load_path(file.path()).unwrap(), json!([{"a": 1, "b": "x"}]));
}

#[test]
fn test_load_properties() {
    let file = temp_file(".properties", b"invoice.number=42\ninvoice.paid=no\n");
    assert_eq!(
        load_path(file.path()).unwrap(),
        json!({"invoice": {"number": "42", "paid": "no"}})
    );
}

#[test]
fn test_load_excel_first_sheet() {
    let rows: &[&[&str]] = &[&["name", "age"], &["Ada", "36"], &["Alan", "41"]];
    let file = temp_file(".xlsx", &workbook("People", rows));
    let source = ExcelSource::new(file.path()).unwrap();
    assert_eq!(source.sheet_names(), ["People".to_string()]);
    assert_eq!(source.selected_sheet(), Some("People"));
    assert_eq!(
        source.load().unwrap(),
        json!([{"name": "Ada", "age": 36}, {"name": "Alan", "age": 41}])
    );
}

#[test]
fn test_excel_range_and_unknown_sheet() {
    let file = temp_file(".xlsx", &workbook("Sheet1", &[&["a", "b"], &["1", "2"], &["3", "4"]]));
    let source = ExcelSource::new(file.path()).unwrap().with_range("A1:A2").unwrap();
    assert_eq!(source.load().unwrap(), json!([{"a": 1}]));

    let err = ExcelSource::new(file.path()).unwrap().with_sheet("Missing").unwrap_err();
    assert!(matches!(err, DataError::SheetNotFound(name) if name == "Missing"));
}

#[test]
fn test_unsupported_extension() {
    let file = temp_file(".yaml", b"a: 1\n");
    let Err(err) = source_for(file.path()) else {
        panic!("yaml has no adapter");
    };
    assert!(matches!(err, DataError::UnsupportedFormat(_)), "{err}");
}

#[test]
fn test_missing_file() {
    let err = load_path("/nonexistent/data.csv").unwrap_err();
    assert!(matches!(err, DataError::FileNotFound(_)));
}

#[test]
fn test_describe_names_the_adapter() {
    let file = temp_file(".csv", b"a\n1\n");
    let source = source_for(file.path()).unwrap();
    assert!(source.describe().starts_with("csv:"));
}
