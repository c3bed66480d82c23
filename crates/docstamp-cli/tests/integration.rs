//! Integration tests for the docstamp CLI
//!
//! Templates are built in memory, written to a temporary directory and run
//! through the same command functions the binary dispatches to.

use std::fs;
use std::path::{Path, PathBuf};

use docstamp_cli::{check_command, load_data, stamp_command, OutputFormat, StampArgs};
use docstamp_ooxml::test_utils::*;
use docstamp_ooxml::OoxmlArchive;
use serde_json::json;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write fixture");
    path
}

fn document_xml(path: &Path) -> String {
    let archive = OoxmlArchive::open(path).expect("Failed to open output");
    archive.get_string("word/document.xml").expect("document.xml missing")
}

fn invoice_template() -> Vec<u8> {
    let body = format!(
        "{}{}",
        paragraph("Invoice for ${customer.name}"),
        table(&[row(&["Item", "Qty"]), commented_row(1, &["${name}", "${qty}"])])
    );
    DocxBuilder::new(body).comment(1, "repeatTableRow(items)").build()
}

#[test]
fn test_stamp_json_data() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    let template = write(dir, "invoice.docx", invoice_template());
    let data = write(
        dir,
        "invoice.json",
        json!({
            "customer": {"name": "ACME"},
            "items": [{"name": "Bolt", "qty": 12}, {"name": "Nut", "qty": 3}]
        })
        .to_string(),
    );

    let report = stamp_command(&StampArgs::new(&template, &data)).unwrap();
    assert_eq!(report.directives, 1);

    let output = dir.join("invoice-stamped.docx");
    let xml = document_xml(&output);
    assert!(xml.contains("Invoice for ACME"), "{xml}");
    assert!(xml.contains("Bolt") && xml.contains("Nut"), "{xml}");
    assert!(!xml.contains("${"), "{xml}");
    assert!(!xml.contains("commentRangeStart"), "{xml}");
}

#[test]
fn test_stamp_csv_rows_with_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    let body = format!(
        "{}{}",
        table(&[commented_row(1, &["${name}", "${qty}"])]),
        paragraph("Signed: ${signature}")
    );
    let template = DocxBuilder::new(body).comment(1, "repeatTableRow(root)").build();
    let template = write(dir, "list.docx", template);
    let data = write(dir, "items.csv", "name,qty\nBolt,12\nNut,3\n");
    let config = write(
        dir,
        "stamp.toml",
        "fail_on_unresolved = false\nunresolved_default = \"-\"\n",
    );
    let output = dir.join("out.docx");

    let args = StampArgs {
        output: Some(output.clone()),
        config: Some(config),
        ..StampArgs::new(&template, &data)
    };
    stamp_command(&args).unwrap();

    let xml = document_xml(&output);
    assert!(xml.contains("Bolt") && xml.contains("12"), "{xml}");
    assert!(xml.contains("Signed: -"), "{xml}");
}

#[test]
fn test_stamp_unresolved_fails_by_default() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dir = temp_dir.path();
    let template = write(dir, "t.docx", DocxBuilder::new(paragraph("${missing}")).build());
    let data = write(dir, "d.json", "{}");

    let err = stamp_command(&StampArgs::new(&template, &data)).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to stamp template"), "{err:#}");
    assert!(!dir.join("t-stamped.docx").exists());
}

#[test]
fn test_stamp_missing_template() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let args = StampArgs::new(temp_dir.path().join("nope.docx"), "d.json");
    let err = stamp_command(&args).unwrap_err();
    assert!(err.to_string().contains("Template file not found"));
}

#[test]
fn test_load_data_rejects_unknown_format() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let data = write(temp_dir.path(), "data.yaml", "a: 1");
    let err = load_data(&data, None).unwrap_err();
    assert!(format!("{err:#}").contains("Unsupported data format"), "{err:#}");
}

#[test]
fn test_check_lists_directives() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let template = write(temp_dir.path(), "invoice.docx", invoice_template());

    let report = check_command(&template, OutputFormat::Json, true).unwrap();
    assert!(report.malformed.is_empty());
    assert_eq!(report.directives.len(), 1);
    assert_eq!(report.directives[0].processor.as_deref(), Some("repeatTableRow"));
    assert_eq!(report.placeholders, vec!["customer.name", "name", "qty"]);
}

#[test]
fn test_check_strict_rejects_malformed() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let body = format!("<w:p>{}{}</w:p>", comment_start(3), run("dangling"));
    let template = write(
        temp_dir.path(),
        "broken.docx",
        DocxBuilder::new(body).comment(3, "customer").build(),
    );

    assert!(check_command(&template, OutputFormat::Text, false).is_ok());
    let err = check_command(&template, OutputFormat::Text, true).unwrap_err();
    assert!(err.to_string().contains("malformed"), "{err}");
}
