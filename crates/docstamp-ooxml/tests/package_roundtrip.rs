//! Integration tests for docstamp-ooxml
//!
//! Packages are assembled with the shared fixture builder, edited through
//! the public tree API and read back from their serialized form.

use docstamp_ooxml::test_utils::*;
use docstamp_ooxml::{NodeType, OoxmlArchive, WordPackage};
use tempfile::TempDir;

fn body_paragraph_texts(package: &WordPackage) -> Vec<String> {
    let tree = &package.document;
    let body = tree.child_named(tree.root(), "w:body").unwrap();
    tree.children(body)
        .iter()
        .filter(|&&node| tree.is(node, NodeType::Paragraph))
        .map(|&node| tree.text_content(node))
        .collect()
}

#[test]
fn test_edit_save_reopen() {
    let bytes = DocxBuilder::new(format!(
        "{}{}",
        paragraph("first"),
        commented_paragraph(1, "second")
    ))
    .comment(1, "note")
    .footnote(1, "footnote text")
    .header(paragraph("page header"))
    .build();
    let mut package = WordPackage::from_bytes(&bytes).unwrap();

    assert!(package.comments.is_some());
    assert!(package.footnotes.is_some());
    assert_eq!(package.headers_footers.len(), 1);
    assert_eq!(package.headers_footers[0].path, "word/header1.xml");

    let tree = &mut package.document;
    let body = tree.child_named(tree.root(), "w:body").unwrap();
    let first = tree.children(body)[0];
    let added = tree
        .import_fragment(
            r#"<w:p xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:r><w:t>inserted</w:t></w:r></w:p>"#,
        )
        .unwrap();
    tree.insert_after(first, added).unwrap();

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("edited.docx");
    package.save(&path).unwrap();

    let reopened = WordPackage::open(&path).unwrap();
    assert_eq!(body_paragraph_texts(&reopened), vec!["first", "inserted", "second"]);
    let header = &reopened.headers_footers[0].tree;
    assert_eq!(header.text_content(header.root()), "page header");

    let archive = OoxmlArchive::open(&path).unwrap();
    assert!(archive.contains("word/comments.xml"));
    assert!(archive.contains("word/footnotes.xml"));
}

#[test]
fn test_media_added_once_and_registered() {
    let mut package = WordPackage::from_bytes(&DocxBuilder::new(paragraph("x")).build()).unwrap();
    let png = vec![0x89, b'P', b'N', b'G', 1, 2, 3];

    let first = package.add_media(&png, "PNG");
    let second = package.add_media(&png, ".png");
    assert_eq!(first, second);

    let (path, stored) = package.media(&first).unwrap();
    assert!(path.starts_with("word/media/stamp_") && path.ends_with(".png"), "{path}");
    assert_eq!(stored, png.as_slice());

    let bytes = package.to_bytes().unwrap();
    let archive = OoxmlArchive::from_bytes(&bytes).unwrap();
    let content_types = archive.get_string("[Content_Types].xml").unwrap();
    assert_eq!(content_types.matches(r#"Extension="png""#).count(), 1);

    let reopened = WordPackage::from_bytes(&bytes).unwrap();
    assert_eq!(reopened.media(&first).map(|(_, b)| b.to_vec()), Some(png));
}

#[test]
fn test_existing_image_reachable_by_relationship() {
    let bytes = DocxBuilder::new(paragraph("x"))
        .image("logo.png", vec![9, 9, 9])
        .build();
    let package = WordPackage::from_bytes(&bytes).unwrap();

    let (path, stored) = package.media("rIdImg1").unwrap();
    assert_eq!(path, "word/media/logo.png");
    assert_eq!(stored, &[9, 9, 9]);
    assert!(package.media("rIdMissing").is_none());
}

#[test]
fn test_untouched_parts_survive() {
    let bytes = DocxBuilder::new(paragraph("x")).build();
    let mut archive = OoxmlArchive::from_bytes(&bytes).unwrap();
    archive.set_string("word/styles.xml", "<w:styles/>");
    let bytes = archive.to_bytes().unwrap();

    let mut package = WordPackage::from_bytes(&bytes).unwrap();
    let out = package.to_bytes().unwrap();
    let archive = OoxmlArchive::from_bytes(&out).unwrap();
    assert_eq!(archive.get_string("word/styles.xml").as_deref(), Some("<w:styles/>"));
}
