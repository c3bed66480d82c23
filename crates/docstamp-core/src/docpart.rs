//! `repeatDocPart`: stamping a document fragment as a sub-document
//!
//! The spanned blocks are cut into a standalone template that keeps every
//! other part of the package (styles, numbering, comments, media). That
//! template is stamped once per item by a nested stamping call running on a
//! worker thread, which streams the produced package back through a bounded
//! pipe. The stamped body is then imported in front of the anchor, with
//! image relationships re-created in the outer package.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;

use docstamp_ooxml::{NodeId, NodeType, WordPackage, STAMP_PREFIX};
use rhai::Dynamic;
use tracing::debug;

use crate::branch::{BranchKey, BRANCH_ATTR};
use crate::directive::Directive;
use crate::dom::{body, collect_named, collect_of_type, ensure_cell_content};
use crate::error::{Result, StampError};
use crate::iter::TreeIter;
use crate::processors::repeat::{apply_section_break, section_break_source};
use crate::processors::{require_blocks, ProcessorContext};
use crate::stamper::Stamper;

/// Largest chunk sent through the pipe at once
const PIPE_CHUNK: usize = 64 * 1024;

/// Chunks in flight before the worker blocks
const PIPE_DEPTH: usize = 16;

/// Writing half of a bounded in-memory pipe
#[derive(Debug)]
pub struct PipeWriter {
    sender: SyncSender<Vec<u8>>,
}

/// Reading half of a bounded in-memory pipe
///
/// Reads return end of file once the writer is dropped and every chunk has
/// been consumed.
#[derive(Debug)]
pub struct PipeReader {
    receiver: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    position: usize,
}

/// Create a pipe holding at most `depth` unread chunks
pub fn pipe(depth: usize) -> (PipeWriter, PipeReader) {
    let (sender, receiver) = sync_channel(depth);
    (
        PipeWriter { sender },
        PipeReader {
            receiver,
            chunk: Vec::new(),
            position: 0,
        },
    )
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(PIPE_CHUNK);
        self.sender
            .send(buf[..len].to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.chunk.len() {
            match self.receiver.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.position = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let available = &self.chunk[self.position..];
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.position += len;
        Ok(len)
    }
}

pub fn repeat_doc_part(
    ctx: &mut ProcessorContext<'_>,
    directive: &Directive,
    argument: &str,
) -> Result<()> {
    let anchor = require_blocks(ctx, directive, "repeatDocPart")?;
    let Some(items) = ctx.iterable(directive, argument)? else {
        return Ok(());
    };

    let template = sub_template(ctx.package, &anchor)?;
    let section = section_break_source(&ctx.package.document, &anchor);
    let first = anchor[0];
    let container = ctx.package.document.parent(first);

    let mut last_imported = None;
    for item in items {
        let key = ctx.branches.fork(directive.branch, item);
        let chain = ctx.branches.chain(key);
        let bytes = stamp_on_worker(ctx.stamper, template.clone(), chain)?;
        let stamped = WordPackage::from_bytes(&bytes)?;
        let imported = import_body(ctx.package, &stamped, key, first)?;
        if let Some(&last) = imported.last() {
            last_imported = Some(last);
        }
        ctx.stats.sub_documents += 1;
        debug!(
            id = %directive.id,
            blocks = imported.len(),
            bytes = bytes.len(),
            "imported sub-document"
        );
    }

    let tree = &mut ctx.package.document;
    if let (Some(section), Some(last)) = (section, last_imported) {
        apply_section_break(tree, section, last)?;
    }
    for node in anchor {
        tree.detach(node);
    }
    if let Some(container) = container {
        ensure_cell_content(tree, container);
    }
    Ok(())
}

/// Package whose body holds only clean copies of `anchor`
///
/// Hooks inside the copies are unwrapped so the nested call promotes their
/// comments afresh; the body's own section properties are kept.
pub fn sub_template(package: &WordPackage, anchor: &[NodeId]) -> Result<WordPackage> {
    let mut template = package.clone();
    let tree = &mut template.document;
    let body = body(tree)
        .ok_or_else(|| StampError::StructuralMismatch("document has no body".into()))?;

    let section = tree
        .children(body)
        .iter()
        .copied()
        .rfind(|&node| tree.name(node) == Some("w:sectPr"));
    for node in tree.children(body).to_vec() {
        tree.detach(node);
    }
    // The clone shares node ids with the source tree
    for &node in anchor {
        tree.detach(node);
        tree.append_child(body, node);
        for hook in collect_of_type(tree, node, NodeType::DirectiveWrapper) {
            tree.unwrap_node(hook);
        }
        let elements: Vec<NodeId> = TreeIter::new(tree, node).collect();
        for element in elements {
            tree.remove_attrs_with_prefix(element, STAMP_PREFIX);
        }
    }
    if let Some(section) = section {
        tree.append_child(body, section);
    }
    Ok(template)
}

/// Stamp a template on a worker thread, collecting its output from a pipe
pub fn stamp_on_worker(
    stamper: &Stamper,
    template: WordPackage,
    chain: Vec<Dynamic>,
) -> Result<Vec<u8>> {
    let (writer, mut reader) = pipe(PIPE_DEPTH);

    thread::scope(|scope| {
        let worker = scope.spawn(move || -> Result<()> {
            let mut template = template;
            let mut writer = writer;
            stamper.stamp_chain(&mut template, chain)?;
            let bytes = template.to_bytes()?;
            writer.write_all(&bytes)?;
            Ok(())
        });

        let mut output = Vec::new();
        let read = reader.read_to_end(&mut output);
        drop(reader);

        let outcome = worker
            .join()
            .map_err(|_| StampError::SubDocument(Box::new(StampError::WorkerPanic)))?;
        outcome.map_err(|err| StampError::SubDocument(Box::new(err)))?;
        read?;
        Ok(output)
    })
}

/// Import a stamped body in front of `before`; returns the imported roots
///
/// Each root is bound to `key` so placeholders left in it resolve against
/// the item. Pictures are copied into the destination package and their
/// `r:embed` references rewritten.
pub fn import_body(
    destination: &mut WordPackage,
    source: &WordPackage,
    key: BranchKey,
    before: NodeId,
) -> Result<Vec<NodeId>> {
    let Some(source_body) = body(&source.document) else {
        return Ok(Vec::new());
    };

    let mut imported = Vec::new();
    for &child in source.document.children(source_body) {
        if source.document.name(child) == Some("w:sectPr") {
            continue;
        }
        let tree = &mut destination.document;
        let copy = tree.import(&source.document, child);
        tree.set_attr(copy, BRANCH_ATTR, key.to_attr());
        tree.insert_before(before, copy)?;
        imported.push(copy);
    }

    for &root in &imported {
        for blip in collect_named(&destination.document, root, "a:blip") {
            let Some(rel_id) = destination.document.attr(blip, "r:embed").map(str::to_string) else {
                continue;
            };
            let Some((path, bytes)) = source.media(&rel_id) else {
                continue;
            };
            let extension = Path::new(&path)
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("bin")
                .to_string();
            let new_id = destination.add_media(bytes, &extension);
            destination.document.set_attr(blip, "r:embed", new_id);
        }
    }
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_round_trip() {
        let (mut writer, mut reader) = pipe(2);
        let payload: Vec<u8> = (0..200_000u32).map(|n| (n % 251) as u8).collect();
        let expected = payload.clone();

        let handle = thread::spawn(move || {
            writer.write_all(&payload).unwrap();
        });
        let mut received = Vec::new();
        reader.read_to_end(&mut received).unwrap();
        handle.join().unwrap();

        assert_eq!(received, expected);
    }

    #[test]
    fn test_write_after_reader_dropped() {
        let (mut writer, reader) = pipe(1);
        drop(reader);
        let err = writer.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_empty_pipe_reads_eof() {
        let (writer, mut reader) = pipe(1);
        drop(writer);
        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).unwrap(), 0);
    }
}
