//! Paragraph text splicing
//!
//! A paragraph's text is the concatenation of its runs' text, where a run
//! contributes its `w:t` content, `\t` per `w:tab` and `\n` per `w:br` or
//! `w:cr`. Offsets are byte offsets into that concatenation.
//!
//! Replacing a range touches every run whose span overlaps it. Plain text is
//! written into the first touched run so it keeps that run's formatting;
//! rich content gets fresh runs that inherit the first touched run's
//! properties.

use docstamp_ooxml::media::inline_drawing_xml;
use docstamp_ooxml::{NodeId, NodeType, XmlTree};

use crate::dom::{collect_named, is_empty_run};
use crate::error::Result;
use crate::eval::TextStyle;
use crate::render::Fragment;

/// Canonical order of run properties inside `w:rPr`
const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
];

/// Where one run's text sits inside its paragraph's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSpan {
    pub run: NodeId,
    pub start: usize,
    pub end: usize,
}

impl RunSpan {
    /// Clamp a paragraph offset into this run and make it run-local
    fn local(&self, offset: usize) -> usize {
        offset.clamp(self.start, self.end) - self.start
    }
}

/// Text layout of a paragraph
#[derive(Debug, Clone, Default)]
pub struct ParagraphText {
    pub text: String,
    pub runs: Vec<RunSpan>,
}

impl ParagraphText {
    /// Compute the layout of a paragraph
    pub fn read(tree: &XmlTree, paragraph: NodeId) -> Self {
        let mut layout = Self::default();
        for run in paragraph_runs(tree, paragraph) {
            let text = run_text(tree, run);
            let start = layout.text.len();
            layout.text.push_str(&text);
            layout.runs.push(RunSpan {
                run,
                start,
                end: layout.text.len(),
            });
        }
        layout
    }

    /// Runs whose span overlaps `[start, end)`
    ///
    /// An empty range touches the run it falls inside, or the run ending
    /// exactly at it.
    pub fn touched(&self, start: usize, end: usize) -> Vec<RunSpan> {
        if start < end {
            return self
                .runs
                .iter()
                .filter(|span| span.start < end && span.end > start)
                .copied()
                .collect();
        }
        self.runs
            .iter()
            .find(|span| span.start <= start && start < span.end)
            .or_else(|| {
                self.runs
                    .iter()
                    .rev()
                    .find(|span| span.end == start && span.end > span.start)
            })
            .copied()
            .into_iter()
            .collect()
    }
}

/// Text of a paragraph
pub fn paragraph_text(tree: &XmlTree, paragraph: NodeId) -> String {
    ParagraphText::read(tree, paragraph).text
}

/// Runs of a paragraph in order, looking through inline containers
/// (hyperlinks, directive hooks, tracked insertions, content controls)
pub fn paragraph_runs(tree: &XmlTree, paragraph: NodeId) -> Vec<NodeId> {
    inline_sequence(tree, paragraph)
        .into_iter()
        .filter(|&node| tree.is(node, NodeType::Run))
        .collect()
}

/// Inline nodes of a paragraph in order, without descending into runs or
/// nested blocks
fn inline_sequence(tree: &XmlTree, paragraph: NodeId) -> Vec<NodeId> {
    fn walk(tree: &XmlTree, node: NodeId, out: &mut Vec<NodeId>) {
        for &child in tree.children(node) {
            out.push(child);
            let kind = tree.node_type(child);
            let descend = kind.has_children()
                && !matches!(
                    kind,
                    NodeType::Run | NodeType::Paragraph | NodeType::Table | NodeType::CharacterData
                )
                && tree.name(child) != Some("w:pPr");
            if descend {
                walk(tree, child, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(tree, paragraph, &mut out);
    out
}

/// Paragraph offset at which an inline node (a marker, a hook, a run) sits
pub fn offset_of(tree: &XmlTree, paragraph: NodeId, node: NodeId) -> Option<usize> {
    let target = tree
        .ancestor_of_type(node, NodeType::Run)
        .filter(|&run| tree.is_ancestor(paragraph, run))
        .unwrap_or(node);
    let mut offset = 0;
    for item in inline_sequence(tree, paragraph) {
        if item == target {
            return Some(offset);
        }
        if tree.is(item, NodeType::Run) {
            offset += run_text(tree, item).len();
        }
    }
    None
}

/// Text contributed by one run
pub fn run_text(tree: &XmlTree, run: NodeId) -> String {
    let mut text = String::new();
    for &child in tree.children(run) {
        match tree.name(child) {
            Some("w:t") => text.push_str(&tree.text_content(child)),
            Some("w:tab") => text.push('\t'),
            Some("w:br") | Some("w:cr") => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn is_text_content(tree: &XmlTree, node: NodeId) -> bool {
    matches!(tree.name(node), Some("w:t" | "w:tab" | "w:br" | "w:cr"))
}

/// Remove a run's text content, keeping everything else
fn strip_text(tree: &mut XmlTree, run: NodeId) {
    let doomed: Vec<_> = tree
        .children(run)
        .iter()
        .copied()
        .filter(|&child| is_text_content(tree, child))
        .collect();
    for node in doomed {
        tree.detach(node);
    }
}

/// Replace a run's text content, mapping `\t` and `\n` to `w:tab`/`w:br`
pub fn set_run_text(tree: &mut XmlTree, run: NodeId, text: &str) {
    strip_text(tree, run);
    let mut buffer = String::new();
    for ch in text.chars() {
        match ch {
            '\t' | '\n' => {
                flush_text(tree, run, &mut buffer);
                let name = if ch == '\t' { "w:tab" } else { "w:br" };
                let element = tree.create_element(name, &[]);
                tree.append_child(run, element);
            }
            _ => buffer.push(ch),
        }
    }
    flush_text(tree, run, &mut buffer);
}

fn flush_text(tree: &mut XmlTree, run: NodeId, buffer: &mut String) {
    if buffer.is_empty() {
        return;
    }
    let element = tree.create_element("w:t", &[("xml:space", "preserve")]);
    let text = tree.create_text(std::mem::take(buffer));
    tree.append_child(element, text);
    tree.append_child(run, element);
}

/// Drop a touched run that no longer carries anything but properties
fn discard_if_empty(tree: &mut XmlTree, run: NodeId) {
    if is_empty_run(tree, run) {
        tree.detach(run);
    }
}

/// Append a new run at the end of a paragraph
fn append_run(tree: &mut XmlTree, paragraph: NodeId, run: NodeId) {
    tree.append_child(paragraph, run);
}

/// Replace `[start, end)` of a paragraph's text with plain text
///
/// The first touched run is edited in place and keeps its formatting;
/// interior runs are cleared and the last run keeps only its tail. Runs left
/// without content are removed. An empty range with empty text is a no-op.
pub fn replace_text(
    tree: &mut XmlTree,
    paragraph: NodeId,
    start: usize,
    end: usize,
    text: &str,
) -> Result<()> {
    if start == end && text.is_empty() {
        return Ok(());
    }
    let layout = ParagraphText::read(tree, paragraph);
    let touched = layout.touched(start, end);

    let (Some(first), Some(last)) = (touched.first().copied(), touched.last().copied()) else {
        if !text.is_empty() {
            let run = tree.create_element("w:r", &[]);
            set_run_text(tree, run, text);
            append_run(tree, paragraph, run);
        }
        return Ok(());
    };

    let first_text = &layout.text[first.start..first.end];
    let mut replaced = String::with_capacity(first_text.len() + text.len());
    replaced.push_str(&first_text[..first.local(start)]);
    replaced.push_str(text);
    if first.run == last.run {
        replaced.push_str(&first_text[first.local(end)..]);
    }
    set_run_text(tree, first.run, &replaced);

    if first.run != last.run {
        for span in &touched[1..touched.len() - 1] {
            strip_text(tree, span.run);
            discard_if_empty(tree, span.run);
        }
        let last_text = &layout.text[last.start..last.end];
        set_run_text(tree, last.run, &last_text[last.local(end)..]);
        discard_if_empty(tree, last.run);
    }
    discard_if_empty(tree, first.run);
    Ok(())
}

/// Replace `[start, end)` of a paragraph's text with rich content
///
/// Touched runs are replaced outright: text before and after the range is
/// kept in runs cloned from the first and last touched run, and each
/// fragment gets a run carrying the first touched run's properties merged
/// with the fragment's own style.
pub fn replace_fragments(
    tree: &mut XmlTree,
    paragraph: NodeId,
    start: usize,
    end: usize,
    fragments: &[Fragment],
) -> Result<()> {
    if start == end && fragments.is_empty() {
        return Ok(());
    }
    let layout = ParagraphText::read(tree, paragraph);
    let touched = layout.touched(start, end);

    let (Some(first), Some(last)) = (touched.first().copied(), touched.last().copied()) else {
        for fragment in fragments {
            let run = fragment_run(tree, None, fragment)?;
            append_run(tree, paragraph, run);
        }
        return Ok(());
    };

    let prefix = layout.text[first.start..first.end][..first.local(start)].to_string();
    let suffix = layout.text[last.start..last.end][last.local(end)..].to_string();

    if !prefix.is_empty() {
        let run = text_run(tree, Some(first.run), &prefix);
        tree.insert_before(first.run, run)?;
    }
    for fragment in fragments {
        let run = fragment_run(tree, Some(first.run), fragment)?;
        tree.insert_before(first.run, run)?;
    }
    if !suffix.is_empty() {
        let run = text_run(tree, Some(last.run), &suffix);
        tree.insert_before(first.run, run)?;
    }

    for span in touched {
        strip_text(tree, span.run);
        discard_if_empty(tree, span.run);
    }
    Ok(())
}

/// New run holding text, with properties cloned from `template`
fn text_run(tree: &mut XmlTree, template: Option<NodeId>, text: &str) -> NodeId {
    let run = tree.create_element("w:r", &[]);
    if let Some(properties) = template.and_then(|t| tree.child_named(t, "w:rPr")) {
        let copy = tree.deep_clone(properties);
        tree.append_child(run, copy);
    }
    set_run_text(tree, run, text);
    run
}

/// New run for one fragment
fn fragment_run(
    tree: &mut XmlTree,
    template: Option<NodeId>,
    fragment: &Fragment,
) -> Result<NodeId> {
    let run = text_run(tree, template, "");
    match fragment {
        Fragment::Text { text, style } => {
            apply_style(tree, run, style);
            set_run_text(tree, run, text);
        }
        Fragment::Break => {
            let br = tree.create_element("w:br", &[]);
            tree.append_child(run, br);
        }
        Fragment::Drawing { rel_id, cx, cy } => {
            let id = next_drawing_id(tree);
            let drawing = tree.import_fragment(&inline_drawing_xml(id, rel_id, *cx, *cy))?;
            tree.append_child(run, drawing);
        }
    }
    Ok(run)
}

/// Merge a fragment style into a run's properties
fn apply_style(tree: &mut XmlTree, run: NodeId, style: &TextStyle) {
    if style.is_plain() {
        return;
    }
    let properties = match tree.child_named(run, "w:rPr") {
        Some(properties) => properties,
        None => {
            let properties = tree.create_element("w:rPr", &[]);
            tree.insert_child(run, 0, properties);
            properties
        }
    };
    if style.bold {
        set_property(tree, properties, "w:b", None);
    }
    if style.italic {
        set_property(tree, properties, "w:i", None);
    }
    if style.underline {
        set_property(tree, properties, "w:u", Some("single"));
    }
    if let Some(color) = &style.color {
        set_property(tree, properties, "w:color", Some(color));
    }
}

/// Set a run property, inserting it at its schema position
fn set_property(tree: &mut XmlTree, properties: NodeId, name: &str, value: Option<&str>) {
    let element = match tree.child_named(properties, name) {
        Some(existing) => existing,
        None => {
            let rank = |n: &str| RPR_ORDER.iter().position(|&o| o == n).unwrap_or(RPR_ORDER.len());
            let own = rank(name);
            let index = tree
                .children(properties)
                .iter()
                .position(|&child| tree.name(child).is_some_and(|n| rank(n) > own))
                .unwrap_or(tree.children(properties).len());
            let element = tree.create_element(name, &[]);
            tree.insert_child(properties, index, element);
            element
        }
    };
    match value {
        Some(value) => tree.set_attr(element, "w:val", value),
        None => {
            tree.remove_attr(element, "w:val");
        }
    }
}

/// First drawing id not yet used by any `wp:docPr` in the tree
fn next_drawing_id(tree: &XmlTree) -> u32 {
    collect_named(tree, tree.root(), "wp:docPr")
        .into_iter()
        .filter_map(|node| tree.attr(node, "id").and_then(|id| id.parse::<u32>().ok()))
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstamp_ooxml::test_utils::{bold_run, run, NAMESPACES};

    fn paragraph(runs: &str) -> (XmlTree, NodeId) {
        let tree = XmlTree::parse(format!("<w:p {NAMESPACES}>{runs}</w:p>").as_bytes()).unwrap();
        let root = tree.root();
        (tree, root)
    }

    fn run_count(tree: &XmlTree, paragraph: NodeId) -> usize {
        paragraph_runs(tree, paragraph).len()
    }

    #[test]
    fn test_layout() {
        let (tree, p) = paragraph(&format!(
            "{}<w:r><w:t>b</w:t><w:tab/><w:t>c</w:t><w:br/></w:r>",
            run("a")
        ));
        let layout = ParagraphText::read(&tree, p);

        assert_eq!(layout.text, "ab\tc\n");
        assert_eq!(layout.runs[0].end, 1);
        assert_eq!(layout.runs[1].start, 1);
        assert_eq!(layout.runs[1].end, 5);
    }

    #[test]
    fn test_runs_inside_inline_containers() {
        let (tree, p) = paragraph(&format!(
            "<w:pPr><w:rPr><w:b/></w:rPr></w:pPr><w:hyperlink>{}</w:hyperlink>{}",
            run("link"),
            run(" tail")
        ));
        assert_eq!(paragraph_text(&tree, p), "link tail");
    }

    #[test]
    fn test_touched_runs() {
        let (tree, p) = paragraph(&format!("{}{}{}", run("ab"), run("cd"), run("ef")));
        let layout = ParagraphText::read(&tree, p);

        assert_eq!(layout.touched(1, 5).len(), 3);
        assert_eq!(layout.touched(2, 4).len(), 1);
        assert_eq!(layout.touched(2, 2)[0].start, 2);
        assert_eq!(layout.touched(6, 6)[0].start, 4);
        assert!(layout.touched(7, 7).is_empty());
    }

    #[test]
    fn test_replace_within_one_run() {
        let (mut tree, p) = paragraph(&run("Hello ${name}!"));
        replace_text(&mut tree, p, 6, 13, "World").unwrap();

        assert_eq!(paragraph_text(&tree, p), "Hello World!");
        assert_eq!(run_count(&tree, p), 1);
    }

    #[test]
    fn test_replace_across_runs_keeps_first_formatting() {
        let (mut tree, p) =
            paragraph(&format!("{}{}{}", bold_run("Hello ${"), run("na"), run("me}!")));
        replace_text(&mut tree, p, 6, 13, "World").unwrap();

        assert_eq!(paragraph_text(&tree, p), "Hello World!");
        let runs = paragraph_runs(&tree, p);
        assert_eq!(runs.len(), 2);
        assert_eq!(run_text(&tree, runs[0]), "Hello World");
        assert!(tree.child_named(runs[0], "w:rPr").is_some());
        assert_eq!(run_text(&tree, runs[1]), "!");
    }

    #[test]
    fn test_empty_splice_is_noop() {
        let (mut tree, p) = paragraph(&format!("{}{}", run("ab"), run("cd")));
        let before = tree.to_xml().unwrap();

        replace_text(&mut tree, p, 2, 2, "").unwrap();
        replace_fragments(&mut tree, p, 3, 3, &[]).unwrap();

        assert_eq!(tree.to_xml().unwrap(), before);
    }

    #[test]
    fn test_insert_at_point() {
        let (mut tree, p) = paragraph(&run("ac"));
        replace_text(&mut tree, p, 1, 1, "b").unwrap();
        assert_eq!(paragraph_text(&tree, p), "abc");
    }

    #[test]
    fn test_replace_in_empty_paragraph() {
        let (mut tree, p) = paragraph("<w:pPr/>");
        replace_text(&mut tree, p, 0, 0, "new").unwrap();
        assert_eq!(paragraph_text(&tree, p), "new");
    }

    #[test]
    fn test_newlines_become_breaks() {
        let (mut tree, p) = paragraph(&run("x"));
        replace_text(&mut tree, p, 0, 1, "a\nb").unwrap();

        let runs = paragraph_runs(&tree, p);
        assert!(tree.child_named(runs[0], "w:br").is_some());
        assert_eq!(paragraph_text(&tree, p), "a\nb");
    }

    #[test]
    fn test_replace_fragments_with_styles() {
        let (mut tree, p) = paragraph(&bold_run("Dear ${name}, hi"));
        let fragments = vec![
            Fragment::Text {
                text: "Ann".to_string(),
                style: TextStyle {
                    italic: true,
                    ..TextStyle::default()
                },
            },
            Fragment::Break,
        ];
        replace_fragments(&mut tree, p, 5, 12, &fragments).unwrap();

        assert_eq!(paragraph_text(&tree, p), "Dear Ann\n, hi");
        let runs = paragraph_runs(&tree, p);
        assert_eq!(runs.len(), 4);

        let styled = tree.child_named(runs[1], "w:rPr").unwrap();
        let names: Vec<_> = tree
            .children(styled)
            .iter()
            .filter_map(|&c| tree.name(c))
            .collect();
        assert_eq!(names, vec!["w:b", "w:i"]);
        assert!(tree.child_named(runs[2], "w:rPr").is_some());
    }

    #[test]
    fn test_drawing_fragment() {
        let (mut tree, p) = paragraph(&run("[logo]"));
        let fragments = vec![Fragment::Drawing {
            rel_id: "rId9".to_string(),
            cx: 10,
            cy: 20,
        }];
        replace_fragments(&mut tree, p, 0, 6, &fragments).unwrap();

        assert_eq!(paragraph_text(&tree, p), "");
        let drawings = collect_named(&tree, p, "w:drawing");
        assert_eq!(drawings.len(), 1);
        let doc_pr = collect_named(&tree, p, "wp:docPr");
        assert_eq!(tree.attr(doc_pr[0], "id"), Some("1"));
    }

    #[test]
    fn test_offset_of_marker() {
        let (tree, p) = paragraph(&format!(
            "{}<w:commentRangeStart w:id=\"1\"/>{}<w:commentRangeEnd w:id=\"1\"/>",
            run("ab"),
            run("cd")
        ));
        let start = tree.child_named(p, "w:commentRangeStart").unwrap();
        let end = tree.child_named(p, "w:commentRangeEnd").unwrap();

        assert_eq!(offset_of(&tree, p, start), Some(2));
        assert_eq!(offset_of(&tree, p, end), Some(4));
    }
}
