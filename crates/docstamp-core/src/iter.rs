//! Resettable pre-order traversal over an [`XmlTree`]
//!
//! [`TreeIter`] walks a subtree depth-first in document order. Adapters
//! ([`Filtered`], [`Mapped`], [`Sliced`]) compute one element of look-ahead
//! so [`ResettableIterator::has_next`] never advances the source, and every
//! layer can be rewound with [`ResettableIterator::reset`] without touching
//! the tree.
//!
//! Iterators hold a shared borrow of the tree, so a collection pass must
//! finish before the tree can be mutated.

use docstamp_ooxml::{NodeId, XmlTree};

/// An iterator that can report pending items and restart from the beginning
pub trait ResettableIterator: Iterator {
    /// Whether another item is available
    fn has_next(&self) -> bool;

    /// Restart the traversal
    fn reset(&mut self);

    /// Keep only items matching a predicate
    fn filtered<P>(self, predicate: P) -> Filtered<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool,
    {
        Filtered::new(self, predicate)
    }

    /// Transform every item
    fn mapped<B, F>(self, f: F) -> Mapped<Self, F, B>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> B,
    {
        Mapped::new(self, f)
    }

    /// Yield only the items between two boundary items, both included
    fn sliced(self, start: Self::Item, end: Self::Item) -> Sliced<Self>
    where
        Self: Sized,
        Self::Item: PartialEq,
    {
        Sliced::new(self, start, end)
    }
}

/// Pre-order traversal of a subtree
#[derive(Debug, Clone)]
pub struct TreeIter<'a> {
    tree: &'a XmlTree,
    origin: NodeId,
    stack: Vec<NodeId>,
}

impl<'a> TreeIter<'a> {
    /// Traverse the subtree rooted at `origin`, the origin included
    pub fn new(tree: &'a XmlTree, origin: NodeId) -> Self {
        Self {
            tree,
            origin,
            stack: vec![origin],
        }
    }

    /// Traverse a whole part from its root element
    pub fn document(tree: &'a XmlTree) -> Self {
        Self::new(tree, tree.root())
    }

    /// The tree being traversed
    pub fn tree(&self) -> &'a XmlTree {
        self.tree
    }
}

impl Iterator for TreeIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(node).iter().rev().copied());
        Some(node)
    }
}

impl ResettableIterator for TreeIter<'_> {
    fn has_next(&self) -> bool {
        !self.stack.is_empty()
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.stack.push(self.origin);
    }
}

/// Filtering adapter with one item of look-ahead
pub struct Filtered<I: Iterator, P> {
    inner: I,
    predicate: P,
    lookahead: Option<I::Item>,
}

impl<I, P> Filtered<I, P>
where
    I: Iterator,
    P: FnMut(&I::Item) -> bool,
{
    fn new(inner: I, predicate: P) -> Self {
        let mut filtered = Self {
            inner,
            predicate,
            lookahead: None,
        };
        filtered.lookahead = filtered.advance();
        filtered
    }

    fn advance(&mut self) -> Option<I::Item> {
        let predicate = &mut self.predicate;
        self.inner.find(|item| predicate(item))
    }
}

impl<I, P> Iterator for Filtered<I, P>
where
    I: Iterator,
    P: FnMut(&I::Item) -> bool,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        let item = self.lookahead.take()?;
        self.lookahead = self.advance();
        Some(item)
    }
}

impl<I, P> ResettableIterator for Filtered<I, P>
where
    I: ResettableIterator,
    P: FnMut(&I::Item) -> bool,
{
    fn has_next(&self) -> bool {
        self.lookahead.is_some()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.lookahead = self.advance();
    }
}

/// Mapping adapter with one item of look-ahead
pub struct Mapped<I, F, B> {
    inner: I,
    f: F,
    lookahead: Option<B>,
}

impl<I, F, B> Mapped<I, F, B>
where
    I: Iterator,
    F: FnMut(I::Item) -> B,
{
    fn new(mut inner: I, mut f: F) -> Self {
        let lookahead = inner.next().map(&mut f);
        Self {
            inner,
            f,
            lookahead,
        }
    }
}

impl<I, F, B> Iterator for Mapped<I, F, B>
where
    I: Iterator,
    F: FnMut(I::Item) -> B,
{
    type Item = B;

    fn next(&mut self) -> Option<B> {
        let item = self.lookahead.take()?;
        self.lookahead = self.inner.next().map(&mut self.f);
        Some(item)
    }
}

impl<I, F, B> ResettableIterator for Mapped<I, F, B>
where
    I: ResettableIterator,
    F: FnMut(I::Item) -> B,
{
    fn has_next(&self) -> bool {
        self.lookahead.is_some()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.lookahead = self.inner.next().map(&mut self.f);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SliceState {
    Before,
    Inside,
    Done,
}

/// Adapter yielding the items from `start` through `end`
pub struct Sliced<I: Iterator> {
    inner: I,
    start: I::Item,
    end: I::Item,
    state: SliceState,
    lookahead: Option<I::Item>,
}

impl<I> Sliced<I>
where
    I: Iterator,
    I::Item: PartialEq,
{
    fn new(inner: I, start: I::Item, end: I::Item) -> Self {
        let mut sliced = Self {
            inner,
            start,
            end,
            state: SliceState::Before,
            lookahead: None,
        };
        sliced.lookahead = sliced.advance();
        sliced
    }

    fn advance(&mut self) -> Option<I::Item> {
        loop {
            match self.state {
                SliceState::Done => return None,
                SliceState::Before => {
                    let item = self.inner.next()?;
                    if item == self.start {
                        self.state = if item == self.end {
                            SliceState::Done
                        } else {
                            SliceState::Inside
                        };
                        return Some(item);
                    }
                }
                SliceState::Inside => {
                    let item = self.inner.next()?;
                    if item == self.end {
                        self.state = SliceState::Done;
                    }
                    return Some(item);
                }
            }
        }
    }
}

impl<I> Iterator for Sliced<I>
where
    I: Iterator,
    I::Item: PartialEq,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        let item = self.lookahead.take()?;
        self.lookahead = self.advance();
        Some(item)
    }
}

impl<I> ResettableIterator for Sliced<I>
where
    I: ResettableIterator,
    I::Item: PartialEq,
{
    fn has_next(&self) -> bool {
        self.lookahead.is_some()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.state = SliceState::Before;
        self.lookahead = self.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstamp_ooxml::NodeType;

    fn tree() -> XmlTree {
        XmlTree::parse(
            br#"<w:body><w:p><w:r><w:t>a</w:t></w:r><w:r><w:t>b</w:t></w:r></w:p><w:p><w:r><w:t>c</w:t></w:r></w:p></w:body>"#,
        )
        .unwrap()
    }

    fn names(tree: &XmlTree, nodes: impl Iterator<Item = NodeId>) -> Vec<String> {
        nodes
            .map(|id| {
                tree.name(id)
                    .map(str::to_string)
                    .unwrap_or_else(|| tree.text_content(id))
            })
            .collect()
    }

    #[test]
    fn test_pre_order() {
        let tree = tree();
        let order = names(&tree, TreeIter::document(&tree));

        assert_eq!(
            order,
            vec!["w:body", "w:p", "w:r", "w:t", "a", "w:r", "w:t", "b", "w:p", "w:r", "w:t", "c"]
        );
    }

    #[test]
    fn test_reset_restarts_traversal() {
        let tree = tree();
        let mut iter = TreeIter::document(&tree);
        let first: Vec<_> = iter.by_ref().collect();
        assert!(!iter.has_next());

        iter.reset();
        assert!(iter.has_next());
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_filtered_lookahead() {
        let tree = tree();
        let mut paragraphs =
            TreeIter::document(&tree).filtered(|&id| tree.is(id, NodeType::Paragraph));

        assert!(paragraphs.has_next());
        assert!(paragraphs.next().is_some());
        assert!(paragraphs.has_next());
        assert!(paragraphs.next().is_some());
        assert!(!paragraphs.has_next());
        assert_eq!(paragraphs.next(), None);

        paragraphs.reset();
        assert_eq!(paragraphs.count(), 2);
    }

    #[test]
    fn test_mapped() {
        let tree = tree();
        let texts: Vec<String> = TreeIter::document(&tree)
            .filtered(|&id| tree.is(id, NodeType::Text))
            .mapped(|id| tree.text_content(id))
            .collect();

        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sliced_is_inclusive() {
        let tree = tree();
        let runs: Vec<NodeId> = TreeIter::document(&tree)
            .filter(|&id| tree.is(id, NodeType::Run))
            .collect();

        let slice: Vec<NodeId> = TreeIter::document(&tree)
            .filtered(|&id| tree.is(id, NodeType::Run))
            .sliced(runs[1], runs[2])
            .collect();
        assert_eq!(slice, vec![runs[1], runs[2]]);

        let single: Vec<NodeId> = TreeIter::document(&tree).sliced(runs[0], runs[0]).collect();
        assert_eq!(single, vec![runs[0]]);
    }

    #[test]
    fn test_sliced_reset() {
        let tree = tree();
        let runs: Vec<NodeId> = TreeIter::document(&tree)
            .filter(|&id| tree.is(id, NodeType::Run))
            .collect();
        let mut slice = TreeIter::document(&tree).sliced(runs[0], runs[1]);

        let first: Vec<_> = slice.by_ref().collect();
        assert!(!slice.has_next());
        slice.reset();
        assert_eq!(slice.collect::<Vec<_>>(), first);
    }
}
