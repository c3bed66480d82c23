//! Branches: bindings of cloned subtrees to repeated data items
//!
//! Every clone produced by a repeat is tagged with a [`BranchKey`]. The
//! registry maps the key to its data item and to the branch it was cloned
//! under, so an expression inside nested repeats sees the innermost item,
//! then every enclosing item, then the root data.

use rhai::Dynamic;

/// Attribute tagging a clone root (and every hook) with its branch
pub const BRANCH_ATTR: &str = "stamp:branch";

/// Opaque handle of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchKey(u32);

impl BranchKey {
    /// Branch of the root data
    pub const ROOT: BranchKey = BranchKey(0);

    /// Attribute form of the key
    pub fn to_attr(self) -> String {
        self.0.to_string()
    }

    /// Parse the attribute form of a key
    pub fn from_attr(value: &str) -> Option<Self> {
        value.parse().ok().map(BranchKey)
    }
}

#[derive(Debug, Clone)]
struct Layer {
    item: Dynamic,
    parent: Option<BranchKey>,
}

/// Registry of every branch created during one stamping call
#[derive(Debug, Clone)]
pub struct Branches {
    layers: Vec<Layer>,
}

impl Branches {
    /// Start a registry whose root branch is bound to `root`
    pub fn new(root: Dynamic) -> Self {
        Self {
            layers: vec![Layer { item: root, parent: None }],
        }
    }

    /// Start a registry from an inherited chain (outermost first)
    ///
    /// The returned key binds the innermost layer.
    pub fn from_chain(chain: Vec<Dynamic>) -> (Self, BranchKey) {
        let mut layers = chain.into_iter();
        let root = layers.next().unwrap_or(Dynamic::UNIT);
        let mut branches = Self::new(root);
        let mut key = BranchKey::ROOT;
        for item in layers {
            key = branches.fork(key, item);
        }
        (branches, key)
    }

    /// Bind a data item to a new branch nested under `parent`
    pub fn fork(&mut self, parent: BranchKey, item: Dynamic) -> BranchKey {
        let key = BranchKey(self.layers.len() as u32);
        self.layers.push(Layer {
            item,
            parent: Some(parent),
        });
        key
    }

    /// Data item bound to a branch
    pub fn item(&self, key: BranchKey) -> Option<&Dynamic> {
        self.layers.get(key.0 as usize).map(|layer| &layer.item)
    }

    /// Items from the root down to `key`
    pub fn chain(&self, key: BranchKey) -> Vec<Dynamic> {
        let mut chain = Vec::new();
        let mut cursor = Some(key);
        while let Some(current) = cursor {
            let Some(layer) = self.layers.get(current.0 as usize) else {
                break;
            };
            chain.push(layer.item.clone());
            cursor = layer.parent;
        }
        chain.reverse();
        chain
    }

    /// Number of branches, the root included
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false: the root branch exists from construction
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        let mut branches = Branches::new(Dynamic::from("root"));
        let outer = branches.fork(BranchKey::ROOT, Dynamic::from("outer"));
        let inner = branches.fork(outer, Dynamic::from("inner"));
        let sibling = branches.fork(BranchKey::ROOT, Dynamic::from("sibling"));

        let names = |key| {
            branches
                .chain(key)
                .into_iter()
                .map(|item| item.into_string().unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(inner), vec!["root", "outer", "inner"]);
        assert_eq!(names(sibling), vec!["root", "sibling"]);
        assert_eq!(names(BranchKey::ROOT), vec!["root"]);
        assert_ne!(inner, sibling);
    }

    #[test]
    fn test_from_chain() {
        let (branches, key) =
            Branches::from_chain(vec![Dynamic::from(1_i64), Dynamic::from(2_i64)]);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches.item(key).unwrap().as_int().unwrap(), 2);
        assert_eq!(branches.chain(key).len(), 2);
    }

    #[test]
    fn test_attr_roundtrip() {
        let key = BranchKey(42);
        assert_eq!(BranchKey::from_attr(&key.to_attr()), Some(key));
        assert_eq!(BranchKey::from_attr("x"), None);
    }
}
