use std::fmt::Display;

use anyhow::bail;
use itertools::Itertools;

use crate::alignment::{Alignment, InvalidAlignment};
use crate::Result;

use NodeIdx::{Internal as Int, Leaf};

mod nj_matrices;
pub mod nj_builder;
pub mod tree_parser;
mod tree_node;

pub use tree_node::Node;

/// Label prefix given to internal nodes in creation order, root last.
pub(crate) const INNER_LABEL_PREFIX: &str = "Inner";

#[derive(Debug, PartialEq, Clone, Copy, PartialOrd, Eq, Ord, Hash)]
pub enum NodeIdx {
    Internal(usize),
    Leaf(usize),
}

impl From<NodeIdx> for usize {
    fn from(node_idx: NodeIdx) -> usize {
        match node_idx {
            Int(idx) => idx,
            Leaf(idx) => idx,
        }
    }
}

impl From<&NodeIdx> for usize {
    fn from(node_idx: &NodeIdx) -> usize {
        usize::from(*node_idx)
    }
}

impl Display for NodeIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Int(idx) => write!(f, "internal node {}", idx),
            Leaf(idx) => write!(f, "leaf node {}", idx),
        }
    }
}

/// An arena tree: `nodes` owns every clade, `root` and the child lists are
/// indices into it. Leaves occupy the first `n` slots for trees built by
/// the NJ builder; parsed trees store nodes in encounter order.
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: NodeIdx,
    pub nodes: Vec<Node>,
    pub postorder: Vec<NodeIdx>,
    pub n: usize,
}

impl Tree {
    /// Creates a tree over the alignment's taxa with all leaves in place
    /// and no internal nodes yet.
    pub(crate) fn new(alignment: &Alignment) -> Result<Tree> {
        let n = alignment.len();
        if n < 2 {
            bail!(InvalidAlignment {
                message: format!("Tree construction requires at least 2 taxa, got {}", n)
            });
        }
        Ok(Tree {
            root: Int(2 * n - 3),
            nodes: alignment
                .iter()
                .enumerate()
                .map(|(idx, rec)| Node::new_leaf(idx, None, 0.0, rec.id().to_string()))
                .collect(),
            postorder: Vec::new(),
            n,
        })
    }

    pub(crate) fn new_empty() -> Tree {
        Tree {
            root: Int(0),
            nodes: Vec::new(),
            postorder: Vec::new(),
            n: 0,
        }
    }

    /// Joins two active nodes under a fresh internal node at arena index
    /// `parent_idx`, assigning each child its branch length.
    pub(crate) fn add_parent(
        &mut self,
        parent_idx: usize,
        idx_i: &NodeIdx,
        idx_j: &NodeIdx,
        blen_i: f64,
        blen_j: f64,
        id: String,
    ) {
        debug_assert_eq!(parent_idx, self.nodes.len());
        self.nodes
            .push(Node::new_internal(parent_idx, None, vec![*idx_i, *idx_j], 0.0, id));
        self.attach_to_parent(idx_i, parent_idx, blen_i);
        self.attach_to_parent(idx_j, parent_idx, blen_j);
    }

    /// Hangs an already-built node beneath `root_idx` as an extra child,
    /// producing the trifurcation the final join leaves behind.
    pub(crate) fn append_root_child(&mut self, root_idx: usize, idx: &NodeIdx, blen: f64) {
        self.nodes[root_idx].children.push(*idx);
        self.attach_to_parent(idx, root_idx, blen);
    }

    fn attach_to_parent(&mut self, idx: &NodeIdx, parent_idx: usize, blen: f64) {
        let node = &mut self.nodes[usize::from(idx)];
        node.parent = Some(Int(parent_idx));
        node.blen = blen;
    }

    pub fn node(&self, idx: &NodeIdx) -> &Node {
        &self.nodes[usize::from(idx)]
    }

    pub(crate) fn node_mut(&mut self, idx: &NodeIdx) -> &mut Node {
        &mut self.nodes[usize::from(idx)]
    }

    pub fn by_id(&self, id: &str) -> &Node {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .unwrap_or_else(|| panic!("No node with id {} in the tree", id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.idx, Leaf(_)))
            .collect()
    }

    pub(crate) fn compute_postorder(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::with_capacity(self.nodes.len());
        stack.push(self.root);
        while let Some(cur) = stack.pop() {
            order.push(cur);
            for child in &self.node(&cur).children {
                stack.push(*child);
            }
        }
        order.reverse();
        self.postorder = order;
    }

    /// Checks the tree for negative branch lengths, recursively from the
    /// root. A clade is valid iff its own branch length is non-negative and
    /// all its children are valid; leaves participate in the same check.
    pub fn is_valid(&self) -> bool {
        self.clade_is_valid(&self.root)
    }

    fn clade_is_valid(&self, idx: &NodeIdx) -> bool {
        let node = self.node(idx);
        node.blen >= 0.0 && node.children.iter().all(|child| self.clade_is_valid(child))
    }

    /// Mean support over internal clades, the root included; `None` for a
    /// tree carrying no internal support values.
    pub fn mean_support(&self) -> Option<f64> {
        let supports: Vec<f64> = self
            .nodes
            .iter()
            .filter(|node| matches!(node.idx, Int(_)))
            .filter_map(|node| node.support)
            .collect();
        if supports.is_empty() {
            None
        } else {
            Some(supports.iter().sum::<f64>() / supports.len() as f64)
        }
    }

    /// Serializes the tree as a single-line newick string with branch
    /// lengths to five decimal places. Internal nodes carrying a support
    /// value are labeled in the `name/support` convention.
    pub fn to_newick(&self) -> String {
        format!("{};", self.newick_subtree(&self.root))
    }

    fn newick_subtree(&self, idx: &NodeIdx) -> String {
        let node = self.node(idx);
        let label = match node.support {
            Some(support) => format!("{}/{}", node.id, support),
            None => node.id.clone(),
        };
        if node.children.is_empty() {
            format!("{}:{:.5}", label, node.blen)
        } else {
            format!(
                "({}){}:{:.5}",
                node.children
                    .iter()
                    .map(|child| self.newick_subtree(child))
                    .join(","),
                label,
                node.blen
            )
        }
    }
}
