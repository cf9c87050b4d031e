use std::fmt::{Debug, Display};

use approx::relative_eq;
use itertools::Itertools;

use crate::tree::NodeIdx::{self, Internal as Int, Leaf};

#[derive(Clone)]
pub struct Node {
    pub idx: NodeIdx,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub blen: f64,
    pub support: Option<f64>,
    pub id: String,
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.idx)
        } else {
            write!(f, "{} with id {}", self.idx, self.id)
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            writeln!(
                f,
                "{:?}:{}, parent: {:?}, children: {:?}",
                self.idx, self.blen, self.parent, self.children,
            )
        } else {
            writeln!(
                f,
                "({}) {:?}:{}, parent: {:?}, children: {:?}",
                self.id, self.idx, self.blen, self.parent, self.children,
            )
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let support_eq = match (self.support, other.support) {
            (Some(a), Some(b)) => relative_eq!(a, b),
            (None, None) => true,
            _ => false,
        };
        (self.idx == other.idx)
            && (self.parent == other.parent)
            && (self.children.iter().sorted().collect::<Vec<_>>()
                == other.children.iter().sorted().collect::<Vec<_>>())
            && (self.id == other.id)
            && support_eq
            && relative_eq!(self.blen, other.blen)
    }
}

impl Node {
    pub(crate) fn new_leaf(idx: usize, parent: Option<NodeIdx>, blen: f64, id: String) -> Self {
        Self {
            idx: Leaf(idx),
            parent,
            children: Vec::new(),
            blen,
            support: None,
            id,
        }
    }

    pub(crate) fn new_internal(
        idx: usize,
        parent: Option<NodeIdx>,
        children: Vec<NodeIdx>,
        blen: f64,
        id: String,
    ) -> Self {
        Self {
            idx: Int(idx),
            parent,
            children,
            blen,
            support: None,
            id,
        }
    }

    pub(crate) fn new_empty_internal(node_idx: usize) -> Self {
        Self::new_internal(node_idx, None, Vec::new(), 0.0, "".to_string())
    }
}
