use std::fmt;
use std::result::Result as stdResult;

use anyhow::bail;
use log::info;
use pest::{error::Error as PestError, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::tree::{
    Node,
    NodeIdx::{Internal as Int, Leaf},
    Tree,
};
use crate::Result;

#[derive(Parser)]
#[grammar = "./tree/newick.pest"]
pub struct NewickParser;

#[derive(Debug)]
pub(crate) struct ParsingError(pub(crate) Box<PestError<Rule>>);

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malformed newick string")?;
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParsingError {}

/// Parses every newick tree in the given string, in order of appearance.
/// Multifurcations are kept as found, so the trifurcating roots the NJ
/// builder produces survive a write/read round trip. Internal node labels
/// in the `name/support` convention are split into the node id and its
/// support value.
pub fn from_newick(newick_string: &str) -> Result<Vec<Tree>> {
    let mut trees = Vec::new();
    let newick_rule = match NewickParser::parse(Rule::newick, newick_string) {
        Ok(mut rules) => rules.next().unwrap(),
        Err(e) => bail!(ParsingError(Box::new(e))),
    };
    for tree_rule in newick_rule.into_inner() {
        if let Some(rule) = tree_rule.into_inner().next() {
            let mut tree = Tree::new_empty();
            let mut node_idx = 0;
            match rule.as_rule() {
                Rule::internal => {
                    let mut stack = Vec::new();
                    tree.parse_internal_rule(&mut node_idx, &mut stack, rule)?;
                    tree.root = Int(0);
                }
                Rule::leaf => {
                    tree.parse_leaf_rule(&mut node_idx, rule)?;
                    tree.root = Leaf(0);
                }
                _ => unreachable!(),
            }
            tree.n = tree.leaves().len();
            tree.compute_postorder();
            trees.push(tree);
        }
    }
    info!("Parsed {} newick tree(s)", trees.len());
    Ok(trees)
}

impl Tree {
    fn parse_internal_rule(
        &mut self,
        node_idx: &mut usize,
        stack: &mut Vec<usize>,
        internal_rule: Pair<Rule>,
    ) -> stdResult<(), Box<PestError<Rule>>> {
        let mut id = String::from("");
        let mut support = None;
        let mut blen = 0.0;
        let mut children = Vec::new();
        stack.push(*node_idx);
        self.nodes.push(Node::new_empty_internal(*node_idx));
        *node_idx += 1;
        for rule in internal_rule.into_inner() {
            match rule.as_rule() {
                Rule::label => (id, support) = Tree::parse_label_rule(rule),
                Rule::branch_length => blen = Tree::parse_branch_length_rule(rule),
                Rule::internal => {
                    children.push(Int(*node_idx));
                    self.parse_internal_rule(node_idx, stack, rule)?;
                }
                Rule::leaf => {
                    children.push(Leaf(*node_idx));
                    self.parse_leaf_rule(node_idx, rule)?;
                }
                _ => unreachable!(),
            }
        }
        let cur_node_idx = stack.pop().unwrap_or_default();
        self.nodes[cur_node_idx].id = id;
        self.nodes[cur_node_idx].support = support;
        self.nodes[cur_node_idx].blen = blen;
        self.nodes[cur_node_idx].children.clone_from(&children);
        for child_idx in &children {
            self.nodes[usize::from(child_idx)].parent = Some(Int(cur_node_idx));
        }
        Ok(())
    }

    fn parse_leaf_rule(
        &mut self,
        node_idx: &mut usize,
        leaf_rule: Pair<Rule>,
    ) -> stdResult<(), Box<PestError<Rule>>> {
        let mut id = String::from("");
        let mut blen = 0.0;
        for rule in leaf_rule.into_inner() {
            match rule.as_rule() {
                Rule::label => id = rule.as_str().to_string(),
                Rule::branch_length => blen = Tree::parse_branch_length_rule(rule),
                _ => unreachable!(),
            }
        }
        self.nodes.push(Node::new_leaf(*node_idx, None, blen, id));
        *node_idx += 1;
        Ok(())
    }

    fn parse_branch_length_rule(rule: Pair<Rule>) -> f64 {
        rule.into_inner()
            .next()
            .unwrap()
            .as_str()
            .trim()
            .parse::<f64>()
            .unwrap_or_default()
    }

    // Internal labels may carry support as `name/support`; anything after
    // the last `/` that parses as a number is taken as the support value.
    fn parse_label_rule(rule: Pair<Rule>) -> (String, Option<f64>) {
        let label = rule.as_str();
        if let Some((id, support)) = label.rsplit_once('/') {
            if let Ok(support) = support.parse::<f64>() {
                return (id.to_string(), Some(support));
            }
        }
        (label.to_string(), None)
    }
}
