use fixedbitset::FixedBitSet;
use hashbrown::{HashMap, HashSet};
use log::debug;
use rand::Rng;

use crate::alignment::Alignment;
use crate::tree::nj_builder::build_nj_tree;
use crate::tree::{NodeIdx, Tree};
use crate::Result;

/// Number of column-resampled replicates behind every support estimate.
pub const REPLICATE_COUNT: usize = 100;

/// Estimates the average bootstrap confidence of the NJ reconstruction for
/// one alignment. Builds [`REPLICATE_COUNT`] replicate trees from
/// column-resampled copies of the alignment, scores every internal clade of
/// every replicate by how many replicates contain an equivalent bipartition,
/// and averages the per-tree mean supports. The result is a percentage in
/// [0, 100] for the caller to compare against its acceptance threshold.
///
/// A replicate without internal support values would count as 100 (automatic
/// pass); NJ trees always carry at least the root clade, so this only
/// matters for degenerate inputs.
pub fn average_support<R: Rng>(alignment: &Alignment, rng: &mut R) -> Result<f64> {
    let mut trees = replicate_trees(alignment, rng)?;
    let counts = count_bipartitions(&trees);
    let n_trees = trees.len();
    for tree in trees.iter_mut() {
        attach_support(tree, &counts, n_trees);
    }
    let means: Vec<f64> = trees
        .iter()
        .map(|tree| tree.mean_support().unwrap_or(100.0))
        .collect();
    let average = means.iter().sum::<f64>() / means.len() as f64;
    debug!(
        "Average support over {} replicates: {:.2}",
        trees.len(),
        average
    );
    Ok(average)
}

/// Builds one NJ tree per column-resampled replicate of the alignment.
pub(crate) fn replicate_trees<R: Rng>(alignment: &Alignment, rng: &mut R) -> Result<Vec<Tree>> {
    (0..REPLICATE_COUNT)
        .map(|_| build_nj_tree(&alignment.resample_columns(rng)))
        .collect()
}

/// Counts, for every bipartition seen in any replicate, the number of
/// replicate trees containing it. Each tree contributes a bipartition at
/// most once, even when a clade and the complement of another clade encode
/// the same split.
pub(crate) fn count_bipartitions(trees: &[Tree]) -> HashMap<FixedBitSet, usize> {
    let mut counts = HashMap::new();
    for tree in trees {
        let in_tree: HashSet<FixedBitSet> =
            internal_bipartitions(tree).into_iter().map(|(_, bits)| bits).collect();
        for bits in in_tree {
            *counts.entry(bits).or_insert(0) += 1;
        }
    }
    counts
}

/// Attaches the percentage support to every internal clade of the tree.
pub(crate) fn attach_support(
    tree: &mut Tree,
    counts: &HashMap<FixedBitSet, usize>,
    n_trees: usize,
) {
    for (idx, bits) in internal_bipartitions(tree) {
        let count = counts.get(&bits).copied().unwrap_or(0);
        tree.node_mut(&idx).support = Some(count as f64 * 100.0 / n_trees as f64);
    }
}

/// The bipartition key of every internal clade: the clade's leaf set as a
/// bitset over leaf indices, complemented whenever it contains leaf 0 so
/// that a split and its mirror image compare equal. Leaves must occupy
/// arena slots `0..n` in taxon order, as they do in NJ-built trees, so the
/// keys are comparable across replicates of the same alignment.
pub(crate) fn internal_bipartitions(tree: &Tree) -> Vec<(NodeIdx, FixedBitSet)> {
    let mut leaf_sets = vec![FixedBitSet::with_capacity(tree.n); tree.len()];
    let mut result = Vec::new();
    for idx in &tree.postorder {
        match idx {
            NodeIdx::Leaf(leaf) => leaf_sets[*leaf].insert(*leaf),
            NodeIdx::Internal(internal) => {
                let mut bits = FixedBitSet::with_capacity(tree.n);
                for child in &tree.node(idx).children {
                    bits.union_with(&leaf_sets[usize::from(child)]);
                }
                leaf_sets[*internal] = bits.clone();
                if bits.contains(0) {
                    bits.toggle_range(..);
                }
                result.push((*idx, bits));
            }
        }
    }
    result
}
