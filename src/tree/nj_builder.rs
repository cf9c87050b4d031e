use anyhow::bail;
use nalgebra::DMatrix;

use crate::alignment::{Alignment, InvalidAlignment, GAP};
use crate::tree::nj_matrices::{Mat, NJMat};
use crate::tree::{NodeIdx, Tree, INNER_LABEL_PREFIX};
use crate::Result;

/// Builds the neighbor-joining tree for one alignment under the identity
/// distance model. Leaves carry the alignment's taxon ids, internal nodes
/// are labeled `Inner1`..`InnerK` in creation order with the root last,
/// and the root trifurcates for alignments of three or more taxa.
///
/// # Example
/// ```
/// use njtrees::alignment::Alignment;
/// use njtrees::tree::nj_builder::build_nj_tree;
/// use njtrees::record_wo_desc as record;
///
/// let alignment = Alignment::new(vec![
///     record!("A", b"MKKVL"),
///     record!("B", b"MKKVI"),
///     record!("C", b"MRRVI"),
/// ]);
/// let tree = build_nj_tree(&alignment).unwrap();
/// # assert_eq!(tree.leaves().len(), 3);
/// # assert!(tree.to_newick().ends_with(";"));
/// ```
pub fn build_nj_tree(alignment: &Alignment) -> Result<Tree> {
    let nj_data = identity_distances(alignment)?;
    build_nj_tree_from_matrix(nj_data, alignment)
}

/// Computes pairwise identity distances: 1 - matches/alignment_length. A
/// position counts as a match iff both symbols are equal and neither is the
/// gap character; the denominator is always the full alignment length.
pub(crate) fn identity_distances(alignment: &Alignment) -> Result<NJMat> {
    if !alignment.aligned {
        bail!(InvalidAlignment {
            message: String::from("Sequences have unequal lengths, no distances defined")
        });
    }
    let nseqs = alignment.len();
    if nseqs < 2 {
        bail!(InvalidAlignment {
            message: format!("Distance matrix requires at least 2 taxa, got {}", nseqs)
        });
    }
    let len = alignment.msa_len();
    if len == 0 {
        bail!(InvalidAlignment {
            message: String::from("Alignment has no columns")
        });
    }
    let mut distances = DMatrix::zeros(nseqs, nseqs);
    for i in 0..nseqs {
        for j in (i + 1)..nseqs {
            let seq_i = alignment.record(i).seq();
            let seq_j = alignment.record(j).seq();
            let matches = seq_i
                .iter()
                .zip(seq_j.iter())
                .filter(|(a, b)| a == b && **a != GAP)
                .count();
            let dist = 1.0 - matches as f64 / len as f64;
            distances[(i, j)] = dist;
            distances[(j, i)] = dist;
        }
    }
    Ok(NJMat {
        idx: (0..nseqs).map(NodeIdx::Leaf).collect(),
        distances,
    })
}

fn inner_label(ordinal: usize) -> String {
    format!("{}{}", INNER_LABEL_PREFIX, ordinal)
}

fn build_nj_tree_from_matrix(mut nj_data: NJMat, alignment: &Alignment) -> Result<Tree> {
    let n = nj_data.distances.ncols();
    let mut tree = Tree::new(alignment)?;
    if n == 2 {
        let dist = nj_data.distances[(0, 1)];
        let blen_i = dist / 2.0;
        tree.add_parent(
            2,
            &nj_data.idx[0],
            &nj_data.idx[1],
            blen_i,
            dist - blen_i,
            inner_label(1),
        );
        tree.root = NodeIdx::Internal(2);
    } else {
        let mut cur_idx = n;
        while nj_data.len() > 2 {
            let q = nj_data.compute_nj_q();
            let (i, j) = argmin_wo_diagonal(&q);
            let (blen_i, blen_j) = nj_data.branch_lengths(i, j);
            tree.add_parent(
                cur_idx,
                &nj_data.idx[i],
                &nj_data.idx[j],
                blen_i,
                blen_j,
                inner_label(cur_idx - n + 1),
            );
            nj_data = nj_data
                .add_merge_node(cur_idx)
                .recompute_new_node_distances(i, j)
                .remove_merged_nodes(i, j);
            cur_idx += 1;
        }
        // Two active nodes are left, one of them the newest internal node.
        // That node becomes the root and the other is hung beneath it at
        // the remaining pairwise distance.
        let root_idx = cur_idx - 1;
        let dist = nj_data.distances[(0, 1)];
        let other = if nj_data.idx[0] == NodeIdx::Internal(root_idx) {
            nj_data.idx[1]
        } else {
            nj_data.idx[0]
        };
        tree.append_root_child(root_idx, &other, dist);
        tree.root = NodeIdx::Internal(root_idx);
    }
    tree.compute_postorder();
    Ok(tree)
}

/// First-encountered minimum below the diagonal, scanning rows in order.
/// Ties keep the earliest pair so repeated runs produce the same topology.
fn argmin_wo_diagonal(q: &Mat) -> (usize, usize) {
    debug_assert!(!q.is_empty(), "The input matrix must not be empty.");
    debug_assert!(
        q.ncols() > 1 && q.nrows() > 1,
        "The input matrix should have more than 1 element."
    );
    let mut arg_min = (1, 0);
    let mut val_min = f64::MAX;
    for i in 0..q.nrows() {
        for j in 0..i {
            let val = q[(i, j)];
            if val < val_min {
                val_min = val;
                arg_min = (i, j);
            }
        }
    }
    arg_min
}
