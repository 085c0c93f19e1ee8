//! Bucket-box-intersection (BBI) k-d tree Gaussian shortlist (spec.md
//! §4.2 step 1, glossary "BBI"). Grounded on
//! `examples/original_source/src/libpocketsphinx/kdtree.c`'s split-on-
//! widest-dimension construction and leaf-bitvector lookup, reimplemented
//! as a safe arena tree rather than translated pointer code, per spec.md
//! §9's "manual pointer graphs -> arena + dense indices" guidance.
use ndarray::Array2;

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        /// Density indices likely to be in the true top-N for any frame
        /// that reaches this leaf.
        candidates: Vec<usize>,
    },
    Split {
        dimension: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// A k-d tree over a codebook's density means, used to shortlist
/// candidate densities for a given frame before full Gaussian evaluation.
#[derive(Clone, Debug)]
pub struct BbiTree {
    nodes: Vec<Node>,
    root: usize,
}

impl BbiTree {
    /// Build a tree over `means` (`(n_density, veclen)`), splitting nodes
    /// with more than `leaf_size` points on their highest-variance
    /// dimension, median-threshold.
    pub fn build(means: &Array2<f32>, leaf_size: usize) -> Self {
        let n_density = means.nrows();
        let all: Vec<usize> = (0..n_density).collect();
        let mut nodes = Vec::new();
        let root = Self::build_node(means, &all, leaf_size, &mut nodes);
        Self { nodes, root }
    }

    fn build_node(means: &Array2<f32>, idxs: &[usize], leaf_size: usize, nodes: &mut Vec<Node>) -> usize {
        if idxs.len() <= leaf_size.max(1) {
            nodes.push(Node::Leaf {
                candidates: idxs.to_vec(),
            });
            return nodes.len() - 1;
        }
        let veclen = means.ncols();
        let mut best_dim = 0usize;
        let mut best_spread = -1.0f32;
        for d in 0..veclen {
            let vals: Vec<f32> = idxs.iter().map(|&i| means[[i, d]]).collect();
            let lo = vals.iter().cloned().fold(f32::INFINITY, f32::min);
            let hi = vals.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            if hi - lo > best_spread {
                best_spread = hi - lo;
                best_dim = d;
            }
        }
        let mut sorted = idxs.to_vec();
        sorted.sort_by(|&a, &b| means[[a, best_dim]].partial_cmp(&means[[b, best_dim]]).unwrap());
        let mid = sorted.len() / 2;
        let threshold = means[[sorted[mid], best_dim]];
        let (left_idxs, right_idxs) = sorted.split_at(mid);
        if left_idxs.is_empty() || right_idxs.is_empty() {
            nodes.push(Node::Leaf {
                candidates: idxs.to_vec(),
            });
            return nodes.len() - 1;
        }
        let left = Self::build_node(means, left_idxs, leaf_size, nodes);
        let right = Self::build_node(means, right_idxs, leaf_size, nodes);
        nodes.push(Node::Split {
            dimension: best_dim,
            threshold,
            left,
            right,
        });
        nodes.len() - 1
    }

    /// Candidate density indices for `frame`, descending the tree by
    /// comparing `frame[dimension]` against each split's threshold.
    pub fn shortlist(&self, frame: &[f32]) -> &[usize] {
        let mut cur = self.root;
        loop {
            match &self.nodes[cur] {
                Node::Leaf { candidates } => return candidates,
                Node::Split {
                    dimension,
                    threshold,
                    left,
                    right,
                } => {
                    cur = if frame[*dimension] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortlist_covers_all_points_for_small_codebooks() {
        let means = Array2::from_shape_vec((4, 2), vec![0.0, 0.0, 10.0, 10.0, -5.0, 0.0, 5.0, -5.0]).unwrap();
        let tree = BbiTree::build(&means, 1);
        let sl = tree.shortlist(&[0.1, 0.1]);
        assert!(!sl.is_empty());
    }

    #[test]
    fn leaf_size_larger_than_codebook_is_single_leaf() {
        let means = Array2::from_shape_vec((3, 2), vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]).unwrap();
        let tree = BbiTree::build(&means, 100);
        assert_eq!(tree.shortlist(&[0.0, 0.0]).len(), 3);
    }
}
