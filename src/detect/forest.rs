//! Isolation forest: unsupervised outlier scoring by random partitioning.
//!
//! Each tree is grown on a random subsample by repeatedly picking a random
//! feature and a uniform split value between that feature's min and max.
//! Outliers sit in sparse regions and get isolated after fewer splits, so a
//! short average path length across the ensemble means a likely anomaly.

use crate::detect::stats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Points drawn (without replacement) to grow each tree.
pub const MAX_SUBSAMPLE: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub trees: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { trees: 100, seed: 42 }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow<const N: usize>(
        data: &[[f64; N]],
        indices: Vec<usize>,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(data, indices, 0, max_depth, rng);
        tree
    }

    fn build<const N: usize>(
        &mut self,
        data: &[[f64; N]],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: indices.len() });
        if depth >= max_depth || indices.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it.
        let mut candidates: Vec<(usize, f64, f64)> = Vec::with_capacity(N);
        for feature in 0..N {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(data[i][feature]), hi.max(data[i][feature]))
            });
            if hi > lo {
                candidates.push((feature, lo, hi));
            }
        }
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = split_value(lo, hi, rng);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| data[i][feature] <= threshold);

        let left = self.build(data, left_idx, depth + 1, max_depth, rng);
        let right = self.build(data, right_idx, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length<const N: usize>(&self, point: &[f64; N]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Uniform split point in `[lo, hi)`. Interpolates instead of taking
/// `hi - lo` when the span overflows.
fn split_value(lo: f64, hi: f64, rng: &mut StdRng) -> f64 {
    let u: f64 = rng.gen();
    let span = hi - lo;
    let t = if span.is_finite() {
        lo + u * span
    } else {
        lo * (1.0 - u) + hi * u
    };
    if t >= lo && t < hi {
        t
    } else {
        lo
    }
}

/// Expected path length of an unsuccessful BST search over `n` points; used
/// both to normalize scores and to credit the unexpanded part of a leaf.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fitted ensemble of isolation trees over `N`-dimensional feature vectors.
#[derive(Debug, Clone)]
pub struct IsolationForest<const N: usize> {
    trees: Vec<IsolationTree>,
    subsample: usize,
}

impl<const N: usize> IsolationForest<N> {
    /// Grow `params.trees` trees, each on its own subsample. The whole
    /// ensemble derives from `params.seed`, so equal input gives equal trees.
    pub fn fit(data: &[[f64; N]], params: ForestParams) -> Self {
        let subsample = data.len().min(MAX_SUBSAMPLE);
        if subsample < 2 {
            return Self {
                trees: Vec::new(),
                subsample,
            };
        }
        let max_depth = (subsample as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.trees.max(1))
            .map(|_| {
                let indices = rand::seq::index::sample(&mut rng, data.len(), subsample).into_vec();
                IsolationTree::grow(data, indices, max_depth, &mut rng)
            })
            .collect();

        Self { trees, subsample }
    }

    /// Anomaly score per point in (-1, 0]: `-2^(-E[h(x)] / c(subsample))`.
    /// Lower means more anomalous.
    pub fn score_samples(&self, data: &[[f64; N]]) -> Vec<f64> {
        if self.trees.is_empty() {
            return vec![-0.5; data.len()];
        }
        let norm = average_path_length(self.subsample);
        data.iter()
            .map(|point| {
                let total: f64 = self.trees.iter().map(|t| t.path_length(point)).sum();
                let mean_path = total / self.trees.len() as f64;
                -(2f64.powf(-mean_path / norm))
            })
            .collect()
    }
}

/// Outcome of thresholding forest scores at a contamination rate.
#[derive(Debug, Clone)]
pub struct OutlierFlags {
    pub scores: Vec<f64>,
    pub threshold: f64,
    pub flagged: Vec<bool>,
}

/// Fit a forest on `data`, score every point and flag the `contamination`
/// fraction with the lowest scores. Points whose score merely equals the
/// threshold are kept as inliers, so uniform data flags nothing.
pub fn detect_outliers<const N: usize>(
    data: &[[f64; N]],
    contamination: f64,
    params: ForestParams,
) -> OutlierFlags {
    let forest = IsolationForest::fit(data, params);
    let scores = forest.score_samples(data);
    let threshold = stats::percentile(&scores, contamination * 100.0);
    let flagged = scores.iter().map(|&s| s < threshold).collect();
    debug!(points = data.len(), threshold, "isolation forest scored");
    OutlierFlags {
        scores,
        threshold,
        flagged,
    }
}
