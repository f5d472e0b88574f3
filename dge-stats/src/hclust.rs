//! Sample distances and Ward-linkage hierarchical clustering.

use crate::error::{Result, StatsError};

use nalgebra::DMatrix;

/// One agglomeration step. Cluster ids `0..n` are the original samples;
/// step `k` creates cluster `n + k`.
#[derive(Debug, Clone)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

/// Full merge history plus the leaf order for heatmap display.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    pub merges: Vec<Merge>,
    pub leaf_order: Vec<usize>,
}

/// Pairwise Euclidean distances between the columns (samples) of a
/// transformed genes x samples matrix.
pub fn sample_distance_matrix(transformed: &DMatrix<f64>) -> DMatrix<f64> {
    let n = transformed.ncols();
    let mut dist = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = (transformed.column(i) - transformed.column(j)).norm();
            dist[(i, j)] = d;
            dist[(j, i)] = d;
        }
    }
    dist
}

/// Agglomerative clustering of a distance matrix under Ward's
/// minimum-variance criterion, via the Lance-Williams update on squared
/// distances. Heights are reported on the distance scale.
pub fn ward_cluster(dist: &DMatrix<f64>) -> Result<Dendrogram> {
    let n = dist.nrows();
    if n == 0 || dist.ncols() != n {
        return Err(StatsError::ShapeMismatch {
            reason: "distance matrix must be square and non-empty".into(),
        });
    }
    if n == 1 {
        return Ok(Dendrogram {
            merges: vec![],
            leaf_order: vec![0],
        });
    }

    // working squared distances between active clusters
    let mut d2 = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            d2[(i, j)] = dist[(i, j)] * dist[(i, j)];
        }
    }

    let mut active: Vec<usize> = (0..n).collect(); // slot indices
    let mut sizes: Vec<f64> = vec![1.0; n];
    let mut labels: Vec<usize> = (0..n).collect(); // slot -> cluster id
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..(n - 1) {
        let mut best = f64::INFINITY;
        let (mut a, mut b) = (0, 0);
        for (ai, &i) in active.iter().enumerate() {
            for &j in &active[ai + 1..] {
                if d2[(i, j)] < best {
                    best = d2[(i, j)];
                    a = i;
                    b = j;
                }
            }
        }

        let (na, nb) = (sizes[a], sizes[b]);
        merges.push(Merge {
            left: labels[a],
            right: labels[b],
            height: best.max(0.0).sqrt(),
            size: (na + nb) as usize,
        });

        // Lance-Williams (Ward): merged cluster kept in slot `a`
        for &c in &active {
            if c == a || c == b {
                continue;
            }
            let nc = sizes[c];
            let updated = ((na + nc) * d2[(a, c)] + (nb + nc) * d2[(b, c)] - nc * best)
                / (na + nb + nc);
            d2[(a, c)] = updated;
            d2[(c, a)] = updated;
        }

        sizes[a] = na + nb;
        labels[a] = n + step;
        active.retain(|&c| c != b);
    }

    let leaf_order = leaf_order(&merges, n);
    Ok(Dendrogram { merges, leaf_order })
}

/// Depth-first leaf order of the merge tree, left subtree first.
fn leaf_order(merges: &[Merge], n: usize) -> Vec<usize> {
    if merges.is_empty() {
        return (0..n).collect();
    }
    let mut order = Vec::with_capacity(n);
    let root = n + merges.len() - 1;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if id < n {
            order.push(id);
        } else {
            let merge = &merges[id - n];
            // push right first so the left branch is visited first
            stack.push(merge.right);
            stack.push(merge.left);
        }
    }
    order
}
