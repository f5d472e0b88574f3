//! Benjamini-Hochberg false discovery rate control.

/// Adjust p-values with the Benjamini-Hochberg step-up procedure.
/// Returns adjusted values in the input order; each adjusted value is
/// `>=` its raw value and the adjusted values are monotone in the raw
/// ranking.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    if n == 0 {
        return vec![];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let n_f = n as f64;
    let mut adjusted = vec![0.0; n];
    let mut running_min = f64::INFINITY;
    for rank in (0..n).rev() {
        let idx = order[rank];
        let adj = (p_values[idx] * n_f / (rank + 1) as f64).min(1.0);
        running_min = running_min.min(adj);
        adjusted[idx] = running_min;
    }
    adjusted
}
