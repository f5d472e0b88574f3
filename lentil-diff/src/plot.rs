//! SVG diagnostics for the report. Pure presentation: every figure is
//! drawn from values the statistical layer already computed.

use crate::common::*;

use dge_stats::hclust::Dendrogram;
use dge_stats::DgeTable;
use plotters::prelude::*;

const FIG_SIZE: (u32, u32) = (800, 600);

fn draw_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow::anyhow!("plot: {}", e)
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.08).max(1e-6);
    (lo - pad, hi + pad)
}

/// Bar chart of per-sample totals (library sizes or summed expression).
pub fn plot_totals(
    names: &[Box<str>],
    totals: &DVec,
    title: &str,
    file_path: &str,
) -> anyhow::Result<()> {
    let root = SVGBackend::new(file_path, FIG_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let n = names.len();
    let max = totals.max() * 1.1;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(80)
        .y_label_area_size(80)
        .build_cartesian_2d(0..n as i32, 0.0..max)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|&i| {
            names
                .get(i as usize)
                .map(|s| s.to_string())
                .unwrap_or_default()
        })
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series((0..n).map(|j| {
            Rectangle::new(
                [(j as i32, 0.0), (j as i32 + 1, totals[j])],
                BLUE.mix(0.6).filled(),
            )
        }))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Scatter of the first two principal components, points colored by
/// condition and labelled by sample name. Axis labels carry the percent
/// of variance explained, rounded to whole percents.
pub fn plot_pca(
    scores: &Mat,
    percent_variance: &[f64],
    names: &[Box<str>],
    conditions: &[Box<str>],
    file_path: &str,
) -> anyhow::Result<()> {
    let root = SVGBackend::new(file_path, FIG_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let (x_lo, x_hi) = padded_range(scores.column(0).iter().copied());
    let (y_lo, y_hi) = if scores.ncols() > 1 {
        padded_range(scores.column(1).iter().copied())
    } else {
        (-1.0, 1.0)
    };

    let pc1 = percent_variance.first().copied().unwrap_or(0.0).round();
    let pc2 = percent_variance.get(1).copied().unwrap_or(0.0).round();

    let mut chart = ChartBuilder::on(&root)
        .caption("PCA of transformed counts", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc(format!("PC1: {}% variance", pc1))
        .y_desc(format!("PC2: {}% variance", pc2))
        .draw()
        .map_err(draw_err)?;

    let levels = distinct(conditions);
    for (j, name) in names.iter().enumerate() {
        let x = scores[(j, 0)];
        let y = if scores.ncols() > 1 { scores[(j, 1)] } else { 0.0 };
        let level = levels
            .iter()
            .position(|l| *l == conditions[j])
            .unwrap_or(0);
        let color = Palette99::pick(level).filled();
        chart
            .draw_series(std::iter::once(
                EmptyElement::at((x, y))
                    + Circle::new((0, 0), 5, color)
                    + Text::new(name.to_string(), (8, -8), ("sans-serif", 14)),
            ))
            .map_err(draw_err)?;
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Sample distance heatmap with rows and columns in dendrogram leaf
/// order, annotated with the `condition_replicate` display names.
pub fn plot_distance_heatmap(
    dist: &Mat,
    dendro: &Dendrogram,
    names: &[Box<str>],
    file_path: &str,
) -> anyhow::Result<()> {
    let root = SVGBackend::new(file_path, FIG_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let order = &dendro.leaf_order;
    let n = order.len();
    let max = dist.max().max(1e-12);

    let mut chart = ChartBuilder::on(&root)
        .caption("Sample distance matrix", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(100)
        .y_label_area_size(100)
        .build_cartesian_2d(0..n as i32, 0..n as i32)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&|&i| leaf_label(names, order, i))
        .y_label_formatter(&|&i| leaf_label(names, order, i))
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series((0..n).flat_map(|a| (0..n).map(move |b| (a, b))).map(
            |(a, b)| {
                // small distance = dark blue, large = white
                let t = dist[(order[a], order[b])] / max;
                let shade = (t * 255.0) as u8;
                let color = RGBColor(shade, shade, 255);
                Rectangle::new(
                    [(a as i32, b as i32), (a as i32 + 1, b as i32 + 1)],
                    color.filled(),
                )
            },
        ))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Histogram of raw p-values over 20 equal bins on [0, 1].
pub fn plot_pvalue_histogram(p_values: &[f64], file_path: &str) -> anyhow::Result<()> {
    const N_BINS: usize = 20;
    let mut bins = [0usize; N_BINS];
    for &p in p_values {
        let b = ((p * N_BINS as f64) as usize).min(N_BINS - 1);
        bins[b] += 1;
    }
    let max = *bins.iter().max().unwrap_or(&1) as f64 * 1.1;

    let root = SVGBackend::new(file_path, FIG_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Raw p-value distribution", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..1.0, 0.0..max)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("p-value")
        .y_desc("genes")
        .draw()
        .map_err(draw_err)?;

    let width = 1.0 / N_BINS as f64;
    chart
        .draw_series(bins.iter().enumerate().map(|(b, &count)| {
            let x0 = b as f64 * width;
            Rectangle::new([(x0, 0.0), (x0 + width, count as f64)], BLUE.mix(0.6).filled())
        }))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Volcano plot: log2 fold change against -log10 adjusted p-value,
/// significant genes highlighted.
pub fn plot_volcano(table: &DgeTable, file_path: &str) -> anyhow::Result<()> {
    let root = SVGBackend::new(file_path, FIG_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let neg_log10 = |p: f64| -(p.max(1e-300)).log10();

    let (x_lo, x_hi) = padded_range(table.genes.iter().map(|g| g.log_fc));
    let (_, y_hi) = padded_range(table.genes.iter().map(|g| neg_log10(g.adj_p_value)));

    let mut chart = ChartBuilder::on(&root)
        .caption("Volcano", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, 0.0..y_hi)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("log2 fold change")
        .y_desc("-log10 adjusted p-value")
        .draw()
        .map_err(draw_err)?;

    let grey = RGBColor(140, 140, 140);
    chart
        .draw_series(table.genes.iter().map(|g| {
            let color = if g.is_significant() {
                RED.filled()
            } else {
                grey.mix(0.5).filled()
            };
            Circle::new((g.log_fc, neg_log10(g.adj_p_value)), 3, color)
        }))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

fn distinct(labels: &[Box<str>]) -> Vec<Box<str>> {
    let mut seen: Vec<Box<str>> = vec![];
    for l in labels {
        if !seen.iter().any(|s| s == l) {
            seen.push(l.clone());
        }
    }
    seen
}

fn leaf_label(names: &[Box<str>], order: &[usize], i: i32) -> String {
    order
        .get(i as usize)
        .and_then(|&s| names.get(s))
        .map(|n| n.to_string())
        .unwrap_or_default()
}
