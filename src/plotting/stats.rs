use super::palette::scale_color;
use super::{defined_runs, ensure_parent, PlotError};
use crate::analysis::histogram::{Histogram, PooledCloudStats, ScatterSeries};
use crate::analysis::rdf::{cumulative, ClusterRadii, Rdf};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

const HIST_Y_MIN: f64 = 0.1;
const HIST_Y_MAX: f64 = 1e4;

fn draw_histogram(
    area: &Area,
    title: &str,
    x_desc: &str,
    hist: &Histogram,
    mean: Option<f64>,
) -> Result<(), PlotError> {
    let x_max = hist.edges.last().copied().unwrap_or(1.0).max(f64::MIN_POSITIVE);
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 16))
        .margin(8)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..x_max, (HIST_Y_MIN..HIST_Y_MAX).log_scale())?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Number of clouds")
        .x_label_formatter(&|v: &f64| format!("{:.1e}", v))
        .draw()?;

    chart.draw_series(
        hist.counts
            .iter()
            .zip(hist.edges.windows(2))
            .filter(|(c, _)| **c > 0)
            .map(|(&c, e)| Rectangle::new([(e[0], HIST_Y_MIN), (e[1], c as f64)], BLUE.filled())),
    )?;
    if let Some(m) = mean {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(m, HIST_Y_MIN), (m, HIST_Y_MAX)],
            RED.mix(0.5),
        )))?;
    }
    Ok(())
}

fn draw_rdf(area: &Area, rdf: &Rdf, radii: &ClusterRadii) -> Result<(), PlotError> {
    let r_km: Vec<f64> = rdf.r.iter().map(|r| r / 1000.0).collect();
    let r_max = r_km.iter().copied().fold(0.0, f64::max).max(1.0);
    let mut chart = ChartBuilder::on(area)
        .caption("Radial distribution function", ("sans-serif", 16))
        .margin(8)
        .x_label_area_size(35)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0..r_max, 0.0..4.0)?;
    chart
        .configure_mesh()
        .x_desc("Distance [km]")
        .y_desc("Normalized RDF")
        .draw()?;

    chart.draw_series(std::iter::once(PathElement::new(
        vec![(0.0, 1.0), (r_max, 1.0)],
        BLACK.mix(0.3),
    )))?;
    for run in defined_runs(&r_km, &rdf.g) {
        chart.draw_series(LineSeries::new(run, &BLUE))?;
    }
    for run in defined_runs(&r_km, &cumulative(&rdf.g)) {
        chart.draw_series(LineSeries::new(run, &GREEN))?;
    }
    let markers = [(radii.from_rdf, RED.mix(0.5)), (radii.from_cdf, MAGENTA.mix(0.5))];
    for (radius, color) in markers {
        if let Some(r) = radius {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(r, 0.0), (r, 4.0)],
                color,
            )))?;
        }
    }
    Ok(())
}

/// Cloud size and flux histograms next to the ensemble-mean RDF
pub fn plot_cloud_stats(
    path: &Path,
    title: &str,
    pooled: &PooledCloudStats,
    rdf: &Rdf,
    radii: &ClusterRadii,
    quantity: &str,
    unit: &str,
) -> Result<(), PlotError> {
    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (1500, 520)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, ("sans-serif", 22))?;
    let panels = root.split_evenly((1, 3));

    draw_histogram(
        &panels[0],
        "Cloud size distribution",
        "Cloud size [m^2]",
        &pooled.size_hist,
        pooled.mean_size,
    )?;
    draw_histogram(
        &panels[1],
        &format!("Cloud {} distribution", quantity),
        &format!("Cloud {} [{}]", quantity, unit),
        &pooled.sum_hist,
        pooled.mean_sum,
    )?;
    draw_rdf(&panels[2], rdf, radii)?;

    root.present()?;
    Ok(())
}

/// Relative spread against sqrt(1/N) for every scale, and the same spread
/// as a percentage of the independent-cloud value
pub fn plot_scatter(
    path: &Path,
    title: &str,
    series: &[ScatterSeries],
    symbol: char,
    dx_km: f64,
) -> Result<(), PlotError> {
    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (1200, 520)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, ("sans-serif", 22))?;
    let panels = root.split_evenly((1, 2));

    let mut left = ChartBuilder::on(&panels[0])
        .margin(8)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d((0.05..10.0).log_scale(), (0.01..100.0).log_scale())?;
    left.configure_mesh()
        .x_desc("Square root (1/N)")
        .y_desc(format!("Square root (Var({0})/{0}^2)", symbol))
        .draw()?;
    left.draw_series(std::iter::once(PathElement::new(
        vec![(0.05, 0.05 * 2f64.sqrt()), (10.0, 10.0 * 2f64.sqrt())],
        BLACK.mix(0.4),
    )))?;

    let mut right = ChartBuilder::on(&panels[1])
        .margin(8)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d((0.05..10.0).log_scale(), (1.0..1000.0).log_scale())?;
    right
        .configure_mesh()
        .x_desc("Square root (1/N)")
        .y_desc("Percent of theoretical value")
        .draw()?;
    right.draw_series(std::iter::once(PathElement::new(
        vec![(0.05, 100.0), (10.0, 100.0)],
        BLACK.mix(0.4),
    )))?;

    for (k, s) in series.iter().enumerate() {
        let color = scale_color(k);
        let points = |ys: &[Option<f64>]| -> Vec<(f64, f64)> {
            s.x.iter()
                .zip(ys)
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .filter(|(x, y)| *x > 0.0 && *y > 0.0)
                .collect()
        };

        left.draw_series(
            points(&s.y)
                .into_iter()
                .map(|p| Circle::new(p, 2, color.mix(0.8).filled())),
        )?
        .label(format!("{:.1}km", s.scale as f64 * dx_km))
        .legend(move |(x, y)| Circle::new((x, y), 3, color.filled()));
        if let (Some(xm), Some(ym)) = (s.x_mean, s.y_mean) {
            left.draw_series(std::iter::once(Cross::new((xm, ym), 5, color.stroke_width(2))))?;
        }

        right.draw_series(
            points(&s.percent)
                .into_iter()
                .map(|p| Circle::new(p, 2, color.mix(0.8).filled())),
        )?;
        if let (Some(xm), Some(pm)) = (s.x_mean, s.percent_mean) {
            right.draw_series(std::iter::once(Cross::new((xm, pm), 5, color.stroke_width(2))))?;
        }
    }

    left.configure_series_labels()
        .position(SeriesLabelPosition::LowerLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
