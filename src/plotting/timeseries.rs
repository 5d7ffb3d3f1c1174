use super::palette::{parse_hex, scale_color};
use super::{defined_runs, ensure_parent, padded_range, PlotError};
use crate::analysis::series::DiagnosticSeries;
use crate::config::{ModeSettings, PlotColors};
use crate::data_io::PrecipArchive;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// One line of a time series panel
struct Curve<'a> {
    y: &'a [Option<f64>],
    color: RGBColor,
    label: Option<String>,
}

fn draw_lines(
    area: &Area,
    x: &[f64],
    curves: &[Curve],
    y_desc: &str,
    reference: Option<f64>,
) -> Result<(), PlotError> {
    let x_range = match (x.first(), x.last()) {
        (Some(&a), Some(&b)) if b > a => (a, b),
        (Some(&a), _) => (a - 0.5, a + 0.5),
        _ => (0.0, 1.0),
    };
    let values = curves
        .iter()
        .flat_map(|c| c.y.iter().flatten().copied())
        .chain(reference);
    let y_range = padded_range(values, (0.0, 1.0));

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;
    chart
        .configure_mesh()
        .x_desc("time [h/UTC]")
        .y_desc(y_desc)
        .draw()?;

    if let Some(r) = reference {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x_range.0, r), (x_range.1, r)],
            BLACK.mix(0.3),
        )))?;
    }

    let mut labelled = false;
    for curve in curves {
        let color = curve.color;
        for (k, run) in defined_runs(x, curve.y).into_iter().enumerate() {
            let anno = chart.draw_series(LineSeries::new(run, color.stroke_width(2)))?;
            if let (0, Some(label)) = (k, &curve.label) {
                anno.label(label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], color));
                labelled = true;
            }
        }
    }
    if labelled {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

fn single(y: &[Option<f64>]) -> [Curve<'_>; 1] {
    [Curve {
        y,
        color: BLUE,
        label: None,
    }]
}

fn scale_curves<'a>(
    columns: &'a [Vec<Option<f64>>],
    scales: &[usize],
    labelled: bool,
    dx_km: f64,
) -> Vec<Curve<'a>> {
    columns
        .iter()
        .zip(scales)
        .enumerate()
        .map(|(k, (y, &n))| Curve {
            y,
            color: scale_color(k),
            label: labelled.then(|| format!("{:.1}km", n as f64 * dx_km)),
        })
        .collect()
}

/// Summary figures of one analysis level: domain statistics and the
/// variance diagnostics per scale. Returns the written paths.
pub fn plot_summary(
    dir: &Path,
    level_tag: &str,
    title: &str,
    series: &DiagnosticSeries,
    settings: &ModeSettings,
    dx_km: f64,
) -> Result<Vec<PathBuf>, PlotError> {
    let x = series.lead_hours();
    let steps = series.steps();
    let total: Vec<Option<f64>> = steps.iter().map(|s| Some(s.total)).collect();
    let mean_size: Vec<Option<f64>> = steps.iter().map(|s| s.mean_size).collect();
    let mean_tauc: Vec<Option<f64>> = steps.iter().map(|s| s.mean_tauc).collect();
    let mean_sum: Vec<Option<f64>> = steps.iter().map(|s| s.mean_sum).collect();

    let stats_path = dir.join(format!("mean_stats_timeseries_{}.png", level_tag));
    ensure_parent(&stats_path)?;
    {
        let root = BitMapBackend::new(&stats_path, (1400, 1000)).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(title, ("sans-serif", 24))?;
        let panels = root.split_evenly((2, 2));
        draw_lines(
            &panels[0],
            &x,
            &single(&total),
            &format!("Domain total {} [{}]", settings.quantity, settings.unit),
            None,
        )?;
        draw_lines(&panels[1], &x, &single(&mean_size), "Mean cloud size [m^2]", None)?;
        draw_lines(&panels[2], &x, &single(&mean_tauc), "Domain mean tau_c [h]", None)?;
        draw_lines(
            &panels[3],
            &x,
            &single(&mean_sum),
            &format!("Mean cloud {} [{}]", settings.quantity, settings.unit),
            None,
        )?;
        root.present()?;
    }

    let ratio: Vec<Vec<Option<f64>>> = series
        .scales()
        .iter()
        .map(|&n| series.count_variance_ratio(n).unwrap_or_default())
        .collect();
    let normalized: Vec<Vec<Option<f64>>> = series
        .scales()
        .iter()
        .map(|&n| series.normalized_variance(n).unwrap_or_default())
        .collect();
    let adjusted: Vec<Vec<Option<f64>>> = series
        .scales()
        .iter()
        .map(|&n| series.adjusted_variance(n).unwrap_or_default())
        .collect();
    let scales = series.scales();

    let variance_path = dir.join(format!("variance_stats_timeseries_{}.png", level_tag));
    {
        let root = BitMapBackend::new(&variance_path, (1400, 1000)).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(title, ("sans-serif", 24))?;
        let panels = root.split_evenly((2, 2));
        draw_lines(
            &panels[0],
            &x,
            &scale_curves(&ratio, scales, false, dx_km),
            "Var(N)/N",
            Some(1.0),
        )?;
        draw_lines(
            &panels[1],
            &x,
            &scale_curves(&normalized, scales, false, dx_km),
            "0.5 * NVar(M) <N>",
            Some(1.0),
        )?;
        draw_lines(
            &panels[3],
            &x,
            &scale_curves(&adjusted, scales, true, dx_km),
            "NVar(M) <N> / (1+Var(N)/N)",
            Some(1.0),
        )?;
        root.present()?;
    }

    Ok(vec![stats_path, variance_path])
}

/// Domain-mean precipitation per day: deterministic and observed curves
/// plus the ensemble mean with its min/max envelope, four days per row
pub fn plot_precip_timeseries(
    archive: &PrecipArchive,
    colors: &PlotColors,
    path: &Path,
) -> Result<(), PlotError> {
    const COLUMNS: usize = 4;
    let days = archive.dates();
    let rows = days.div_ceil(COLUMNS).max(1);
    let x: Vec<f64> = (1..=archive.times()).map(|t| t as f64).collect();
    let color_of = |group: &str| -> Result<RGBColor, PlotError> {
        parse_hex(colors.get(group).unwrap_or("#000000"))
    };

    let y_max = archive
        .groups
        .values()
        .flat_map(|s| s.data.iter().copied())
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    let y_range = (0.0, if y_max > 0.0 { y_max * 1.05 } else { 1.0 });
    let x_range = (1.0, (x.len() as f64).max(2.0));

    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (1000, 300 * rows as u32)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((rows, COLUMNS));

    for day in 0..days {
        let mut builder = ChartBuilder::on(&panels[day]);
        builder.caption(day.to_string(), ("sans-serif", 14)).margin(5);
        builder.x_label_area_size(if day >= (rows - 1) * COLUMNS { 30 } else { 10 });
        builder.y_label_area_size(if day % COLUMNS == 0 { 45 } else { 10 });
        let mut chart = builder.build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;
        let mut mesh = chart.configure_mesh();
        if day % COLUMNS == 0 {
            mesh.y_desc("Accumulation [mm/h]");
        }
        if day >= (rows - 1) * COLUMNS {
            mesh.x_desc("Time [UTC]");
        }
        mesh.draw()?;

        for (name, series) in &archive.groups {
            if day >= series.dates() {
                continue;
            }
            let color = color_of(name)?;
            let line = if name == "ens" {
                let range = series.member_range(day);
                let fill = color_of("ens_range")?;
                let mut upper = Vec::new();
                let mut lower = Vec::new();
                for (&xv, r) in x.iter().zip(&range) {
                    match r {
                        Some((lo, hi)) => {
                            upper.push((xv, *hi));
                            lower.push((xv, *lo));
                        }
                        None => {
                            draw_envelope(&mut chart, &upper, &lower, fill)?;
                            upper.clear();
                            lower.clear();
                        }
                    }
                }
                draw_envelope(&mut chart, &upper, &lower, fill)?;
                series.member_mean(day)
            } else {
                series.first_member(day)
            };

            for (k, run) in defined_runs(&x, &line).into_iter().enumerate() {
                let anno = chart.draw_series(LineSeries::new(run, color.stroke_width(2)))?;
                if day == 0 && k == 0 {
                    anno.label(name.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], color));
                }
            }
        }

        if day == 0 {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperLeft)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }

    root.present()?;
    Ok(())
}

type LinearChart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_envelope(
    chart: &mut LinearChart,
    upper: &[(f64, f64)],
    lower: &[(f64, f64)],
    fill: RGBColor,
) -> Result<(), PlotError> {
    if upper.len() < 2 {
        return Ok(());
    }
    let outline: Vec<(f64, f64)> = upper.iter().chain(lower.iter().rev()).copied().collect();
    chart.draw_series(std::iter::once(Polygon::new(outline, fill.mix(0.6).filled())))?;
    Ok(())
}
