use super::palette::{field_colormap, flux_colormap, nvar_colormap, tauc_colormap, DiscreteColormap};
use super::{ensure_parent, PlotError};
use crate::analysis::coarse::EnsembleBoxStats;
use crate::analysis::undefined::defined;
use crate::config::AnalysisMode;
use ndarray::{Array2, ArrayView2};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Everything shown on one 2x2 variance map figure
pub struct VarianceMapInputs<'a> {
    /// Detection field of the first member on the analysis window
    pub field: ArrayView2<'a, f64>,
    pub stats: &'a EnsembleBoxStats,
    pub mode: AnalysisMode,
    pub unit: &'a str,
    /// `M` or `P`
    pub symbol: char,
}

fn drop_zeros(field: &Array2<Option<f64>>) -> Array2<Option<f64>> {
    field.mapv(|v| v.filter(|x| *x != 0.0))
}

fn max_defined(field: &Array2<Option<f64>>) -> f64 {
    let max = field
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() && max > 0.0 {
        max
    } else {
        1.0
    }
}

/// Draw a gridded field with a colour bar; `cell` is the number of window
/// cells covered by one value
fn draw_grid_panel(
    area: &Area,
    title: &str,
    unit: &str,
    values: ArrayView2<Option<f64>>,
    cell: usize,
    cmap: &DiscreteColormap,
) -> Result<(), PlotError> {
    let (width, _) = area.dim_in_pixel();
    let (map_area, bar_area) = area.split_horizontally(width.saturating_sub(80));
    let (rows, cols) = values.dim();
    let y_top = (rows * cell) as f64;

    let mut chart = ChartBuilder::on(&map_area)
        .caption(title, ("sans-serif", 18))
        .margin(5)
        .x_label_area_size(25)
        .y_label_area_size(35)
        .build_cartesian_2d(0.0..(cols * cell) as f64, 0.0..y_top)?;
    chart.configure_mesh().disable_mesh().draw()?;

    chart.draw_series(values.indexed_iter().filter_map(|((i, j), v)| {
        let color = cmap.color_for((*v)?)?;
        let x0 = (j * cell) as f64;
        let y0 = y_top - (i * cell) as f64;
        Some(Rectangle::new(
            [(x0, y0), (x0 + cell as f64, y0 - cell as f64)],
            color.filled(),
        ))
    }))?;

    let levels = cmap.levels.clone();
    let label = move |v: &f64| {
        let k = v.round().max(0.0) as usize;
        levels
            .get(k)
            .map(|l| format!("{:.3}", l))
            .unwrap_or_default()
    };
    let mut bar = ChartBuilder::on(&bar_area)
        .margin_top(30)
        .margin_bottom(30)
        .y_label_area_size(55)
        .build_cartesian_2d(0.0..1.0, 0.0..cmap.colors.len() as f64)?;
    bar.configure_mesh()
        .disable_mesh()
        .x_labels(0)
        .y_labels(cmap.levels.len())
        .y_label_formatter(&label)
        .y_desc(unit)
        .draw()?;
    bar.draw_series(cmap.colors.iter().enumerate().map(|(k, c)| {
        Rectangle::new([(0.0, k as f64), (1.0, k as f64 + 1.0)], c.filled())
    }))?;
    Ok(())
}

/// 2x2 figure: detection field, ensemble-mean box sum, normalized variance
/// times N and ensemble-mean object flux
pub fn plot_variance_maps(
    path: &Path,
    title: &str,
    inputs: &VarianceMapInputs,
) -> Result<(), PlotError> {
    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (1400, 1250)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, ("sans-serif", 24))?;
    let panels = root.split_evenly((2, 2));

    let n = inputs.stats.grid.n;
    let field = inputs.field.mapv(defined);
    let sum_mean = drop_zeros(&inputs.stats.sum_mean);
    let flux_mean = drop_zeros(&inputs.stats.flux_mean);
    let nvar = inputs.stats.normalized_variance_field();
    let field_name = match inputs.mode {
        AnalysisMode::MassFlux => "W",
        AnalysisMode::Precipitation => "TOT_PR",
    };
    let field_unit = match inputs.mode {
        AnalysisMode::MassFlux => "m/s",
        AnalysisMode::Precipitation => "mm/h",
    };

    draw_grid_panel(
        &panels[0],
        field_name,
        field_unit,
        field.view(),
        1,
        &field_colormap(inputs.mode),
    )?;
    draw_grid_panel(
        &panels[1],
        &inputs.symbol.to_string(),
        inputs.unit,
        sum_mean.view(),
        n,
        &flux_colormap(max_defined(&sum_mean)),
    )?;
    draw_grid_panel(
        &panels[2],
        "Normalized Var * N",
        "",
        nvar.view(),
        n,
        &nvar_colormap(),
    )?;
    draw_grid_panel(
        &panels[3],
        &inputs.symbol.to_ascii_lowercase().to_string(),
        inputs.unit,
        flux_mean.view(),
        n,
        &flux_colormap(max_defined(&flux_mean)),
    )?;

    root.present()?;
    Ok(())
}

/// Ensemble-mean convective timescale on the analysis window
pub fn plot_tauc_map(path: &Path, title: &str, tauc: ArrayView2<f64>) -> Result<(), PlotError> {
    ensure_parent(path)?;
    let root = BitMapBackend::new(path, (900, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let values = tauc.mapv(defined);
    draw_grid_panel(&root, title, "h", values.view(), 1, &tauc_colormap())?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_boxes_are_blank() {
        let field = array![[Some(0.0), Some(2.0)], [None, Some(-1.0)]];
        assert_eq!(
            drop_zeros(&field),
            array![[None, Some(2.0)], [None, Some(-1.0)]]
        );
        assert_eq!(max_defined(&field), 2.0);
        assert_eq!(max_defined(&array![[None, Some(0.0)]]), 1.0);
    }
}
