//! PNG figures of fields, cloud statistics and diagnostic time series

pub mod maps;
pub mod palette;
pub mod stats;
pub mod timeseries;

pub use maps::{plot_tauc_map, plot_variance_maps, VarianceMapInputs};
pub use palette::{parse_hex, DiscreteColormap};
pub use stats::{plot_cloud_stats, plot_scatter};
pub use timeseries::{plot_precip_timeseries, plot_summary};

use plotters::drawing::DrawingAreaErrorKind;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Drawing error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid colour: {0}")]
    InvalidColor(String),
}

impl<E> From<DrawingAreaErrorKind<E>> for PlotError
where
    E: std::error::Error + Send + Sync,
{
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        PlotError::Backend(e.to_string())
    }
}

/// Create the parent directory of an output file
pub(crate) fn ensure_parent(path: &Path) -> Result<(), PlotError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Split `(x, y)` pairs into runs of defined values so lines break at gaps
pub fn defined_runs(x: &[f64], y: &[Option<f64>]) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (&xv, yv) in x.iter().zip(y) {
        match yv {
            Some(v) if v.is_finite() => current.push((xv, *v)),
            _ => {
                if !current.is_empty() {
                    runs.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Finite range of a set of values padded by 5 %, `fallback` when empty or flat
pub fn padded_range<I>(values: I, fallback: (f64, f64)) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-12 {
        return fallback;
    }
    let pad = 0.05 * (hi - lo);
    (lo - pad, hi + pad)
}
