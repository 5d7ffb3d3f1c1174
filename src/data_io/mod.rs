pub mod archive;
pub mod reader;
pub mod writer;

pub use archive::{read_precip_archive, ForecastSeries, PrecipArchive};
pub use reader::{NetCDFEnsemble, ReaderError};
pub use writer::{DiagnosticWriter, RunMetadata, WriteError};

use chrono::Duration;
use ndarray::{s, Array2, ArrayView2};

/// A 2D model field at one level and time
#[derive(Debug, Clone)]
pub struct Field {
    /// Variable name (e.g. "W", "QC", "RHO", "TOT_PR", "TAU_C")
    pub name: String,
    /// 2D data array [y, x]; missing values are NaN
    pub data: Array2<f64>,
    /// Units, empty if the file carries none
    pub unit: String,
    /// Vertical level the field was taken from
    pub level: Option<usize>,
}

impl Field {
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Centered analysis window inside a larger domain.
///
/// For an extent `s` and a requested size `w` the window starts at
/// `(s - w - 1) / 2` and leaves one more cell on the far side than on the
/// near side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubWindow {
    pub row_start: usize,
    pub col_start: usize,
    pub rows: usize,
    pub cols: usize,
}

fn centered_range(extent: usize, size: usize) -> Option<(usize, usize)> {
    if extent < size + 1 {
        return None;
    }
    let lo = (extent - size - 1) / 2;
    Some((lo, extent - 2 * lo - 1))
}

impl SubWindow {
    pub fn centered(shape: (usize, usize), size: usize) -> Result<Self, ReaderError> {
        let too_small = || ReaderError::DomainTooSmall {
            shape,
            window: size,
        };
        let (row_start, rows) = centered_range(shape.0, size).ok_or_else(too_small)?;
        let (col_start, cols) = centered_range(shape.1, size).ok_or_else(too_small)?;
        Ok(Self {
            row_start,
            col_start,
            rows,
            cols,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn slice<'a>(&self, field: ArrayView2<'a, f64>) -> ArrayView2<'a, f64> {
        field.slice_move(s![
            self.row_start..self.row_start + self.rows,
            self.col_start..self.col_start + self.cols
        ])
    }
}

/// Which variable to load from which file family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequest {
    pub name: String,
    /// File name suffix after `lfffDDHHMMSS`
    pub suffix: String,
    pub level: Option<usize>,
}

impl FieldRequest {
    pub fn new(name: &str, suffix: &str, level: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            suffix: suffix.to_string(),
            level,
        }
    }
}

/// Source of ensemble member fields.
///
/// Members are numbered from 0; implementations map them to their own
/// storage layout.
pub trait EnsembleSource {
    fn member_count(&self) -> usize;

    fn load_field(
        &self,
        member: usize,
        lead: Duration,
        request: &FieldRequest,
    ) -> Result<Field, ReaderError>;

    /// Height above sea level (m) of every model level
    fn level_heights(&self) -> Result<Vec<f64>, ReaderError>;
}

/// Index and height of the level closest to `target`
pub fn closest_level(heights: &[f64], target: f64) -> Option<(usize, f64)> {
    heights
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, h)| h.is_finite())
        .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_window() {
        let w = SubWindow::centered((357, 357), 256).unwrap();
        assert_eq!(w.row_start, 50);
        assert_eq!(w.shape(), (256, 256));

        // even margin leaves one extra cell on the far side
        let w = SubWindow::centered((260, 300), 256).unwrap();
        assert_eq!((w.row_start, w.rows), (1, 257));
        assert_eq!((w.col_start, w.cols), (21, 257));

        assert!(SubWindow::centered((256, 400), 256).is_err());
    }

    #[test]
    fn test_window_slice() {
        let field = Array2::from_shape_fn((7, 7), |(i, j)| (i * 10 + j) as f64);
        let w = SubWindow::centered((7, 7), 4).unwrap();
        let cut = w.slice(field.view());
        assert_eq!(cut.dim(), (4, 4));
        assert_eq!(cut[[0, 0]], 11.0);
    }

    #[test]
    fn test_closest_level() {
        let heights = [12000.0, 8000.0, 3100.0, 2950.0, 100.0];
        assert_eq!(closest_level(&heights, 3000.0), Some((3, 2950.0)));
        assert_eq!(closest_level(&[], 3000.0), None);
    }
}
