use super::clouds::MemberClouds;
use super::undefined::{defined, mean_defined, ratio, sample_mean, sample_variance};
use crate::config::AggregationMode;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::ops::Range;

/// Partition of the analysis window into `n`×`n` boxes.
///
/// Cells beyond `nx * n` rows or `ny * n` columns belong to no box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxGrid {
    pub n: usize,
    pub nx: usize,
    pub ny: usize,
}

impl BoxGrid {
    pub fn new(shape: (usize, usize), n: usize) -> Self {
        let n = n.max(1);
        Self {
            n,
            nx: shape.0 / n,
            ny: shape.1 / n,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Box holding a point in grid coordinates, if any
    pub fn box_of(&self, row: f64, col: f64) -> Option<(usize, usize)> {
        if !(row >= 0.0 && col >= 0.0) || !row.is_finite() || !col.is_finite() {
            return None;
        }
        let i = (row / self.n as f64).floor() as usize;
        let j = (col / self.n as f64).floor() as usize;
        (i < self.nx && j < self.ny).then_some((i, j))
    }

    /// Cell ranges `(rows, cols)` covered by box `(i, j)`
    pub fn bounds(&self, i: usize, j: usize) -> (Range<usize>, Range<usize>) {
        (i * self.n..(i + 1) * self.n, j * self.n..(j + 1) * self.n)
    }

    fn index(&self, k: usize) -> (usize, usize) {
        (k / self.ny, k % self.ny)
    }
}

/// Box aggregates of one member
#[derive(Clone, Debug, PartialEq)]
pub struct MemberBoxes {
    /// Mean object flux, undefined for empty boxes
    pub mean: Array2<Option<f64>>,
    /// Summed object flux (M or P)
    pub sum: Array2<f64>,
    /// Number of objects (N)
    pub count: Array2<f64>,
}

fn aggregate(contributions: &[f64]) -> (Option<f64>, f64, f64) {
    let total: f64 = contributions.iter().sum();
    (
        sample_mean(contributions),
        total,
        contributions.len() as f64,
    )
}

fn collect_boxes(grid: &BoxGrid, per_box: Vec<(Option<f64>, f64, f64)>) -> MemberBoxes {
    let dim = grid.dim();
    let mut mean = Array2::from_elem(dim, None);
    let mut sum = Array2::zeros(dim);
    let mut count = Array2::zeros(dim);
    for (k, (m, s, c)) in per_box.into_iter().enumerate() {
        let idx = grid.index(k);
        mean[idx] = m;
        sum[idx] = s;
        count[idx] = c;
    }
    MemberBoxes { mean, sum, count }
}

/// Aggregate one member's objects onto the box grid
pub fn member_boxes(grid: &BoxGrid, clouds: &MemberClouds, mode: AggregationMode) -> MemberBoxes {
    match mode {
        AggregationMode::Centroid => {
            let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); grid.len()];
            for (&(row, col), &s) in clouds.centroids.iter().zip(&clouds.sums) {
                if let Some((i, j)) = grid.box_of(row, col) {
                    buckets[i * grid.ny + j].push(s);
                }
            }
            let per_box = buckets.iter().map(|b| aggregate(b)).collect();
            collect_boxes(grid, per_box)
        }
        AggregationMode::Footprint => {
            let per_box = (0..grid.len())
                .into_par_iter()
                .map(|k| {
                    let (i, j) = grid.index(k);
                    let (rows, cols) = grid.bounds(i, j);
                    let mut parts: BTreeMap<u32, f64> = BTreeMap::new();
                    for r in rows {
                        for c in cols.clone() {
                            let label = clouds.labels[[r, c]];
                            if label != 0 {
                                *parts.entry(label).or_insert(0.0) += clouds.flux[[r, c]];
                            }
                        }
                    }
                    let contributions: Vec<f64> = parts.into_values().collect();
                    aggregate(&contributions)
                })
                .collect();
            collect_boxes(grid, per_box)
        }
    }
}

/// Ensemble statistics per box across members
#[derive(Clone, Debug, PartialEq)]
pub struct EnsembleBoxStats {
    pub grid: BoxGrid,
    pub members: usize,
    /// Ensemble mean of the box sum, ⟨M⟩
    pub sum_mean: Array2<Option<f64>>,
    /// Unbiased ensemble variance of the box sum, Var(M)
    pub sum_var: Array2<Option<f64>>,
    /// Ensemble mean of the object count, ⟨N⟩
    pub count_mean: Array2<Option<f64>>,
    /// Unbiased ensemble variance of the object count, Var(N)
    pub count_var: Array2<Option<f64>>,
    /// Mean over members with objects of the per-member mean flux, ⟨m⟩
    pub flux_mean: Array2<Option<f64>>,
}

impl EnsembleBoxStats {
    pub fn from_members(grid: BoxGrid, members: &[MemberBoxes]) -> Self {
        let per_box: Vec<[Option<f64>; 5]> = (0..grid.len())
            .into_par_iter()
            .map(|k| {
                let idx = grid.index(k);
                let sums: Vec<f64> = members.iter().map(|m| m.sum[idx]).collect();
                let counts: Vec<f64> = members.iter().map(|m| m.count[idx]).collect();
                [
                    sample_mean(&sums),
                    sample_variance(&sums),
                    sample_mean(&counts),
                    sample_variance(&counts),
                    mean_defined(members.iter().map(|m| m.mean[idx])),
                ]
            })
            .collect();

        let dim = grid.dim();
        let mut fields: [Array2<Option<f64>>; 5] = std::array::from_fn(|_| Array2::from_elem(dim, None));
        for (k, values) in per_box.into_iter().enumerate() {
            let idx = grid.index(k);
            for (field, value) in fields.iter_mut().zip(values) {
                field[idx] = value;
            }
        }
        let [sum_mean, sum_var, count_mean, count_var, flux_mean] = fields;

        Self {
            grid,
            members: members.len(),
            sum_mean,
            sum_var,
            count_mean,
            count_var,
            flux_mean,
        }
    }

    /// Var(N) / ⟨N⟩ per box
    pub fn count_ratio_field(&self) -> Array2<Option<f64>> {
        Array2::from_shape_fn(self.grid.dim(), |idx| {
            ratio(self.count_var[idx], self.count_mean[idx])
        })
    }

    /// Var(M) / (⟨M⟩ ⟨m⟩) per box, the normalized variance times N
    pub fn normalized_variance_field(&self) -> Array2<Option<f64>> {
        Array2::from_shape_fn(self.grid.dim(), |idx| {
            let m_big = self.sum_mean[idx].filter(|v| *v != 0.0);
            let den = match (m_big, self.flux_mean[idx]) {
                (Some(a), Some(b)) => Some(a * b),
                _ => None,
            };
            ratio(self.sum_var[idx], den)
        })
    }

    /// Var(M) / ⟨M⟩² per box
    pub fn relative_variance_field(&self) -> Array2<Option<f64>> {
        Array2::from_shape_fn(self.grid.dim(), |idx| {
            ratio(self.sum_var[idx], self.sum_mean[idx].map(|m| m * m))
        })
    }
}

/// Domain-level variance diagnostics for one scale and time step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleDiagnostics {
    pub scale: usize,
    /// Domain mean of Var(N)/⟨N⟩
    pub count_variance_ratio: Option<f64>,
    /// Half the domain mean of Var(M) ⟨N⟩/⟨M⟩²
    pub normalized_variance: Option<f64>,
    /// Domain mean of Var(M) ⟨N⟩/⟨M⟩² over (1 + Var(N)/⟨N⟩)
    pub adjusted_variance: Option<f64>,
}

impl ScaleDiagnostics {
    pub fn from_stats(stats: &EnsembleBoxStats) -> Self {
        let count_variance_ratio = mean_defined(stats.count_ratio_field().iter().copied());
        let raw = mean_defined(stats.normalized_variance_field().iter().copied());
        Self {
            scale: stats.grid.n,
            count_variance_ratio,
            normalized_variance: raw.map(|v| v / 2.0),
            adjusted_variance: ratio(raw, count_variance_ratio.map(|c| 1.0 + c)),
        }
    }
}

/// Box mean of a field ignoring non-finite cells
pub fn upscale_mean(field: ArrayView2<f64>, grid: &BoxGrid) -> Array2<Option<f64>> {
    Array2::from_shape_fn(grid.dim(), |(i, j)| {
        let (rows, cols) = grid.bounds(i, j);
        mean_defined(
            field
                .slice(ndarray::s![rows, cols])
                .iter()
                .map(|&v| defined(v)),
        )
    })
}

/// One box of one scale at one time, kept for correlation analysis
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxRecord {
    pub variance: Option<f64>,
    pub sum_mean: Option<f64>,
    pub flux_mean: Option<f64>,
    pub count_mean: Option<f64>,
    pub scale: usize,
    pub tauc: Option<f64>,
    pub lead_hours: f64,
}

pub fn box_records(
    stats: &EnsembleBoxStats,
    tauc: Option<&Array2<Option<f64>>>,
    lead_hours: f64,
) -> Vec<BoxRecord> {
    stats
        .sum_var
        .indexed_iter()
        .map(|(idx, &variance)| BoxRecord {
            variance,
            sum_mean: stats.sum_mean[idx],
            flux_mean: stats.flux_mean[idx],
            count_mean: stats.count_mean[idx],
            scale: stats.grid.n,
            tauc: tauc.and_then(|t| t.get(idx).copied().flatten()),
            lead_hours,
        })
        .collect()
}
