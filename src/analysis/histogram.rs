use super::clouds::MemberClouds;
use super::coarse::EnsembleBoxStats;
use super::undefined::{defined, log_mean, mean_defined, ratio, sample_mean};

/// Fixed-range histogram.
///
/// Bins are half open except the last, which includes the upper edge;
/// values outside the range are dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub counts: Vec<usize>,
    pub edges: Vec<f64>,
}

impl Histogram {
    pub fn new(values: &[f64], bins: usize, range: (f64, f64)) -> Self {
        let (lo, hi) = range;
        let bins = bins.max(1);
        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|k| lo + k as f64 * width).collect();
        let mut counts = vec![0usize; bins];
        if width > 0.0 {
            for &v in values {
                if !(v >= lo && v <= hi) {
                    continue;
                }
                let k = (((v - lo) / width).floor() as usize).min(bins - 1);
                counts[k] += 1;
            }
        }
        Self { counts, edges }
    }

    pub fn bin_width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Object statistics pooled over all members of one time step
#[derive(Clone, Debug, PartialEq)]
pub struct PooledCloudStats {
    pub size_hist: Histogram,
    pub sum_hist: Histogram,
    pub mean_size: Option<f64>,
    pub mean_sum: Option<f64>,
    /// Sum of all object fluxes over all members
    pub total: f64,
    pub objects: usize,
}

impl PooledCloudStats {
    pub fn from_members(members: &[MemberClouds], bins: usize, size_max: f64, sum_max: f64) -> Self {
        let sizes: Vec<f64> = members.iter().flat_map(|m| m.sizes.iter().copied()).collect();
        let sums: Vec<f64> = members.iter().flat_map(|m| m.sums.iter().copied()).collect();
        Self {
            size_hist: Histogram::new(&sizes, bins, (0.0, size_max)),
            sum_hist: Histogram::new(&sums, bins, (0.0, sum_max)),
            mean_size: sample_mean(&sizes),
            mean_sum: sample_mean(&sums),
            total: sums.iter().sum(),
            objects: sums.len(),
        }
    }
}

/// Spread against object count for one scale, per box
#[derive(Clone, Debug, PartialEq)]
pub struct ScatterSeries {
    pub scale: usize,
    /// sqrt(1/⟨N⟩)
    pub x: Vec<Option<f64>>,
    /// sqrt(Var(M)/⟨M⟩²)
    pub y: Vec<Option<f64>>,
    /// Var(M)/⟨M⟩² as a percentage of the independent-object value 2/⟨N⟩
    pub percent: Vec<Option<f64>>,
    pub x_mean: Option<f64>,
    pub y_mean: Option<f64>,
    pub percent_mean: Option<f64>,
}

impl ScatterSeries {
    pub fn from_stats(stats: &EnsembleBoxStats) -> Self {
        let rel = stats.relative_variance_field();
        let mut x = Vec::with_capacity(rel.len());
        let mut y = Vec::with_capacity(rel.len());
        let mut percent = Vec::with_capacity(rel.len());

        for (idx, &r) in rel.indexed_iter() {
            let n = stats.count_mean[idx].filter(|v| *v != 0.0);
            x.push(ratio(Some(1.0), n).map(f64::sqrt));
            y.push(r.map(f64::sqrt));
            percent.push(ratio(r, ratio(Some(2.0), n)).and_then(|p| defined(p * 100.0)));
        }

        // Percent averages every box with a finite x·y; the log means also
        // drop boxes where x·y is zero
        let finite: Vec<bool> = x
            .iter()
            .zip(&y)
            .map(|(a, b)| matches!((a, b), (Some(a), Some(b)) if (a * b).is_finite()))
            .collect();
        let positive: Vec<bool> = x
            .iter()
            .zip(&y)
            .zip(&finite)
            .map(|((a, b), &ok)| ok && a.unwrap_or(0.0) * b.unwrap_or(0.0) != 0.0)
            .collect();
        let pick = |values: &[Option<f64>], mask: &[bool]| -> Vec<Option<f64>> {
            values
                .iter()
                .zip(mask)
                .map(|(v, &ok)| if ok { *v } else { None })
                .collect()
        };

        Self {
            scale: stats.grid.n,
            x_mean: log_mean(pick(&x, &positive)),
            y_mean: log_mean(pick(&y, &positive)),
            percent_mean: mean_defined(pick(&percent, &finite)),
            x,
            y,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::coarse::{BoxGrid, MemberBoxes};
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_histogram_edges_and_counts() {
        let h = Histogram::new(&[0.0, 0.5, 1.0, 9.99, 10.0, 10.5, -1.0], 10, (0.0, 10.0));
        assert_eq!(h.edges.len(), 11);
        assert_eq!(h.counts[0], 2);
        assert_eq!(h.counts[1], 1);
        assert_eq!(h.counts[9], 2);
        assert_eq!(h.total(), 5);
        assert_relative_eq!(h.bin_width(), 1.0);
    }

    #[test]
    fn test_histogram_empty() {
        let h = Histogram::new(&[], 15, (0.0, 2e8));
        assert_eq!(h.counts, vec![0; 15]);
    }

    #[test]
    fn test_pooled_stats() {
        let mut a = MemberClouds::empty((4, 4));
        a.sizes = vec![1.0, 3.0];
        a.sums = vec![2.0, 4.0];
        let mut b = MemberClouds::empty((4, 4));
        b.sizes = vec![2.0];
        b.sums = vec![6.0];
        let empty = MemberClouds::empty((4, 4));

        let pooled = PooledCloudStats::from_members(&[a, b, empty], 15, 10.0, 10.0);
        assert_eq!(pooled.objects, 3);
        assert_eq!(pooled.total, 12.0);
        assert_eq!(pooled.mean_size, Some(2.0));
        assert_eq!(pooled.mean_sum, Some(4.0));
        assert_eq!(pooled.size_hist.total(), 3);

        let none = PooledCloudStats::from_members(&[MemberClouds::empty((2, 2))], 15, 1.0, 1.0);
        assert_eq!(none.mean_size, None);
        assert_eq!(none.total, 0.0);
    }

    #[test]
    fn test_scatter_series() {
        let grid = BoxGrid::new((2, 4), 2);
        let members = vec![
            MemberBoxes {
                mean: array![[Some(1.0), None]],
                sum: array![[1.0, 0.0]],
                count: array![[1.0, 0.0]],
            },
            MemberBoxes {
                mean: array![[Some(1.0), None]],
                sum: array![[3.0, 0.0]],
                count: array![[3.0, 0.0]],
            },
        ];
        let stats = EnsembleBoxStats::from_members(grid, &members);
        let scatter = ScatterSeries::from_stats(&stats);
        // N = 2, M = 2, Var(M) = 2
        assert_relative_eq!(scatter.x[0].unwrap(), (0.5f64).sqrt());
        assert_relative_eq!(scatter.y[0].unwrap(), (0.5f64).sqrt());
        assert_relative_eq!(scatter.percent[0].unwrap(), 50.0);
        assert_eq!(scatter.x[1], None);
        assert_relative_eq!(scatter.x_mean.unwrap(), (0.5f64).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(scatter.percent_mean.unwrap(), 50.0);
    }

    #[test]
    fn test_scatter_keeps_zero_variance_boxes_in_percent_mean() {
        let grid = BoxGrid::new((2, 4), 2);
        // Box 0: M = 1, 3 so Var(M) = 2. Box 1: M = 2, 2 so Var(M) = 0
        let members = vec![
            MemberBoxes {
                mean: array![[Some(1.0), Some(1.0)]],
                sum: array![[1.0, 2.0]],
                count: array![[1.0, 2.0]],
            },
            MemberBoxes {
                mean: array![[Some(1.0), Some(1.0)]],
                sum: array![[3.0, 2.0]],
                count: array![[3.0, 2.0]],
            },
        ];
        let stats = EnsembleBoxStats::from_members(grid, &members);
        let scatter = ScatterSeries::from_stats(&stats);

        assert_relative_eq!(scatter.percent[0].unwrap(), 50.0);
        assert_eq!(scatter.percent[1], Some(0.0));
        assert_eq!(scatter.y[1], Some(0.0));
        assert_relative_eq!(scatter.percent_mean.unwrap(), 25.0);
        // The zero-variance box stays out of the log-space means
        assert_relative_eq!(scatter.y_mean.unwrap(), (0.5f64).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(scatter.x_mean.unwrap(), (0.5f64).sqrt(), epsilon = 1e-12);
    }
}
