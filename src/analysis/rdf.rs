use super::undefined::strict_mean;
use std::f64::consts::PI;

/// Value of g(r) below which objects are treated as decorrelated
pub const RDF_THRESHOLD: f64 = 1.0;
/// Cumulative fraction defining the CDF clustering radius
pub const CDF_THRESHOLD: f64 = 0.5;

/// Radial distribution function g(r)
#[derive(Clone, Debug, PartialEq)]
pub struct Rdf {
    /// Normalised pair density per radial bin, 1.0 = no clustering
    pub g: Vec<Option<f64>>,
    /// Bin centres (m)
    pub r: Vec<f64>,
}

impl Rdf {
    pub fn undefined(r: Vec<f64>) -> Self {
        Self {
            g: vec![None; r.len()],
            r,
        }
    }

    pub fn is_defined(&self) -> bool {
        !self.g.is_empty() && self.g.iter().all(Option::is_some)
    }
}

/// Bin centres in metres for `r_max` and `dr` given in grid cells
pub fn radial_bins(r_max: f64, dr: f64, dx: f64) -> Vec<f64> {
    let nbins = (r_max / dr).floor() as usize;
    (0..nbins).map(|k| (k as f64 + 0.5) * dr * dx).collect()
}

/// Pair correlation of object centroids on a `shape` domain.
///
/// Pair separations (in grid cells) are binned into shells of width `dr`
/// up to `r_max` and normalised by the expected count for a uniform
/// distribution with the same object density.
pub fn pair_correlation(
    centroids: &[(f64, f64)],
    shape: (usize, usize),
    r_max: f64,
    dr: f64,
    dx: f64,
) -> Rdf {
    let r = radial_bins(r_max, dr, dx);
    let points: Vec<(f64, f64)> = centroids
        .iter()
        .copied()
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .collect();
    let n = points.len();
    let area = (shape.0 * shape.1) as f64;
    if n < 2 || area == 0.0 || r.is_empty() {
        return Rdf::undefined(r);
    }

    let nbins = r.len();
    let mut counts = vec![0usize; nbins];
    for (a, p) in points.iter().enumerate() {
        for q in &points[a + 1..] {
            let d = ((p.0 - q.0).powi(2) + (p.1 - q.1).powi(2)).sqrt();
            let k = (d / dr).floor() as usize;
            if k < nbins {
                counts[k] += 1;
            }
        }
    }

    let density = n as f64 / area;
    let g = counts
        .iter()
        .enumerate()
        .map(|(k, &c)| {
            let inner = k as f64 * dr;
            let outer = inner + dr;
            let shell = PI * (outer * outer - inner * inner);
            // Each pair seen once, so 2c neighbours over n reference objects
            Some(2.0 * c as f64 / (n as f64 * density * shell))
        })
        .collect();

    Rdf { g, r }
}

/// Bin-wise mean over members; a bin is undefined if any member's is
pub fn ensemble_mean_rdf(members: &[Rdf]) -> Option<Rdf> {
    let first = members.first()?;
    let g = (0..first.g.len())
        .map(|k| {
            let column: Vec<Option<f64>> = members
                .iter()
                .map(|m| m.g.get(k).copied().flatten())
                .collect();
            strict_mean(&column)
        })
        .collect();
    Some(Rdf {
        g,
        r: first.r.clone(),
    })
}

/// Normalised cumulative sum `cumsum(g) / (len - 1)`
pub fn cumulative(g: &[Option<f64>]) -> Vec<Option<f64>> {
    let denom = g.len().saturating_sub(1).max(1) as f64;
    let mut acc = Some(0.0);
    g.iter()
        .map(|v| {
            acc = match (acc, v) {
                (Some(a), Some(x)) => Some(a + x),
                _ => None,
            };
            acc.map(|a| a / denom)
        })
        .collect()
}

/// Clustering radii (km) derived from an ensemble-mean RDF
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClusterRadii {
    /// First radius past the initial peak where g drops below 1
    pub from_rdf: Option<f64>,
    /// First radius where the cumulative distribution exceeds 0.5
    pub from_cdf: Option<f64>,
}

/// Index where g first falls below the threshold after the initial peak.
///
/// If g already starts below the threshold at r = 0, the leading run is
/// skipped and the first index after its end (the next below-threshold
/// index past a gap) is used.
pub fn rdf_drop_index(g: &[f64], threshold: f64) -> Option<usize> {
    let below: Vec<usize> = g
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < threshold)
        .map(|(i, _)| i)
        .collect();
    let first = *below.first()?;
    if first != 0 {
        return Some(first);
    }
    below
        .windows(2)
        .position(|w| w[1] - w[0] > 1)
        .map(|p| below[p + 1])
}

pub fn cluster_radii(rdf: &Rdf) -> ClusterRadii {
    if !rdf.is_defined() {
        return ClusterRadii::default();
    }
    let g: Vec<f64> = rdf.g.iter().flatten().copied().collect();
    let from_rdf = rdf_drop_index(&g, RDF_THRESHOLD).map(|i| rdf.r[i] / 1000.0);
    let from_cdf = cumulative(&rdf.g)
        .iter()
        .position(|c| c.is_some_and(|v| v > CDF_THRESHOLD))
        .map(|i| rdf.r[i] / 1000.0);
    ClusterRadii { from_rdf, from_cdf }
}
