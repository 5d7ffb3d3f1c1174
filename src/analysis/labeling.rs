use super::rdf::{pair_correlation, Rdf};
use ndarray::{Array2, ArrayView2};

/// Optional fields that refine detection and weighting
#[derive(Clone, Copy, Debug, Default)]
pub struct AuxFields<'a> {
    /// Cloud liquid water; only consulted when `water` is set
    pub cloud_water: Option<ArrayView2<'a, f64>>,
    pub qc_threshold: f64,
    pub water: bool,
    /// Air density multiplied into the per-object sum
    pub density: Option<ArrayView2<'a, f64>>,
}

/// Labelled objects of one field
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// 0 is background, objects are numbered 1..=N in raster order
    pub labels: Array2<u32>,
    /// Object area (m²)
    pub sizes: Vec<f64>,
    /// Object sum of the (density weighted) field, not area scaled
    pub sums: Vec<f64>,
}

impl Detection {
    pub fn count(&self) -> usize {
        self.sizes.len()
    }
}

/// Detection capability injected into the analysis
pub trait CloudDetector: Sync {
    fn label_objects(&self, field: ArrayView2<f64>, threshold: f64, aux: &AuxFields) -> Detection;

    /// Radial distribution function of the labelled objects
    fn radial_distribution(
        &self,
        labels: ArrayView2<u32>,
        field: ArrayView2<f64>,
        r_max: f64,
        dr: f64,
    ) -> Rdf;
}

/// 4-connected component labelling on a thresholded field
#[derive(Clone, Copy, Debug)]
pub struct ConnectedClouds {
    /// Grid spacing (m)
    pub dx: f64,
}

impl ConnectedClouds {
    pub fn new(dx: f64) -> Self {
        Self { dx }
    }
}

fn is_cloudy(field: &ArrayView2<f64>, aux: &AuxFields, threshold: f64, idx: (usize, usize)) -> bool {
    if !(field[idx] >= threshold) {
        return false;
    }
    match (aux.water, aux.cloud_water) {
        (true, Some(qc)) => qc[idx] > aux.qc_threshold,
        _ => true,
    }
}

impl CloudDetector for ConnectedClouds {
    fn label_objects(&self, field: ArrayView2<f64>, threshold: f64, aux: &AuxFields) -> Detection {
        let (rows, cols) = field.dim();
        let mut labels = Array2::<u32>::zeros((rows, cols));
        let mut sizes = Vec::new();
        let mut sums = Vec::new();
        let cell_area = self.dx * self.dx;
        let mut stack = Vec::new();

        for i in 0..rows {
            for j in 0..cols {
                if labels[[i, j]] != 0 || !is_cloudy(&field, aux, threshold, (i, j)) {
                    continue;
                }
                let label = sizes.len() as u32 + 1;
                let mut cells = 0usize;
                let mut sum = 0.0;
                labels[[i, j]] = label;
                stack.push((i, j));

                while let Some((ci, cj)) = stack.pop() {
                    cells += 1;
                    let weight = aux.density.map_or(1.0, |rho| rho[[ci, cj]]);
                    sum += field[[ci, cj]] * weight;

                    let neighbours = [
                        (ci.wrapping_sub(1), cj),
                        (ci + 1, cj),
                        (ci, cj.wrapping_sub(1)),
                        (ci, cj + 1),
                    ];
                    for (ni, nj) in neighbours {
                        if ni < rows
                            && nj < cols
                            && labels[[ni, nj]] == 0
                            && is_cloudy(&field, aux, threshold, (ni, nj))
                        {
                            labels[[ni, nj]] = label;
                            stack.push((ni, nj));
                        }
                    }
                }

                sizes.push(cells as f64 * cell_area);
                sums.push(sum);
            }
        }

        Detection { labels, sizes, sums }
    }

    fn radial_distribution(
        &self,
        labels: ArrayView2<u32>,
        field: ArrayView2<f64>,
        r_max: f64,
        dr: f64,
    ) -> Rdf {
        let count = labels.iter().copied().max().unwrap_or(0) as usize;
        let centroids = center_of_mass(field, labels, count);
        pair_correlation(&centroids, labels.dim(), r_max, dr, self.dx)
    }
}

/// Field-weighted centre of mass `(row, col)` of labels 1..=count.
///
/// Objects whose weights sum to zero fall back to the geometric centroid.
pub fn center_of_mass(
    field: ArrayView2<f64>,
    labels: ArrayView2<u32>,
    count: usize,
) -> Vec<(f64, f64)> {
    let mut weight = vec![0.0; count];
    let mut wrow = vec![0.0; count];
    let mut wcol = vec![0.0; count];
    let mut cells = vec![0usize; count];
    let mut rsum = vec![0.0; count];
    let mut csum = vec![0.0; count];

    for ((i, j), &label) in labels.indexed_iter() {
        if label == 0 || label as usize > count {
            continue;
        }
        let k = label as usize - 1;
        let w = field[[i, j]];
        weight[k] += w;
        wrow[k] += w * i as f64;
        wcol[k] += w * j as f64;
        cells[k] += 1;
        rsum[k] += i as f64;
        csum[k] += j as f64;
    }

    (0..count)
        .map(|k| {
            if weight[k] != 0.0 && weight[k].is_finite() {
                (wrow[k] / weight[k], wcol[k] / weight[k])
            } else if cells[k] > 0 {
                (rsum[k] / cells[k] as f64, csum[k] / cells[k] as f64)
            } else {
                (f64::NAN, f64::NAN)
            }
        })
        .collect()
}
