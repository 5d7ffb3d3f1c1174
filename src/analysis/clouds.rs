use super::labeling::{center_of_mass, AuxFields, CloudDetector};
use crate::config::{AnalysisMode, Config};
use ndarray::{Array2, ArrayView2, Zip};

/// Fields of one member at one time step, cut to the analysis window
#[derive(Clone, Copy, Debug)]
pub struct MemberInputs<'a> {
    pub field: ArrayView2<'a, f64>,
    pub cloud_water: Option<ArrayView2<'a, f64>>,
    pub density: Option<ArrayView2<'a, f64>>,
}

impl<'a> MemberInputs<'a> {
    pub fn field_only(field: ArrayView2<'a, f64>) -> Self {
        Self {
            field,
            cloud_water: None,
            density: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExtractionSettings {
    pub mode: AnalysisMode,
    pub threshold: f64,
    pub water: bool,
    pub qc_threshold: f64,
    /// Grid spacing (m)
    pub dx: f64,
}

impl ExtractionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.mode,
            threshold: config.settings().threshold,
            water: config.water,
            qc_threshold: config.qc_threshold,
            dx: config.dx,
        }
    }

    /// Area factor applied to per-object sums
    fn area_scale(&self) -> f64 {
        match self.mode {
            AnalysisMode::MassFlux => self.dx * self.dx,
            AnalysisMode::Precipitation => 1.0,
        }
    }
}

/// Cloud objects of one member at one time step
#[derive(Clone, Debug, PartialEq)]
pub struct MemberClouds {
    pub labels: Array2<u32>,
    /// Object areas (m²)
    pub sizes: Vec<f64>,
    /// Object aggregate flux (kg/s for mass flux, mm/h for precipitation)
    pub sums: Vec<f64>,
    /// Field-weighted centroids `(row, col)` in window grid coordinates
    pub centroids: Vec<(f64, f64)>,
    /// Per-cell contribution to the object sums, zero outside objects
    pub flux: Array2<f64>,
}

impl MemberClouds {
    pub fn count(&self) -> usize {
        self.sums.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.labels.dim()
    }

    /// Member with no objects on a `shape` window
    pub fn empty(shape: (usize, usize)) -> Self {
        Self {
            labels: Array2::zeros(shape),
            sizes: Vec::new(),
            sums: Vec::new(),
            centroids: Vec::new(),
            flux: Array2::zeros(shape),
        }
    }
}

/// Detect cloud objects of one member and compute their statistics
pub fn extract_member_clouds<D>(
    detector: &D,
    inputs: &MemberInputs,
    settings: &ExtractionSettings,
) -> MemberClouds
where
    D: CloudDetector + ?Sized,
{
    let aux = AuxFields {
        cloud_water: inputs.cloud_water,
        qc_threshold: settings.qc_threshold,
        water: settings.water,
        density: inputs.density,
    };
    let detection = detector.label_objects(inputs.field, settings.threshold, &aux);
    let scale = settings.area_scale();

    let centroids = center_of_mass(inputs.field, detection.labels.view(), detection.count());
    let sums = detection.sums.iter().map(|s| s * scale).collect();

    let mut flux = Array2::<f64>::zeros(inputs.field.dim());
    Zip::indexed(&mut flux)
        .and(&detection.labels)
        .for_each(|idx, f, &label| {
            if label != 0 {
                let weight = inputs.density.map_or(1.0, |rho| rho[idx]);
                *f = inputs.field[idx] * weight * scale;
            }
        });

    MemberClouds {
        labels: detection.labels,
        sizes: detection.sizes,
        sums,
        centroids,
        flux,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::labeling::ConnectedClouds;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn settings(mode: AnalysisMode) -> ExtractionSettings {
        ExtractionSettings {
            mode,
            threshold: 1.0,
            water: false,
            qc_threshold: 0.0,
            dx: 10.0,
        }
    }

    #[test]
    fn test_mass_flux_scaling() {
        let field = array![[2.0, 2.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 4.0]];
        let rho = Array2::from_elem((3, 3), 0.5);
        let inputs = MemberInputs {
            field: field.view(),
            cloud_water: None,
            density: Some(rho.view()),
        };
        let clouds = extract_member_clouds(
            &ConnectedClouds::new(10.0),
            &inputs,
            &settings(AnalysisMode::MassFlux),
        );
        assert_eq!(clouds.count(), 2);
        assert_relative_eq!(clouds.sums[0], 2.0 * 100.0);
        assert_relative_eq!(clouds.sums[1], 2.0 * 100.0);
        assert_eq!(clouds.centroids, vec![(0.0, 0.5), (2.0, 2.0)]);
        assert_relative_eq!(clouds.flux.sum(), clouds.sums.iter().sum::<f64>());
    }

    #[test]
    fn test_precipitation_is_not_area_scaled() {
        let field = array![[0.5, 1.5]];
        let clouds = extract_member_clouds(
            &ConnectedClouds::new(10.0),
            &MemberInputs::field_only(field.view()),
            &settings(AnalysisMode::Precipitation),
        );
        assert_eq!(clouds.sums, vec![1.5]);
        assert_eq!(clouds.sizes, vec![100.0]);
    }

    #[test]
    fn test_zero_objects_have_empty_shapes() {
        let field = Array2::<f64>::zeros((8, 8));
        let clouds = extract_member_clouds(
            &ConnectedClouds::new(10.0),
            &MemberInputs::field_only(field.view()),
            &settings(AnalysisMode::Precipitation),
        );
        assert_eq!(clouds.count(), 0);
        assert!(clouds.centroids.is_empty());
        assert!(clouds.sizes.is_empty());
        assert_eq!(clouds.shape(), (8, 8));
        assert_eq!(clouds, MemberClouds::empty((8, 8)));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let field = array![[1.2, 0.0, 3.0], [1.1, 0.0, 3.0], [0.0, 5.0, 0.0]];
        let detector = ConnectedClouds::new(2800.0);
        let s = settings(AnalysisMode::Precipitation);
        let first = extract_member_clouds(&detector, &MemberInputs::field_only(field.view()), &s);
        let second = extract_member_clouds(&detector, &MemberInputs::field_only(field.view()), &s);
        assert_eq!(first, second);
    }
}
