//! Cloud detection, coarse-graining and ensemble variance diagnostics

pub mod clouds;
pub mod coarse;
pub mod histogram;
pub mod labeling;
pub mod rdf;
pub mod series;
pub mod undefined;

pub use clouds::{extract_member_clouds, ExtractionSettings, MemberClouds, MemberInputs};
pub use coarse::{
    box_records, member_boxes, upscale_mean, BoxGrid, BoxRecord, EnsembleBoxStats, MemberBoxes,
    ScaleDiagnostics,
};
pub use histogram::{Histogram, PooledCloudStats, ScatterSeries};
pub use labeling::{AuxFields, CloudDetector, ConnectedClouds, Detection};
pub use rdf::{cluster_radii, ensemble_mean_rdf, ClusterRadii, Rdf};
pub use series::{DiagnosticSeries, StepSummary};
