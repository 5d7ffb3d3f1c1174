use super::coarse::ScaleDiagnostics;
use super::histogram::PooledCloudStats;
use super::rdf::ClusterRadii;

/// Per-time-step scalars that do not depend on the scale
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepSummary {
    pub lead_hours: f64,
    pub mean_size: Option<f64>,
    pub mean_sum: Option<f64>,
    pub total: f64,
    pub radii: ClusterRadii,
    /// Domain mean of the ensemble-mean convective timescale (h)
    pub mean_tauc: Option<f64>,
}

impl StepSummary {
    pub fn new(
        lead_hours: f64,
        pooled: &PooledCloudStats,
        radii: ClusterRadii,
        mean_tauc: Option<f64>,
    ) -> Self {
        Self {
            lead_hours,
            mean_size: pooled.mean_size,
            mean_sum: pooled.mean_sum,
            total: pooled.total,
            radii,
            mean_tauc,
        }
    }
}

/// Diagnostic time series of one analysis level, one entry per time step
/// and per scale
#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosticSeries {
    scales: Vec<usize>,
    steps: Vec<StepSummary>,
    /// Indexed `[scale][time]`
    diagnostics: Vec<Vec<ScaleDiagnostics>>,
}

impl DiagnosticSeries {
    pub fn new(scales: &[usize]) -> Self {
        Self {
            scales: scales.to_vec(),
            steps: Vec::new(),
            diagnostics: vec![Vec::new(); scales.len()],
        }
    }

    /// Append one time step; `per_scale` must follow the scale order
    pub fn push_step(
        &mut self,
        summary: StepSummary,
        per_scale: Vec<ScaleDiagnostics>,
    ) -> Result<(), String> {
        if per_scale.len() != self.scales.len() {
            return Err(format!(
                "Expected diagnostics for {} scales, got {}",
                self.scales.len(),
                per_scale.len()
            ));
        }
        for (expected, diag) in self.scales.iter().zip(&per_scale) {
            if *expected != diag.scale {
                return Err(format!(
                    "Scale order mismatch: expected {}, got {}",
                    expected, diag.scale
                ));
            }
        }
        self.steps.push(summary);
        for (series, diag) in self.diagnostics.iter_mut().zip(per_scale) {
            series.push(diag);
        }
        Ok(())
    }

    pub fn scales(&self) -> &[usize] {
        &self.scales
    }

    pub fn steps(&self) -> &[StepSummary] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn lead_hours(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.lead_hours).collect()
    }

    /// Diagnostics of one scale over time
    pub fn for_scale(&self, scale: usize) -> Option<&[ScaleDiagnostics]> {
        let k = self.scales.iter().position(|&n| n == scale)?;
        Some(&self.diagnostics[k])
    }

    pub fn count_variance_ratio(&self, scale: usize) -> Option<Vec<Option<f64>>> {
        self.for_scale(scale)
            .map(|d| d.iter().map(|x| x.count_variance_ratio).collect())
    }

    pub fn normalized_variance(&self, scale: usize) -> Option<Vec<Option<f64>>> {
        self.for_scale(scale)
            .map(|d| d.iter().map(|x| x.normalized_variance).collect())
    }

    pub fn adjusted_variance(&self, scale: usize) -> Option<Vec<Option<f64>>> {
        self.for_scale(scale)
            .map(|d| d.iter().map(|x| x.adjusted_variance).collect())
    }
}
