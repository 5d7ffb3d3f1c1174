use crate::analysis::coarse::BoxRecord;
use crate::analysis::series::{DiagnosticSeries, StepSummary};
use chrono::Utc;
use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Nothing to write: {0}")]
    EmptyData(String),
}

/// Global attributes describing one analysis level
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub init_date: String,
    pub mode: String,
    pub aggregation: String,
    pub water: bool,
    /// Analysis height above sea level (m), `None` for the surface
    pub height: Option<f64>,
    pub members: usize,
}

fn nan_if_undefined(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

/// Writes diagnostic series and box records to NetCDF
pub struct DiagnosticWriter {
    pub output_dir: PathBuf,
}

impl DiagnosticWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Write one level to `<output_dir>/<file_name>`, creating directories
    /// as needed. Undefined values are stored as NaN.
    pub fn write(
        &self,
        file_name: &str,
        series: &DiagnosticSeries,
        records: &[BoxRecord],
        meta: &RunMetadata,
    ) -> Result<PathBuf, WriteError> {
        if series.is_empty() {
            return Err(WriteError::EmptyData("diagnostic series has no time steps".to_string()));
        }
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file_name);

        let mut file = netcdf::create(&path)?;
        file.add_dimension("time", series.len())?;
        file.add_dimension("scale", series.scales().len())?;

        file.add_attribute("title", "Ensemble convective variance diagnostics")?;
        file.add_attribute("init_date", meta.init_date.as_str())?;
        file.add_attribute("mode", meta.mode.as_str())?;
        file.add_attribute("aggregation", meta.aggregation.as_str())?;
        file.add_attribute("water", if meta.water { 1i32 } else { 0i32 })?;
        file.add_attribute("members", meta.members as i32)?;
        file.add_attribute("height", nan_if_undefined(meta.height))?;
        let creation_time = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        file.add_attribute("history", format!("Created on {}", creation_time))?;

        let hours = series.lead_hours();
        put_1d(&mut file, "time", "time", "h", "forecast lead time", &hours)?;
        let scales: Vec<f64> = series.scales().iter().map(|&n| n as f64).collect();
        put_1d(&mut file, "scale", "scale", "1", "coarse box size in grid cells", &scales)?;

        let steps = series.steps();
        let step_column = |f: fn(&StepSummary) -> Option<f64>| -> Vec<f64> {
            steps.iter().map(|s| nan_if_undefined(f(s))).collect()
        };
        let step_vars = [
            ("mean_size", "m2", "mean cloud size", step_column(|s| s.mean_size)),
            ("mean_sum", "", "mean cloud flux", step_column(|s| s.mean_sum)),
            ("total", "", "total flux over all members", step_column(|s| Some(s.total))),
            ("r_cluster", "km", "clustering radius from g(r)", step_column(|s| s.radii.from_rdf)),
            (
                "r_cdf_cluster",
                "km",
                "clustering radius from cumulative g(r)",
                step_column(|s| s.radii.from_cdf),
            ),
            ("mean_tauc", "h", "domain mean convective timescale", step_column(|s| s.mean_tauc)),
        ];
        for (name, units, long_name, values) in &step_vars {
            put_1d(&mut file, name, "time", units, long_name, values)?;
        }

        // [time, scale] tables
        let ntime = series.len();
        let nscale = series.scales().len();
        let tables = [
            ("count_variance_ratio", "variance of cloud number over its mean"),
            ("normalized_variance", "normalized variance of the box flux"),
            ("adjusted_variance", "normalized variance adjusted for cloud number variance"),
        ];
        for (name, long_name) in tables {
            let mut data = vec![f64::NAN; ntime * nscale];
            for (k, &scale) in series.scales().iter().enumerate() {
                let column = match name {
                    "count_variance_ratio" => series.count_variance_ratio(scale),
                    "normalized_variance" => series.normalized_variance(scale),
                    _ => series.adjusted_variance(scale),
                }
                .unwrap_or_default();
                for (t, v) in column.into_iter().enumerate() {
                    data[t * nscale + k] = nan_if_undefined(v);
                }
            }
            let mut var = file.add_variable::<f64>(name, &["time", "scale"])?;
            var.put_attribute("units", "1")?;
            var.put_attribute("long_name", long_name)?;
            var.put_values(&data, (.., ..))?;
        }

        if !records.is_empty() {
            file.add_dimension("record", records.len())?;
            let record_column = |f: fn(&BoxRecord) -> Option<f64>| -> Vec<f64> {
                records.iter().map(|r| nan_if_undefined(f(r))).collect()
            };
            let record_vars = [
                ("rec_variance", "ensemble variance of the box flux", record_column(|r| r.variance)),
                ("rec_M", "ensemble mean of the box flux", record_column(|r| r.sum_mean)),
                ("rec_m", "ensemble mean of the mean cloud flux", record_column(|r| r.flux_mean)),
                ("rec_N", "ensemble mean cloud number", record_column(|r| r.count_mean)),
                ("rec_scale", "coarse box size in grid cells", record_column(|r| Some(r.scale as f64))),
                ("rec_tauc", "box mean convective timescale", record_column(|r| r.tauc)),
                ("rec_time", "forecast lead time", record_column(|r| Some(r.lead_hours))),
            ];
            for (name, long_name, values) in &record_vars {
                put_1d(&mut file, name, "record", "", long_name, values)?;
            }
        }

        info!("Wrote diagnostics to {}", path.display());
        Ok(path)
    }
}

fn put_1d(
    file: &mut netcdf::FileMut,
    name: &str,
    dim: &str,
    units: &str,
    long_name: &str,
    values: &[f64],
) -> Result<(), WriteError> {
    let mut var = file.add_variable::<f64>(name, &[dim])?;
    if !units.is_empty() {
        var.put_attribute("units", units)?;
    }
    var.put_attribute("long_name", long_name)?;
    var.put_values(values, ..)?;
    Ok(())
}
