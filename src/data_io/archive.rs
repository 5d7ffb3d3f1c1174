use super::reader::ReaderError;
use crate::analysis::undefined::{defined, mean_defined};
use log::debug;
use ndarray::{Array3, ArrayView2, Axis};
use std::collections::BTreeMap;
use std::path::Path;

/// Accumulated precipitation of one forecast source, `[date, time, ens]`
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    pub name: String,
    pub data: Array3<f64>,
}

impl ForecastSeries {
    pub fn dates(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn times(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn members(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// `[time, ens]` slice of one day
    pub fn day(&self, date: usize) -> ArrayView2<f64> {
        self.data.index_axis(Axis(0), date)
    }

    /// First member of one day, used for single-valued sources
    pub fn first_member(&self, date: usize) -> Vec<Option<f64>> {
        self.day(date)
            .outer_iter()
            .map(|row| row.first().copied().and_then(defined))
            .collect()
    }

    /// Ensemble mean over members of one day
    pub fn member_mean(&self, date: usize) -> Vec<Option<f64>> {
        self.day(date)
            .outer_iter()
            .map(|row| mean_defined(row.iter().map(|&v| defined(v))))
            .collect()
    }

    /// Ensemble minimum and maximum of one day
    pub fn member_range(&self, date: usize) -> Vec<Option<(f64, f64)>> {
        self.day(date)
            .outer_iter()
            .map(|row| {
                row.iter()
                    .copied()
                    .filter(|v| v.is_finite())
                    .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                        None => Some((v, v)),
                        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    })
            })
            .collect()
    }
}

/// Pre-processed domain-mean precipitation archive, one group per source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrecipArchive {
    pub groups: BTreeMap<String, ForecastSeries>,
}

impl PrecipArchive {
    pub fn get(&self, name: &str) -> Option<&ForecastSeries> {
        self.groups.get(name)
    }

    pub fn dates(&self) -> usize {
        self.groups.values().map(ForecastSeries::dates).max().unwrap_or(0)
    }

    pub fn times(&self) -> usize {
        self.groups.values().map(ForecastSeries::times).max().unwrap_or(0)
    }
}

pub const PRECIP_VARIABLE: &str = "PREC_ACCUM";

/// Read every group of a precipitation archive holding `PREC_ACCUM`
pub fn read_precip_archive(path: &Path) -> Result<PrecipArchive, ReaderError> {
    if !path.exists() {
        return Err(ReaderError::FileNotFound(path.display().to_string()));
    }
    let file = netcdf::open(path)?;
    let mut archive = PrecipArchive::default();

    for group in file.groups()? {
        let name = group.name();
        let var = group
            .variable(PRECIP_VARIABLE)
            .ok_or_else(|| ReaderError::MissingVariable(format!("{}/{}", name, PRECIP_VARIABLE)))?;
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let values: Vec<f64> = var.get_values::<f64, _>(..)?;
        let unexpected = || ReaderError::UnexpectedShape {
            name: format!("{}/{}", name, PRECIP_VARIABLE),
            shape: shape.clone(),
        };
        if shape.len() != 3 {
            return Err(unexpected());
        }
        let data = Array3::from_shape_vec((shape[0], shape[1], shape[2]), values)
            .map_err(|_| unexpected())?;
        debug!("Archive group {} with shape {:?}", name, shape);
        archive.groups.insert(name.clone(), ForecastSeries { name, data });
    }

    if archive.groups.is_empty() {
        return Err(ReaderError::MissingGroup(format!(
            "no groups in {}",
            path.display()
        )));
    }
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn series() -> ForecastSeries {
        // 1 day, 2 times, 3 members
        let data = Array3::from_shape_vec(
            (1, 2, 3),
            vec![1.0, 2.0, 3.0, f64::NAN, 4.0, 8.0],
        )
        .unwrap();
        ForecastSeries {
            name: "ens".to_string(),
            data,
        }
    }

    #[test]
    fn test_member_statistics() {
        let s = series();
        assert_eq!(s.member_mean(0), vec![Some(2.0), Some(6.0)]);
        assert_eq!(s.member_range(0), vec![Some((1.0, 3.0)), Some((4.0, 8.0))]);
        assert_eq!(s.first_member(0), vec![Some(1.0), None]);
        assert_eq!((s.dates(), s.times(), s.members()), (1, 2, 3));
    }

    #[test]
    fn test_missing_archive() {
        assert!(matches!(
            read_precip_archive(Path::new("/nonexistent/archive.nc")),
            Err(ReaderError::FileNotFound(_))
        ));
    }
}
