use super::{EnsembleSource, Field, FieldRequest};
use crate::time_utils::ddhhmmss;
use chrono::Duration;
use log::debug;
use ndarray::{Array2, ArrayD, Axis, Ix2, Ix3, IxDyn};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Group not found: {0}")]
    MissingGroup(String),

    #[error("Unexpected shape {shape:?} for variable {name}")]
    UnexpectedShape { name: String, shape: Vec<usize> },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Level {level} out of range for {name} with {levels} levels")]
    LevelOutOfRange {
        name: String,
        level: usize,
        levels: usize,
    },

    #[error("Domain {shape:?} too small for a {window}x{window} analysis window")]
    DomainTooSmall { shape: (usize, usize), window: usize },
}

/// File name of a model output step, e.g. `lfff00080000.nc_30m`
pub fn get_filename(lead: Duration, suffix: &str) -> String {
    format!("lfff{}{}", ddhhmmss(lead), suffix)
}

/// Ensemble stored as one directory per member:
/// `<root>/<member>/OUTPUT/lfff<DDHHMMSS><suffix>` with members numbered from 1
pub struct NetCDFEnsemble {
    pub root: PathBuf,
    pub members: usize,
    /// File holding the `HHL` level heights
    pub constants_file: PathBuf,
}

impl NetCDFEnsemble {
    pub fn new(root: impl AsRef<Path>, members: usize) -> Self {
        let root = root.as_ref().to_path_buf();
        let constants_file = root.join("1").join("OUTPUT").join("lfff00000000c.nc_30m");
        Self {
            root,
            members,
            constants_file,
        }
    }

    pub fn member_file(&self, member: usize, lead: Duration, suffix: &str) -> PathBuf {
        self.root
            .join((member + 1).to_string())
            .join("OUTPUT")
            .join(get_filename(lead, suffix))
    }
}

impl EnsembleSource for NetCDFEnsemble {
    fn member_count(&self) -> usize {
        self.members
    }

    fn load_field(
        &self,
        member: usize,
        lead: Duration,
        request: &FieldRequest,
    ) -> Result<Field, ReaderError> {
        let path = self.member_file(member, lead, &request.suffix);
        debug!("Reading {} from {}", request.name, path.display());
        let (data, unit) = read_variable(&path, &request.name)?;
        let data = reduce_to_2d(data, &request.name, request.level)?;
        Ok(Field {
            name: request.name.clone(),
            data,
            unit,
            level: request.level,
        })
    }

    fn level_heights(&self) -> Result<Vec<f64>, ReaderError> {
        let (hhl, _) = read_variable(&self.constants_file, "HHL")?;
        let shape = hhl.shape().to_vec();
        let hhl = hhl
            .into_dimensionality::<Ix3>()
            .map_err(|_| ReaderError::UnexpectedShape {
                name: "HHL".to_string(),
                shape: shape.clone(),
            })?;
        let (_, ny, nx) = hhl.dim();
        if ny == 0 || nx == 0 {
            return Err(ReaderError::UnexpectedShape {
                name: "HHL".to_string(),
                shape,
            });
        }
        // Column at the last grid point
        Ok(hhl.slice(ndarray::s![.., ny - 1, nx - 1]).to_vec())
    }
}

fn open_netcdf_file(path: &Path) -> Result<netcdf::File, ReaderError> {
    if !path.exists() {
        return Err(ReaderError::FileNotFound(path.display().to_string()));
    }
    netcdf::open(path).map_err(ReaderError::Netcdf)
}

fn fill_value(var: &netcdf::Variable) -> Option<f64> {
    match var.attribute("_FillValue")?.value().ok()? {
        netcdf::AttributeValue::Double(v) => Some(v),
        netcdf::AttributeValue::Float(v) => Some(v as f64),
        _ => None,
    }
}

fn units(var: &netcdf::Variable) -> String {
    match var.attribute("units").and_then(|a| a.value().ok()) {
        Some(netcdf::AttributeValue::Str(s)) => s,
        _ => String::new(),
    }
}

/// Read a whole variable as f64 with fill values replaced by NaN and a
/// leading length-1 time axis removed from 4D data
pub fn read_variable(path: &Path, name: &str) -> Result<(ArrayD<f64>, String), ReaderError> {
    let file = open_netcdf_file(path)?;
    let var = file
        .variable(name)
        .ok_or_else(|| ReaderError::MissingVariable(name.to_string()))?;

    let mut raw: Vec<f64> = var.get_values::<f64, _>(..)?;
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    if let Some(fill) = fill_value(&var) {
        raw.iter_mut().filter(|v| **v == fill).for_each(|v| *v = f64::NAN);
    }
    let unit = units(&var);

    let mut array = ArrayD::from_shape_vec(IxDyn(&shape), raw).map_err(|_| {
        ReaderError::UnexpectedShape {
            name: name.to_string(),
            shape: shape.clone(),
        }
    })?;
    if array.ndim() == 4 && array.shape()[0] == 1 {
        array = array.index_axis_move(Axis(0), 0);
    }
    Ok((array, unit))
}

/// Reduce `[y, x]`, `[1, y, x]` or `[level, y, x]` data to a 2D field
pub fn reduce_to_2d(
    array: ArrayD<f64>,
    name: &str,
    level: Option<usize>,
) -> Result<Array2<f64>, ReaderError> {
    let shape = array.shape().to_vec();
    let unexpected = || ReaderError::UnexpectedShape {
        name: name.to_string(),
        shape: shape.clone(),
    };
    let reduced = match array.ndim() {
        2 => array,
        3 => {
            let levels = shape[0];
            let k = match level {
                Some(k) => k,
                None if levels == 1 => 0,
                None => return Err(unexpected()),
            };
            if k >= levels {
                return Err(ReaderError::LevelOutOfRange {
                    name: name.to_string(),
                    level: k,
                    levels,
                });
            }
            array.index_axis_move(Axis(0), k)
        }
        _ => return Err(unexpected()),
    };
    reduced.into_dimensionality::<Ix2>().map_err(|_| unexpected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn test_get_filename() {
        assert_eq!(get_filename(Duration::hours(8), ".nc_30m"), "lfff00080000.nc_30m");
        assert_eq!(
            get_filename(Duration::hours(25) + Duration::minutes(30), ".nc_30m_surf"),
            "lfff01013000.nc_30m_surf"
        );
    }

    #[test]
    fn test_member_file_layout() {
        let ens = NetCDFEnsemble::new("/data/ens", 20);
        assert_eq!(
            ens.member_file(0, Duration::hours(12), ".nc_30m_buoy"),
            PathBuf::from("/data/ens/1/OUTPUT/lfff00120000.nc_30m_buoy")
        );
        assert_eq!(
            ens.constants_file,
            PathBuf::from("/data/ens/1/OUTPUT/lfff00000000c.nc_30m")
        );
    }

    #[test]
    fn test_reduce_to_2d() {
        let surf = Array::from_shape_vec(IxDyn(&[1, 2, 3]), (0..6).map(f64::from).collect()).unwrap();
        assert_eq!(reduce_to_2d(surf, "TOT_PR", None).unwrap().dim(), (2, 3));

        let levels = Array::from_shape_vec(IxDyn(&[3, 2, 2]), (0..12).map(f64::from).collect()).unwrap();
        let lev1 = reduce_to_2d(levels.clone(), "W", Some(1)).unwrap();
        assert_eq!(lev1[[0, 0]], 4.0);
        assert!(matches!(
            reduce_to_2d(levels.clone(), "W", Some(3)),
            Err(ReaderError::LevelOutOfRange { levels: 3, .. })
        ));
        assert!(matches!(
            reduce_to_2d(levels, "W", None),
            Err(ReaderError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let ens = NetCDFEnsemble::new("/nonexistent/ensemble", 2);
        let request = FieldRequest::new("W", ".nc_30m", Some(0));
        assert!(matches!(
            ens.load_field(0, Duration::hours(8), &request),
            Err(ReaderError::FileNotFound(_))
        ));
    }
}
