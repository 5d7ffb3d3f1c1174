use crate::analysis::undefined::{defined, mean_defined};
use crate::analysis::{
    box_records, cluster_radii, ensemble_mean_rdf, extract_member_clouds, member_boxes,
    rdf::radial_bins, upscale_mean, BoxGrid, BoxRecord, CloudDetector, ClusterRadii,
    DiagnosticSeries, EnsembleBoxStats, ExtractionSettings, MemberBoxes, MemberClouds,
    MemberInputs, PooledCloudStats, Rdf, ScaleDiagnostics, ScatterSeries, StepSummary,
};
use crate::config::{AggregationMode, AnalysisMode, Config};
use crate::data_io::{
    closest_level, DiagnosticWriter, EnsembleSource, FieldRequest, ReaderError, RunMetadata,
    SubWindow, WriteError,
};
use crate::plotting::{self, PlotError, VarianceMapInputs};
use crate::time_utils::{ddhhmmss, lead_hours, make_timelist};
use chrono::Duration;
use log::{debug, info, warn};
use ndarray::Array2;
use rayon::prelude::*;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Plot error: {0}")]
    Plot(#[from] PlotError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Vertical level analysed in one pass of the time loop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalysisLevel {
    /// Model level index, `None` for surface fields
    pub index: Option<usize>,
    /// Height above sea level of the level (m)
    pub height: Option<f64>,
}

impl AnalysisLevel {
    pub fn surface() -> Self {
        Self {
            index: None,
            height: None,
        }
    }

    /// Short tag used in file names
    pub fn tag(&self) -> String {
        match self.index {
            Some(k) => format!("lev{}", k),
            None => "surf".to_string(),
        }
    }

    fn describe(&self) -> String {
        match self.height {
            Some(h) => format!("height asl = {:.0}", h),
            None => "height asl = surf".to_string(),
        }
    }
}

/// Results of one analysis level
#[derive(Debug, Clone)]
pub struct LevelReport {
    pub level: AnalysisLevel,
    pub series: DiagnosticSeries,
    pub records: Vec<BoxRecord>,
    /// NetCDF file holding the series and records
    pub output: Option<PathBuf>,
}

/// Member fields of one time step cut to the analysis window
struct StepFields {
    fields: Vec<Array2<f64>>,
    cloud_water: Vec<Option<Array2<f64>>>,
    density: Vec<Option<Array2<f64>>>,
    /// Ensemble-mean convective timescale, NaN where undefined
    tauc: Option<Array2<f64>>,
}

impl StepFields {
    fn window_shape(&self) -> (usize, usize) {
        self.fields.first().map_or((0, 0), |f| f.dim())
    }

    fn member_inputs(&self) -> Vec<MemberInputs<'_>> {
        self.fields
            .iter()
            .zip(&self.cloud_water)
            .zip(&self.density)
            .map(|((field, qc), rho)| MemberInputs {
                field: field.view(),
                cloud_water: qc.as_ref().map(|a| a.view()),
                density: rho.as_ref().map(|a| a.view()),
            })
            .collect()
    }
}

/// Batch driver: levels, then lead times, then scales
pub struct Analysis<'a, S: ?Sized, D: ?Sized> {
    config: &'a Config,
    source: &'a S,
    detector: &'a D,
}

impl<'a, S, D> Analysis<'a, S, D>
where
    S: EnsembleSource + ?Sized,
    D: CloudDetector + ?Sized,
{
    pub fn new(config: &'a Config, source: &'a S, detector: &'a D) -> Self {
        Self {
            config,
            source,
            detector,
        }
    }

    /// Levels analysed for the configured mode
    pub fn levels(&self) -> Result<Vec<AnalysisLevel>, AnalysisError> {
        let settings = self.config.settings();
        if settings.heights.is_empty() {
            return Ok(vec![AnalysisLevel::surface()]);
        }
        let heights = self.source.level_heights()?;
        settings
            .heights
            .iter()
            .map(|&h| {
                let (index, height) = closest_level(&heights, h).ok_or_else(|| {
                    AnalysisError::Config(format!("No model level heights to match {} m", h))
                })?;
                Ok(AnalysisLevel {
                    index: Some(index),
                    height: Some(height),
                })
            })
            .collect()
    }

    pub fn run(&self) -> Result<Vec<LevelReport>, AnalysisError> {
        self.config.validate().map_err(AnalysisError::Config)?;
        if self.source.member_count() == 0 {
            return Err(AnalysisError::Config("Ensemble has no members".to_string()));
        }
        self.levels()?
            .into_iter()
            .map(|level| self.run_level(level))
            .collect()
    }

    fn title(&self, lead: Option<Duration>, level: &AnalysisLevel, scale: Option<usize>) -> String {
        let mut title = self.config.run_tag();
        if let Some(t) = lead {
            title.push_str(&format!("+{}", ddhhmmss(t)));
        }
        title.push_str(&format!(" {} water={}", self.config.mode, self.config.water));
        if let Some(n) = scale {
            title.push_str(&format!(" n = {:03}", n));
        }
        format!("{} {}", title, level.describe())
    }

    fn run_level(&self, level: AnalysisLevel) -> Result<LevelReport, AnalysisError> {
        info!("Analysing level {} ({})", level.tag(), level.describe());
        let config = self.config;
        let mut series = DiagnosticSeries::new(&config.scales);
        let mut records = Vec::new();

        for lead in make_timelist(config.lead_start, config.lead_end, config.lead_step) {
            info!("Lead time {}", ddhhmmss(lead));
            let step = self.load_step(lead, &level)?;
            let (summary, per_scale, step_records) = self.process_step(lead, &level, &step)?;
            series
                .push_step(summary, per_scale)
                .map_err(AnalysisError::Config)?;
            records.extend(step_records);
        }

        let plot_dir = config.plot_dir();
        if config.plots.summary && !series.is_empty() {
            let paths = plotting::plot_summary(
                &plot_dir,
                &level.tag(),
                &self.title(None, &level, None),
                &series,
                &config.settings(),
                config.dx / 1000.0,
            )?;
            debug!("Summary figures: {:?}", paths);
        }

        let output = if series.is_empty() {
            warn!("No time steps analysed for level {}", level.tag());
            None
        } else {
            let meta = RunMetadata {
                init_date: config.date.to_string(),
                mode: config.mode.code().to_string(),
                aggregation: match config.aggregation {
                    AggregationMode::Centroid => "centroid".to_string(),
                    AggregationMode::Footprint => "footprint".to_string(),
                },
                water: config.water,
                height: level.height,
                members: self.source.member_count(),
            };
            let file_name = format!("variance_{}_{}.nc", config.run_tag(), level.tag());
            Some(DiagnosticWriter::new(&plot_dir).write(&file_name, &series, &records, &meta)?)
        };

        Ok(LevelReport {
            level,
            series,
            records,
            output,
        })
    }

    /// Load all members sequentially and cut them to the analysis window
    fn load_step(&self, lead: Duration, level: &AnalysisLevel) -> Result<StepFields, AnalysisError> {
        let config = self.config;
        let settings = config.settings();
        let members = self.source.member_count();
        let mass_flux = config.mode == AnalysisMode::MassFlux;

        let field_req = FieldRequest::new(&settings.field_name, &settings.file_suffix, level.index);
        let qc_req = FieldRequest::new("QC", &settings.file_suffix, level.index);
        let rho_req = FieldRequest::new(
            "RHO",
            &format!("{}_buoy", settings.file_suffix),
            level.index,
        );

        // All fields of a step must share the first field's shape
        let mut reference: Option<((usize, usize), SubWindow)> = None;
        let mut cut = |data: &Array2<f64>, name: &str| -> Result<Array2<f64>, AnalysisError> {
            let shape = data.dim();
            let window = match reference {
                Some((s, w)) if s == shape => w,
                Some(_) => {
                    return Err(ReaderError::UnexpectedShape {
                        name: name.to_string(),
                        shape: vec![shape.0, shape.1],
                    }
                    .into())
                }
                None => {
                    let w = SubWindow::centered(shape, config.window)?;
                    reference = Some((shape, w));
                    w
                }
            };
            Ok(window.slice(data.view()).to_owned())
        };

        let mut fields = Vec::with_capacity(members);
        let mut cloud_water = Vec::with_capacity(members);
        let mut density = Vec::with_capacity(members);
        let mut taus = Vec::new();
        for m in 0..members {
            let field = self.source.load_field(m, lead, &field_req)?;
            fields.push(cut(&field.data, &field.name)?);

            let qc = if mass_flux && config.water {
                let qc = self.source.load_field(m, lead, &qc_req)?;
                Some(cut(&qc.data, &qc.name)?)
            } else {
                None
            };
            cloud_water.push(qc);

            let rho = if mass_flux {
                let rho = self.source.load_field(m, lead, &rho_req)?;
                Some(cut(&rho.data, &rho.name)?)
            } else {
                None
            };
            density.push(rho);

            if config.include_tauc {
                let tau_req = FieldRequest::new("TAU_C", ".nc_30m_surf", None);
                let tau = self.source.load_field(m, lead, &tau_req)?;
                taus.push(cut(&tau.data, &tau.name)?);
            }
            debug!("Loaded member {} at {}", m + 1, ddhhmmss(lead));
        }

        let tauc = (!taus.is_empty()).then(|| {
            let shape = taus[0].dim();
            Array2::from_shape_fn(shape, |idx| {
                mean_defined(taus.iter().map(|t| defined(t[idx]))).unwrap_or(f64::NAN)
            })
        });

        Ok(StepFields {
            fields,
            cloud_water,
            density,
            tauc,
        })
    }

    fn process_step(
        &self,
        lead: Duration,
        level: &AnalysisLevel,
        step: &StepFields,
    ) -> Result<(StepSummary, Vec<ScaleDiagnostics>, Vec<BoxRecord>), AnalysisError> {
        let config = self.config;
        let settings = config.settings();
        let extraction = ExtractionSettings::from_config(config);
        let inputs = step.member_inputs();
        let hours = lead_hours(lead);
        let plot_dir = config.plot_dir();
        let stamp = ddhhmmss(lead);

        let detector = self.detector;
        let clouds: Vec<MemberClouds> = inputs
            .par_iter()
            .map(|inp| extract_member_clouds(detector, inp, &extraction))
            .collect();
        debug!(
            "Objects per member: {:?}",
            clouds.iter().map(MemberClouds::count).collect::<Vec<_>>()
        );

        let pooled = PooledCloudStats::from_members(
            &clouds,
            config.hist_bins,
            settings.size_max,
            settings.sum_max,
        );

        let rdfs: Vec<Rdf> = clouds
            .par_iter()
            .zip(inputs.par_iter())
            .map(|(c, inp)| {
                let labels = c.labels.view();
                detector.radial_distribution(labels, inp.field, config.rdf_rmax, config.rdf_dr)
            })
            .collect();
        let mean_rdf = ensemble_mean_rdf(&rdfs).unwrap_or_else(|| {
            Rdf::undefined(radial_bins(config.rdf_rmax, config.rdf_dr, config.dx))
        });
        let radii: ClusterRadii = cluster_radii(&mean_rdf);
        if !mean_rdf.is_defined() {
            warn!("Ensemble-mean RDF undefined at {}", stamp);
        }

        let mean_tauc = step
            .tauc
            .as_ref()
            .and_then(|t| mean_defined(t.iter().map(|&v| defined(v))));

        let mut per_scale = Vec::with_capacity(config.scales.len());
        let mut scatter = Vec::with_capacity(config.scales.len());
        let mut records = Vec::new();
        for &n in &config.scales {
            let grid = BoxGrid::new(step.window_shape(), n);
            if grid.is_empty() {
                warn!("Scale {} exceeds the analysis window, no boxes", n);
            }
            let aggregation = config.aggregation;
            let boxes: Vec<MemberBoxes> = clouds
                .par_iter()
                .map(|c| member_boxes(&grid, c, aggregation))
                .collect();
            let stats = EnsembleBoxStats::from_members(grid, &boxes);
            let diag = ScaleDiagnostics::from_stats(&stats);
            info!(
                "n = {:3}: Var(N)/N = {:?}, NVar = {:?}, adjusted = {:?}",
                n, diag.count_variance_ratio, diag.normalized_variance, diag.adjusted_variance
            );

            let tauc_boxes = step.tauc.as_ref().map(|t| upscale_mean(t.view(), &grid));
            records.extend(box_records(&stats, tauc_boxes.as_ref(), hours));
            scatter.push(ScatterSeries::from_stats(&stats));

            if config.plots.var {
                if let Some(first) = inputs.first() {
                    let path = plot_dir
                        .join("var")
                        .join(format!("var_{}_{:03}_{}.png", stamp, n, level.tag()));
                    let map = VarianceMapInputs {
                        field: first.field.view(),
                        stats: &stats,
                        mode: config.mode,
                        unit: &settings.unit,
                        symbol: settings.symbol,
                    };
                    plotting::plot_variance_maps(&path, &self.title(Some(lead), level, Some(n)), &map)?;
                }
            }
            per_scale.push(diag);
        }

        let title = self.title(Some(lead), level, None);
        if config.plots.tauc {
            if let (Some(tauc), Some(mean)) = (&step.tauc, mean_tauc) {
                let path = plot_dir.join("tauc").join(format!("tauc_{}.png", stamp));
                let tauc_title = format!("mean tau_c, di_mean: {:.2}h + {}", mean, stamp);
                plotting::plot_tauc_map(&path, &tauc_title, tauc.view())?;
            }
        }
        if config.plots.stats {
            let path = plot_dir
                .join("cloud_stats")
                .join(format!("stats_{}_{}.png", stamp, level.tag()));
            plotting::plot_cloud_stats(
                &path,
                &title,
                &pooled,
                &mean_rdf,
                &radii,
                &settings.quantity,
                &settings.unit,
            )?;
        }
        if config.plots.scatter {
            let path = plot_dir
                .join("var_scatter")
                .join(format!("scatter_{}_{}.png", stamp, level.tag()));
            plotting::plot_scatter(&path, &title, &scatter, settings.symbol, config.dx / 1000.0)?;
        }

        let summary = StepSummary::new(hours, &pooled, radii, mean_tauc);
        Ok((summary, per_scale, records))
    }
}
