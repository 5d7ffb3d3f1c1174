use chrono::Duration;
use convective_variance::analysis::ConnectedClouds;
use convective_variance::config::{AnalysisMode, Config, PlotSelection};
use convective_variance::data_io::{EnsembleSource, Field, FieldRequest, ReaderError};
use convective_variance::parse_init_date;
use convective_variance::pipeline::{Analysis, AnalysisError};
use ndarray::Array2;
use tempfile::TempDir;

const DOMAIN: usize = 64;

/// In-memory ensemble: every member holds a few square objects whose
/// positions shift with the member and the lead time
struct SyntheticEnsemble {
    members: usize,
    shape: (usize, usize),
    heights: Vec<f64>,
    /// Level every 3D request must ask for
    expected_level: Option<usize>,
}

impl SyntheticEnsemble {
    fn surface(members: usize) -> Self {
        Self {
            members,
            shape: (DOMAIN, DOMAIN),
            heights: Vec::new(),
            expected_level: None,
        }
    }

    fn objects(&self, member: usize, lead: Duration, value: f64) -> Array2<f64> {
        let mut field = Array2::zeros(self.shape);
        let shift = (member * 3 + lead.num_hours() as usize) % 8;
        let corners = [(16 + shift, 18), (30, 20 + shift), (40 - shift, 42)];
        for &(r, c) in corners.iter().take(1 + member % 3) {
            for dr in 0..2 {
                for dc in 0..2 {
                    field[[r + dr, c + dc]] = value;
                }
            }
        }
        field
    }
}

impl EnsembleSource for SyntheticEnsemble {
    fn member_count(&self) -> usize {
        self.members
    }

    fn load_field(
        &self,
        member: usize,
        lead: Duration,
        request: &FieldRequest,
    ) -> Result<Field, ReaderError> {
        if request.name != "TAU_C" && request.level != self.expected_level {
            return Err(ReaderError::LevelOutOfRange {
                name: request.name.clone(),
                level: request.level.unwrap_or(0),
                levels: self.heights.len(),
            });
        }
        let data = match request.name.as_str() {
            "TOT_PR" => self.objects(member, lead, 2.5),
            "W" => self.objects(member, lead, 3.0),
            "QC" => self.objects(member, lead, 1.0e-3),
            "RHO" => Array2::from_elem(self.shape, 1.1),
            "TAU_C" => Array2::from_elem(self.shape, 1.0 + member as f64),
            other => return Err(ReaderError::MissingVariable(other.to_string())),
        };
        Ok(Field {
            name: request.name.clone(),
            data,
            unit: String::new(),
            level: request.level,
        })
    }

    fn level_heights(&self) -> Result<Vec<f64>, ReaderError> {
        Ok(self.heights.clone())
    }
}

fn test_config(mode: AnalysisMode, output: &TempDir) -> Config {
    let mut config = Config::new(mode, parse_init_date("2016052800").unwrap());
    config.members = 4;
    config.window = 32;
    config.scales = vec![32, 16, 8];
    config.lead_start = Duration::hours(8);
    config.lead_end = Duration::hours(10);
    config.lead_step = Duration::hours(1);
    config.output_dir = output.path().to_path_buf();
    config.plots = PlotSelection::none();
    config
}

#[test]
fn test_precipitation_run_writes_series() {
    let output = TempDir::new().unwrap();
    let config = test_config(AnalysisMode::Precipitation, &output);
    let source = SyntheticEnsemble::surface(4);
    let detector = ConnectedClouds::new(config.dx);

    let reports = Analysis::new(&config, &source, &detector).run().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.level.tag(), "surf");
    assert_eq!(report.series.len(), 3);
    assert_eq!(report.series.lead_hours(), vec![8.0, 9.0, 10.0]);
    assert_eq!(report.series.scales(), &[32, 16, 8]);

    // The window is 33 cells wide: one box at n = 32, 2x2 at 16, 4x4 at 8
    assert_eq!(report.records.len(), 3 * (1 + 4 + 16));
    assert!(report.records.iter().all(|r| r.tauc.is_some()));

    let step = report.series.steps()[0];
    assert!(step.total > 0.0);
    assert_eq!(step.mean_tauc, Some(2.5));

    let path = report.output.clone().unwrap();
    assert_eq!(
        path,
        output
            .path()
            .join("2016052800")
            .join("p")
            .join("variance_2016052800_surf.nc")
    );
    let file = netcdf::open(&path).unwrap();
    assert_eq!(file.dimension("time").unwrap().len(), 3);
    assert_eq!(file.dimension("scale").unwrap().len(), 3);
    assert_eq!(file.dimension("record").unwrap().len(), 63);
    let scales: Vec<f64> = file.variable("scale").unwrap().get_values(..).unwrap();
    assert_eq!(scales, vec![32.0, 16.0, 8.0]);
    let time: Vec<f64> = file.variable("time").unwrap().get_values(..).unwrap();
    assert_eq!(time, vec![8.0, 9.0, 10.0]);
}

#[test]
fn test_precipitation_run_draws_all_figures() {
    let output = TempDir::new().unwrap();
    let mut config = test_config(AnalysisMode::Precipitation, &output);
    config.lead_end = Duration::hours(9);
    config.plots = PlotSelection::all();
    let source = SyntheticEnsemble::surface(4);
    let detector = ConnectedClouds::new(config.dx);

    let reports = Analysis::new(&config, &source, &detector).run().unwrap();
    assert_eq!(reports[0].series.len(), 2);

    let plot_dir = output.path().join("2016052800").join("p");
    assert_eq!(plot_dir, config.plot_dir());
    for stamp in ["00080000", "00090000"] {
        for n in [32, 16, 8] {
            let var = plot_dir
                .join("var")
                .join(format!("var_{}_{:03}_surf.png", stamp, n));
            assert!(var.is_file(), "missing {}", var.display());
        }
        for figure in [
            plot_dir.join("tauc").join(format!("tauc_{}.png", stamp)),
            plot_dir.join("cloud_stats").join(format!("stats_{}_surf.png", stamp)),
            plot_dir.join("var_scatter").join(format!("scatter_{}_surf.png", stamp)),
        ] {
            assert!(figure.is_file(), "missing {}", figure.display());
            assert!(std::fs::metadata(&figure).unwrap().len() > 0);
        }
    }
    assert!(plot_dir.join("mean_stats_timeseries_surf.png").is_file());
    assert!(plot_dir.join("variance_stats_timeseries_surf.png").is_file());
    assert!(plot_dir.join("variance_2016052800_surf.nc").is_file());
}

#[test]
fn test_plots_follow_selection_and_tauc_flag() {
    let output = TempDir::new().unwrap();
    let mut config = test_config(AnalysisMode::Precipitation, &output);
    config.lead_end = Duration::hours(8);
    config.include_tauc = false;
    config.water = false;
    config.plots = PlotSelection::parse("var,tauc").unwrap();
    let source = SyntheticEnsemble::surface(4);
    let detector = ConnectedClouds::new(config.dx);

    Analysis::new(&config, &source, &detector).run().unwrap();

    let plot_dir = output.path().join("2016052800").join("p_nowater");
    assert!(plot_dir.join("var").join("var_00080000_032_surf.png").is_file());
    // No timescale field was read, so there is no map to draw
    assert!(!plot_dir.join("tauc").exists());
    assert!(!plot_dir.join("cloud_stats").exists());
    assert!(!plot_dir.join("mean_stats_timeseries_surf.png").exists());
    assert!(plot_dir.join("variance_nowater_2016052800_surf.nc").is_file());
}

#[test]
fn test_mass_flux_uses_closest_level() {
    let output = TempDir::new().unwrap();
    let mut config = test_config(AnalysisMode::MassFlux, &output);
    config.include_tauc = false;
    config.lead_end = Duration::hours(8);
    let source = SyntheticEnsemble {
        members: 4,
        shape: (DOMAIN, DOMAIN),
        heights: vec![5000.0, 3100.0, 2000.0, 500.0],
        expected_level: Some(1),
    };
    let detector = ConnectedClouds::new(config.dx);

    let analysis = Analysis::new(&config, &source, &detector);
    let levels = analysis.levels().unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0].index, Some(1));
    assert_eq!(levels[0].height, Some(3100.0));

    let reports = analysis.run().unwrap();
    let report = &reports[0];
    assert_eq!(report.level.tag(), "lev1");
    assert_eq!(report.series.len(), 1);
    assert_eq!(report.series.steps()[0].mean_tauc, None);
    assert!(report.records.iter().all(|r| r.tauc.is_none()));

    let path = report.output.clone().unwrap();
    assert!(path.ends_with("variance_2016052800_lev1.nc"));
    assert!(path.exists());
}

#[test]
fn test_mass_flux_with_wrong_level_fails() {
    let output = TempDir::new().unwrap();
    let mut config = test_config(AnalysisMode::MassFlux, &output);
    config.lead_end = Duration::hours(8);
    let source = SyntheticEnsemble {
        members: 4,
        shape: (DOMAIN, DOMAIN),
        heights: vec![3000.0, 1000.0],
        expected_level: Some(1),
    };
    let detector = ConnectedClouds::new(config.dx);

    let result = Analysis::new(&config, &source, &detector).run();
    assert!(matches!(
        result,
        Err(AnalysisError::Reader(ReaderError::LevelOutOfRange { .. }))
    ));
}

#[test]
fn test_domain_smaller_than_window_fails() {
    let output = TempDir::new().unwrap();
    let config = test_config(AnalysisMode::Precipitation, &output);
    let source = SyntheticEnsemble {
        shape: (20, 20),
        ..SyntheticEnsemble::surface(4)
    };
    let detector = ConnectedClouds::new(config.dx);

    let result = Analysis::new(&config, &source, &detector).run();
    assert!(matches!(
        result,
        Err(AnalysisError::Reader(ReaderError::DomainTooSmall { .. }))
    ));
}

#[test]
fn test_empty_ensemble_is_rejected() {
    let output = TempDir::new().unwrap();
    let config = test_config(AnalysisMode::Precipitation, &output);
    let source = SyntheticEnsemble::surface(0);
    let detector = ConnectedClouds::new(config.dx);

    let result = Analysis::new(&config, &source, &detector).run();
    assert!(matches!(result, Err(AnalysisError::Config(_))));
}

#[test]
fn test_repeated_runs_are_identical() {
    let output = TempDir::new().unwrap();
    let config = test_config(AnalysisMode::Precipitation, &output);
    let source = SyntheticEnsemble::surface(4);
    let detector = ConnectedClouds::new(config.dx);
    let analysis = Analysis::new(&config, &source, &detector);

    let first = analysis.run().unwrap();
    let second = analysis.run().unwrap();
    assert_eq!(first[0].series, second[0].series);
    assert_eq!(first[0].records, second[0].records);
}
