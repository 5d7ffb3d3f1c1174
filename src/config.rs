use crate::time_utils::{parse_init_date, InitDate};
use chrono::Duration;
use clap::{value_parser, Arg, ArgMatches, Command};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Quantity analysed for cloud objects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Vertical mass flux from `W` at fixed heights
    MassFlux,
    /// Surface precipitation rate from `TOT_PR`
    Precipitation,
}

impl AnalysisMode {
    /// Single-letter code used on the command line and in output paths
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisMode::MassFlux => "m",
            AnalysisMode::Precipitation => "p",
        }
    }

    pub fn settings(&self) -> ModeSettings {
        match self {
            AnalysisMode::MassFlux => ModeSettings {
                field_name: "W".to_string(),
                threshold: 1.0,
                file_suffix: ".nc_30m".to_string(),
                unit: "kg/s".to_string(),
                size_max: 2e8,
                sum_max: 7.5e8,
                heights: vec![3000.0],
                symbol: 'M',
                quantity: "mass flux".to_string(),
            },
            AnalysisMode::Precipitation => ModeSettings {
                field_name: "TOT_PR".to_string(),
                threshold: 0.001,
                file_suffix: ".nc_30m_surf".to_string(),
                unit: "mm/h".to_string(),
                size_max: 1e9,
                sum_max: 1.0,
                heights: Vec::new(),
                symbol: 'P',
                quantity: "precipitation".to_string(),
            },
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "m" | "massflux" => Ok(AnalysisMode::MassFlux),
            "p" | "precip" => Ok(AnalysisMode::Precipitation),
            _ => Err(format!("Unknown analysis mode: {} (expected 'm' or 'p')", s)),
        }
    }
}

/// Constants that depend on the analysis mode
#[derive(Clone, Debug)]
pub struct ModeSettings {
    /// Variable detected on
    pub field_name: String,
    /// Detection threshold in field units
    pub threshold: f64,
    /// File name suffix after `lfffDDHHMMSS`
    pub file_suffix: String,
    /// Unit of the per-object aggregate
    pub unit: String,
    /// Upper edge of the cloud size histogram (m²)
    pub size_max: f64,
    /// Upper edge of the cloud flux histogram
    pub sum_max: f64,
    /// Analysis heights above sea level (m); empty means a single surface level
    pub heights: Vec<f64>,
    /// Symbol of the box aggregate (M or P)
    pub symbol: char,
    /// Human-readable quantity for axis labels
    pub quantity: String,
}

/// How cloud objects contribute to coarse boxes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationMode {
    /// Each object counts in the box holding its centroid
    Centroid,
    /// Each object contributes the part of its footprint inside each box
    Footprint,
}

/// Figure families to render
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlotSelection {
    pub var: bool,
    pub tauc: bool,
    pub stats: bool,
    pub scatter: bool,
    pub summary: bool,
}

impl PlotSelection {
    pub fn all() -> Self {
        Self {
            var: true,
            tauc: true,
            stats: true,
            scatter: true,
            summary: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        self.var || self.tauc || self.stats || self.scatter || self.summary
    }

    /// Parse a comma separated list such as `all`, `none` or `var,summary`
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut selection = Self::none();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item {
                "all" => selection = Self::all(),
                "none" => {}
                "var" => selection.var = true,
                "tauc" => selection.tauc = true,
                "stats" => selection.stats = true,
                "scatter" => selection.scatter = true,
                "summary" => selection.summary = true,
                other => return Err(format!("Unknown plot family: {}", other)),
            }
        }
        Ok(selection)
    }
}

/// Main configuration for an analysis run
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: AnalysisMode,
    pub date: InitDate,
    /// Require cloud water for mass-flux objects
    pub water: bool,
    pub aggregation: AggregationMode,

    // Input layout
    /// Directory holding one sub-directory per member
    pub ensemble_dir: PathBuf,
    pub members: usize,

    // Time loop
    pub lead_start: Duration,
    pub lead_end: Duration,
    pub lead_step: Duration,

    // Geometry
    /// Coarse box sizes in grid cells, largest first
    pub scales: Vec<usize>,
    /// Side length of the centered analysis window
    pub window: usize,
    /// Grid spacing (m)
    pub dx: f64,

    // Detection and statistics
    pub qc_threshold: f64,
    pub rdf_rmax: f64,
    pub rdf_dr: f64,
    pub hist_bins: usize,
    pub include_tauc: bool,

    // Output
    pub output_dir: PathBuf,
    pub plots: PlotSelection,

    pub num_threads: usize,
    pub verbose: bool,
}

impl Config {
    /// Configuration with default settings for a mode and date
    pub fn new(mode: AnalysisMode, date: InitDate) -> Self {
        Self {
            mode,
            date,
            water: true,
            aggregation: AggregationMode::Centroid,
            ensemble_dir: PathBuf::from("./ensemble"),
            members: 20,
            lead_start: Duration::hours(8),
            lead_end: Duration::hours(20),
            lead_step: Duration::hours(1),
            scales: vec![256, 128, 64, 32, 16, 8, 4],
            window: 256,
            dx: 2800.0,
            qc_threshold: 0.0,
            rdf_rmax: 30.0,
            rdf_dr: 2.0,
            hist_bins: 15,
            include_tauc: true,
            output_dir: PathBuf::from("./figures"),
            plots: PlotSelection::all(),
            num_threads: 4,
            verbose: false,
        }
    }

    pub fn settings(&self) -> ModeSettings {
        self.mode.settings()
    }

    /// Date tag used in titles and output names; prefixed for non-default runs
    pub fn run_tag(&self) -> String {
        let mut tag = self.date.to_string();
        if self.aggregation == AggregationMode::Footprint {
            tag = format!("noncoll_{}", tag);
        }
        if !self.water {
            tag = format!("nowater_{}", tag);
        }
        tag
    }

    /// Directory receiving all figures and tables of this run
    pub fn plot_dir(&self) -> PathBuf {
        let mut leaf = self.mode.code().to_string();
        if self.aggregation == AggregationMode::Footprint {
            leaf.push_str("_noncollapse");
        }
        if !self.water {
            leaf.push_str("_nowater");
        }
        self.output_dir.join(self.date.to_string()).join(leaf)
    }

    /// Arguments of the `analyze` subcommand
    pub fn command() -> Command {
        Command::new("analyze")
            .about("Run the cloud statistics and coarse-grained variance analysis")
            .arg(
                Arg::new("mode")
                    .value_name("MODE")
                    .help("Analysis mode: m (mass flux) or p (precipitation)")
                    .value_parser(["m", "p"])
                    .required(true),
            )
            .arg(
                Arg::new("date")
                    .value_name("YYYYMMDDHH")
                    .help("Forecast initialisation date")
                    .required(true),
            )
            .arg(
                Arg::new("nowater")
                    .long("nowater")
                    .help("Do not require cloud water for mass-flux objects")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("footprint")
                    .long("footprint")
                    .help("Aggregate by object footprint instead of centroid")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("ensemble-dir")
                    .short('e')
                    .long("ensemble-dir")
                    .value_name("DIR")
                    .help("Root directory of the ensemble (defaults to ./<date>/deout_ceu_pspens)"),
            )
            .arg(
                Arg::new("members")
                    .short('n')
                    .long("members")
                    .value_name("COUNT")
                    .help("Number of ensemble members")
                    .default_value("20")
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                Arg::new("start-hour")
                    .long("start-hour")
                    .value_name("HOURS")
                    .help("First lead time (hours)")
                    .default_value("8")
                    .value_parser(value_parser!(i64)),
            )
            .arg(
                Arg::new("end-hour")
                    .long("end-hour")
                    .value_name("HOURS")
                    .help("Last lead time, inclusive (hours)")
                    .default_value("20")
                    .value_parser(value_parser!(i64)),
            )
            .arg(
                Arg::new("step-minutes")
                    .long("step-minutes")
                    .value_name("MINUTES")
                    .help("Lead time increment (minutes)")
                    .default_value("60")
                    .value_parser(value_parser!(i64)),
            )
            .arg(
                Arg::new("scales")
                    .short('s')
                    .long("scales")
                    .value_name("LIST")
                    .help("Comma separated coarse box sizes in grid cells")
                    .default_value("256,128,64,32,16,8,4"),
            )
            .arg(
                Arg::new("window")
                    .long("window")
                    .value_name("CELLS")
                    .help("Side length of the centered analysis window")
                    .default_value("256")
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                Arg::new("dx")
                    .long("dx")
                    .value_name("METERS")
                    .help("Grid spacing")
                    .default_value("2800")
                    .value_parser(value_parser!(f64)),
            )
            .arg(
                Arg::new("output-dir")
                    .short('o')
                    .long("output-dir")
                    .value_name("DIR")
                    .help("Output directory for figures and tables")
                    .default_value("./figures"),
            )
            .arg(
                Arg::new("plots")
                    .short('p')
                    .long("plots")
                    .value_name("LIST")
                    .help("Figure families: all, none, or any of var,tauc,stats,scatter,summary")
                    .default_value("all"),
            )
            .arg(
                Arg::new("no-tauc")
                    .long("no-tauc")
                    .help("Skip the convective timescale fields")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("num-threads")
                    .short('j')
                    .long("num-threads")
                    .value_name("COUNT")
                    .help("Number of worker threads")
                    .default_value("4")
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Enable debug logging")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    /// Build a configuration from parsed `analyze` arguments
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let mode: AnalysisMode = required(matches, "mode")?.parse()?;
        let date = parse_init_date(required(matches, "date")?)?;

        let mut config = Self::new(mode, date);
        config.water = !matches.get_flag("nowater");
        if matches.get_flag("footprint") {
            config.aggregation = AggregationMode::Footprint;
        }
        config.ensemble_dir = match matches.get_one::<String>("ensemble-dir") {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(".")
                .join(date.to_string())
                .join("deout_ceu_pspens"),
        };
        config.members = typed(matches, "members")?;
        config.lead_start = Duration::hours(typed(matches, "start-hour")?);
        config.lead_end = Duration::hours(typed(matches, "end-hour")?);
        config.lead_step = Duration::minutes(typed(matches, "step-minutes")?);
        config.scales = parse_scales(required(matches, "scales")?)?;
        config.window = typed(matches, "window")?;
        config.dx = typed(matches, "dx")?;
        config.output_dir = PathBuf::from(required(matches, "output-dir")?);
        config.plots = PlotSelection::parse(required(matches, "plots")?)?;
        config.include_tauc = !matches.get_flag("no-tauc");
        config.num_threads = typed(matches, "num-threads")?;
        config.verbose = matches.get_flag("verbose");

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.members < 2 {
            return Err("At least two ensemble members are needed for a variance".to_string());
        }
        if self.scales.is_empty() {
            return Err("Scale list is empty".to_string());
        }
        if self.scales.iter().any(|&n| n == 0) {
            return Err("Scales must be positive".to_string());
        }
        if let Some(&n) = self.scales.iter().find(|&&n| n > self.window) {
            return Err(format!(
                "Scale {} exceeds the analysis window of {} cells",
                n, self.window
            ));
        }
        if self.lead_step <= Duration::zero() {
            return Err("Time step must be positive".to_string());
        }
        if self.lead_start > self.lead_end {
            return Err("Start lead time is after end lead time".to_string());
        }
        if self.dx <= 0.0 {
            return Err("Grid spacing must be positive".to_string());
        }
        if self.rdf_dr <= 0.0 || self.rdf_rmax < self.rdf_dr {
            return Err("RDF bin width must be positive and not exceed r_max".to_string());
        }
        if self.hist_bins == 0 {
            return Err("Histogram needs at least one bin".to_string());
        }
        if self.num_threads == 0 {
            return Err("Number of threads must be positive".to_string());
        }
        Ok(())
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, String> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing argument: {}", name))
}

fn typed<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, name: &str) -> Result<T, String> {
    matches
        .get_one::<T>(name)
        .cloned()
        .ok_or_else(|| format!("Missing argument: {}", name))
}

/// Parse a comma separated list of box sizes
pub fn parse_scales(list: &str) -> Result<Vec<usize>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| format!("Invalid scale: {}", s)))
        .collect()
}

/// Colours per forecast source, the named store read by the time-series plot
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PlotColors {
    #[serde(default = "default_det")]
    pub det: String,
    #[serde(default = "default_obs")]
    pub obs: String,
    #[serde(default = "default_ens")]
    pub ens: String,
    #[serde(default = "default_ens_range")]
    pub ens_range: String,
}

fn default_det() -> String {
    "#000000".to_string()
}
fn default_obs() -> String {
    "#d62728".to_string()
}
fn default_ens() -> String {
    "#1f77b4".to_string()
}
fn default_ens_range() -> String {
    "#aec7e8".to_string()
}

impl Default for PlotColors {
    fn default() -> Self {
        Self {
            det: default_det(),
            obs: default_obs(),
            ens: default_ens(),
            ens_range: default_ens_range(),
        }
    }
}

#[derive(Deserialize)]
struct ColorFile {
    #[serde(default)]
    colors: Option<PlotColors>,
}

impl PlotColors {
    /// Colour for a named forecast group (`det`, `obs`, `ens`, `ens_range`)
    pub fn get(&self, group: &str) -> Option<&str> {
        match group {
            "det" => Some(&self.det),
            "obs" => Some(&self.obs),
            "ens" => Some(&self.ens),
            "ens_range" => Some(&self.ens_range),
            _ => None,
        }
    }

    /// Parse the `[colors]` table of a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let parsed: ColorFile =
            toml::from_str(content).map_err(|e| format!("Invalid colour file: {}", e))?;
        Ok(parsed.colors.unwrap_or_default())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content)
    }
}

/// Configuration of the `plot-ts` subcommand
#[derive(Clone, Debug)]
pub struct TimeSeriesPlotConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub colors: PlotColors,
    pub verbose: bool,
}

impl TimeSeriesPlotConfig {
    pub fn command() -> Command {
        Command::new("plot-ts")
            .about("Plot accumulated precipitation time series from a pre-processed archive")
            .arg(
                Arg::new("input")
                    .short('i')
                    .long("input")
                    .value_name("FILE")
                    .help("Grouped NetCDF archive with det/obs/ens groups")
                    .required(true),
            )
            .arg(
                Arg::new("output")
                    .short('o')
                    .long("output")
                    .value_name("FILE")
                    .help("Output figure")
                    .default_value("./figures/domain_mean_weather_ts.png"),
            )
            .arg(
                Arg::new("colors")
                    .short('c')
                    .long("colors")
                    .value_name("FILE")
                    .help("TOML file with a [colors] table"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Enable debug logging")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let input = PathBuf::from(required(matches, "input")?);
        if !input.is_file() {
            return Err(format!("Input file does not exist: {}", input.display()));
        }
        let colors = match matches.get_one::<String>("colors") {
            Some(path) => PlotColors::from_toml_file(Path::new(path))?,
            None => PlotColors::default(),
        };
        Ok(Self {
            input,
            output: PathBuf::from(required(matches, "output")?),
            colors,
            verbose: matches.get_flag("verbose"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_date() -> InitDate {
        parse_init_date("2016052800").unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = Config::new(AnalysisMode::MassFlux, test_date());
        assert!(config.validate().is_ok());
        assert_eq!(config.scales, vec![256, 128, 64, 32, 16, 8, 4]);
        assert_eq!(config.members, 20);
    }

    #[test]
    fn test_mode_settings() {
        let m = AnalysisMode::MassFlux.settings();
        assert_eq!(m.field_name, "W");
        assert_eq!(m.threshold, 1.0);
        assert_eq!(m.heights, vec![3000.0]);

        let p = AnalysisMode::Precipitation.settings();
        assert_eq!(p.field_name, "TOT_PR");
        assert_eq!(p.file_suffix, ".nc_30m_surf");
        assert!(p.heights.is_empty());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::new(AnalysisMode::Precipitation, test_date());
        config.members = 1;
        assert!(config.validate().unwrap_err().contains("two ensemble members"));

        let mut config = Config::new(AnalysisMode::Precipitation, test_date());
        config.scales = vec![64, 0];
        assert!(config.validate().is_err());

        let mut config = Config::new(AnalysisMode::Precipitation, test_date());
        config.scales = vec![512];
        assert!(config.validate().unwrap_err().contains("exceeds"));

        let mut config = Config::new(AnalysisMode::Precipitation, test_date());
        config.lead_start = Duration::hours(21);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plot_dir_and_tag() {
        let mut config = Config::new(AnalysisMode::MassFlux, test_date());
        config.output_dir = PathBuf::from("/tmp/out");
        assert_eq!(config.plot_dir(), PathBuf::from("/tmp/out/2016052800/m"));
        assert_eq!(config.run_tag(), "2016052800");

        config.water = false;
        config.aggregation = AggregationMode::Footprint;
        assert_eq!(
            config.plot_dir(),
            PathBuf::from("/tmp/out/2016052800/m_noncollapse_nowater")
        );
        assert_eq!(config.run_tag(), "nowater_noncoll_2016052800");
    }

    #[test]
    fn test_from_matches() {
        let matches = Config::command()
            .try_get_matches_from([
                "analyze", "p", "2016052800", "--nowater", "--scales", "64,32", "--plots", "none",
            ])
            .unwrap();
        let config = Config::from_matches(&matches).unwrap();
        assert_eq!(config.mode, AnalysisMode::Precipitation);
        assert!(!config.water);
        assert_eq!(config.scales, vec![64, 32]);
        assert!(!config.plots.any());
        assert!(!config.verbose);
        assert_eq!(
            config.ensemble_dir,
            Path::new(".").join("2016052800").join("deout_ceu_pspens")
        );
    }

    #[test]
    fn test_plot_selection_parse() {
        assert_eq!(PlotSelection::parse("all").unwrap(), PlotSelection::all());
        let sel = PlotSelection::parse("var, summary").unwrap();
        assert!(sel.var && sel.summary && !sel.tauc);
        assert!(PlotSelection::parse("maps").is_err());
    }

    #[test]
    fn test_parse_scales() {
        assert_eq!(parse_scales("256, 64,4").unwrap(), vec![256, 64, 4]);
        assert!(parse_scales("a,4").is_err());
    }

    #[test]
    fn test_plot_colors_from_toml() {
        let colors = PlotColors::from_toml_str("[colors]\ndet = \"#112233\"\n").unwrap();
        assert_eq!(colors.det, "#112233");
        assert_eq!(colors.ens, default_ens());
        assert_eq!(colors.get("ens_range"), Some("#aec7e8"));
        assert_eq!(colors.get("unknown"), None);

        let empty = PlotColors::from_toml_str("").unwrap();
        assert_eq!(empty, PlotColors::default());
    }
}
