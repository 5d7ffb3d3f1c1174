use chrono::Duration;
use convective_variance::config::{
    AggregationMode, AnalysisMode, Config, PlotColors, TimeSeriesPlotConfig,
};
use convective_variance::{ddhhmmss, make_timelist};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_analyze_defaults() {
    let matches = Config::command()
        .try_get_matches_from(["analyze", "m", "2016052800"])
        .unwrap();
    let config = Config::from_matches(&matches).unwrap();

    assert_eq!(config.mode, AnalysisMode::MassFlux);
    assert!(config.water);
    assert_eq!(config.aggregation, AggregationMode::Centroid);
    assert_eq!(config.members, 20);
    assert_eq!(config.window, 256);
    assert_eq!(config.dx, 2800.0);
    assert!(config.include_tauc);
    assert!(config.plots.any());

    let leads = make_timelist(config.lead_start, config.lead_end, config.lead_step);
    assert_eq!(leads.len(), 13);
    assert_eq!(ddhhmmss(leads[0]), "00080000");
    assert_eq!(ddhhmmss(leads[12]), "00200000");
}

#[test]
fn test_analyze_options() {
    let matches = Config::command()
        .try_get_matches_from([
            "analyze",
            "p",
            "2016060612",
            "--footprint",
            "--no-tauc",
            "-e",
            "/data/ens",
            "-n",
            "5",
            "--step-minutes",
            "30",
            "--end-hour",
            "9",
            "-j",
            "2",
            "--dx",
            "1250.5",
            "-v",
        ])
        .unwrap();
    let config = Config::from_matches(&matches).unwrap();

    assert_eq!(config.aggregation, AggregationMode::Footprint);
    assert!(!config.include_tauc);
    assert_eq!(config.ensemble_dir, PathBuf::from("/data/ens"));
    assert_eq!(config.members, 5);
    assert_eq!(config.lead_step, Duration::minutes(30));
    assert_eq!(config.num_threads, 2);
    assert_eq!(config.dx, 1250.5);
    assert!(config.verbose);
    assert_eq!(config.run_tag(), "noncoll_2016060612");

    let leads = make_timelist(config.lead_start, config.lead_end, config.lead_step);
    assert_eq!(leads.len(), 3);
    assert_eq!(ddhhmmss(leads[1]), "00083000");
}

#[test]
fn test_analyze_rejects_bad_input() {
    let command = Config::command();
    assert!(command
        .clone()
        .try_get_matches_from(["analyze", "x", "2016052800"])
        .is_err());

    let matches = command
        .clone()
        .try_get_matches_from(["analyze", "m", "20160528"])
        .unwrap();
    assert!(Config::from_matches(&matches).is_err());

    let matches = command
        .clone()
        .try_get_matches_from(["analyze", "m", "2016052800", "--window", "64"])
        .unwrap();
    let err = Config::from_matches(&matches).unwrap_err();
    assert!(err.contains("exceeds"));

    let matches = command
        .try_get_matches_from(["analyze", "m", "2016052800", "-n", "1"])
        .unwrap();
    assert!(Config::from_matches(&matches).is_err());
}

#[test]
fn test_analyze_rejects_non_numeric_arguments() {
    let command = Config::command();
    for args in [
        ["--members", "abc"],
        ["--start-hour", "8.5"],
        ["--window", "4.5"],
        ["--dx", "fine"],
        ["-j", "many"],
    ] {
        let result = command
            .clone()
            .try_get_matches_from(["analyze", "m", "2016052800", args[0], args[1]]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation, "{:?}", args);
    }
}

#[test]
fn test_plot_ts_arguments() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("archive.nc");
    std::fs::write(&input, b"").unwrap();
    let colors = dir.path().join("colors.toml");
    std::fs::write(&colors, "[colors]\nens = \"#00ff00\"\n").unwrap();

    let matches = TimeSeriesPlotConfig::command()
        .try_get_matches_from([
            "plot-ts",
            "-i",
            input.to_str().unwrap(),
            "-c",
            colors.to_str().unwrap(),
        ])
        .unwrap();
    let config = TimeSeriesPlotConfig::from_matches(&matches).unwrap();
    assert_eq!(config.input, input);
    assert_eq!(
        config.output,
        PathBuf::from("./figures/domain_mean_weather_ts.png")
    );
    assert_eq!(config.colors.ens, "#00ff00");
    assert_eq!(config.colors.det, PlotColors::default().det);
    assert!(!config.verbose);
}

#[test]
fn test_plot_ts_missing_input() {
    let matches = TimeSeriesPlotConfig::command()
        .try_get_matches_from(["plot-ts", "-i", "/nonexistent/archive.nc"])
        .unwrap();
    let err = TimeSeriesPlotConfig::from_matches(&matches).unwrap_err();
    assert!(err.contains("does not exist"));
}
