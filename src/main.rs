use clap::Command;
use convective_variance::{
    analysis::ConnectedClouds,
    config::{Config, TimeSeriesPlotConfig},
    data_io::{read_precip_archive, EnsembleSource, NetCDFEnsemble},
    pipeline::Analysis,
    plotting::plot_precip_timeseries,
};
use log::info;

fn main() {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("analyze", sub_matches)) => {
            let result = Config::from_matches(sub_matches).and_then(|config| {
                init_logging(config.verbose);
                run_analysis(&config)
            });
            if let Err(e) = result {
                eprintln!("Analysis error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("plot-ts", sub_matches)) => {
            let result = TimeSeriesPlotConfig::from_matches(sub_matches).and_then(|config| {
                init_logging(config.verbose);
                run_timeseries_plot(&config)
            });
            if let Err(e) = result {
                eprintln!("Time series plot error: {}", e);
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` takes precedence over the verbosity flag
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn run_analysis(config: &Config) -> Result<(), String> {
    info!(
        "Analysing {} ({}), {} members, scales {:?}",
        config.run_tag(),
        config.mode,
        config.members,
        config.scales
    );

    let source = NetCDFEnsemble::new(&config.ensemble_dir, config.members);
    let detector = ConnectedClouds::new(config.dx);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build()
        .map_err(|e| format!("Failed to create thread pool: {}", e))?;

    let analysis = Analysis::new(config, &source, &detector);
    let reports = pool
        .install(|| analysis.run())
        .map_err(|e| e.to_string())?;

    println!("\n=== Variance Analysis Summary ===");
    println!("Members: {}", source.member_count());
    for report in &reports {
        println!(
            "Level {}: {} time steps, {} box records",
            report.level.tag(),
            report.series.len(),
            report.records.len()
        );
        for &n in report.series.scales() {
            let adjusted = report.series.adjusted_variance(n).unwrap_or_default();
            let defined: Vec<f64> = adjusted.iter().flatten().copied().collect();
            if defined.is_empty() {
                println!("  n = {:3}: no defined diagnostics", n);
            } else {
                let mean = defined.iter().sum::<f64>() / defined.len() as f64;
                println!("  n = {:3}: mean adjusted variance {:.3}", n, mean);
            }
        }
        if let Some(path) = &report.output {
            println!("  Results written to: {}", path.display());
        }
    }

    Ok(())
}

fn run_timeseries_plot(config: &TimeSeriesPlotConfig) -> Result<(), String> {
    let archive = read_precip_archive(&config.input).map_err(|e| e.to_string())?;
    info!(
        "Read {} forecast groups, {} days of {} times",
        archive.groups.len(),
        archive.dates(),
        archive.times()
    );
    plot_precip_timeseries(&archive, &config.colors, &config.output)
        .map_err(|e| e.to_string())?;
    println!("Figure saved to: {}", config.output.display());
    Ok(())
}

fn build_cli() -> Command {
    Command::new("convective_variance")
        .version("0.1.0")
        .about("Convective variance analysis of convection-permitting ensembles")
        .subcommand_required(true)
        .subcommand(Config::command())
        .subcommand(TimeSeriesPlotConfig::command())
}
