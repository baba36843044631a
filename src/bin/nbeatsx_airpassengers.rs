//! Train NBEATSx on the two-airline AirPassengers panel, predict the last year
//! and write the forecast chart.

use anofox_neuralforecast::workflow::{run_air_passengers, WorkflowConfig};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file overriding the default run settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Training steps.
    #[arg(long)]
    max_steps: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Series shown in the chart.
    #[arg(long)]
    series: Option<String>,

    /// Where to write the SVG chart. Defaults to the config's `plot_path`,
    /// then to `nbeatsx_airpassengers.svg`.
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Where to write the prediction frame as CSV.
    #[arg(long)]
    csv: Option<PathBuf>,
}

const DEFAULT_PLOT: &str = "nbeatsx_airpassengers.svg";

/// Command-line flags take precedence over the config file.
fn apply_overrides(args: Args, mut config: WorkflowConfig) -> WorkflowConfig {
    if let Some(steps) = args.max_steps {
        config.max_steps = steps;
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    if let Some(series) = args.series {
        config.series = series;
    }
    config.plot_path = args
        .plot
        .or(config.plot_path)
        .or_else(|| Some(PathBuf::from(DEFAULT_PLOT)));
    config.csv_path = args.csv.or(config.csv_path);
    config
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("anofox_neuralforecast=info,nbeatsx_airpassengers=info")
            }),
        )
        .with_target(false)
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => WorkflowConfig::from_json_path(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => WorkflowConfig::default(),
    };
    let config = apply_overrides(args, config);

    let output = run_air_passengers(&config).context("AirPassengers run failed")?;

    for report in &output.reports {
        tracing::info!(
            model = %report.model,
            steps = report.steps,
            early_stopped = report.early_stopped,
            best_valid_loss = ?report.best_valid_loss,
            "training finished"
        );
    }
    let acc = &output.evaluation.accuracy;
    println!("MAE   {:>10.3}", acc.mae);
    println!("RMSE  {:>10.3}", acc.rmse);
    println!("sMAPE {:>10.3}", acc.smape);
    for c in &output.evaluation.coverage {
        println!(
            "level {:>3}: coverage {:.2}, mean width {:.1}",
            c.level, c.coverage, c.mean_width
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_paths() -> WorkflowConfig {
        WorkflowConfig {
            plot_path: Some(PathBuf::from("from_config.svg")),
            csv_path: Some(PathBuf::from("from_config.csv")),
            ..Default::default()
        }
    }

    #[test]
    fn config_paths_survive_without_flags() {
        let args = Args::parse_from(["nbeatsx-airpassengers"]);
        let c = apply_overrides(args, config_with_paths());
        assert_eq!(c.plot_path, Some(PathBuf::from("from_config.svg")));
        assert_eq!(c.csv_path, Some(PathBuf::from("from_config.csv")));
    }

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "nbeatsx-airpassengers",
            "--plot",
            "flag.svg",
            "--max-steps",
            "7",
            "--series",
            "Airline2",
        ]);
        let c = apply_overrides(args, config_with_paths());
        assert_eq!(c.plot_path, Some(PathBuf::from("flag.svg")));
        assert_eq!(c.csv_path, Some(PathBuf::from("from_config.csv")));
        assert_eq!(c.max_steps, 7);
        assert_eq!(c.series, "Airline2");
    }

    #[test]
    fn plot_falls_back_to_default_name() {
        let args = Args::parse_from(["nbeatsx-airpassengers"]);
        let c = apply_overrides(args, WorkflowConfig::default());
        assert_eq!(c.plot_path, Some(PathBuf::from(DEFAULT_PLOT)));
        assert_eq!(c.csv_path, None);
    }
}
