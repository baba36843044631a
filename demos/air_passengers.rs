//! NBEATSx on the two-airline AirPassengers panel, step by step.
//!
//! Run with: cargo run --release --example air_passengers

use anofox_neuralforecast::core::Frequency;
use anofox_neuralforecast::data::{air_passengers_panel, air_passengers_static};
use anofox_neuralforecast::models::{BoxedForecaster, Distribution, Loss, NBEATSx, NBEATSxConfig};
use anofox_neuralforecast::transform::ScalerType;
use anofox_neuralforecast::workflow::{evaluate_frame, WorkflowConfig, WorkflowOutput};
use anofox_neuralforecast::NeuralForecast;
use tracing_subscriber::EnvFilter;

fn main() -> anofox_neuralforecast::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("anofox_neuralforecast=info")),
        )
        .with_target(false)
        .init();

    println!("=== NBEATSx AirPassengers ===\n");

    // 1. Load the panel and hold out the last year
    let panel = air_passengers_panel()?;
    let static_df = air_passengers_static()?;
    let (train, test) = panel.train_test_split(12)?;
    println!("Panel rows: {} (train {}, test {})", panel.len(), train.len(), test.len());
    println!("Series: {:?}", panel.unique_ids());

    // 2. Configure the model
    println!("\n--- Configuring NBEATSx ---");
    let config = NBEATSxConfig::new(12, 24)
        .with_loss(Loss::distribution(Distribution::Normal, vec![80.0, 90.0]))
        .with_scaler(ScalerType::Robust)
        .with_dropout(0.5)
        .with_stat_exog(&["airline1"])
        .with_futr_exog(&["trend"])
        .with_max_steps(200)
        .with_val_check_steps(10)
        .with_early_stop_patience(2);
    let model = NBEATSx::new(config)?;
    let models: Vec<BoxedForecaster> = vec![Box::new(model)];
    let mut nf = NeuralForecast::new(models, Frequency::MonthEnd)?;

    // 3. Fit with a 12 month validation tail
    println!("\n--- Training ---");
    let reports = nf.fit(&train, Some(&static_df), 12)?;
    for report in &reports {
        println!("Steps run: {}", report.steps);
        println!("Early stopped: {}", report.early_stopped);
        for (step, loss) in &report.valid_loss {
            println!("  step {:>4}: valid loss {:.4}", step, loss);
        }
    }

    // 4. Predict the held-out year
    println!("\n--- Forecast for Airline1 ---");
    let y_hat = nf.predict(Some(&test))?;
    let joined = test.hstack(&y_hat)?;
    let airline1 = joined.filter_series("Airline1")?;
    let y = airline1.column("y")?;
    let mean = airline1.column("NBEATSx")?;
    let lo = airline1.column("NBEATSx-lo-90")?;
    let hi = airline1.column("NBEATSx-hi-90")?;
    for (t, date) in airline1.dates().iter().enumerate() {
        println!(
            "  {}: actual {:>6.1}  mean {:>7.2}  90% [{:>7.2}, {:>7.2}]",
            date, y[t], mean[t], lo[t], hi[t]
        );
    }

    // 5. Evaluate and plot
    println!("\n--- Evaluation ---");
    let evaluation = evaluate_frame(&joined, "NBEATSx", &[80.0, 90.0])?;
    println!("MAE:   {:.3}", evaluation.accuracy.mae);
    println!("RMSE:  {:.3}", evaluation.accuracy.rmse);
    println!("sMAPE: {:.3}%", evaluation.accuracy.smape);
    for c in &evaluation.coverage {
        println!("Coverage at {}%: {:.2}", c.level, c.coverage);
    }

    let plot_frame = train.vstack(&joined)?.filter_series("Airline1")?;
    let output = WorkflowOutput {
        train,
        test,
        predictions: y_hat,
        plot_frame,
        reports,
        evaluation,
        alias: "NBEATSx".to_string(),
    };
    let path = std::env::temp_dir().join("nbeatsx_airpassengers.svg");
    output.plot(WorkflowConfig::default().plot_level, 12).save_svg(&path)?;
    println!("\nPlot written to {}", path.display());

    println!("\n=== Done ===");
    Ok(())
}
