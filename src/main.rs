// Batch entry point: turns raw transactions into labeled RFM customers and trains risk classifiers.
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use crate::config::PipelineConfig;
use crate::csv_reader::{read_transactions, write_labeled};
use crate::kmeans::LabeledRecord;
use crate::pipeline::Pipeline;
use crate::trainer::{train_models, TrainingReport};

mod cleaner;
mod config;
mod csv_reader;
mod error;
mod kmeans;
mod pipeline;
mod rfm;
mod timestamp;
mod trainer;

const CONFIG_PATH: &str = "configs/config.yml";
const DATA_PATH: &str = "data/raw/data.csv";
const OUTPUT_PATH: &str = "data/processed/rfm_labeled.csv";

// Prints per-segment counts and mean RFM values
// Inputs: labeled customers
// Outputs: Prints formatted summary to console
fn print_segment_summary(labeled: &[LabeledRecord]) {
    for (title, flag) in [("High risk", 1u8), ("Low risk", 0u8)] {
        let segment: Vec<&LabeledRecord> = labeled.iter().filter(|r| r.is_high_risk == flag).collect();
        if segment.is_empty() {
            println!("\n{title}: no customers");
            continue;
        }
        let n = segment.len() as f64;
        let recency = segment.iter().map(|r| r.recency as f64).sum::<f64>() / n;
        let frequency = segment.iter().map(|r| r.frequency as f64).sum::<f64>() / n;
        let monetary = segment.iter().map(|r| r.monetary).sum::<f64>() / n;

        println!("\n{title}: {} customers", segment.len());
        println!("Avg Recency: {recency:.1} days");
        println!("Avg Frequency: {frequency:.1}");
        println!("Avg Monetary: {monetary:.2}");
    }
}

fn print_training_report(report: &TrainingReport) {
    println!("\nModel Selection ({} train / {} test customers):", report.train_rows, report.test_rows);
    for candidate in &report.candidates {
        println!(
            "{:<14} {:<14} val AUC {:.3}  test AUC {:.3}  test F1 {:.3}  accuracy {:.3}",
            candidate.params.model_name(),
            candidate.params.to_string(),
            candidate.val_auc,
            candidate.test_auc,
            candidate.test_f1,
            candidate.test_accuracy
        );
    }
    let best = report.best();
    println!("Selected: {} ({})", best.params.model_name(), best.params);
}

// Main entry point
// Key steps:
// 1. Load configuration and raw transactions
// 2. Clean, aggregate to RFM and label customers
// 3. Write labeled customers and train candidate classifiers
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("credit_risk_rfm=info")),
        )
        .init();

    let config = PipelineConfig::load_from_path(CONFIG_PATH)
        .with_context(|| format!("Failed to load configuration from {CONFIG_PATH}"))?;
    let transactions = read_transactions(DATA_PATH)
        .with_context(|| format!("Failed to read transactions from {DATA_PATH}"))?;
    if transactions.is_empty() {
        warn!("No transactions in {}", DATA_PATH);
        return Ok(());
    }
    info!(rows = transactions.len(), "Loaded transactions");

    let mut pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;
    let labeled = pipeline
        .fit_transform(&transactions)
        .context("Feature pipeline failed")?;
    write_labeled(OUTPUT_PATH, &labeled)
        .with_context(|| format!("Failed to write {OUTPUT_PATH}"))?;
    info!(customers = labeled.len(), path = OUTPUT_PATH, "Wrote labeled customers");

    if let Some(model) = pipeline.risk_model() {
        println!("RFM Risk Segments (risk cluster {}):", model.risk_cluster());
        for (idx, centroid) in model.centroids().outer_iter().enumerate() {
            println!(
                "Cluster {idx}: Recency {:.1}, Frequency {:.1}, Monetary {:.2}",
                centroid[0], centroid[1], centroid[2]
            );
        }
    }
    print_segment_summary(&labeled);

    match train_models(&labeled, &pipeline.config().training) {
        Ok(report) => print_training_report(&report),
        Err(e) => warn!(error = %e, "Skipping model training"),
    }

    Ok(())
}
