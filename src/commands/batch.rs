use crate::models::{AnalyticsRow, BacktestOptions, BacktestResult, SignalInput};
use crate::runner::BacktestRunner;
use crate::summary::summarize_results;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct BatchFile {
    #[serde(default)]
    options: BacktestOptions,
    #[serde(default)]
    signals: Vec<SignalInput>,
}

#[derive(Serialize)]
struct BatchReport {
    results: Vec<BacktestResult>,
    summary: Vec<AnalyticsRow>,
}

pub async fn run(
    runner: &BacktestRunner,
    file: &Path,
    concurrency: usize,
    output: Option<&Path>,
) -> Result<()> {
    info!("Loading signal batch from {}", file.display());
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read signal batch from {}", file.display()))?;
    let batch: BatchFile = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid signal batch in {}", file.display()))?;

    if batch.signals.is_empty() {
        info!("Signal batch {} contains no signals", file.display());
    }

    let results = runner
        .run_batch(&batch.signals, &batch.options, concurrency)
        .await?;

    let partial_count = results.iter().filter(|row| row.quality.partial).count();
    info!(
        "Completed {} backtest(s), {} partial",
        results.len(),
        partial_count
    );

    let report = BatchReport {
        summary: summarize_results(&results),
        results,
    };
    let rendered =
        serde_json::to_string_pretty(&report).context("Failed to serialize batch report")?;

    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write batch report to {}", path.display()))?;
            info!("Batch report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
