use crate::models::{BacktestOptions, SignalInput};
use crate::runner::BacktestRunner;
use anyhow::{Context, Result};
use log::info;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    runner: &BacktestRunner,
    pair: &str,
    direction: &str,
    time: &str,
    date: &str,
    leverage: Option<String>,
    sl_roe: Option<String>,
    tp_roe: Option<String>,
    lookahead_hours: Option<String>,
    timeframe: Option<String>,
) -> Result<()> {
    info!("Received backtest command for {} {} at {} {}", pair, direction, date, time);

    let signal = SignalInput {
        pair: pair.to_string(),
        direction: direction.to_string(),
        start_time: time.to_string(),
    };
    let options = BacktestOptions {
        selected_date: Some(date.to_string()),
        leverage,
        sl_roe_pct: sl_roe,
        tp_roe_pct: tp_roe,
        lookahead_hours,
        timeframe,
    };

    let result = runner.run_signal(&signal, &options).await?;
    if let Some(error) = &result.quality.error {
        info!("Backtest for {} completed with error: {}", result.pair, error);
    }

    let rendered =
        serde_json::to_string_pretty(&result).context("Failed to serialize backtest result")?;
    println!("{rendered}");

    Ok(())
}
