use crate::runner::BacktestRunner;
use anyhow::{bail, Result};
use log::info;

pub async fn run(runner: &BacktestRunner, ticker: &str) -> Result<()> {
    match runner.symbols().resolve(ticker).await? {
        Some(symbol) => {
            info!("Resolved {} to {}", ticker, symbol);
            println!("{symbol}");
            Ok(())
        }
        None => bail!("No USDT-M futures contract matches {}", ticker),
    }
}
