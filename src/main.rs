use clap::{Parser, Subcommand};
use log::info;
use replay::{
    commands::{batch, resolve, run},
    config::RuntimeConfig,
    runner::BacktestRunner,
};
use std::path::PathBuf;

const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "A signal replay backtester for Binance USDT-M futures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a single signal and print the result row as JSON
    Run {
        /// Ticker or pair, e.g. BTC or BTCUSDT
        #[arg(long)]
        pair: String,
        /// Trade direction (LONG or SHORT)
        #[arg(long)]
        direction: String,
        /// Signal time of day in UTC, e.g. 14:05
        #[arg(long)]
        time: String,
        /// Signal date as DD/MM/YYYY
        #[arg(long)]
        date: String,
        /// Position leverage, e.g. 10 or 10x
        #[arg(long)]
        leverage: Option<String>,
        /// Stop loss distance as ROE percent
        #[arg(long = "sl-roe")]
        sl_roe: Option<String>,
        /// Take profit distance as ROE percent
        #[arg(long = "tp-roe")]
        tp_roe: Option<String>,
        /// Hours of price action to scan after the signal
        #[arg(long)]
        lookahead_hours: Option<String>,
        /// Entry timeframe (1m, 5m, 15m, 1h, 4h or 1d)
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Backtest a batch of signals from a JSON file
    Batch {
        /// Path to a JSON file with an options block and a signals array
        file: PathBuf,
        /// Maximum number of signals evaluated at once
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Write the report to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Resolve a ticker to its USDT-M futures contract symbol
    Resolve {
        /// Ticker or pair to resolve
        ticker: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Cli { command } = cli;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RuntimeConfig::from_env()?;
    info!("Starting replay against {}", config.base_url);
    let runner = BacktestRunner::new(config)?;

    match command {
        Commands::Run {
            pair,
            direction,
            time,
            date,
            leverage,
            sl_roe,
            tp_roe,
            lookahead_hours,
            timeframe,
        } => {
            run::run(
                &runner,
                &pair,
                &direction,
                &time,
                &date,
                leverage,
                sl_roe,
                tp_roe,
                lookahead_hours,
                timeframe,
            )
            .await?;
        }
        Commands::Batch {
            file,
            concurrency,
            output,
        } => {
            batch::run(&runner, &file, concurrency, output.as_deref()).await?;
        }
        Commands::Resolve { ticker } => {
            resolve::run(&runner, &ticker).await?;
        }
    }

    Ok(())
}
