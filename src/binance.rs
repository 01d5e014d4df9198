use crate::config::RuntimeConfig;
use crate::models::Candle;
use crate::retry::RetryPolicy;
use crate::timeframe::Interval;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::{sleep, timeout};

pub const MAX_KLINES_LIMIT: u32 = 1500;
const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";
const KLINES_PATH: &str = "/fapi/v1/klines";

/// Shared USDT-M futures market data client. Cheap to clone; all clones share
/// the same connection pool.
#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    config: RuntimeConfig,
    retry: RetryPolicy,
}

/// A paged fetch result. `partial` means the upstream stopped serving data
/// before the requested window was covered.
#[derive(Debug, Clone)]
pub struct PagedKlines {
    pub candles: Vec<Candle>,
    pub partial: bool,
}

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Deserialize)]
struct ExchangeSymbol {
    symbol: String,
}

impl BinanceClient {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(BinanceClient {
            http,
            config,
            retry: RetryPolicy::default(),
        })
    }

    /// All currently listed contract symbols, in exchange order.
    pub async fn fetch_exchange_info(&self) -> Result<Vec<String>> {
        let response = self.get_with_retry(EXCHANGE_INFO_PATH, &[]).await?;
        if !response.status().is_success() {
            bail!(
                "Exchange info request failed: {}",
                response.status().as_u16()
            );
        }
        let payload: ExchangeInfo = response
            .json()
            .await
            .context("failed to parse exchange info payload")?;
        Ok(payload
            .symbols
            .into_iter()
            .map(|entry| entry.symbol)
            .collect())
    }

    /// Fetches `[start_time, end_time)` klines page by page. Rows are deduped
    /// by open time (later pages win) and returned in ascending order. The
    /// whole fetch is bounded by the configured deadline.
    pub async fn fetch_klines_paged(
        &self,
        symbol: &str,
        interval: Interval,
        start_time: i64,
        end_time: i64,
        limit: Option<u32>,
    ) -> Result<PagedKlines> {
        let fetch = self.fetch_klines_pages(symbol, interval, start_time, end_time, limit);
        match timeout(self.config.fetch_deadline, fetch).await {
            Ok(result) => result,
            Err(_) => bail!(
                "Kline fetch for {} {} exceeded the {}s deadline",
                symbol,
                interval.as_str(),
                self.config.fetch_deadline.as_secs()
            ),
        }
    }

    async fn fetch_klines_pages(
        &self,
        symbol: &str,
        interval: Interval,
        start_time: i64,
        end_time: i64,
        limit: Option<u32>,
    ) -> Result<PagedKlines> {
        let interval_ms = interval.duration_ms();
        let page_limit = limit.unwrap_or(MAX_KLINES_LIMIT);
        let mut current_start = start_time;
        let mut by_open_time: HashMap<i64, Candle> = HashMap::new();
        let mut partial = false;

        while current_start < end_time {
            let query = [
                ("symbol", symbol.to_string()),
                ("interval", interval.as_str().to_string()),
                ("startTime", current_start.to_string()),
                ("endTime", end_time.to_string()),
                ("limit", page_limit.to_string()),
            ];
            let response = self.get_with_retry(KLINES_PATH, &query).await?;
            if !response.status().is_success() {
                bail!("Binance request failed: {}", response.status().as_u16());
            }
            let rows: Vec<Value> = response
                .json()
                .await
                .context("failed to parse klines payload")?;
            if rows.is_empty() {
                partial = true;
                break;
            }

            for row in &rows {
                let candle = parse_kline_row(row)?;
                // The upstream treats endTime as inclusive; trim to [start, end).
                if candle.open_time >= end_time {
                    continue;
                }
                by_open_time.insert(candle.open_time, candle);
            }

            let last_open_time = parse_kline_row(&rows[rows.len() - 1])?.open_time;
            debug!(
                "Fetched {} {} klines for {} (cursor {})",
                rows.len(),
                interval.as_str(),
                symbol,
                current_start
            );
            if last_open_time <= current_start {
                partial = true;
                break;
            }
            current_start = last_open_time + interval_ms;
        }

        let mut candles: Vec<Candle> = by_open_time.into_values().collect();
        candles.sort_by_key(|candle| candle.open_time);
        Ok(PagedKlines { candles, partial })
    }

    /// Single unbounded request for the most recent `limit` bars.
    pub async fn fetch_klines_once(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let response = self.get_with_retry(KLINES_PATH, &query).await?;
        if !response.status().is_success() {
            bail!("Binance request failed: {}", response.status().as_u16());
        }
        let rows: Vec<Value> = response
            .json()
            .await
            .context("failed to parse klines payload")?;
        rows.iter().map(parse_kline_row).collect()
    }

    async fn get_with_retry(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..self.retry.max_attempts {
            let failure = match self.http.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || !RetryPolicy::is_retryable_status(status) {
                        return Ok(response);
                    }
                    anyhow!("Binance request failed: {}", status.as_u16())
                }
                Err(err) => anyhow::Error::new(err).context(format!("GET {} failed", url)),
            };

            if attempt + 1 < self.retry.max_attempts {
                let delay = self.retry.delay(attempt);
                warn!(
                    "Attempt {}/{} for GET {} failed: {}. Retrying in {}ms.",
                    attempt + 1,
                    self.retry.max_attempts,
                    path,
                    failure,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            last_error = Some(failure);
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Binance request failed")))
    }
}

/// Kline rows arrive as JSON arrays with numeric strings for prices. Only the
/// first five fields matter here.
fn parse_kline_row(row: &Value) -> Result<Candle> {
    let fields = row
        .as_array()
        .ok_or_else(|| anyhow!("kline row is not an array"))?;
    if fields.len() < 5 {
        bail!("kline row has {} fields, expected at least 5", fields.len());
    }
    let open_time = fields[0]
        .as_i64()
        .ok_or_else(|| anyhow!("kline openTime is not an integer"))?;
    Ok(Candle {
        open_time,
        open: parse_price(&fields[1], "open")?,
        high: parse_price(&fields[2], "high")?,
        low: parse_price(&fields[3], "low")?,
        close: parse_price(&fields[4], "close")?,
    })
}

fn parse_price(value: &Value, field: &str) -> Result<f64> {
    match value {
        Value::String(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("kline {} '{}' is not numeric", field, raw)),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| anyhow!("kline {} is out of range", field)),
        other => Err(anyhow!("kline {} has unexpected type: {}", field, other)),
    }
}
