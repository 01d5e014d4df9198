use crate::backtest::{entry_open_time, MS_PER_MINUTE};
use crate::binance::BinanceClient;
use crate::models::FailureCode;
use crate::timeframe::Interval;
use anyhow::Result;
use log::warn;
use serde_json::{json, Map, Value};

const ENTRY_WINDOW_LIMIT: u32 = 2;
const FALLBACK_WINDOW_LIMIT: u32 = 5;
/// 2000-01-01T00:00:00Z, safely before any contract listing.
const EPOCH_FLOOR_MS: i64 = 946_684_800_000;

/// The bar that contains the signal time: `[open_time, end_time]` with the
/// end bound inclusive, matching the upstream endTime convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryWindow {
    pub open_time: i64,
    pub end_time: i64,
}

impl EntryWindow {
    pub fn locate(start_time_utc_ms: i64, interval: Interval) -> Self {
        let tf_ms = interval.duration_ms();
        let open_time = entry_open_time(start_time_utc_ms, tf_ms);
        EntryWindow {
            open_time,
            end_time: open_time + tf_ms - 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryOutcome {
    Resolved { price: f64, partial: bool },
    Failed(FailureCode),
}

/// Outcome of the entry-bar search plus the operator debug context collected
/// along the way.
#[derive(Debug, Clone)]
pub struct EntryLookup {
    pub outcome: EntryOutcome,
    pub debug: Map<String, Value>,
}

/// Locates the entry bar for a signal. A miss on the exact window escalates
/// through a widened window, a latest-bar availability probe and an
/// earliest-history probe, so that the failure is classified rather than
/// reported as a bare miss.
pub async fn resolve_entry(
    client: &BinanceClient,
    symbol: &str,
    interval: Interval,
    window: EntryWindow,
    start_time_utc_ms: i64,
    mut debug: Map<String, Value>,
) -> Result<EntryLookup> {
    let tf_ms = interval.duration_ms();
    debug.insert(
        "entryReq".to_string(),
        json!({
            "symbol": symbol,
            "interval": interval.as_str(),
            "startTime": window.open_time,
            "endTime": window.end_time,
            "limit": ENTRY_WINDOW_LIMIT,
        }),
    );

    let entry_fetch = client
        .fetch_klines_paged(
            symbol,
            interval,
            window.open_time,
            window.end_time,
            Some(ENTRY_WINDOW_LIMIT),
        )
        .await?;
    let mut entry_bar = entry_fetch.candles.first().copied();

    if entry_bar.is_none() {
        warn!(
            "Entry window empty for {} {} at {}; widening search",
            symbol,
            interval.as_str(),
            window.open_time
        );
        let fallback = client
            .fetch_klines_paged(
                symbol,
                interval,
                window.open_time - tf_ms,
                window.end_time,
                Some(FALLBACK_WINDOW_LIMIT),
            )
            .await?;
        entry_bar = fallback
            .candles
            .iter()
            .find(|candle| candle.open_time == window.open_time)
            .copied();
    }

    if let Some(bar) = entry_bar {
        return Ok(EntryLookup {
            outcome: EntryOutcome::Resolved {
                price: bar.open,
                partial: entry_fetch.partial,
            },
            debug,
        });
    }

    // No boundary bar in either window; figure out why.
    let latest = client.fetch_klines_once(symbol, interval, 1).await?;
    debug.insert("latestReqOk".to_string(), json!(!latest.is_empty()));
    debug.insert(
        "latestKlineOpenTime".to_string(),
        latest
            .first()
            .map_or(Value::Null, |candle| json!(candle.open_time)),
    );
    if latest.is_empty() {
        return Ok(EntryLookup {
            outcome: EntryOutcome::Failed(FailureCode::SymbolKlineUnavailable),
            debug,
        });
    }

    let earliest = client
        .fetch_klines_paged(
            symbol,
            Interval::M1,
            EPOCH_FLOOR_MS,
            start_time_utc_ms + MS_PER_MINUTE,
            Some(1),
        )
        .await?;
    let earliest_open = earliest.candles.first().map(|candle| candle.open_time);
    debug.insert(
        "earliestKlineOpenTime".to_string(),
        earliest_open.map_or(Value::Null, |ts| json!(ts)),
    );
    if let Some(earliest_open) = earliest_open {
        if start_time_utc_ms < earliest_open {
            return Ok(EntryLookup {
                outcome: EntryOutcome::Failed(FailureCode::StartBeforeListingHistory),
                debug,
            });
        }
    }

    Ok(EntryLookup {
        outcome: EntryOutcome::Failed(FailureCode::EntryKlineNotFoundTimestampAlignment),
        debug,
    })
}
