use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors raised before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Invalid selectedDate '{0}': expected DD/MM/YYYY")]
    InvalidDate(String),
    #[error("Invalid startTime '{0}': expected HH:MM")]
    InvalidTime(String),
    #[error("Invalid direction '{0}': expected LONG or SHORT")]
    InvalidDirection(String),
    #[error("Unsupported timeframe '{0}'")]
    UnsupportedTimeframe(String),
}

/// One kline bar. `open_time` is the bar's opening timestamp in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// Human-facing label used by the summary rows.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Long => "Long",
            Direction::Short => "Short",
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Direction::Long)
    }
}

impl FromStr for Direction {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(InputError::InvalidDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlTpHit {
    None,
    Sl,
    Tp,
    Both,
}

impl SlTpHit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlTpHit::None => "NONE",
            SlTpHit::Sl => "SL",
            SlTpHit::Tp => "TP",
            SlTpHit::Both => "BOTH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitOrder {
    SlFirst,
    TpFirst,
    SameCandleUnknown,
}

impl HitOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitOrder::SlFirst => "SL_FIRST",
            HitOrder::TpFirst => "TP_FIRST",
            HitOrder::SameCandleUnknown => "SAME_CANDLE_UNKNOWN",
        }
    }
}

/// Classified reasons a signal could not be evaluated. Reported as data in
/// `quality.error`, never raised as process errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    SymbolNotOnUsdmFutures,
    SymbolKlineUnavailable,
    StartBeforeListingHistory,
    EntryKlineNotFoundTimestampAlignment,
    NoCandlesReturned,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::SymbolNotOnUsdmFutures => "symbol_not_on_usdm_futures",
            FailureCode::SymbolKlineUnavailable => "symbol_kline_unavailable",
            FailureCode::StartBeforeListingHistory => "start_before_listing_history",
            FailureCode::EntryKlineNotFoundTimestampAlignment => {
                "entry_kline_not_found_timestamp_alignment"
            }
            FailureCode::NoCandlesReturned => "no_candles_returned",
        }
    }
}

/// A raw signal row as submitted: free-form ticker, direction and HH:MM time,
/// validated later by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalInput {
    pub pair: String,
    pub direction: String,
    pub start_time: String,
}

/// Analysis options shared by every signal in a run. All fields accept either
/// JSON strings or numbers (the upstream form submits strings like "5x").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestOptions {
    #[serde(default, deserialize_with = "deserialize_string_opt")]
    pub selected_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_opt")]
    pub leverage: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_opt")]
    pub sl_roe_pct: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_opt")]
    pub tp_roe_pct: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_opt")]
    pub lookahead_hours: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_opt")]
    pub timeframe: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestQuality {
    pub partial: bool,
    pub gap: bool,
    pub missing_minutes: i64,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub venue: String,
    pub endpoint: String,
}

impl SourceInfo {
    pub fn usdm_klines() -> Self {
        SourceInfo {
            venue: "BINANCE_FUTURES_USDM".to_string(),
            endpoint: "/fapi/v1/klines".to_string(),
        }
    }
}

/// One evaluated signal. Failure cases keep the parsed option values and a
/// `quality.error` code instead of prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub id: String,
    pub pair: String,
    pub direction: Direction,
    pub start_time_utc_ms: i64,
    pub entry_price: Option<f64>,
    pub sl_roe_pct: f64,
    pub tp_roe_pct: f64,
    pub leverage: f64,
    pub sl_price: Option<f64>,
    pub tp_price: Option<f64>,
    pub mfe_pct: Option<f64>,
    pub mae_pct: Option<f64>,
    pub sl_tp_hit: SlTpHit,
    pub sl_before_tp: Option<bool>,
    pub hit_order: Option<HitOrder>,
    pub lookahead_hours: f64,
    pub timeframe: String,
    pub quality: BacktestQuality,
    pub source: SourceInfo,
}

/// Per pair and direction hit counts over a batch of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRow {
    pub pair: String,
    pub direction: String,
    pub sl_hit_trades: u32,
    pub tp_hit_trades: u32,
    pub sl_before_tp_trades: u32,
}

pub fn result_id(pair: &str, start_time_utc_ms: i64) -> String {
    format!("{}-{}", pair, start_time_utc_ms)
}

pub(crate) fn deserialize_string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOptVisitor;

    impl<'de> Visitor<'de> for StringOptVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }
    }

    deserializer.deserialize_any(StringOptVisitor)
}
