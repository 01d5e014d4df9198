use crate::models::InputError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kline interval supported by the USDT-M klines endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::M1 => 60_000,
            Interval::M5 => 300_000,
            Interval::M15 => 900_000,
            Interval::H1 => 3_600_000,
            Interval::H4 => 14_400_000,
            Interval::D1 => 86_400_000,
        }
    }

    /// Maps an optional form timeframe to an interval. Absent means 1h; the
    /// long labels match the upstream form's dropdown entries.
    pub fn from_timeframe(timeframe: Option<&str>) -> Result<Interval, InputError> {
        match timeframe {
            None => Ok(Interval::H1),
            Some(raw) => raw.parse(),
        }
    }
}

impl FromStr for Interval {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1 minute" => Ok(Interval::M1),
            "5m" | "5 minutes" => Ok(Interval::M5),
            "15m" | "15 minutes" => Ok(Interval::M15),
            "1h" | "1 hour" => Ok(Interval::H1),
            "4h" | "4 hours" => Ok(Interval::H4),
            "1d" | "1 day" => Ok(Interval::D1),
            _ => Err(InputError::UnsupportedTimeframe(s.trim().to_string())),
        }
    }
}
