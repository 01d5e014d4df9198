use crate::models::{Candle, Direction, HitOrder, InputError, SlTpHit};
use chrono::{TimeZone, Utc};

pub const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: f64 = 3_600_000.0;
const DEFAULT_LOOKAHEAD_HOURS: f64 = 4.0;

/// Parses a DD/MM/YYYY date and an HH:MM time of day into UTC epoch
/// milliseconds. Inputs are interpreted as UTC only; invalid calendar dates
/// (e.g. 31/02) are rejected.
pub fn parse_start_time_utc_ms(selected_date: &str, start_time: &str) -> Result<i64, InputError> {
    let (year, month, day) = split_date(selected_date)
        .ok_or_else(|| InputError::InvalidDate(selected_date.to_string()))?;
    let (hour, minute) = split_time(start_time)
        .ok_or_else(|| InputError::InvalidTime(start_time.to_string()))?;

    if hour > 23 || minute > 59 {
        return Err(InputError::InvalidTime(start_time.to_string()));
    }

    let datetime = Utc
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .ok_or_else(|| InputError::InvalidDate(selected_date.to_string()))?;
    Ok(datetime.timestamp_millis())
}

fn split_date(selected_date: &str) -> Option<(i32, u32, u32)> {
    let mut parts = selected_date.split('/');
    let day = parts.next()?;
    let month = parts.next()?;
    let year = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if day.len() != 2 || month.len() != 2 || year.len() != 4 {
        return None;
    }
    if ![day, month, year]
        .iter()
        .all(|part| part.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    Some((year.parse().ok()?, month.parse().ok()?, day.parse().ok()?))
}

fn split_time(start_time: &str) -> Option<(u32, u32)> {
    let (hour, minute) = start_time.split_once(':')?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return None;
    }
    if !hour.chars().chain(minute.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((hour.parse().ok()?, minute.parse().ok()?))
}

/// Leverage strings accept an optional trailing "x" ("5x"). Absent, empty or
/// non-positive values fall back to 1.
pub fn parse_leverage(value: Option<&str>) -> f64 {
    let raw = match value {
        Some(v) if !v.is_empty() => v,
        _ => return 1.0,
    };
    let normalized = raw.to_lowercase();
    let stripped = normalized.strip_suffix('x').unwrap_or(&normalized);
    match stripped.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed > 0.0 => parsed,
        _ => 1.0,
    }
}

/// Absent or unparsable percentages count as 0. Negative values pass through.
pub fn parse_percentage(value: Option<&str>) -> f64 {
    let raw = match value {
        Some(v) => v.trim(),
        None => return 0.0,
    };
    if raw.is_empty() {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => 0.0,
    }
}

pub fn parse_lookahead_hours(value: Option<&str>) -> f64 {
    let raw = match value {
        Some(v) => v.trim(),
        None => return DEFAULT_LOOKAHEAD_HOURS,
    };
    match raw.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed > 0.0 => parsed,
        _ => DEFAULT_LOOKAHEAD_HOURS,
    }
}

pub fn parse_lookahead_ms(value: Option<&str>) -> i64 {
    (parse_lookahead_hours(value) * MS_PER_HOUR).round() as i64
}

/// Floors a timestamp to the opening time of the bar that contains it.
pub fn entry_open_time(start_time_utc_ms: i64, interval_ms: i64) -> i64 {
    start_time_utc_ms.div_euclid(interval_ms) * interval_ms
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerPrices {
    pub sl_price: f64,
    pub tp_price: f64,
}

/// Converts ROE percentages into price levels. ROE is magnified by leverage,
/// so the underlying price move is `roe / leverage` percent.
pub fn calculate_sl_tp_prices(
    entry_price: f64,
    direction: Direction,
    leverage: f64,
    sl_roe_pct: f64,
    tp_roe_pct: f64,
) -> TriggerPrices {
    let safe_leverage = if leverage == 0.0 || leverage.is_nan() {
        1.0
    } else {
        leverage
    };
    let sl_move = sl_roe_pct / safe_leverage / 100.0;
    let tp_move = tp_roe_pct / safe_leverage / 100.0;

    if direction.is_long() {
        TriggerPrices {
            sl_price: entry_price * (1.0 - sl_move),
            tp_price: entry_price * (1.0 + tp_move),
        }
    } else {
        TriggerPrices {
            sl_price: entry_price * (1.0 + sl_move),
            tp_price: entry_price * (1.0 - tp_move),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitDetection {
    pub sl_tp_hit: SlTpHit,
    pub sl_before_tp: Option<bool>,
    pub hit_order: Option<HitOrder>,
    pub sl_hit_ts: Option<i64>,
    pub tp_hit_ts: Option<i64>,
    pub sl_price: Option<f64>,
    pub tp_price: Option<f64>,
}

impl HitDetection {
    fn none(sl_price: Option<f64>, tp_price: Option<f64>) -> Self {
        HitDetection {
            sl_tp_hit: SlTpHit::None,
            sl_before_tp: None,
            hit_order: None,
            sl_hit_ts: None,
            tp_hit_ts: None,
            sl_price,
            tp_price,
        }
    }
}

/// Scans candles in order, recording the first bar time at which each trigger
/// condition holds. A bar can satisfy both conditions; when the first SL and
/// first TP land on the same bar the intrabar path is unknown and the order
/// is reported as `SameCandleUnknown` rather than guessed.
pub fn detect_sl_tp_hits(
    candles: &[Candle],
    entry_price: f64,
    direction: Direction,
    leverage: f64,
    sl_roe_pct: f64,
    tp_roe_pct: f64,
) -> HitDetection {
    if entry_price <= 0.0 {
        return HitDetection::none(None, None);
    }

    let prices = calculate_sl_tp_prices(entry_price, direction, leverage, sl_roe_pct, tp_roe_pct);
    if candles.is_empty() {
        return HitDetection::none(Some(prices.sl_price), Some(prices.tp_price));
    }

    let mut sl_hit_ts: Option<i64> = None;
    let mut tp_hit_ts: Option<i64> = None;

    for candle in candles {
        let tp_hit = if direction.is_long() {
            candle.high >= prices.tp_price
        } else {
            candle.low <= prices.tp_price
        };
        let sl_hit = if direction.is_long() {
            candle.low <= prices.sl_price
        } else {
            candle.high >= prices.sl_price
        };

        if tp_hit && tp_hit_ts.is_none() {
            tp_hit_ts = Some(candle.open_time);
        }
        if sl_hit && sl_hit_ts.is_none() {
            sl_hit_ts = Some(candle.open_time);
        }
        if tp_hit_ts.is_some() && sl_hit_ts.is_some() {
            break;
        }
    }

    let sl_tp_hit = match (sl_hit_ts, tp_hit_ts) {
        (Some(_), Some(_)) => SlTpHit::Both,
        (None, Some(_)) => SlTpHit::Tp,
        (Some(_), None) => SlTpHit::Sl,
        (None, None) => SlTpHit::None,
    };

    let (sl_before_tp, hit_order) = match (sl_tp_hit, sl_hit_ts, tp_hit_ts) {
        (SlTpHit::Both, Some(sl_ts), Some(tp_ts)) => {
            if sl_ts < tp_ts {
                (Some(true), Some(HitOrder::SlFirst))
            } else if tp_ts < sl_ts {
                (Some(false), Some(HitOrder::TpFirst))
            } else {
                (None, Some(HitOrder::SameCandleUnknown))
            }
        }
        _ => (None, None),
    };

    HitDetection {
        sl_tp_hit,
        sl_before_tp,
        hit_order,
        sl_hit_ts,
        tp_hit_ts,
        sl_price: Some(prices.sl_price),
        tp_price: Some(prices.tp_price),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Excursion {
    pub mfe_pct: Option<f64>,
    pub mae_pct: Option<f64>,
}

/// Maximum favorable and adverse excursion over the window, as ROE percent
/// (price move percent times leverage).
pub fn calculate_mfe_mae(
    candles: &[Candle],
    entry_price: f64,
    direction: Direction,
    leverage: f64,
) -> Excursion {
    if candles.is_empty() || entry_price <= 0.0 {
        return Excursion {
            mfe_pct: None,
            mae_pct: None,
        };
    }

    let mut max_high = f64::NEG_INFINITY;
    let mut min_low = f64::INFINITY;
    for candle in candles {
        max_high = max_high.max(candle.high);
        min_low = min_low.min(candle.low);
    }

    let mfe_price_move = if direction.is_long() {
        (max_high - entry_price) / entry_price
    } else {
        (entry_price - min_low) / entry_price
    };
    let mae_price_move = if direction.is_long() {
        (entry_price - min_low) / entry_price
    } else {
        (max_high - entry_price) / entry_price
    };

    Excursion {
        mfe_pct: Some(mfe_price_move * 100.0 * leverage),
        mae_pct: Some(mae_price_move * 100.0 * leverage),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapReport {
    pub gap: bool,
    pub missing_minutes: i64,
}

/// Counts interval steps missing between consecutive bars. Fewer than two
/// bars cannot show a gap.
pub fn detect_missing_minutes(candles: &[Candle], interval_ms: i64) -> GapReport {
    if candles.len() < 2 {
        return GapReport {
            gap: false,
            missing_minutes: 0,
        };
    }

    let mut missing_minutes = 0i64;
    for pair in candles.windows(2) {
        let expected = pair[0].open_time + interval_ms;
        if pair[1].open_time > expected {
            missing_minutes +=
                ((pair[1].open_time - expected) as f64 / interval_ms as f64).round() as i64;
        }
    }

    GapReport {
        gap: missing_minutes > 0,
        missing_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time,
            open,
            high,
            low,
            close,
        }
    }

    #[test]
    fn parses_utc_date_and_time() {
        let ms = parse_start_time_utc_ms("15/04/2024", "12:30").unwrap();
        assert_eq!(ms, 1_713_184_200_000);
    }

    #[test]
    fn accepts_single_digit_hour() {
        let ms = parse_start_time_utc_ms("01/01/2024", "9:05").unwrap();
        assert_eq!(ms, 1_704_099_900_000);
    }

    #[test]
    fn rejects_iso_date_format() {
        assert!(matches!(
            parse_start_time_utc_ms("2024-04-15", "12:30"),
            Err(InputError::InvalidDate(_))
        ));
    }

    #[test]
    fn rejects_date_embedded_in_time() {
        assert!(matches!(
            parse_start_time_utc_ms("15/04/2024", "2024-04-15 12:30"),
            Err(InputError::InvalidTime(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_time() {
        assert!(matches!(
            parse_start_time_utc_ms("15/04/2024", "24:00"),
            Err(InputError::InvalidTime(_))
        ));
        assert!(matches!(
            parse_start_time_utc_ms("15/04/2024", "12:60"),
            Err(InputError::InvalidTime(_))
        ));
    }

    #[test]
    fn rejects_impossible_calendar_date() {
        assert!(matches!(
            parse_start_time_utc_ms("31/02/2024", "12:00"),
            Err(InputError::InvalidDate(_))
        ));
    }

    #[test]
    fn leverage_strips_suffix_and_defaults() {
        assert_eq!(parse_leverage(Some("5x")), 5.0);
        assert_eq!(parse_leverage(Some("10X")), 10.0);
        assert_eq!(parse_leverage(Some("2.5")), 2.5);
        assert_eq!(parse_leverage(None), 1.0);
        assert_eq!(parse_leverage(Some("")), 1.0);
        assert_eq!(parse_leverage(Some("abc")), 1.0);
        assert_eq!(parse_leverage(Some("-3")), 1.0);
        assert_eq!(parse_leverage(Some("0")), 1.0);
    }

    #[test]
    fn percentage_defaults_to_zero() {
        assert_eq!(parse_percentage(Some("150")), 150.0);
        assert_eq!(parse_percentage(Some("-50")), -50.0);
        assert_eq!(parse_percentage(Some("abc")), 0.0);
        assert_eq!(parse_percentage(None), 0.0);
    }

    #[test]
    fn lookahead_defaults_to_four_hours() {
        assert_eq!(parse_lookahead_ms(None), 14_400_000);
        assert_eq!(parse_lookahead_ms(Some("0")), 14_400_000);
        assert_eq!(parse_lookahead_ms(Some("-2")), 14_400_000);
        assert_eq!(parse_lookahead_ms(Some("12")), 43_200_000);
        assert_eq!(parse_lookahead_ms(Some("4.5")), 16_200_000);
        assert_eq!(parse_lookahead_hours(Some("abc")), 4.0);
    }

    #[test]
    fn oversized_lookahead_saturates_to_max_ms() {
        assert_eq!(parse_lookahead_ms(Some("9e99")), i64::MAX);
        assert_eq!(parse_lookahead_ms(Some("1e13")), i64::MAX);
        assert!(parse_lookahead_ms(Some("1e300")) > 0);
    }

    #[test]
    fn entry_open_time_floors_to_bar_boundary() {
        assert_eq!(entry_open_time(1_713_184_200_000, 3_600_000), 1_713_182_400_000);
        assert_eq!(entry_open_time(1_713_182_400_000, 3_600_000), 1_713_182_400_000);
        assert_eq!(entry_open_time(59_999, 60_000), 0);
    }

    #[test]
    fn trigger_prices_scale_roe_by_leverage() {
        let long = calculate_sl_tp_prices(100.0, Direction::Long, 5.0, 100.0, 200.0);
        assert!((long.sl_price - 80.0).abs() < 1e-9);
        assert!((long.tp_price - 140.0).abs() < 1e-9);

        let short = calculate_sl_tp_prices(100.0, Direction::Short, 5.0, 100.0, 200.0);
        assert!((short.sl_price - 120.0).abs() < 1e-9);
        assert!((short.tp_price - 60.0).abs() < 1e-9);
    }

    #[test]
    fn trigger_prices_treat_zero_leverage_as_one() {
        let prices = calculate_sl_tp_prices(100.0, Direction::Long, 0.0, 10.0, 20.0);
        assert!((prices.sl_price - 90.0).abs() < 1e-9);
        assert!((prices.tp_price - 120.0).abs() < 1e-9);
    }

    #[test]
    fn detects_no_hit_inside_range() {
        let candles = [candle(0, 100.0, 101.0, 99.0, 100.5)];
        let hits = detect_sl_tp_hits(&candles, 100.0, Direction::Long, 1.0, 5.0, 5.0);
        assert_eq!(hits.sl_tp_hit, SlTpHit::None);
        assert_eq!(hits.hit_order, None);
        assert_eq!(hits.sl_price, Some(95.0));
        assert_eq!(hits.tp_price, Some(105.0));
    }

    #[test]
    fn detects_tp_only_for_long() {
        let candles = [
            candle(0, 100.0, 101.0, 99.0, 100.5),
            candle(60_000, 100.5, 106.0, 100.0, 105.5),
        ];
        let hits = detect_sl_tp_hits(&candles, 100.0, Direction::Long, 1.0, 10.0, 5.0);
        assert_eq!(hits.sl_tp_hit, SlTpHit::Tp);
        assert_eq!(hits.tp_hit_ts, Some(60_000));
        assert_eq!(hits.sl_hit_ts, None);
        assert_eq!(hits.sl_before_tp, None);
    }

    #[test]
    fn orders_hits_across_bars() {
        let candles = [
            candle(0, 100.0, 101.0, 94.0, 95.0),
            candle(60_000, 95.0, 106.0, 95.0, 105.5),
        ];
        let hits = detect_sl_tp_hits(&candles, 100.0, Direction::Long, 1.0, 5.0, 5.0);
        assert_eq!(hits.sl_tp_hit, SlTpHit::Both);
        assert_eq!(hits.hit_order, Some(HitOrder::SlFirst));
        assert_eq!(hits.sl_before_tp, Some(true));
        assert_eq!(hits.sl_hit_ts, Some(0));
        assert_eq!(hits.tp_hit_ts, Some(60_000));

        let reversed = [
            candle(0, 100.0, 106.0, 99.0, 105.0),
            candle(60_000, 105.0, 105.5, 94.0, 95.0),
        ];
        let hits = detect_sl_tp_hits(&reversed, 100.0, Direction::Long, 1.0, 5.0, 5.0);
        assert_eq!(hits.hit_order, Some(HitOrder::TpFirst));
        assert_eq!(hits.sl_before_tp, Some(false));
    }

    #[test]
    fn same_bar_touch_is_reported_unknown() {
        let candles = [candle(0, 100.0, 106.0, 94.0, 100.0)];
        let hits = detect_sl_tp_hits(&candles, 100.0, Direction::Long, 1.0, 5.0, 5.0);
        assert_eq!(hits.sl_tp_hit, SlTpHit::Both);
        assert_eq!(hits.hit_order, Some(HitOrder::SameCandleUnknown));
        assert_eq!(hits.sl_before_tp, None);
    }

    #[test]
    fn short_direction_mirrors_triggers() {
        let candles = [
            candle(0, 100.0, 100.5, 94.0, 95.0),
            candle(60_000, 95.0, 106.0, 95.0, 105.5),
        ];
        let hits = detect_sl_tp_hits(&candles, 100.0, Direction::Short, 1.0, 5.0, 5.0);
        assert_eq!(hits.sl_tp_hit, SlTpHit::Both);
        // Short profits on the way down, so the drop at bar 0 is the TP touch.
        assert_eq!(hits.hit_order, Some(HitOrder::TpFirst));
        assert_eq!(hits.sl_before_tp, Some(false));
    }

    #[test]
    fn non_positive_entry_yields_no_prices() {
        let candles = [candle(0, 100.0, 106.0, 94.0, 100.0)];
        let hits = detect_sl_tp_hits(&candles, 0.0, Direction::Long, 1.0, 5.0, 5.0);
        assert_eq!(hits.sl_tp_hit, SlTpHit::None);
        assert_eq!(hits.sl_price, None);
        assert_eq!(hits.tp_price, None);
    }

    #[test]
    fn empty_series_keeps_trigger_prices() {
        let hits = detect_sl_tp_hits(&[], 100.0, Direction::Long, 1.0, 5.0, 5.0);
        assert_eq!(hits.sl_tp_hit, SlTpHit::None);
        assert_eq!(hits.sl_price, Some(95.0));
        assert_eq!(hits.tp_price, Some(105.0));
    }

    #[test]
    fn excursion_scales_with_leverage_and_mirrors_direction() {
        let candles = [
            candle(0, 100.0, 110.0, 95.0, 105.0),
            candle(60_000, 105.0, 112.0, 90.0, 95.0),
        ];

        let long = calculate_mfe_mae(&candles, 100.0, Direction::Long, 2.0);
        assert!((long.mfe_pct.unwrap() - 24.0).abs() < 1e-9);
        assert!((long.mae_pct.unwrap() - 20.0).abs() < 1e-9);

        let short = calculate_mfe_mae(&candles, 100.0, Direction::Short, 2.0);
        assert!((short.mfe_pct.unwrap() - 20.0).abs() < 1e-9);
        assert!((short.mae_pct.unwrap() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn excursion_is_null_without_data_or_entry() {
        let empty = calculate_mfe_mae(&[], 100.0, Direction::Long, 1.0);
        assert_eq!(empty.mfe_pct, None);
        assert_eq!(empty.mae_pct, None);

        let candles = [candle(0, 100.0, 110.0, 95.0, 105.0)];
        let no_entry = calculate_mfe_mae(&candles, 0.0, Direction::Long, 1.0);
        assert_eq!(no_entry.mfe_pct, None);
        assert_eq!(no_entry.mae_pct, None);
    }

    #[test]
    fn counts_missing_bars() {
        let contiguous = [
            candle(0, 1.0, 1.0, 1.0, 1.0),
            candle(60_000, 1.0, 1.0, 1.0, 1.0),
            candle(120_000, 1.0, 1.0, 1.0, 1.0),
        ];
        let report = detect_missing_minutes(&contiguous, MS_PER_MINUTE);
        assert!(!report.gap);
        assert_eq!(report.missing_minutes, 0);

        let gappy = [
            candle(0, 1.0, 1.0, 1.0, 1.0),
            candle(60_000, 1.0, 1.0, 1.0, 1.0),
            candle(240_000, 1.0, 1.0, 1.0, 1.0),
        ];
        let report = detect_missing_minutes(&gappy, MS_PER_MINUTE);
        assert!(report.gap);
        assert_eq!(report.missing_minutes, 2);
    }

    #[test]
    fn short_series_cannot_show_gaps() {
        let report = detect_missing_minutes(&[candle(0, 1.0, 1.0, 1.0, 1.0)], MS_PER_MINUTE);
        assert!(!report.gap);
        assert_eq!(report.missing_minutes, 0);
    }
}
