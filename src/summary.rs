use crate::models::{AnalyticsRow, BacktestResult, SlTpHit};

/// Aggregates result rows into per pair and direction hit counts. A BOTH hit
/// counts toward both the SL and TP tallies; slBeforeTp is only counted when
/// the ordering was actually established. Rows come back sorted by pair, and
/// the stable sort keeps first-seen order for directions within a pair.
pub fn summarize_results(results: &[BacktestResult]) -> Vec<AnalyticsRow> {
    let mut rows: Vec<AnalyticsRow> = Vec::new();

    for result in results {
        let direction = result.direction.label();
        let position = rows
            .iter()
            .position(|row| row.pair == result.pair && row.direction == direction);
        let index = match position {
            Some(index) => index,
            None => {
                rows.push(AnalyticsRow {
                    pair: result.pair.clone(),
                    direction: direction.to_string(),
                    sl_hit_trades: 0,
                    tp_hit_trades: 0,
                    sl_before_tp_trades: 0,
                });
                rows.len() - 1
            }
        };

        let row = &mut rows[index];
        if matches!(result.sl_tp_hit, SlTpHit::Sl | SlTpHit::Both) {
            row.sl_hit_trades += 1;
        }
        if matches!(result.sl_tp_hit, SlTpHit::Tp | SlTpHit::Both) {
            row.tp_hit_trades += 1;
        }
        if result.sl_before_tp == Some(true) {
            row.sl_before_tp_trades += 1;
        }
    }

    rows.sort_by(|a, b| a.pair.cmp(&b.pair));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        result_id, BacktestQuality, Direction, SourceInfo,
    };

    fn row(pair: &str, direction: Direction, hit: SlTpHit, sl_before_tp: Option<bool>) -> BacktestResult {
        BacktestResult {
            id: result_id(pair, 0),
            pair: pair.to_string(),
            direction,
            start_time_utc_ms: 0,
            entry_price: Some(1.0),
            sl_roe_pct: 0.0,
            tp_roe_pct: 0.0,
            leverage: 1.0,
            sl_price: None,
            tp_price: None,
            mfe_pct: None,
            mae_pct: None,
            sl_tp_hit: hit,
            sl_before_tp,
            hit_order: None,
            lookahead_hours: 4.0,
            timeframe: "1h".to_string(),
            quality: BacktestQuality {
                partial: false,
                gap: false,
                missing_minutes: 0,
                error: None,
                debug: None,
            },
            source: SourceInfo::usdm_klines(),
        }
    }

    #[test]
    fn counts_hits_per_pair_and_direction() {
        let results = vec![
            row("BTCUSDT", Direction::Long, SlTpHit::Sl, Some(true)),
            row("BTCUSDT", Direction::Long, SlTpHit::Tp, Some(false)),
            row("BTCUSDT", Direction::Short, SlTpHit::Both, Some(true)),
            row("ETHUSDT", Direction::Long, SlTpHit::None, None),
        ];

        let summary = summarize_results(&results);
        assert_eq!(summary.len(), 3);

        assert_eq!(summary[0].pair, "BTCUSDT");
        assert_eq!(summary[0].direction, "Long");
        assert_eq!(summary[0].sl_hit_trades, 1);
        assert_eq!(summary[0].tp_hit_trades, 1);
        assert_eq!(summary[0].sl_before_tp_trades, 1);

        assert_eq!(summary[1].pair, "BTCUSDT");
        assert_eq!(summary[1].direction, "Short");
        assert_eq!(summary[1].sl_hit_trades, 1);
        assert_eq!(summary[1].tp_hit_trades, 1);
        assert_eq!(summary[1].sl_before_tp_trades, 1);

        assert_eq!(summary[2].pair, "ETHUSDT");
        assert_eq!(summary[2].sl_hit_trades, 0);
        assert_eq!(summary[2].tp_hit_trades, 0);
        assert_eq!(summary[2].sl_before_tp_trades, 0);
    }

    #[test]
    fn unknown_order_does_not_count_as_sl_first() {
        let results = vec![row("BTCUSDT", Direction::Long, SlTpHit::Both, None)];
        let summary = summarize_results(&results);
        assert_eq!(summary[0].sl_hit_trades, 1);
        assert_eq!(summary[0].tp_hit_trades, 1);
        assert_eq!(summary[0].sl_before_tp_trades, 0);
    }

    #[test]
    fn keeps_first_seen_direction_order_within_a_pair() {
        let results = vec![
            row("ETHUSDT", Direction::Short, SlTpHit::Sl, Some(true)),
            row("ETHUSDT", Direction::Long, SlTpHit::Tp, Some(false)),
            row("BTCUSDT", Direction::Long, SlTpHit::None, None),
        ];

        let summary = summarize_results(&results);
        let order: Vec<(&str, &str)> = summary
            .iter()
            .map(|row| (row.pair.as_str(), row.direction.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("BTCUSDT", "Long"), ("ETHUSDT", "Short"), ("ETHUSDT", "Long")]
        );
    }
}
