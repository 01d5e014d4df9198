use crate::backtest::{
    calculate_mfe_mae, detect_missing_minutes, detect_sl_tp_hits, parse_leverage,
    parse_lookahead_hours, parse_lookahead_ms, parse_percentage, parse_start_time_utc_ms,
    MS_PER_MINUTE,
};
use crate::binance::BinanceClient;
use crate::config::RuntimeConfig;
use crate::entry::{resolve_entry, EntryOutcome, EntryWindow};
use crate::models::{
    result_id, BacktestOptions, BacktestQuality, BacktestResult, Direction, FailureCode,
    InputError, SignalInput, SlTpHit, SourceInfo,
};
use crate::symbols::SymbolDirectory;
use crate::timeframe::Interval;
use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};

/// Evaluates signals against historical USDT-M futures data. Resolution and
/// data-quality problems become partial result rows; only malformed input is
/// a hard error.
pub struct BacktestRunner {
    client: BinanceClient,
    symbols: SymbolDirectory,
}

/// A signal and its options with every field parsed up front, before any
/// network traffic.
struct ParsedRequest {
    pair: String,
    pair_upper: String,
    direction: Direction,
    signal_time: String,
    selected_date: String,
    start_time_utc_ms: i64,
    lookahead_ms: i64,
    interval: Interval,
    window: EntryWindow,
    leverage: f64,
    sl_roe_pct: f64,
    tp_roe_pct: f64,
    lookahead_hours: f64,
}

impl ParsedRequest {
    fn parse(signal: &SignalInput, options: &BacktestOptions) -> Result<Self, InputError> {
        if signal.pair.is_empty() {
            return Err(InputError::MissingField("pair"));
        }
        if signal.direction.is_empty() {
            return Err(InputError::MissingField("direction"));
        }
        if signal.start_time.is_empty() {
            return Err(InputError::MissingField("startTime"));
        }
        let selected_date = match options.selected_date.as_deref() {
            None | Some("") => return Err(InputError::MissingField("selectedDate")),
            Some(raw) => raw,
        };

        let direction = signal.direction.parse::<Direction>()?;
        let start_time_utc_ms = parse_start_time_utc_ms(selected_date, &signal.start_time)?;
        let interval = Interval::from_timeframe(options.timeframe.as_deref())?;

        Ok(ParsedRequest {
            pair: signal.pair.clone(),
            pair_upper: signal.pair.to_uppercase(),
            direction,
            signal_time: signal.start_time.clone(),
            selected_date: selected_date.to_string(),
            start_time_utc_ms,
            lookahead_ms: parse_lookahead_ms(options.lookahead_hours.as_deref()),
            interval,
            window: EntryWindow::locate(start_time_utc_ms, interval),
            leverage: parse_leverage(options.leverage.as_deref()),
            sl_roe_pct: parse_percentage(options.sl_roe_pct.as_deref()),
            tp_roe_pct: parse_percentage(options.tp_roe_pct.as_deref()),
            lookahead_hours: parse_lookahead_hours(options.lookahead_hours.as_deref()),
        })
    }
}

impl BacktestRunner {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let client = BinanceClient::new(config)?;
        let symbols = SymbolDirectory::new(client.clone());
        Ok(BacktestRunner { client, symbols })
    }

    pub fn symbols(&self) -> &SymbolDirectory {
        &self.symbols
    }

    /// Evaluates one signal. Fails only on malformed input; everything after
    /// validation is reported inside the returned row.
    pub async fn run_signal(
        &self,
        signal: &SignalInput,
        options: &BacktestOptions,
    ) -> Result<BacktestResult> {
        let request = ParsedRequest::parse(signal, options)?;
        Ok(self.evaluate(&request).await)
    }

    /// Evaluates a batch sharing one options block. Every row is validated
    /// before any row runs; evaluation then proceeds with bounded
    /// concurrency, preserving input order in the output.
    pub async fn run_batch(
        &self,
        signals: &[SignalInput],
        options: &BacktestOptions,
        concurrency: usize,
    ) -> Result<Vec<BacktestResult>> {
        let mut parsed_rows = Vec::with_capacity(signals.len());
        for (index, signal) in signals.iter().enumerate() {
            let request = ParsedRequest::parse(signal, options)
                .with_context(|| format!("signal {} ({})", index + 1, signal.pair))?;
            parsed_rows.push(request);
        }
        if parsed_rows.is_empty() {
            return Ok(Vec::new());
        }

        let worker_limit = std::cmp::max(1, std::cmp::min(parsed_rows.len(), concurrency));
        info!(
            "Evaluating {} signal(s) with {} concurrent worker{}",
            parsed_rows.len(),
            worker_limit,
            if worker_limit == 1 { "" } else { "s" }
        );

        let pb = ProgressBar::new(parsed_rows.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut pending = parsed_rows.iter().enumerate();
        let mut in_flight: FuturesUnordered<_> = FuturesUnordered::new();
        for _ in 0..worker_limit {
            if let Some((index, request)) = pending.next() {
                in_flight.push(self.evaluate_indexed(index, request));
            }
        }

        let mut results: Vec<Option<BacktestResult>> = Vec::new();
        results.resize_with(parsed_rows.len(), || None);
        while let Some((index, result)) = in_flight.next().await {
            results[index] = Some(result);
            pb.inc(1);
            if let Some((next_index, request)) = pending.next() {
                in_flight.push(self.evaluate_indexed(next_index, request));
            }
        }
        pb.finish_with_message("Backtesting complete");

        Ok(results.into_iter().flatten().collect())
    }

    async fn evaluate_indexed(
        &self,
        index: usize,
        request: &ParsedRequest,
    ) -> (usize, BacktestResult) {
        (index, self.evaluate(request).await)
    }

    async fn evaluate(&self, request: &ParsedRequest) -> BacktestResult {
        debug!(
            "Backtesting {} {} at {}",
            request.pair,
            request.direction.as_str(),
            request.start_time_utc_ms
        );

        let resolved = match self.symbols.resolve(&request.pair).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!("Symbol resolution failed for {}: {}", request.pair, err);
                return self.failure_result(
                    request,
                    request.pair_upper.clone(),
                    err.to_string(),
                    base_debug(request, &request.pair),
                );
            }
        };
        let Some(symbol) = resolved else {
            return self.failure_result(
                request,
                request.pair_upper.clone(),
                FailureCode::SymbolNotOnUsdmFutures.as_str().to_string(),
                base_debug(request, &request.pair),
            );
        };

        match self.evaluate_resolved(request, &symbol).await {
            Ok(result) => result,
            Err(err) => {
                warn!("Backtest for {} failed: {}", symbol, err);
                self.failure_result(request, symbol.clone(), err.to_string(), base_debug(request, &symbol))
            }
        }
    }

    async fn evaluate_resolved(
        &self,
        request: &ParsedRequest,
        symbol: &str,
    ) -> Result<BacktestResult> {
        let lookup = resolve_entry(
            &self.client,
            symbol,
            request.interval,
            request.window,
            request.start_time_utc_ms,
            base_debug(request, symbol),
        )
        .await?;

        let (entry_price, entry_partial) = match lookup.outcome {
            EntryOutcome::Resolved { price, partial } => (price, partial),
            EntryOutcome::Failed(code) => {
                return Ok(self.failure_result(
                    request,
                    symbol.to_string(),
                    code.as_str().to_string(),
                    lookup.debug,
                ));
            }
        };

        // The lookahead window is always scanned at minute resolution,
        // independent of the entry timeframe.
        let lookahead = self
            .client
            .fetch_klines_paged(
                symbol,
                Interval::M1,
                request.start_time_utc_ms,
                request.start_time_utc_ms.saturating_add(request.lookahead_ms),
                None,
            )
            .await?;

        let candles = &lookahead.candles;
        let gap_report = detect_missing_minutes(candles, MS_PER_MINUTE);
        let hits = detect_sl_tp_hits(
            candles,
            entry_price,
            request.direction,
            request.leverage,
            request.sl_roe_pct,
            request.tp_roe_pct,
        );
        let excursion = calculate_mfe_mae(candles, entry_price, request.direction, request.leverage);

        let mut result = BacktestResult {
            id: result_id(symbol, request.start_time_utc_ms),
            pair: symbol.to_string(),
            direction: request.direction,
            start_time_utc_ms: request.start_time_utc_ms,
            entry_price: Some(entry_price),
            sl_roe_pct: request.sl_roe_pct,
            tp_roe_pct: request.tp_roe_pct,
            leverage: request.leverage,
            sl_price: hits.sl_price,
            tp_price: hits.tp_price,
            mfe_pct: excursion.mfe_pct,
            mae_pct: excursion.mae_pct,
            sl_tp_hit: hits.sl_tp_hit,
            sl_before_tp: hits.sl_before_tp,
            hit_order: hits.hit_order,
            lookahead_hours: request.lookahead_hours,
            timeframe: request.interval.as_str().to_string(),
            quality: BacktestQuality {
                partial: gap_report.gap || lookahead.partial || entry_partial,
                gap: gap_report.gap,
                missing_minutes: gap_report.missing_minutes,
                error: None,
                debug: None,
            },
            source: SourceInfo::usdm_klines(),
        };

        if candles.is_empty() {
            result.quality.partial = true;
            result.quality.error = Some(FailureCode::NoCandlesReturned.as_str().to_string());
            result.mfe_pct = None;
            result.mae_pct = None;
            result.sl_tp_hit = SlTpHit::None;
        }

        Ok(result)
    }

    fn failure_result(
        &self,
        request: &ParsedRequest,
        pair: String,
        error: String,
        debug: Map<String, Value>,
    ) -> BacktestResult {
        BacktestResult {
            id: result_id(&pair, request.start_time_utc_ms),
            pair,
            direction: request.direction,
            start_time_utc_ms: request.start_time_utc_ms,
            entry_price: None,
            sl_roe_pct: request.sl_roe_pct,
            tp_roe_pct: request.tp_roe_pct,
            leverage: request.leverage,
            sl_price: None,
            tp_price: None,
            mfe_pct: None,
            mae_pct: None,
            sl_tp_hit: SlTpHit::None,
            sl_before_tp: None,
            hit_order: None,
            lookahead_hours: request.lookahead_hours,
            timeframe: request.interval.as_str().to_string(),
            quality: BacktestQuality {
                partial: true,
                gap: false,
                missing_minutes: 0,
                error: Some(error),
                debug: Some(Value::Object(debug)),
            },
            source: SourceInfo::usdm_klines(),
        }
    }
}

fn base_debug(request: &ParsedRequest, requested_symbol: &str) -> Map<String, Value> {
    let mut debug = Map::new();
    debug.insert("requestedSymbol".to_string(), json!(requested_symbol));
    debug.insert("interval".to_string(), json!(request.interval.as_str()));
    debug.insert("selectedDate".to_string(), json!(request.selected_date));
    debug.insert("signalTime".to_string(), json!(request.signal_time));
    debug.insert("startTsUtcMs".to_string(), json!(request.start_time_utc_ms));
    debug.insert("entryOpenTime".to_string(), json!(request.window.open_time));
    debug.insert("entryEndTime".to_string(), json!(request.window.end_time));
    debug
}
