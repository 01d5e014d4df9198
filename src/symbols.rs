use crate::binance::BinanceClient;
use anyhow::Result;
use log::info;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 60);
const QUOTE_SUFFIX: &str = "USDT";
const DENOMINATION_PREFIXES: [&str; 2] = ["1000", "10000"];

struct SymbolSnapshot {
    set: HashSet<String>,
    list: Vec<String>,
    expires_at: Instant,
}

/// Tradable-symbol directory backed by the exchange info endpoint. The
/// snapshot is built lazily, kept for 30 minutes and replaced wholesale;
/// readers never see a partially updated set.
pub struct SymbolDirectory {
    client: BinanceClient,
    snapshot: RwLock<Option<Arc<SymbolSnapshot>>>,
    refresh_gate: Mutex<()>,
}

impl SymbolDirectory {
    pub fn new(client: BinanceClient) -> Self {
        SymbolDirectory {
            client,
            snapshot: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Uppercases a free-form ticker and appends the USDT quote if missing.
    pub fn normalize(input: &str) -> String {
        let upper = input.trim().to_uppercase();
        if upper.ends_with(QUOTE_SUFFIX) {
            upper
        } else {
            format!("{}{}", upper, QUOTE_SUFFIX)
        }
    }

    /// Resolves a free-form ticker to a listed contract symbol: exact match,
    /// then the 1000/10000 denominated variants, then a substring scan that
    /// only wins when exactly one candidate remains.
    pub async fn resolve(&self, ticker: &str) -> Result<Option<String>> {
        let normalized = Self::normalize(ticker);
        let snapshot = self.snapshot().await?;
        Ok(resolve_in_snapshot(&normalized, &snapshot))
    }

    /// Drops the cached snapshot; the next resolve refetches.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = None;
        }
    }

    async fn snapshot(&self) -> Result<Arc<SymbolSnapshot>> {
        if let Some(current) = self.read_fresh() {
            return Ok(current);
        }

        // Single in-flight refresh; latecomers re-check before fetching.
        let _refresh = self.refresh_gate.lock().await;
        if let Some(current) = self.read_fresh() {
            return Ok(current);
        }

        let symbols = self.client.fetch_exchange_info().await?;
        let snapshot = Arc::new(SymbolSnapshot {
            set: symbols.iter().cloned().collect(),
            list: symbols,
            expires_at: Instant::now() + SNAPSHOT_TTL,
        });
        info!(
            "Refreshed symbol directory: {} listed contracts",
            snapshot.list.len()
        );
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = Some(Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    fn read_fresh(&self) -> Option<Arc<SymbolSnapshot>> {
        let guard = self.snapshot.read().ok()?;
        let current = guard.as_ref()?;
        if current.expires_at > Instant::now() {
            Some(Arc::clone(current))
        } else {
            None
        }
    }
}

fn resolve_in_snapshot(normalized: &str, snapshot: &SymbolSnapshot) -> Option<String> {
    if snapshot.set.contains(normalized) {
        return Some(normalized.to_string());
    }

    let base = normalized.strip_suffix(QUOTE_SUFFIX).unwrap_or(normalized);
    for prefix in DENOMINATION_PREFIXES {
        let denominated = format!("{}{}{}", prefix, base, QUOTE_SUFFIX);
        if snapshot.set.contains(&denominated) {
            return Some(denominated);
        }
    }

    let mut candidates = snapshot
        .list
        .iter()
        .filter(|symbol| symbol.ends_with(QUOTE_SUFFIX) && symbol.contains(base));
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}
