//! Deterministic object factories shared by the workspace test suites.

use crate::{
    config::EngineConfig,
    instrument::Symbol,
    ohlc::Ohlc,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Close-of-session timestamp for a trading day (21:00 UTC, the NYSE close).
pub fn session_close(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(21, 0, 0).unwrap())
}

/// Open-of-session timestamp for a trading day (14:30 UTC, the NYSE open).
pub fn session_open(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(14, 30, 0).unwrap())
}

/// One deterministic, invariant-respecting bar for `symbol` on `date`.
///
/// Prices decline by five cents a session around a per-symbol base, so
/// different symbols and dates give different but reproducible values, and a
/// buy-and-hold across the series always carries a small mark-to-market
/// loss.
pub fn bar(symbol: impl Into<Symbol>, date: NaiveDate, day_index: usize) -> Ohlc {
    let symbol = symbol.into();
    let base = 50.0
        + symbol
            .as_str()
            .bytes()
            .map(|byte| byte as f64)
            .sum::<f64>()
            % 200.0;

    let open = base - day_index as f64 * 0.05;
    let close = open + 0.02;
    let high = close + 0.5;
    let low = open - 0.5;

    Ohlc::new(
        symbol,
        open,
        high,
        low,
        close,
        1_000_000 + (day_index as u64 * 1_000),
        session_close(date),
    )
}

/// Deterministic bar series for `symbol` over `sessions`.
pub fn bar_series(symbol: &str, sessions: &[NaiveDate]) -> Vec<Ohlc> {
    sessions
        .iter()
        .enumerate()
        .map(|(day_index, date)| bar(symbol, *date, day_index))
        .collect()
}

/// The canonical happy-path engine configuration: AAPL benchmark, AAPL and
/// TSLA instruments, 2020-01-07 through 2020-02-01 on the XNYS calendar.
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        bundle: "demo".into(),
        calendar: "XNYS".into(),
        start_date: NaiveDate::from_ymd_opt(2020, 1, 7).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
        timezone: "UTC".to_string(),
        benchmark: Symbol::from("AAPL"),
        instruments: vec![Symbol::from("AAPL"), Symbol::from("TSLA")],
    }
}
