use crate::{
    bundle::Bundle,
    error::EngineError,
    simulation::{calendar::TradingCalendar, session_close},
};
use async_trait::async_trait;
use bourse_markets::{IngestConfig, Ohlc, Symbol};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

/// Turns an [`IngestConfig`] into a named [`Bundle`] of historical bars.
///
/// Ingestion blocks the caller until it completes or fails and is not
/// interruptible once started. Implementations wrapping external stores
/// (vendor APIs, relational databases) plug in here.
#[async_trait]
pub trait Ingester: Send + Sync {
    async fn ingest(&self, config: &IngestConfig) -> Result<Bundle, EngineError>;
}

/// Reads one `<SYMBOL>.csv` per instrument from a directory.
///
/// Expected header: `time,open,high,low,close,volume` with RFC 3339
/// timestamps. Rows outside the configured date range are skipped; every
/// kept bar is validated.
#[derive(Debug, Clone)]
pub struct CsvIngester {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

impl CsvIngester {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_series(&self, symbol: &Symbol, config: &IngestConfig) -> Result<Vec<Ohlc>, EngineError> {
        let path = self.root.join(format!("{}.csv", symbol));
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|error| EngineError::Ingest(format!("opening {path:?}: {error}")))?;

        let mut series = Vec::new();
        for row in reader.deserialize::<CsvBar>() {
            let row = row.map_err(|error| EngineError::Ingest(format!("{path:?}: {error}")))?;
            let date = row.time.date_naive();
            if date < config.from_date || date > config.to_date {
                continue;
            }

            let bar = Ohlc::new(
                symbol.clone(),
                row.open,
                row.high,
                row.low,
                row.close,
                row.volume,
                row.time,
            );
            bar.validate()
                .map_err(|error| EngineError::Ingest(error.to_string()))?;
            series.push(bar);
        }
        Ok(series)
    }
}

#[async_trait]
impl Ingester for CsvIngester {
    async fn ingest(&self, config: &IngestConfig) -> Result<Bundle, EngineError> {
        let mut bundle = Bundle::new(config.name.clone(), config.calendar_name.clone());
        for symbol in &config.instruments {
            let series = self.read_series(symbol, config)?;
            info!(%symbol, bars = series.len(), "ingested series");
            bundle.insert_series(symbol.clone(), series);
        }
        Ok(bundle)
    }
}

/// Generates a reproducible random-walk series per instrument. Useful for
/// demos and tests where no external price store is wired up.
#[derive(Debug, Clone)]
pub struct SyntheticIngester {
    seed: u64,
}

impl SyntheticIngester {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn series(&self, symbol: &Symbol, config: &IngestConfig) -> Result<Vec<Ohlc>, EngineError> {
        let calendar = TradingCalendar::resolve(&config.calendar_name).ok_or_else(|| {
            EngineError::Ingest(format!("calendar {} not found", config.calendar_name))
        })?;

        let symbol_seed = symbol
            .as_str()
            .bytes()
            .fold(self.seed, |seed, byte| seed.wrapping_mul(31).wrapping_add(byte as u64));
        let mut rng = StdRng::seed_from_u64(symbol_seed);
        let mut price = rng.random_range(20.0..400.0);

        let mut series = Vec::new();
        for date in calendar.sessions(config.from_date, config.to_date) {
            let change: f64 = rng.random_range(-0.02..0.02);
            let open = price;
            let close: f64 = price * (1.0 + change);
            let high = open.max(close) * (1.0 + rng.random_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.random_range(0.0..0.01));
            let volume: u64 = rng.random_range(100_000..5_000_000);

            series.push(Ohlc::new(
                symbol.clone(),
                open,
                high,
                low,
                close,
                volume,
                session_close(date),
            ));
            price = close;
        }
        Ok(series)
    }
}

impl Default for SyntheticIngester {
    fn default() -> Self {
        Self::new(7)
    }
}

#[async_trait]
impl Ingester for SyntheticIngester {
    async fn ingest(&self, config: &IngestConfig) -> Result<Bundle, EngineError> {
        let mut bundle = Bundle::new(config.name.clone(), config.calendar_name.clone());
        for symbol in &config.instruments {
            bundle.insert_series(symbol.clone(), self.series(symbol, config)?);
        }
        Ok(bundle)
    }
}
