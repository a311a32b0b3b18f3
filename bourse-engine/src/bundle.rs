use crate::error::EngineError;
use bourse_markets::{Ohlc, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

/// A named, immutable collection of historical bars, keyed by instrument.
///
/// The engine's unit of ingested market data; callers treat its storage as
/// opaque.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bundle {
    pub name: SmolStr,
    pub calendar: SmolStr,
    bars: HashMap<Symbol, Vec<Ohlc>>,
}

impl Bundle {
    pub fn new(name: impl Into<SmolStr>, calendar: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            calendar: calendar.into(),
            bars: HashMap::new(),
        }
    }

    /// Add the bar series of one instrument, sorted by time.
    pub fn insert_series(&mut self, symbol: Symbol, mut series: Vec<Ohlc>) {
        series.sort_by_key(|bar| bar.time);
        self.bars.insert(symbol, series);
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.bars.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.bars.keys()
    }

    pub fn series(&self, symbol: &Symbol) -> Option<&[Ohlc]> {
        self.bars.get(symbol).map(Vec::as_slice)
    }

    /// Bars of `date` for `instruments`, in configured instrument order so
    /// feed delivery order is stable.
    pub fn session_bars(&self, date: NaiveDate, instruments: &[Symbol]) -> Vec<Ohlc> {
        instruments
            .iter()
            .filter_map(|symbol| {
                self.bars
                    .get(symbol)?
                    .iter()
                    .find(|bar| bar.time.date_naive() == date)
                    .cloned()
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.values().all(Vec::is_empty)
    }
}

/// Registry of ingested bundles: always in memory, optionally persisted as
/// one JSON file per bundle under a root directory.
#[derive(Debug, Default)]
pub struct BundleStore {
    root: Option<PathBuf>,
    bundles: HashMap<SmolStr, Arc<Bundle>>,
}

impl BundleStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store persisting into `root`, loading any bundle already on disk.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|error| EngineError::Ingest(format!("bundle root {root:?}: {error}")))?;

        let mut store = Self {
            root: Some(root.clone()),
            bundles: HashMap::new(),
        };

        for entry in std::fs::read_dir(&root)
            .map_err(|error| EngineError::Ingest(format!("bundle root {root:?}: {error}")))?
        {
            let path = entry
                .map_err(|error| EngineError::Ingest(error.to_string()))?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                store.load_file(&path)?;
            }
        }

        Ok(store)
    }

    fn load_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let contents = std::fs::read(path)
            .map_err(|error| EngineError::Ingest(format!("reading {path:?}: {error}")))?;
        let bundle: Bundle = serde_json::from_slice(&contents)
            .map_err(|error| EngineError::Ingest(format!("decoding {path:?}: {error}")))?;

        debug!(bundle = %bundle.name, "loaded bundle from disk");
        self.bundles.insert(bundle.name.clone(), Arc::new(bundle));
        Ok(())
    }

    /// Register a bundle, replacing any previous bundle of the same name and
    /// persisting it when the store has a root.
    pub fn insert(&mut self, bundle: Bundle) -> Result<(), EngineError> {
        if let Some(root) = &self.root {
            let path = root.join(format!("{}.json", bundle.name));
            let contents = serde_json::to_vec(&bundle)
                .map_err(|error| EngineError::Ingest(error.to_string()))?;
            std::fs::write(&path, contents)
                .map_err(|error| EngineError::Ingest(format!("writing {path:?}: {error}")))?;
        }

        info!(bundle = %bundle.name, symbols = bundle.bars.len(), "bundle registered");
        self.bundles.insert(bundle.name.clone(), Arc::new(bundle));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Bundle>> {
        self.bundles.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_markets::factories;

    fn demo_bundle() -> Bundle {
        let sessions: Vec<_> = (7..11)
            .map(|day| NaiveDate::from_ymd_opt(2020, 1, day).unwrap())
            .collect();

        let mut bundle = Bundle::new("demo", "XNYS");
        bundle.insert_series(
            Symbol::from("AAPL"),
            factories::bar_series("AAPL", &sessions),
        );
        bundle
    }

    #[test]
    fn test_session_bars_follow_instrument_order() {
        let sessions = vec![NaiveDate::from_ymd_opt(2020, 1, 7).unwrap()];
        let mut bundle = Bundle::new("demo", "XNYS");
        bundle.insert_series(
            Symbol::from("TSLA"),
            factories::bar_series("TSLA", &sessions),
        );
        bundle.insert_series(
            Symbol::from("AAPL"),
            factories::bar_series("AAPL", &sessions),
        );

        let bars = bundle.session_bars(
            sessions[0],
            &[Symbol::from("AAPL"), Symbol::from("TSLA")],
        );
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].instrument, Symbol::from("AAPL"));
        assert_eq!(bars[1].instrument, Symbol::from("TSLA"));
    }

    #[test]
    fn test_store_round_trips_through_disk() {
        let root = std::env::temp_dir().join(format!("bourse-bundles-{}", uuid::Uuid::new_v4()));

        let mut store = BundleStore::with_root(&root).expect("store");
        store.insert(demo_bundle()).expect("insert");

        let reloaded = BundleStore::with_root(&root).expect("reload");
        let bundle = reloaded.get("demo").expect("bundle");
        assert!(bundle.contains(&Symbol::from("AAPL")));
        assert_eq!(
            bundle.series(&Symbol::from("AAPL")).map(<[Ohlc]>::len),
            Some(4)
        );

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_missing_bundle_is_none() {
        assert!(BundleStore::in_memory().get("nope").is_none());
    }
}
