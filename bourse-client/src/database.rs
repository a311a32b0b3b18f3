use bourse_markets::{Ohlc, Position, Symbol};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Read-only market state handle passed to strategy callbacks.
///
/// External implementations may adapt a relational price store; the shipped
/// [`InMemoryDatabase`] is fed from the bars and positions the worker
/// observes on the feed.
pub trait Database: Send + Sync + std::fmt::Debug {
    /// Bars seen so far, optionally filtered to one instrument, oldest
    /// first.
    fn stock_data(&self, instrument: Option<&Symbol>) -> Vec<Ohlc>;

    /// Current position in `instrument`, if any.
    fn get_position(&self, instrument: &Symbol) -> Option<Position>;
}

#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    bars: RwLock<Vec<Ohlc>>,
    positions: RwLock<HashMap<Symbol, Position>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bar(&self, bar: Ohlc) {
        self.bars.write().push(bar);
    }

    pub fn record_position(&self, position: Position) {
        if position.amount == 0 {
            self.positions.write().remove(&position.instrument);
        } else {
            self.positions
                .write()
                .insert(position.instrument.clone(), position);
        }
    }
}

impl Database for InMemoryDatabase {
    fn stock_data(&self, instrument: Option<&Symbol>) -> Vec<Ohlc> {
        let bars = self.bars.read();
        match instrument {
            Some(symbol) => bars
                .iter()
                .filter(|bar| &bar.instrument == symbol)
                .cloned()
                .collect(),
            None => bars.clone(),
        }
    }

    fn get_position(&self, instrument: &Symbol) -> Option<Position> {
        self.positions.read().get(instrument).cloned()
    }
}
