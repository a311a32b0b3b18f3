use bourse_markets::{Ohlc, Position, Symbol};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Cash and positions of the simulated account.
///
/// Mutated only by order fills; everything else reads snapshots.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub capital_base: f64,
    pub cash: f64,
    positions: BTreeMap<Symbol, Position>,
}

impl Portfolio {
    pub fn new(capital_base: f64) -> Self {
        Self {
            capital_base,
            cash: capital_base,
            positions: BTreeMap::new(),
        }
    }

    /// Apply a fill: adjust the position and pay cash and commission.
    pub fn apply_fill(
        &mut self,
        instrument: &Symbol,
        amount: i64,
        price: f64,
        commission: f64,
        time: DateTime<Utc>,
    ) {
        self.cash -= amount as f64 * price + commission;

        let entry = self
            .positions
            .entry(instrument.clone())
            .or_insert_with(|| Position::new(instrument.clone(), 0, 0.0, price, time));

        let new_amount = entry.amount + amount;
        if new_amount == 0 {
            self.positions.remove(instrument);
            return;
        }

        // Weighted cost basis over the combined position; a flipped position
        // restarts the basis at the fill price.
        entry.cost_basis = if entry.amount.signum() * new_amount.signum() < 0 {
            price
        } else {
            (entry.amount as f64 * entry.cost_basis + amount as f64 * price) / new_amount as f64
        };
        entry.amount = new_amount;
        entry.last_sale_price = price;
        entry.last_sale_date = time;
    }

    /// Mark positions to the latest bar closes.
    pub fn mark(&mut self, bars: &[Ohlc]) {
        for bar in bars {
            if let Some(position) = self.positions.get_mut(&bar.instrument) {
                position.last_sale_price = bar.close;
                position.last_sale_date = bar.time;
            }
        }
    }

    /// Non-zero positions, in stable symbol order.
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn positions_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Sum of absolute position values.
    pub fn gross_exposure(&self) -> f64 {
        self.positions
            .values()
            .map(|position| position.market_value().abs())
            .sum()
    }

    pub fn value(&self) -> f64 {
        self.cash + self.positions_value()
    }

    pub fn longs_count(&self) -> u32 {
        self.positions.values().filter(|p| p.amount > 0).count() as u32
    }

    pub fn shorts_count(&self) -> u32 {
        self.positions.values().filter(|p| p.amount < 0).count() as u32
    }
}
