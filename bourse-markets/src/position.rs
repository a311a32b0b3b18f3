use crate::instrument::Symbol;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Holding in one instrument, owned by the simulation's portfolio.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Position {
    pub instrument: Symbol,
    pub amount: i64,
    pub cost_basis: f64,
    pub last_sale_price: f64,
    pub last_sale_date: DateTime<Utc>,
}

impl Position {
    pub fn market_value(&self) -> f64 {
        self.amount as f64 * self.last_sale_price
    }
}
