use crate::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portfolio snapshot emitted once per bar.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Period {
    pub period_open: DateTime<Utc>,
    pub period_close: DateTime<Utc>,
    pub starting_cash: f64,
    pub ending_cash: f64,
    pub portfolio_value: f64,
    pub pnl: f64,
    pub returns: f64,
    pub positions_value: f64,
    pub positions_exposure: f64,
    pub gross_leverage: f64,
    pub net_leverage: f64,
    pub capital_used: f64,
    pub longs_count: u32,
    pub shorts_count: u32,
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// Aggregate simulation outcome: the full period series, with row-level
/// orders and transactions already dropped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BacktestResult {
    pub periods: Vec<Period>,
}
