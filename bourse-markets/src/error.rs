use crate::order::OrderStatus;
use smol_str::SmolStr;
use thiserror::Error;

/// Domain model invariant violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    #[error("invalid bar for {symbol}: {reason}")]
    InvalidBar { symbol: SmolStr, reason: String },

    #[error("order cannot transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
