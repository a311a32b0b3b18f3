use crate::{error::MarketError, instrument::Symbol};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

/// Engine-assigned order identifier, unique within a run.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub struct OrderId(SmolStr);

impl OrderId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier, assigned by the engine on acceptance.
    pub fn random() -> Self {
        Self(SmolStr::new(Uuid::new_v4().simple().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    #[default]
    Open,
    Filled,
    Cancelled,
    Rejected,
    Held,
}

impl OrderStatus {
    /// Terminal states do not transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

/// An order intent, or an accepted order once the engine has assigned `id`.
///
/// `amount` is signed: positive buys, negative sells.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderId>,
    pub instrument: Symbol,
    pub amount: i64,
    #[serde(default)]
    pub filled: i64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: OrderStatus,
}

impl Order {
    /// Market order intent: no id until the engine accepts it.
    pub fn market(instrument: impl Into<Symbol>, amount: i64) -> Self {
        Self {
            id: None,
            instrument: instrument.into(),
            amount,
            filled: 0,
            commission: 0.0,
            limit_price: None,
            stop_price: None,
            created_at: None,
            status: OrderStatus::Open,
        }
    }

    pub fn with_limit(mut self, limit_price: f64) -> Self {
        self.limit_price = Some(limit_price);
        self
    }

    pub fn with_stop(mut self, stop_price: f64) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn is_buy(&self) -> bool {
        self.amount > 0
    }

    pub fn remaining(&self) -> i64 {
        self.amount - self.filled
    }

    /// Move to `next`, rejecting transitions out of a terminal state.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), MarketError> {
        if self.status.is_terminal() && self.status != next {
            return Err(MarketError::InvalidOrderTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialises_uppercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).expect("serialise"),
            "\"CANCELLED\""
        );
    }

    #[test]
    fn test_intent_round_trip_without_id() {
        let order = Order::market("AAPL", 10);
        let json = serde_json::to_string(&order).expect("serialise");
        assert!(!json.contains("\"id\""));

        let loaded: Order = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(loaded, order);
        assert_eq!(loaded.status, OrderStatus::Open);
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        let mut order = Order::market("AAPL", -5);
        order.transition(OrderStatus::Filled).expect("open to filled");

        let error = order.transition(OrderStatus::Cancelled).unwrap_err();
        assert!(matches!(error, MarketError::InvalidOrderTransition { .. }));
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_random_ids_are_unique() {
        assert_ne!(OrderId::random(), OrderId::random());
    }
}
