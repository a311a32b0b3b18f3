use crate::simulation::portfolio::Portfolio;
use bourse_integration::router::FnvIndexMap;
use bourse_markets::{Ohlc, Order, OrderId, OrderStatus, Symbol};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// The engine's order book.
///
/// Orders are kept in acceptance order and matched against the next
/// session's open, whole amounts at a time. An order accepted mid-bar is
/// therefore never filled before bar `t + 1`.
#[derive(Debug, Default)]
pub struct Blotter {
    orders: FnvIndexMap<OrderId, Order>,
}

impl Blotter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an order intent: assign a fresh id, stamp `created_at`, open
    /// it. Returns the accepted order for the response envelope.
    pub fn accept(&mut self, intent: Order, now: DateTime<Utc>) -> Order {
        let id = OrderId::random();
        let order = Order {
            id: Some(id.clone()),
            filled: 0,
            commission: 0.0,
            created_at: Some(now),
            status: OrderStatus::Open,
            ..intent
        };

        self.orders.insert(id, order.clone());
        order
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.orders
            .values()
            .filter(|order| order.status == OrderStatus::Open)
            .cloned()
            .collect()
    }

    /// Cancel an open order. Terminal orders keep their status, matching the
    /// idempotent cancel semantics of live brokers. Unknown ids yield
    /// `None`.
    pub fn cancel(&mut self, id: &OrderId) -> Option<Order> {
        let order = self.orders.get_mut(id)?;
        if order.status == OrderStatus::Open {
            order.status = OrderStatus::Cancelled;
        }
        Some(order.clone())
    }

    /// Match every open order against this session's opening prices.
    ///
    /// Fills are whole-amount at the open, gated by limit/stop prices, and
    /// paid for through `portfolio`. Instruments without a bar today stay
    /// open for the next session.
    pub fn match_session_open(
        &mut self,
        bars: &[Ohlc],
        time: DateTime<Utc>,
        portfolio: &mut Portfolio,
        commission_per_share: f64,
    ) -> Vec<Order> {
        let opens: HashMap<&Symbol, f64> = bars
            .iter()
            .map(|bar| (&bar.instrument, bar.open))
            .collect();

        let mut fills = Vec::new();
        for order in self.orders.values_mut() {
            if order.status != OrderStatus::Open {
                continue;
            }
            let Some(open) = opens.get(&order.instrument).copied() else {
                continue;
            };
            if !triggers(order, open) {
                continue;
            }

            let commission = order.amount.unsigned_abs() as f64 * commission_per_share;
            portfolio.apply_fill(&order.instrument, order.amount, open, commission, time);

            order.filled = order.amount;
            order.commission = commission;
            order.status = OrderStatus::Filled;
            debug!(id = ?order.id, instrument = %order.instrument, amount = order.amount, price = open, "order filled");
            fills.push(order.clone());
        }
        fills
    }
}

/// Price gates: market orders always trigger; limit buys need the open at or
/// under the limit (sells at or over); stop buys need the open at or over
/// the stop (sells at or under).
fn triggers(order: &Order, open: f64) -> bool {
    let buying = order.is_buy();

    if let Some(stop) = order.stop_price {
        let stopped = if buying { open >= stop } else { open <= stop };
        if !stopped {
            return false;
        }
    }
    if let Some(limit) = order.limit_price {
        let within = if buying { open <= limit } else { open >= limit };
        if !within {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_markets::factories;
    use chrono::NaiveDate;

    fn session() -> (Vec<Ohlc>, DateTime<Utc>) {
        let date = NaiveDate::from_ymd_opt(2020, 1, 8).unwrap();
        let bars = vec![factories::bar("AAPL", date, 1)];
        let open_time = factories::session_open(date);
        (bars, open_time)
    }

    #[test]
    fn test_accept_assigns_unique_open_ids() {
        let mut blotter = Blotter::new();
        let now = Utc::now();

        let first = blotter.accept(Order::market("AAPL", 10), now);
        let second = blotter.accept(Order::market("AAPL", -3), now);

        assert_ne!(first.id, second.id);
        assert_eq!(first.status, OrderStatus::Open);
        assert_eq!(first.created_at, Some(now));
        assert_eq!(blotter.open_orders().len(), 2);
    }

    #[test]
    fn test_market_order_fills_at_open() {
        let mut blotter = Blotter::new();
        let mut portfolio = Portfolio::new(100_000.0);
        let (bars, open_time) = session();

        let accepted = blotter.accept(Order::market("AAPL", 10), Utc::now());
        let fills = blotter.match_session_open(&bars, open_time, &mut portfolio, 0.001);

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].filled, 10);
        assert_eq!(fills[0].status, OrderStatus::Filled);
        assert!((fills[0].commission - 0.01).abs() < f64::EPSILON);
        let stored = blotter.get(accepted.id.as_ref().unwrap()).unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert!(portfolio.cash < 100_000.0);
    }

    #[test]
    fn test_limit_buy_above_open_waits() {
        let mut blotter = Blotter::new();
        let mut portfolio = Portfolio::new(100_000.0);
        let (bars, open_time) = session();
        let open = bars[0].open;

        blotter.accept(Order::market("AAPL", 10).with_limit(open - 5.0), Utc::now());
        let fills = blotter.match_session_open(&bars, open_time, &mut portfolio, 0.0);

        assert!(fills.is_empty());
        assert_eq!(blotter.open_orders().len(), 1);
    }

    #[test]
    fn test_instrument_without_bar_stays_open() {
        let mut blotter = Blotter::new();
        let mut portfolio = Portfolio::new(100_000.0);
        let (bars, open_time) = session();

        blotter.accept(Order::market("TSLA", 5), Utc::now());
        let fills = blotter.match_session_open(&bars, open_time, &mut portfolio, 0.0);

        assert!(fills.is_empty());
        assert_eq!(blotter.open_orders().len(), 1);
    }

    #[test]
    fn test_cancel_open_then_terminal_is_stable() {
        let mut blotter = Blotter::new();
        let accepted = blotter.accept(Order::market("AAPL", 10), Utc::now());
        let id = accepted.id.unwrap();

        let cancelled = blotter.cancel(&id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // Cancelling again keeps the terminal status.
        let again = blotter.cancel(&id).unwrap();
        assert_eq!(again.status, OrderStatus::Cancelled);

        assert!(blotter.cancel(&OrderId::new("missing")).is_none());
    }
}
