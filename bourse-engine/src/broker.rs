use crate::{
    error::EngineError,
    service::spawn_replier_service,
    simulation::SimulationContext,
};
use bourse_integration::{HandlerError, Replier, Router, SocketConfig};
use bourse_markets::{Instrument, Order, Symbol};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::task::JoinHandle;
use tracing::info;

/// Payload of `get_open_orders`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OpenOrders {
    pub orders: Vec<Order>,
}

/// The engine's broker endpoint.
///
/// Bound at engine startup so `info` can report its address, and serving
/// while a simulation runs: accepts orders against the live
/// [`SimulationContext`] concurrently with the clock task holding at the
/// barrier. An order accepted mid-bar is matched against the next bar's
/// open.
#[derive(Debug)]
pub struct Broker {
    replier: Arc<Replier>,
    online: Arc<AtomicBool>,
    service: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
    pub async fn bind(config: SocketConfig) -> Result<Self, EngineError> {
        let replier = Replier::bind(config).await?;
        Ok(Self {
            replier: Arc::new(replier),
            online: Arc::new(AtomicBool::new(false)),
            service: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SocketConfig {
        self.replier.config()
    }

    /// Start answering order tasks for a fresh simulation run.
    pub fn start(
        &self,
        context: SimulationContext,
        universe: HashSet<Symbol>,
    ) -> Result<(), EngineError> {
        let router = Arc::new(build_router(context, universe)?);
        self.online.store(true, Ordering::Release);

        let service = spawn_replier_service(
            Arc::clone(&self.replier),
            router,
            Arc::clone(&self.online),
        );

        let mut slot = self.service.lock();
        if let Some(previous) = slot.replace(service) {
            previous.abort();
        }
        info!(addr = %self.replier.config().addr(), "broker serving");
        Ok(())
    }

    /// Stop answering order tasks. Idempotent.
    pub fn stop(&self) {
        self.online.store(false, Ordering::Release);
        if let Some(service) = self.service.lock().take() {
            service.abort();
        }
    }
}

/// Broker task table over the simulation's order-submission API.
fn build_router(
    context: SimulationContext,
    universe: HashSet<Symbol>,
) -> Result<Router, EngineError> {
    let mut router = Router::new();
    let universe = Arc::new(universe);

    let ctx = context.clone();
    let known = Arc::clone(&universe);
    router.register("can_trade", move |instrument: Instrument| {
        let ctx = ctx.clone();
        let known = Arc::clone(&known);
        async move {
            if !known.contains(&instrument.symbol) {
                return Err(broker_error(format!(
                    "instrument {} not found",
                    instrument.symbol
                )));
            }
            Ok(ctx.can_trade_now(&instrument.symbol))
        }
    })?;

    let ctx = context.clone();
    let known = Arc::clone(&universe);
    router.register("order", move |intent: Order| {
        let ctx = ctx.clone();
        let known = Arc::clone(&known);
        async move {
            if !known.contains(&intent.instrument) {
                return Err(broker_error(format!(
                    "instrument {} not found",
                    intent.instrument
                )));
            }
            if intent.amount == 0 {
                return Err(broker_error("order amount must be non-zero".to_string()));
            }
            let accepted = ctx.submit_order(intent);
            info!(id = ?accepted.id, instrument = %accepted.instrument, amount = accepted.amount, "order accepted");
            Ok(accepted)
        }
    })?;

    let ctx = context.clone();
    router.register("get_order", move |order: Order| {
        let ctx = ctx.clone();
        async move {
            let id = order
                .id
                .ok_or_else(|| broker_error("order id required".to_string()))?;
            ctx.get_order(&id)
                .ok_or_else(|| broker_error(format!("order {id} not found")))
        }
    })?;

    let ctx = context.clone();
    router.register("get_open_orders", move |_: ()| {
        let ctx = ctx.clone();
        async move {
            Ok(OpenOrders {
                orders: ctx.open_orders(),
            })
        }
    })?;

    let ctx = context;
    router.register("cancel_order", move |order: Order| {
        let ctx = ctx.clone();
        async move {
            let id = order
                .id
                .ok_or_else(|| broker_error("order id required".to_string()))?;
            ctx.cancel_order(&id)
                .ok_or_else(|| broker_error(format!("order {id} not found")))
        }
    })?;

    Ok(router)
}

fn broker_error(message: String) -> HandlerError {
    Box::new(EngineError::Broker(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_integration::{Request, Requester, SocketPattern};
    use bourse_markets::OrderStatus;

    async fn broker_pair() -> (Broker, Requester, SimulationContext) {
        let context = SimulationContext::new(100_000.0, 0.0);
        let broker = Broker::bind(SocketConfig::listener(SocketPattern::Rep))
            .await
            .expect("bind");
        broker
            .start(
                context.clone(),
                HashSet::from([Symbol::from("AAPL"), Symbol::from("TSLA")]),
            )
            .expect("start");

        let requester = Requester::connect(broker.config().to_dialer(SocketPattern::Req))
            .await
            .expect("connect");
        (broker, requester, context)
    }

    #[tokio::test]
    async fn test_order_accepts_and_assigns_id() {
        let (_broker, requester, _context) = broker_pair().await;

        let response = requester
            .request(&Request::with_data("order", &Order::market("AAPL", 10)).expect("build"))
            .await
            .expect("request");
        assert_eq!(response.error, None);

        let accepted: Order = response.payload().expect("payload");
        assert!(accepted.id.is_some());
        assert_eq!(accepted.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn test_can_trade_checks_universe_and_session() {
        let (_broker, requester, _context) = broker_pair().await;

        // Known instrument, but no session bars yet.
        let response = requester
            .request(
                &Request::with_data("can_trade", &Instrument::new("AAPL")).expect("build"),
            )
            .await
            .expect("request");
        assert_eq!(response.error, None);
        assert!(!response.payload::<bool>().expect("payload"));

        let response = requester
            .request(
                &Request::with_data("can_trade", &Instrument::new("NOPE")).expect("build"),
            )
            .await
            .expect("request");
        assert!(response.error.expect("error").contains("not found"));
    }

    #[tokio::test]
    async fn test_unknown_instrument_is_broker_error() {
        let (_broker, requester, _context) = broker_pair().await;

        let response = requester
            .request(&Request::with_data("order", &Order::market("NOPE", 1)).expect("build"))
            .await
            .expect("request");
        assert!(response.error.expect("error").contains("not found"));
    }

    #[tokio::test]
    async fn test_get_and_cancel_order_round_trip() {
        let (_broker, requester, context) = broker_pair().await;
        let accepted = context.submit_order(Order::market("TSLA", -5));

        let response = requester
            .request(&Request::with_data("get_order", &accepted).expect("build"))
            .await
            .expect("request");
        let fetched: Order = response.payload().expect("payload");
        assert_eq!(fetched.id, accepted.id);

        let response = requester
            .request(&Request::with_data("cancel_order", &accepted).expect("build"))
            .await
            .expect("request");
        let cancelled: Order = response.payload().expect("payload");
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_order_id_is_broker_error() {
        let (_broker, requester, _context) = broker_pair().await;
        let mut ghost = Order::market("AAPL", 1);
        ghost.id = Some(bourse_markets::OrderId::new("missing"));

        let response = requester
            .request(&Request::with_data("get_order", &ghost).expect("build"))
            .await
            .expect("request");
        assert!(response.error.expect("error").contains("not found"));
    }

    #[tokio::test]
    async fn test_get_open_orders_lists_outstanding() {
        let (_broker, requester, context) = broker_pair().await;
        context.submit_order(Order::market("AAPL", 10));
        context.submit_order(Order::market("TSLA", 3));

        let response = requester
            .request(&Request::new("get_open_orders"))
            .await
            .expect("request");
        let open: OpenOrders = response.payload().expect("payload");
        assert_eq!(open.orders.len(), 2);
    }
}
