use crate::{database::Database, error::ClientError};
use bourse_integration::router::FnvIndexMap;
use bourse_markets::{Ohlc, Order, Parameters, Symbol};
use parking_lot::Mutex;
use rand::Rng;
use smol_str::SmolStr;
use std::{collections::HashMap, str::FromStr, sync::Arc};
use ta::{Next, indicators::ExponentialMovingAverage};
use tracing::debug;

/// User strategy callback: invoked once per dispatched bar, optionally
/// returning an order intent for the engine's broker.
pub trait Algorithm: Send + Sync {
    fn on_bar(
        &self,
        bar: &Ohlc,
        database: &dyn Database,
        parameters: &Parameters,
    ) -> Result<Option<Order>, ClientError>;
}

/// Explicit `{message type -> algorithm}` table a worker serves its per-bar
/// inbox with. Built once at startup; duplicate routes are a configuration
/// error.
#[derive(Clone, Default)]
pub struct WorkerRoutes {
    routes: FnvIndexMap<SmolStr, Arc<dyn Algorithm>>,
}

impl WorkerRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        task: impl Into<SmolStr>,
        algorithm: Arc<dyn Algorithm>,
    ) -> Result<Self, ClientError> {
        let task = task.into();
        if self.routes.contains_key(&task) {
            return Err(ClientError::RouteAlreadyRegistered(task));
        }
        self.routes.insert(task, algorithm);
        Ok(self)
    }

    pub fn get(&self, task: &str) -> Option<&Arc<dyn Algorithm>> {
        self.routes.get(task)
    }
}

impl std::fmt::Debug for WorkerRoutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRoutes")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The common single-route table: `ohlc` handled by `algorithm`.
pub fn ohlc_routes(algorithm: Arc<dyn Algorithm>) -> WorkerRoutes {
    let mut routes = WorkerRoutes::new();
    routes.routes.insert(SmolStr::new("ohlc"), algorithm);
    routes
}

/// By-name strategy plugin registry. Strategies register once at startup;
/// both thread and process workers resolve them by name.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: FnvIndexMap<SmolStr, Arc<dyn Algorithm>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the shipped demo strategies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Registering distinct literal names cannot collide.
        let _ = registry.register("noop", Arc::new(Noop));
        let _ = registry.register("random", Arc::new(RandomOrders::default()));
        let _ = registry.register("ema", Arc::new(EmaCrossover::default()));
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<SmolStr>,
        algorithm: Arc<dyn Algorithm>,
    ) -> Result<&mut Self, ClientError> {
        let name = name.into();
        if self.strategies.contains_key(&name) {
            return Err(ClientError::StrategyAlreadyRegistered(name));
        }
        self.strategies.insert(name, algorithm);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Algorithm>, ClientError> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::StrategyNotFound(name.into()))
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.strategies.keys()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn parameter<T: FromStr>(
    parameters: &Parameters,
    key: &str,
    default: T,
) -> Result<T, ClientError> {
    match parameters.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ClientError::Algorithm(format!("parameter {key}={raw} is invalid"))),
    }
}

/// Does nothing. The minimal strategy for plumbing tests and dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl Algorithm for Noop {
    fn on_bar(
        &self,
        _: &Ohlc,
        _: &dyn Database,
        _: &Parameters,
    ) -> Result<Option<Order>, ClientError> {
        Ok(None)
    }
}

/// Randomly buys or sells a handful of shares. Demo strategy.
#[derive(Debug, Default)]
pub struct RandomOrders;

impl Algorithm for RandomOrders {
    fn on_bar(
        &self,
        bar: &Ohlc,
        _: &dyn Database,
        parameters: &Parameters,
    ) -> Result<Option<Order>, ClientError> {
        let chance: f64 = parameter(parameters, "chance", 0.2)?;
        let mut rng = rand::rng();
        if rng.random_range(0.0..1.0) > chance {
            return Ok(None);
        }

        let amount = rng.random_range(-10..=10);
        if amount == 0 {
            return Ok(None);
        }
        Ok(Some(Order::market(bar.instrument.clone(), amount)))
    }
}

#[derive(Debug)]
struct EmaState {
    short: ExponentialMovingAverage,
    long: ExponentialMovingAverage,
    samples: usize,
}

/// EMA-crossover demo strategy: buys when the short EMA crosses above the
/// long EMA, closes the position when it crosses back under.
///
/// Parameters: `short` (default 12), `long` (default 26), `amount`
/// (default 10).
#[derive(Debug, Default)]
pub struct EmaCrossover {
    state: Mutex<HashMap<Symbol, EmaState>>,
}

impl Algorithm for EmaCrossover {
    fn on_bar(
        &self,
        bar: &Ohlc,
        database: &dyn Database,
        parameters: &Parameters,
    ) -> Result<Option<Order>, ClientError> {
        let short_period: usize = parameter(parameters, "short", 12)?;
        let long_period: usize = parameter(parameters, "long", 26)?;
        let amount: i64 = parameter(parameters, "amount", 10)?;

        let mut state = self.state.lock();
        let entry = match state.entry(bar.instrument.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let short = ExponentialMovingAverage::new(short_period)
                    .map_err(|error| ClientError::Algorithm(error.to_string()))?;
                let long = ExponentialMovingAverage::new(long_period)
                    .map_err(|error| ClientError::Algorithm(error.to_string()))?;
                vacant.insert(EmaState {
                    short,
                    long,
                    samples: 0,
                })
            }
        };

        let short = entry.short.next(bar.close);
        let long = entry.long.next(bar.close);
        entry.samples += 1;
        if entry.samples < long_period {
            return Ok(None);
        }

        let position = database.get_position(&bar.instrument);
        debug!(instrument = %bar.instrument, short, long, held = position.is_some(), "ema update");

        if short > long && position.is_none() {
            Ok(Some(Order::market(bar.instrument.clone(), amount)))
        } else if short < long {
            match position {
                Some(position) if position.amount != 0 => {
                    Ok(Some(Order::market(bar.instrument.clone(), -position.amount)))
                }
                _ => Ok(None),
            }
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryDatabase;
    use bourse_markets::{Position, factories};
    use chrono::NaiveDate;

    fn sessions(count: usize) -> Vec<NaiveDate> {
        (0..count)
            .map(|offset| {
                NaiveDate::from_ymd_opt(2020, 1, 1)
                    .unwrap()
                    .checked_add_days(chrono::Days::new(offset as u64))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_registry_resolves_builtins_and_rejects_duplicates() {
        let mut registry = StrategyRegistry::with_builtins();
        assert!(registry.get("noop").is_ok());
        assert!(registry.get("ema").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(ClientError::StrategyNotFound(_))
        ));
        assert!(matches!(
            registry.register("noop", Arc::new(Noop)),
            Err(ClientError::StrategyAlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_routes_reject_duplicate_task() {
        let routes = WorkerRoutes::new().on("ohlc", Arc::new(Noop)).expect("on");
        assert!(matches!(
            routes.on("ohlc", Arc::new(Noop)),
            Err(ClientError::RouteAlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_ema_crossover_buys_rising_series_once_warm() {
        let strategy = EmaCrossover::default();
        let database = InMemoryDatabase::new();
        let parameters =
            Parameters::from([("short".into(), "2".into()), ("long".into(), "4".into())]);

        let mut orders = Vec::new();
        for (index, date) in sessions(10).into_iter().enumerate() {
            let mut bar = factories::bar("AAPL", date, index);
            // Force a steadily rising close so the short EMA leads.
            bar.close = bar.high.max(100.0 + index as f64);
            bar.high = bar.close;
            if let Some(order) = strategy.on_bar(&bar, &database, &parameters).expect("ema") {
                orders.push(order);
            }
        }

        assert!(!orders.is_empty());
        assert!(orders[0].is_buy());
        assert_eq!(orders[0].amount, 10);
    }

    #[test]
    fn test_ema_crossover_closes_held_position_on_cross_down() {
        let strategy = EmaCrossover::default();
        let database = InMemoryDatabase::new();
        let parameters =
            Parameters::from([("short".into(), "2".into()), ("long".into(), "3".into())]);
        let symbol = Symbol::from("TSLA");

        let dates = sessions(12);
        // Rising leg to warm up and cross above.
        for (index, date) in dates[..6].iter().enumerate() {
            let mut bar = factories::bar("TSLA", *date, index);
            bar.close = 100.0 + index as f64 * 2.0;
            bar.high = bar.close + 1.0;
            bar.low = bar.close - 1.0;
            bar.open = bar.close;
            strategy.on_bar(&bar, &database, &parameters).expect("ema");
        }

        database.record_position(Position::new(
            symbol.clone(),
            10,
            100.0,
            110.0,
            factories::session_close(dates[5]),
        ));

        // Falling leg crosses back under and should close the position.
        let mut close_order = None;
        for (index, date) in dates[6..].iter().enumerate() {
            let mut bar = factories::bar("TSLA", *date, index);
            bar.close = 110.0 - index as f64 * 5.0;
            bar.high = bar.close + 1.0;
            bar.low = bar.close - 1.0;
            bar.open = bar.close;
            if let Some(order) = strategy.on_bar(&bar, &database, &parameters).expect("ema") {
                close_order = Some(order);
                break;
            }
        }

        let order = close_order.expect("closing order");
        assert_eq!(order.amount, -10);
    }

    #[test]
    fn test_invalid_parameter_surfaces_algorithm_error() {
        let strategy = EmaCrossover::default();
        let database = InMemoryDatabase::new();
        let parameters = Parameters::from([("short".into(), "not-a-number".into())]);
        let bar = factories::bar("AAPL", NaiveDate::from_ymd_opt(2020, 1, 7).unwrap(), 0);

        assert!(matches!(
            strategy.on_bar(&bar, &database, &parameters),
            Err(ClientError::Algorithm(_))
        ));
    }
}
