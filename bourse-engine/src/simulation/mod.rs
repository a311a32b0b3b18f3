use crate::{bundle::Bundle, error::EngineError};
use bourse_markets::{
    BacktestResult, EngineConfig, Ohlc, Order, OrderId, Period, Symbol,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

pub mod blotter;
pub mod calendar;
pub mod portfolio;

use blotter::Blotter;
use calendar::TradingCalendar;
use portfolio::Portfolio;

/// Immutable plan for one simulation run, resolved and validated at
/// `configure` time.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub config: EngineConfig,
    pub bundle: Arc<Bundle>,
    pub calendar: TradingCalendar,
    pub sessions: Vec<NaiveDate>,
}

impl Simulation {
    /// Resolve `config` against `bundle`: every instrument, the benchmark,
    /// the calendar and the timezone must resolve or configuration fails.
    pub fn build(config: EngineConfig, bundle: Arc<Bundle>) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|error| EngineError::Config(error.to_string()))?;

        config
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| EngineError::Config(format!("timezone {} not found", config.timezone)))?;

        let calendar = TradingCalendar::resolve(&config.calendar)
            .ok_or_else(|| EngineError::Config(format!("calendar {} not found", config.calendar)))?;

        if !bundle.contains(&config.benchmark) {
            return Err(EngineError::Config(format!(
                "benchmark {} not found in bundle {}",
                config.benchmark, bundle.name
            )));
        }
        for instrument in &config.instruments {
            if !bundle.contains(instrument) {
                return Err(EngineError::Config(format!(
                    "instrument {} not found in bundle {}",
                    instrument, bundle.name
                )));
            }
        }

        let sessions = calendar.sessions(config.start_date, config.end_date);
        if sessions.is_empty() {
            return Err(EngineError::Config(format!(
                "no {} sessions between {} and {}",
                calendar.name(),
                config.start_date,
                config.end_date
            )));
        }

        Ok(Self {
            config,
            bundle,
            calendar,
            sessions,
        })
    }

    pub fn session_bars(&self, date: NaiveDate) -> Vec<Ohlc> {
        self.bundle.session_bars(date, &self.config.instruments)
    }
}

/// Open and close timestamps of an XNYS-style session, in UTC.
pub fn session_open(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(14, 30, 0).unwrap())
}

pub fn session_close(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(21, 0, 0).unwrap())
}

#[derive(Debug)]
struct ContextInner {
    portfolio: Portfolio,
    blotter: Blotter,
    current_bars: Vec<Ohlc>,
    last_value: f64,
    clock: Option<DateTime<Utc>>,
    periods: Vec<Period>,
}

/// Shared state between the simulation clock, the feed and the broker.
///
/// The clock task advances sessions; the broker submits and inspects orders
/// concurrently through the same context; the feed only reads snapshots.
/// Orders are enqueued in arrival order and matched at the next session's
/// open, never re-ordered.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    inner: Arc<Mutex<ContextInner>>,
    commission_per_share: f64,
}

impl SimulationContext {
    pub fn new(capital_base: f64, commission_per_share: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContextInner {
                portfolio: Portfolio::new(capital_base),
                blotter: Blotter::new(),
                current_bars: Vec::new(),
                last_value: capital_base,
                clock: None,
                periods: Vec::new(),
            })),
            commission_per_share,
        }
    }

    /// Advance the clock one session: match queued orders at the open, mark
    /// positions to the close, and snapshot the period.
    pub fn advance_session(&self, date: NaiveDate, bars: Vec<Ohlc>) -> Period {
        let mut inner = self.inner.lock();
        let open_time = session_open(date);
        let close_time = session_close(date);

        let starting_cash = inner.portfolio.cash;
        let previous_value = inner.last_value;

        let ContextInner {
            portfolio, blotter, ..
        } = &mut *inner;
        blotter.match_session_open(&bars, open_time, portfolio, self.commission_per_share);
        portfolio.mark(&bars);

        let portfolio_value = inner.portfolio.value();
        let pnl = portfolio_value - previous_value;
        let period = Period {
            period_open: open_time,
            period_close: close_time,
            starting_cash,
            ending_cash: inner.portfolio.cash,
            portfolio_value,
            pnl,
            returns: if previous_value != 0.0 {
                pnl / previous_value
            } else {
                0.0
            },
            positions_value: inner.portfolio.positions_value(),
            positions_exposure: inner.portfolio.positions_value(),
            gross_leverage: if portfolio_value != 0.0 {
                inner.portfolio.gross_exposure() / portfolio_value
            } else {
                0.0
            },
            net_leverage: if portfolio_value != 0.0 {
                inner.portfolio.positions_value() / portfolio_value
            } else {
                0.0
            },
            capital_used: starting_cash - inner.portfolio.cash,
            longs_count: inner.portfolio.longs_count(),
            shorts_count: inner.portfolio.shorts_count(),
            positions: inner.portfolio.positions(),
        };

        inner.last_value = portfolio_value;
        inner.clock = Some(close_time);
        inner.current_bars = bars;
        inner.periods.push(period.clone());
        period
    }

    /// Thread-safe order submission used by the broker: the intent is
    /// enqueued immediately and matched on the next bar.
    pub fn submit_order(&self, intent: Order) -> Order {
        let mut inner = self.inner.lock();
        let now = inner.clock.unwrap_or_else(Utc::now);
        inner.blotter.accept(intent, now)
    }

    pub fn get_order(&self, id: &OrderId) -> Option<Order> {
        self.inner.lock().blotter.get(id).cloned()
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.inner.lock().blotter.open_orders()
    }

    pub fn cancel_order(&self, id: &OrderId) -> Option<Order> {
        self.inner.lock().blotter.cancel(id)
    }

    /// Whether `instrument` trades in the current session.
    pub fn can_trade_now(&self, instrument: &Symbol) -> bool {
        self.inner
            .lock()
            .current_bars
            .iter()
            .any(|bar| &bar.instrument == instrument)
    }

    /// Aggregate period series; row-level orders and transactions are not
    /// part of the result.
    pub fn result(&self) -> BacktestResult {
        BacktestResult {
            periods: self.inner.lock().periods.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_markets::factories;

    fn simulation() -> Simulation {
        let config = factories::engine_config();
        let calendar = TradingCalendar::resolve(&config.calendar).unwrap();
        let sessions = calendar.sessions(config.start_date, config.end_date);

        let mut bundle = Bundle::new(config.bundle.clone(), config.calendar.clone());
        for instrument in &config.instruments {
            bundle.insert_series(
                instrument.clone(),
                factories::bar_series(instrument.as_str(), &sessions),
            );
        }
        Simulation::build(config, Arc::new(bundle)).expect("simulation")
    }

    #[test]
    fn test_build_resolves_eighteen_sessions() {
        assert_eq!(simulation().sessions.len(), 18);
    }

    #[test]
    fn test_unknown_benchmark_fails_configuration() {
        let simulation = simulation();
        let mut config = simulation.config.clone();
        config.benchmark = Symbol::from("NOT_A_SYMBOL");

        let error = Simulation::build(config, simulation.bundle).unwrap_err();
        assert!(error.to_string().contains("not found"));
    }

    #[test]
    fn test_unknown_calendar_fails_configuration() {
        let simulation = simulation();
        let mut config = simulation.config.clone();
        config.calendar = "LUNAR".into();

        let error = Simulation::build(config, simulation.bundle).unwrap_err();
        assert!(matches!(error, EngineError::Config(_)));
    }

    #[test]
    fn test_unknown_timezone_fails_configuration() {
        let simulation = simulation();
        let mut config = simulation.config.clone();
        config.timezone = "Mars/Olympus".to_string();

        let error = Simulation::build(config, simulation.bundle).unwrap_err();
        assert!(error.to_string().contains("timezone"));
    }

    #[test]
    fn test_order_submitted_mid_bar_fills_next_session() {
        let simulation = simulation();
        let context = SimulationContext::new(100_000.0, 0.0);

        let first = simulation.sessions[0];
        context.advance_session(first, simulation.session_bars(first));

        let accepted = context.submit_order(Order::market("AAPL", 10));
        let id = accepted.id.clone().expect("assigned id");
        assert_eq!(
            context.get_order(&id).expect("stored").status,
            bourse_markets::OrderStatus::Open
        );

        let second = simulation.sessions[1];
        let period = context.advance_session(second, simulation.session_bars(second));

        let filled = context.get_order(&id).expect("stored");
        assert_eq!(filled.status, bourse_markets::OrderStatus::Filled);
        assert_eq!(filled.filled, 10);
        assert_eq!(period.longs_count, 1);
        assert!(period.capital_used > 0.0);
    }

    #[test]
    fn test_periods_accumulate_into_result() {
        let simulation = simulation();
        let context = SimulationContext::new(100_000.0, 0.0);

        for date in &simulation.sessions {
            context.advance_session(*date, simulation.session_bars(*date));
        }

        let result = context.result();
        assert_eq!(result.periods.len(), 18);
        assert!(result
            .periods
            .windows(2)
            .all(|pair| pair[0].period_close <= pair[1].period_open));
    }
}
