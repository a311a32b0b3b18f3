#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Bourse-Engine
//! The backtest engine: replays historical market bars day by day in
//! lock-step with its controller. On each bar it publishes the period
//! snapshot, positions and OHLC bars on the feed socket, answers order tasks
//! on the broker socket, and holds the simulation clock at a barrier until
//! the controller signals `continue`.
//!
//! The engine is one of three independent processes (engine, worker pool,
//! workers) coordinated purely over message-oriented sockets; see
//! `bourse-integration` for the wire fabric and `bourse-client` for the
//! worker side.

/// The engine application: control socket, lifecycle state machine.
pub mod app;

/// Broker endpoint: order submission against the running simulation.
pub mod broker;

/// Named bundles of historical bars and their registry.
pub mod bundle;

/// All errors generated in `bourse-engine`.
pub mod error;

/// Market-data feed publisher and the per-bar barrier.
pub mod feed;

/// Bundle ingestion: the `Ingester` trait and shipped implementations.
pub mod ingest;

/// Replier service loops shared by the control and broker endpoints.
mod service;

/// Simulation internals: calendar, portfolio, blotter, clock context.
pub mod simulation;

pub use app::{Engine, EngineInfo, EngineSettings, EngineStatus};
pub use broker::OpenOrders;
pub use bundle::{Bundle, BundleStore};
pub use error::EngineError;
pub use feed::BarrierSettings;
pub use ingest::{CsvIngester, Ingester, SyntheticIngester};
pub use simulation::{Simulation, SimulationContext, calendar::TradingCalendar};
