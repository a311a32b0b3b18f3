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

//! # Bourse-Markets
//! Shared market domain model for the Bourse backtest runtime. One schema
//! for instruments, bars, orders, positions and per-bar period snapshots,
//! kept stable across the engine, worker pool and worker roles.
//!
//! All types serialise to self-describing JSON; `load(dump(x)) == x` holds
//! for every payload that crosses a socket.

/// Engine, ingestion and worker configuration payloads.
pub mod config;

/// Domain model invariant violations.
pub mod error;

/// Deterministic object factories for tests across the workspace.
pub mod factories;

/// Tradable instruments and their identifiers.
pub mod instrument;

/// OHLCV bars.
pub mod ohlc;

/// Orders and their lifecycle.
pub mod order;

/// Per-bar portfolio snapshots and the aggregate run result.
pub mod period;

/// Portfolio positions.
pub mod position;

pub use config::{DatabaseConfig, EngineConfig, IngestConfig, Parameters, WorkerConfig};
pub use error::MarketError;
pub use instrument::{Instrument, Symbol};
pub use ohlc::Ohlc;
pub use order::{Order, OrderId, OrderStatus};
pub use period::{BacktestResult, Period};
pub use position::Position;
