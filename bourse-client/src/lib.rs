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

//! # Bourse-Client
//! The worker side of the Bourse backtest runtime: a fixed-size pool of
//! strategy workers behind a surveyor socket, the worker runtime itself
//! (thread or process), the strategy plugin registry, and the `bourse` CLI.
//!
//! The pool fans lifecycle operations out to every worker and requires all
//! of them to answer; each market-data bar is dispatched to exactly one free
//! worker through a per-worker try-lock. Workers run user strategy callbacks
//! and submit the resulting orders to the engine's broker socket.

/// Read-only market state handle passed to strategy callbacks.
pub mod database;

/// Identity and connectivity settings from the process environment.
pub mod environment;

/// All errors generated in `bourse-client`.
pub mod error;

/// Default tracing initialisers.
pub mod logging;

/// The worker pool: readiness collection, surveyor fan-out, bar dispatch.
pub mod pool;

/// Typed client for the HTTP registry control-plane.
pub mod registry;

/// The `Algorithm` trait, route tables and the strategy plugin registry.
pub mod strategy;

/// The worker runtime and its thread/process spawn interface.
pub mod worker;

pub use database::{Database, InMemoryDatabase};
pub use error::{ClientError, WorkerError};
pub use pool::{OnWorkerBusy, PoolConfig, WorkerPool};
pub use registry::RegistryClient;
pub use strategy::{Algorithm, StrategyRegistry, WorkerRoutes, ohlc_routes};
pub use worker::{WorkerSockets, WorkerSpawn, run_worker, run_worker_from_env};
