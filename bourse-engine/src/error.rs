use bourse_integration::{RouterError, SocketError};
use bourse_markets::MarketError;
use thiserror::Error;

/// All errors generated in `bourse-engine`.
///
/// `Config`, `Broker` and `NotRunning` travel to peers inside
/// `Response.error`; `EndOfDay` is fatal to the simulation and transitions
/// the engine to stopped.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ConfigError: {0}")]
    Config(String),

    #[error("BrokerError: {0}")]
    Broker(String),

    #[error("backtest is not running")]
    NotRunning,

    #[error("timeout when waiting for new day")]
    EndOfDay,

    #[error("ingestion failed: {0}")]
    Ingest(String),

    #[error("market data: {0}")]
    Market(#[from] MarketError),

    #[error("socket: {0}")]
    Socket(#[from] SocketError),

    #[error("router: {0}")]
    Router(#[from] RouterError),
}
