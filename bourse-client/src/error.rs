use bourse_integration::{RouterError, SocketError};
use smol_str::SmolStr;
use thiserror::Error;

/// Worker-pool coordination failures. `SetupTimeout` and `Survey` leave the
/// pool in an indeterminate state: the caller must issue `stop`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker pool setup timed out with {received} of {expected} workers ready")]
    SetupTimeout { expected: usize, received: usize },

    #[error("survey {task} collected {received} of {expected} worker responses")]
    Survey {
        task: SmolStr,
        expected: usize,
        received: usize,
    },

    #[error("worker replied with error: {0}")]
    Remote(String),

    #[error("no worker free to take the bar")]
    Busy,

    #[error("worker pool is not configured")]
    NotConfigured,

    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

/// All errors generated in `bourse-client`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket: {0}")]
    Socket(#[from] SocketError),

    #[error("router: {0}")]
    Router(#[from] RouterError),

    #[error("worker: {0}")]
    Worker(#[from] WorkerError),

    #[error("strategy {0} already registered")]
    StrategyAlreadyRegistered(SmolStr),

    #[error("strategy {0} not found")]
    StrategyNotFound(SmolStr),

    #[error("route {0} already registered")]
    RouteAlreadyRegistered(SmolStr),

    #[error("algorithm: {0}")]
    Algorithm(String),

    #[error("registry request failed: {0}")]
    RegistryHttp(#[from] reqwest::Error),

    #[error("registry responded {status}: {body}")]
    Registry { status: u16, body: String },

    #[error("invalid registry url: {0}")]
    Url(#[from] url::ParseError),

    #[error("engine replied with error: {0}")]
    Engine(String),
}
