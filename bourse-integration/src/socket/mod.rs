use crate::{config::SocketConfig, error::SocketError};
use tokio::net::{TcpListener, TcpStream};

/// REQ/REP request-response endpoints.
pub mod request;

/// REP listener with per-peer reply contexts.
pub mod reply;

/// PUB/SUB lossy fan-out endpoints.
pub mod pubsub;

/// SURVEYOR/RESPONDENT deadline-bounded fan-out endpoints.
pub mod survey;

/// Bind a listener for `config`, resolving an ephemeral port (`port == 0`)
/// into the config so peers can be told where to dial.
pub(crate) async fn bind(config: &mut SocketConfig) -> Result<TcpListener, SocketError> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| SocketError::Bind { addr, error })?;

    if config.port == 0 {
        config.port = listener
            .local_addr()
            .map_err(SocketError::Io)?
            .port();
    }

    Ok(listener)
}

/// Dial the peer described by `config`, bounded by its send deadline.
pub(crate) async fn dial(config: &SocketConfig) -> Result<TcpStream, SocketError> {
    let addr = config.addr();
    let connect = TcpStream::connect(&addr);

    let stream = match tokio::time::timeout(config.send_deadline(), connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(error)) => return Err(SocketError::Dial { addr, error }),
        Err(_) => return Err(SocketError::Timeout),
    };

    stream.set_nodelay(true).map_err(SocketError::Io)?;
    Ok(stream)
}
