use crate::{
    config::SocketConfig,
    error::SocketError,
    frame::{read_frame, write_frame},
    message::{Request, Response},
};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// REP endpoint: listens for peers and serves one [`ReplyContext`] per
/// accepted connection. Contexts are independent, so several in-flight
/// request/response exchanges can run concurrently on one bound address.
#[derive(Debug)]
pub struct Replier {
    listener: TcpListener,
    config: SocketConfig,
}

impl Replier {
    pub async fn bind(mut config: SocketConfig) -> Result<Self, SocketError> {
        let listener = super::bind(&mut config).await?;
        Ok(Self { listener, config })
    }

    /// Bound descriptor, with any ephemeral port resolved.
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Wait for the next peer, bounded by the receive deadline so owning
    /// loops can poll shutdown flags between attempts.
    pub async fn accept(&self) -> Result<ReplyContext, SocketError> {
        let accepted = tokio::time::timeout(self.config.recv_deadline(), self.listener.accept());
        match accepted.await {
            Ok(Ok((stream, peer))) => {
                stream.set_nodelay(true).map_err(SocketError::Io)?;
                Ok(ReplyContext {
                    stream,
                    peer,
                    config: self.config.clone(),
                })
            }
            Ok(Err(error)) => Err(SocketError::from_io(error)),
            Err(_) => Err(SocketError::Timeout),
        }
    }
}

/// One peer's connection to a [`Replier`]. Tracks who sent the request so
/// the response goes back to the same peer.
#[derive(Debug)]
pub struct ReplyContext {
    stream: TcpStream,
    peer: SocketAddr,
    config: SocketConfig,
}

impl ReplyContext {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn recv(&mut self) -> Result<Request, SocketError> {
        let frame = read_frame(&mut self.stream, self.config.recv_deadline()).await?;
        Request::load(&frame)
    }

    pub async fn send(&mut self, response: &Response) -> Result<(), SocketError> {
        let payload = response.dump()?;
        write_frame(&mut self.stream, &payload, self.config.send_deadline()).await
    }
}
