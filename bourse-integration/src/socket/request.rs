use crate::{
    config::SocketConfig,
    error::SocketError,
    frame::{read_frame, write_frame},
    message::{Request, Response},
};
use tokio::{net::TcpStream, sync::Mutex};

/// REQ endpoint: dials a [`Replier`](super::reply::Replier) peer and runs
/// strictly alternating send/receive exchanges. Shareable across tasks; the
/// inner lock keeps concurrent callers' exchanges from interleaving.
#[derive(Debug)]
pub struct Requester {
    stream: Mutex<TcpStream>,
    config: SocketConfig,
}

impl Requester {
    pub async fn connect(config: SocketConfig) -> Result<Self, SocketError> {
        let stream = super::dial(&config).await?;
        Ok(Self {
            stream: Mutex::new(stream),
            config,
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Send `request` and await the peer's response.
    pub async fn request(&self, request: &Request) -> Result<Response, SocketError> {
        let payload = request.dump()?;
        let mut stream = self.stream.lock().await;

        write_frame(&mut *stream, &payload, self.config.send_deadline()).await?;
        let frame = read_frame(&mut *stream, self.config.recv_deadline()).await?;
        Response::load(&frame)
    }
}
