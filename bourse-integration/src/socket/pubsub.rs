use crate::{
    config::SocketConfig,
    error::SocketError,
    frame::{read_frame_unbounded, write_frame},
    message::Request,
};
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// PUB endpoint: one-to-many fan-out of [`Request`] frames.
///
/// Delivery is lossy: a peer that is gone, or too slow to drain its stream
/// within the send deadline, is dropped from the broadcast set. The feed
/// barrier makes this acceptable, subscribers drain synchronously per bar.
#[derive(Debug)]
pub struct Publisher {
    mode: PublisherMode,
    config: SocketConfig,
}

#[derive(Debug)]
enum PublisherMode {
    /// Bound listener broadcasting to every dialed-in subscriber.
    Listen {
        subscribers: Arc<Mutex<Vec<TcpStream>>>,
        accept_task: JoinHandle<()>,
    },
    /// Dialer publishing towards a single listening subscriber.
    Dial { stream: Mutex<TcpStream> },
}

impl Publisher {
    pub async fn bind(mut config: SocketConfig) -> Result<Self, SocketError> {
        let listener = super::bind(&mut config).await?;
        let subscribers = Arc::new(Mutex::new(Vec::new()));
        let accept_task = tokio::spawn(accept_subscribers(listener, Arc::clone(&subscribers)));

        Ok(Self {
            mode: PublisherMode::Listen {
                subscribers,
                accept_task,
            },
            config,
        })
    }

    pub async fn dial(config: SocketConfig) -> Result<Self, SocketError> {
        let stream = super::dial(&config).await?;
        Ok(Self {
            mode: PublisherMode::Dial {
                stream: Mutex::new(stream),
            },
            config,
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub async fn subscriber_count(&self) -> usize {
        match &self.mode {
            PublisherMode::Listen { subscribers, .. } => subscribers.lock().await.len(),
            PublisherMode::Dial { .. } => 1,
        }
    }

    /// Broadcast `message` to every connected peer, dropping peers that
    /// fail or stall. Dial-mode errors surface to the caller instead.
    pub async fn publish(&self, message: &Request) -> Result<(), SocketError> {
        let payload = message.dump()?;
        let deadline = self.config.send_deadline();

        match &self.mode {
            PublisherMode::Listen { subscribers, .. } => {
                let mut subscribers = subscribers.lock().await;
                let mut alive = Vec::with_capacity(subscribers.len());
                for mut stream in subscribers.drain(..) {
                    match write_frame(&mut stream, &payload, deadline).await {
                        Ok(()) => alive.push(stream),
                        Err(error) => {
                            warn!(task = %message.task, %error, "dropping subscriber");
                        }
                    }
                }
                *subscribers = alive;
                Ok(())
            }
            PublisherMode::Dial { stream } => {
                let mut stream = stream.lock().await;
                write_frame(&mut *stream, &payload, deadline).await
            }
        }
    }

    /// Stop accepting peers and disconnect the current ones. Subscribers
    /// observe [`SocketError::Closed`] on their next receive.
    pub async fn close(&self) {
        if let PublisherMode::Listen {
            subscribers,
            accept_task,
        } = &self.mode
        {
            accept_task.abort();
            subscribers.lock().await.clear();
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if let PublisherMode::Listen { accept_task, .. } = &self.mode {
            accept_task.abort();
        }
    }
}

async fn accept_subscribers(listener: TcpListener, subscribers: Arc<Mutex<Vec<TcpStream>>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "subscriber connected");
                if stream.set_nodelay(true).is_ok() {
                    subscribers.lock().await.push(stream);
                }
            }
            Err(error) => {
                warn!(%error, "publisher accept failed");
                return;
            }
        }
    }
}

/// SUB endpoint: receives the broadcast stream of one dialed publisher, or
/// listens for many dialing publishers and merges their streams. The
/// listening form backs the worker pool's readiness socket, where every
/// worker dials in to announce itself.
#[derive(Debug)]
pub struct Subscriber {
    rx: Mutex<mpsc::UnboundedReceiver<Request>>,
    tasks: Vec<JoinHandle<()>>,
    config: SocketConfig,
}

impl Subscriber {
    pub async fn dial(config: SocketConfig) -> Result<Self, SocketError> {
        let stream = super::dial(&config).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_frames(stream, tx));

        Ok(Self {
            rx: Mutex::new(rx),
            tasks: vec![pump],
            config,
        })
    }

    pub async fn bind(mut config: SocketConfig) -> Result<Self, SocketError> {
        let listener = super::bind(&mut config).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let accept = tokio::spawn(accept_publishers(listener, tx));

        Ok(Self {
            rx: Mutex::new(rx),
            tasks: vec![accept],
            config,
        })
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Receive the next published message, in publish order per publisher.
    pub async fn recv(&self) -> Result<Request, SocketError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(self.config.recv_deadline(), rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(SocketError::Closed),
            Err(_) => Err(SocketError::Timeout),
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn accept_publishers(listener: TcpListener, tx: mpsc::UnboundedSender<Request>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "publisher connected");
                tokio::spawn(pump_frames(stream, tx.clone()));
            }
            Err(error) => {
                warn!(%error, "subscriber accept failed");
                return;
            }
        }
    }
}

/// Forward decoded frames into the merged channel until the peer closes.
async fn pump_frames(mut stream: TcpStream, tx: mpsc::UnboundedSender<Request>) {
    loop {
        match read_frame_unbounded(&mut stream).await {
            Ok(frame) => match Request::load(&frame) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        return;
                    }
                }
                Err(error) => warn!(%error, "discarding undecodable published frame"),
            },
            Err(error) => {
                if !error.is_closed() {
                    warn!(%error, "subscriber stream failed");
                }
                return;
            }
        }
    }
}
