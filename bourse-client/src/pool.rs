use crate::{
    error::{ClientError, WorkerError},
    strategy::WorkerRoutes,
    worker::{WorkerAck, WorkerHandle, WorkerSockets, WorkerSpawn, spawn_worker},
};
use bourse_integration::{
    Request, Requester, SocketConfig, SocketPattern, Subscriber, Surveyor,
};
use bourse_markets::{Ohlc, Order, WorkerConfig};
use itertools::Itertools;
use smol_str::SmolStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What to do with a bar when no worker lock frees up within the dispatch
/// timeout.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OnWorkerBusy {
    /// Log a warning and drop the bar (at-most-once delivery per bar).
    #[default]
    Drop,
    /// Keep waiting for a free worker.
    Block,
    /// Fail the dispatch.
    Fail,
}

/// Worker pool tunables.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers to start.
    pub executors: usize,
    /// Thread or process workers, chosen at construction.
    pub spawn: WorkerSpawn,
    /// Strategy name process workers resolve at startup.
    pub strategy: SmolStr,
    /// How long `setup` waits for all ready signals.
    pub setup_timeout: Duration,
    /// Deadline for each surveyor fan-out.
    pub survey_timeout: Duration,
    /// How long a bar may wait for a free worker.
    pub dispatch_timeout: Duration,
    pub on_worker_busy: OnWorkerBusy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            executors: 2,
            spawn: WorkerSpawn::Thread,
            strategy: "noop".into(),
            setup_timeout: Duration::from_secs(10),
            survey_timeout: Duration::from_secs(5),
            dispatch_timeout: Duration::from_secs(5),
            on_worker_busy: OnWorkerBusy::default(),
        }
    }
}

#[derive(Debug)]
struct WorkerChannel {
    worker: usize,
    requester: tokio::sync::Mutex<Requester>,
}

/// A fixed-size pool of workers behind a surveyor socket.
///
/// Lifecycle operations (`configure`, `run_backtest`, `stop`) fan out to
/// every worker and require all of them to respond; per-bar dispatch hands
/// each bar to exactly one free worker. The two never run concurrently: a
/// single dispatcher task serialises all pool socket traffic.
#[derive(Debug)]
pub struct WorkerPool {
    config: PoolConfig,
    surveyor: Surveyor,
    workers: Vec<WorkerHandle>,
    channels: Vec<WorkerChannel>,
}

impl WorkerPool {
    /// Bind the pool sockets, spawn `executors` workers and block until
    /// every one has published `ready` (or the setup deadline passes).
    pub async fn setup(config: PoolConfig, routes: WorkerRoutes) -> Result<Self, ClientError> {
        let surveyor = Surveyor::bind(SocketConfig::listener(SocketPattern::Surveyor)).await?;
        let state = Subscriber::bind(
            SocketConfig::listener(SocketPattern::Sub)
                .with_recv_timeout(Duration::from_millis(100)),
        )
        .await?;

        let sockets = WorkerSockets {
            surveyor: surveyor.config().to_dialer(SocketPattern::Respondent),
            state: state.config().to_dialer(SocketPattern::Pub),
        };

        let mut workers = Vec::with_capacity(config.executors);
        for id in 0..config.executors {
            workers.push(spawn_worker(
                config.spawn,
                id,
                sockets.clone(),
                routes.clone(),
                &config.strategy,
            )?);
        }

        collect_ready(&state, config.executors, config.setup_timeout).await?;
        info!(executors = config.executors, spawn = ?config.spawn, "worker pool ready");

        Ok(Self {
            config,
            surveyor,
            workers,
            channels: Vec::new(),
        })
    }

    /// Fan `configure` out to every worker, collecting each worker's per-bar
    /// inbox address from its reply.
    pub async fn configure(&mut self, config: WorkerConfig) -> Result<(), ClientError> {
        let responses = self
            .survey(Request::with_data("configure", &config)?)
            .await?;

        let mut channels = Vec::with_capacity(responses.len());
        for response in responses {
            let ack: WorkerAck = response.payload()?;
            let requester =
                Requester::connect(ack.socket.to_dialer(SocketPattern::Req)).await?;
            channels.push(WorkerChannel {
                worker: ack.worker,
                requester: tokio::sync::Mutex::new(requester),
            });
        }

        // Fixed scan order for the dispatch try-locks.
        self.channels = channels
            .into_iter()
            .sorted_by_key(|channel| channel.worker)
            .collect();
        Ok(())
    }

    pub async fn run_backtest(&mut self) -> Result<(), ClientError> {
        self.survey(Request::new("run_backtest")).await?;
        Ok(())
    }

    /// Stop every worker. The pool is unusable afterwards.
    pub async fn stop(&mut self) -> Result<(), ClientError> {
        let outcome = self.survey(Request::new("stop")).await;
        for worker in &mut self.workers {
            worker.shutdown();
        }
        self.workers.clear();
        self.channels.clear();
        outcome.map(|_| ())
    }

    /// Emit one survey and require a response from every worker. A missing
    /// response leaves the pool indeterminate: callers must `stop`.
    async fn survey(
        &self,
        request: Request,
    ) -> Result<Vec<bourse_integration::Response>, ClientError> {
        let expected = self.config.executors;
        let responses = self
            .surveyor
            .survey(&request, expected, self.config.survey_timeout)
            .await
            .map_err(|error| match error {
                bourse_integration::SocketError::Survey {
                    task,
                    expected,
                    received,
                } => ClientError::Worker(WorkerError::Survey {
                    task,
                    expected,
                    received,
                }),
                other => ClientError::Socket(other),
            })?;

        for response in &responses {
            if let Some(error) = &response.error {
                return Err(ClientError::Worker(WorkerError::Remote(error.clone())));
            }
        }
        Ok(responses)
    }

    /// Hand `bar` to exactly one free worker: scan the try-locks in fixed
    /// order, dispatch through the first free one, release on reply.
    ///
    /// Returns the accepted order the worker produced, if any; `Ok(None)`
    /// also covers a dropped bar under [`OnWorkerBusy::Drop`].
    pub async fn dispatch(&self, bar: &Ohlc) -> Result<Option<Order>, ClientError> {
        if self.channels.is_empty() {
            return Err(ClientError::Worker(WorkerError::NotConfigured));
        }

        let request = Request::with_data("ohlc", bar)?;
        let deadline = Instant::now() + self.config.dispatch_timeout;

        loop {
            for channel in &self.channels {
                let Ok(requester) = channel.requester.try_lock() else {
                    continue;
                };

                debug!(worker = channel.worker, instrument = %bar.instrument, "dispatching bar");
                let response = requester.request(&request).await?;
                if let Some(error) = response.error {
                    return Err(ClientError::Worker(WorkerError::Remote(error)));
                }
                let order = if response.data.is_some() {
                    Some(response.payload()?)
                } else {
                    None
                };
                return Ok(order);
            }

            match self.config.on_worker_busy {
                OnWorkerBusy::Fail => {
                    return Err(ClientError::Worker(WorkerError::Busy));
                }
                OnWorkerBusy::Drop if Instant::now() >= deadline => {
                    warn!(instrument = %bar.instrument, time = %bar.time, "no free worker, dropping bar");
                    return Ok(None);
                }
                _ => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    }

    /// Drive one engine run: subscribe to the feed, issue `run`, dispatch
    /// every bar, answer each `day_completed` with `continue` once the day's
    /// dispatches drained, and return when `backtest_completed` arrives (or
    /// the feed closes).
    ///
    /// Subscribing happens before `run` so the first session's messages
    /// cannot be missed.
    pub async fn run_session(
        &self,
        feed: SocketConfig,
        control: &Requester,
    ) -> Result<(), ClientError> {
        let market = Subscriber::dial(feed).await?;
        // Let the feed publisher register us before the run starts.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = control.request(&Request::new("run")).await?;
        if let Some(error) = response.error {
            return Err(ClientError::Engine(error));
        }

        loop {
            let message = match market.recv().await {
                Ok(message) => message,
                Err(error) if error.is_timeout() => continue,
                Err(error) if error.is_closed() => return Ok(()),
                Err(error) => return Err(error.into()),
            };

            match message.task.as_str() {
                "ohlc" => {
                    let bar: Ohlc = message.payload()?;
                    self.dispatch(&bar).await?;
                }
                "day_completed" => {
                    let response = control.request(&Request::new("continue")).await?;
                    if let Some(error) = response.error {
                        return Err(ClientError::Engine(error));
                    }
                }
                "backtest_completed" => return Ok(()),
                // Periods and positions inform the engine-side result; the
                // pool only drives dispatch.
                _ => {}
            }
        }
    }
}

/// Block until `expected` ready announcements arrive on the state socket.
pub(crate) async fn collect_ready(
    state: &Subscriber,
    expected: usize,
    timeout: Duration,
) -> Result<(), WorkerError> {
    let deadline = Instant::now() + timeout;
    let mut received = 0;

    while received < expected {
        if Instant::now() >= deadline {
            return Err(WorkerError::SetupTimeout { expected, received });
        }
        match state.recv().await {
            Ok(message) if message.task == "ready" => {
                received += 1;
                debug!(received, expected, "worker ready signal");
            }
            Ok(_) => {}
            Err(error) if error.is_timeout() => {}
            Err(_) => return Err(WorkerError::SetupTimeout { expected, received }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_integration::Publisher;

    #[tokio::test]
    async fn test_collect_ready_returns_once_all_workers_announce() {
        let state = Subscriber::bind(
            SocketConfig::listener(SocketPattern::Sub)
                .with_recv_timeout(Duration::from_millis(20)),
        )
        .await
        .expect("bind");
        let dialer = state.config().to_dialer(SocketPattern::Pub);

        for _ in 0..2 {
            let publisher = Publisher::dial(dialer.clone()).await.expect("dial");
            publisher
                .publish(&Request::new("ready"))
                .await
                .expect("publish");
        }

        collect_ready(&state, 2, Duration::from_secs(1))
            .await
            .expect("both ready");
    }

    #[tokio::test]
    async fn test_collect_ready_times_out_when_a_worker_is_missing() {
        let state = Subscriber::bind(
            SocketConfig::listener(SocketPattern::Sub)
                .with_recv_timeout(Duration::from_millis(20)),
        )
        .await
        .expect("bind");

        // Only one of the two expected workers ever announces.
        let publisher = Publisher::dial(state.config().to_dialer(SocketPattern::Pub))
            .await
            .expect("dial");
        publisher
            .publish(&Request::new("ready"))
            .await
            .expect("publish");

        let error = collect_ready(&state, 2, Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            WorkerError::SetupTimeout {
                expected: 2,
                received: 1
            }
        ));
    }
}
