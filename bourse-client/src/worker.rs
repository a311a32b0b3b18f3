use crate::{
    database::{Database, InMemoryDatabase},
    error::{ClientError, WorkerError},
    strategy::{StrategyRegistry, WorkerRoutes, ohlc_routes},
};
use bourse_integration::{
    Publisher, Replier, ReplyContext, Request, Requester, Respondent, Response, SocketConfig,
    SocketPattern,
};
use bourse_markets::{Ohlc, Order, Parameters, Position, WorkerConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where a freshly spawned worker finds its pool.
#[derive(Debug, Clone)]
pub struct WorkerSockets {
    /// The pool's surveyor socket, dialed by the worker's respondent.
    pub surveyor: SocketConfig,
    /// The pool's readiness socket, dialed by the worker's publisher.
    pub state: SocketConfig,
}

/// Readiness announcement published on the pool's state socket.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct WorkerReady {
    pub worker: usize,
}

/// `configure` survey reply: where the pool can dial this worker's per-bar
/// inbox.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct WorkerAck {
    pub worker: usize,
    pub socket: SocketConfig,
}

/// Thread workers run in-process; process workers re-exec the current
/// executable. The protocol is identical either way.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WorkerSpawn {
    Thread,
    Process,
}

#[derive(Debug)]
pub(crate) enum WorkerHandle {
    Thread(JoinHandle<Result<(), ClientError>>),
    Process(tokio::process::Child),
}

impl WorkerHandle {
    pub(crate) fn shutdown(&mut self) {
        match self {
            Self::Thread(task) => task.abort(),
            Self::Process(child) => {
                let _ = child.start_kill();
            }
        }
    }
}

pub(crate) fn spawn_worker(
    spawn: WorkerSpawn,
    id: usize,
    sockets: WorkerSockets,
    routes: WorkerRoutes,
    strategy: &str,
) -> Result<WorkerHandle, WorkerError> {
    match spawn {
        WorkerSpawn::Thread => Ok(WorkerHandle::Thread(tokio::spawn(run_worker(
            id, sockets, routes,
        )))),
        WorkerSpawn::Process => {
            let exe = std::env::current_exe()
                .map_err(|error| WorkerError::Spawn(error.to_string()))?;
            let child = tokio::process::Command::new(exe)
                .args(["worker", "serve"])
                .env("WORKER_ID", id.to_string())
                .env("WORKER_STRATEGY", strategy)
                .env("POOL_SURVEYOR", sockets.surveyor.addr())
                .env("POOL_STATE", sockets.state.addr())
                .kill_on_drop(true)
                .spawn()
                .map_err(|error| WorkerError::Spawn(error.to_string()))?;
            Ok(WorkerHandle::Process(child))
        }
    }
}

/// Entry point for process workers: pool coordinates arrive in the
/// environment, the strategy is resolved by name from `registry`.
pub async fn run_worker_from_env(registry: &StrategyRegistry) -> Result<(), ClientError> {
    let id = std::env::var("WORKER_ID")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let strategy = std::env::var("WORKER_STRATEGY").unwrap_or_else(|_| "noop".to_string());

    let sockets = WorkerSockets {
        surveyor: dialer_from_addr(
            SocketPattern::Respondent,
            &required_env("POOL_SURVEYOR")?,
        )?,
        state: dialer_from_addr(SocketPattern::Pub, &required_env("POOL_STATE")?)?,
    };

    run_worker(id, sockets, ohlc_routes(registry.get(&strategy)?)).await
}

fn required_env(key: &str) -> Result<String, ClientError> {
    std::env::var(key)
        .map_err(|_| ClientError::Worker(WorkerError::Spawn(format!("{key} is not set"))))
}

fn dialer_from_addr(pattern: SocketPattern, addr: &str) -> Result<SocketConfig, ClientError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ClientError::Worker(WorkerError::Spawn(format!("bad address {addr}"))))?;
    let port = port
        .parse()
        .map_err(|_| ClientError::Worker(WorkerError::Spawn(format!("bad port in {addr}"))))?;
    Ok(SocketConfig::dialer(pattern, host, port))
}

struct WorkerShared {
    id: usize,
    routes: WorkerRoutes,
    database: Arc<InMemoryDatabase>,
    broker: Requester,
    parameters: Parameters,
    cursor: Mutex<Option<DateTime<Utc>>>,
    online: Arc<AtomicBool>,
}

struct WorkerSession {
    inbox: Arc<Replier>,
    shared: Arc<WorkerShared>,
    service: Option<JoinHandle<()>>,
}

impl WorkerSession {
    async fn configure(
        id: usize,
        config: WorkerConfig,
        routes: WorkerRoutes,
        online: Arc<AtomicBool>,
    ) -> Result<Self, ClientError> {
        let inbox = Replier::bind(SocketConfig::listener(SocketPattern::Rep)).await?;
        let broker = Requester::connect(config.broker.to_dialer(SocketPattern::Req)).await?;

        info!(
            worker = id,
            execution = %config.execution_id,
            inbox = %inbox.config().addr(),
            "worker configured"
        );
        Ok(Self {
            inbox: Arc::new(inbox),
            shared: Arc::new(WorkerShared {
                id,
                routes,
                database: Arc::new(InMemoryDatabase::new()),
                broker,
                parameters: config.parameters,
                cursor: Mutex::new(None),
                online,
            }),
            service: None,
        })
    }

    fn ack(&self) -> WorkerAck {
        WorkerAck {
            worker: self.shared.id,
            socket: self.inbox.config().clone(),
        }
    }

    fn start(&mut self) {
        if self.service.is_none() {
            self.service = Some(tokio::spawn(serve_inbox(
                Arc::clone(&self.inbox),
                Arc::clone(&self.shared),
            )));
        }
    }

    fn is_running(&self) -> bool {
        self.service.is_some()
    }

    fn shutdown(&mut self) {
        if let Some(service) = self.service.take() {
            service.abort();
        }
    }
}

/// The worker runtime: announce readiness, answer pool surveys, and serve
/// the per-bar inbox while running.
///
/// State machine: SPAWNED -> READY -> CONFIGURED -> RUNNING -> TERMINATED,
/// where `stop` terminates from any state and unknown survey tasks leave the
/// state unchanged with an error response.
pub async fn run_worker(
    id: usize,
    sockets: WorkerSockets,
    routes: WorkerRoutes,
) -> Result<(), ClientError> {
    let respondent = Respondent::connect(sockets.surveyor).await?;
    let ready = Publisher::dial(sockets.state).await?;
    ready
        .publish(&Request::with_data("ready", &WorkerReady { worker: id })?)
        .await?;
    info!(worker = id, "worker ready");

    let online = Arc::new(AtomicBool::new(true));
    let mut session: Option<WorkerSession> = None;

    while online.load(Ordering::Acquire) {
        let survey = match respondent.recv().await {
            Ok(survey) => survey,
            Err(error) if error.is_timeout() => continue,
            Err(error) => {
                if !error.is_closed() {
                    warn!(worker = id, %error, "worker survey socket failed");
                }
                break;
            }
        };

        debug!(worker = id, task = %survey.task, "survey received");
        let task = survey.task.clone();
        let response = match task.as_str() {
            // Reconfigure is allowed from READY and CONFIGURED only; a
            // running session keeps its inbox until `stop`.
            "configure" if session.as_ref().is_some_and(WorkerSession::is_running) => {
                Response::from_error(task.clone(), "worker is already running")
            }
            "configure" => match survey.payload::<WorkerConfig>() {
                Ok(config) => {
                    match WorkerSession::configure(
                        id,
                        config,
                        routes.clone(),
                        Arc::clone(&online),
                    )
                    .await
                    {
                        Ok(new_session) => {
                            let ack = new_session.ack();
                            session = Some(new_session);
                            Response::with_data(task.clone(), &ack)?
                        }
                        Err(error) => Response::from_error(task.clone(), error),
                    }
                }
                Err(error) => Response::from_error(task.clone(), error),
            },
            "run_backtest" => match session.as_mut() {
                Some(session) => {
                    session.start();
                    Response::ok(task.clone())
                }
                None => Response::from_error(task.clone(), "worker is not configured"),
            },
            "stop" => {
                online.store(false, Ordering::Release);
                Response::ok(task.clone())
            }
            _ => Response::from_error(task.clone(), "task not found"),
        };

        respondent.send(&response).await?;
    }

    if let Some(mut session) = session.take() {
        session.shutdown();
    }
    info!(worker = id, "worker terminated");
    Ok(())
}

/// Accept pool connections to the per-bar inbox while the worker is online.
async fn serve_inbox(inbox: Arc<Replier>, shared: Arc<WorkerShared>) {
    while shared.online.load(Ordering::Acquire) {
        match inbox.accept().await {
            Ok(context) => {
                tokio::spawn(serve_inbox_context(context, Arc::clone(&shared)));
            }
            Err(error) if error.is_timeout() => continue,
            Err(_) => return,
        }
    }
}

async fn serve_inbox_context(mut context: ReplyContext, shared: Arc<WorkerShared>) {
    while shared.online.load(Ordering::Acquire) {
        let request = match context.recv().await {
            Ok(request) => request,
            Err(error) if error.is_timeout() => continue,
            Err(_) => return,
        };

        let response = process_bar(&shared, request).await;
        if context.send(&response).await.is_err() {
            return;
        }
    }
}

/// One bar: advance the date cursor, record the bar, invoke the route, and
/// submit any resulting order intent to the engine's broker.
async fn process_bar(shared: &WorkerShared, request: Request) -> Response {
    let Some(algorithm) = shared.routes.get(&request.task) else {
        return Response::from_error(request.task, "task not found");
    };

    let bar: Ohlc = match request.payload() {
        Ok(bar) => bar,
        Err(error) => return Response::from_error(request.task, error),
    };

    *shared.cursor.lock() = Some(bar.time);
    shared.database.record_bar(bar.clone());

    let intent = match algorithm.on_bar(&bar, &*shared.database, &shared.parameters) {
        Ok(None) => return Response::ok(request.task),
        Ok(Some(intent)) => intent,
        Err(error) => return Response::from_error(request.task, error),
    };

    let cursor = *shared.cursor.lock();
    debug!(worker = shared.id, cursor = ?cursor, instrument = %intent.instrument, amount = intent.amount, "submitting order");
    let submit = match Request::with_data("order", &intent) {
        Ok(submit) => submit,
        Err(error) => return Response::from_error(request.task, error),
    };
    match shared.broker.request(&submit).await {
        Ok(reply) => match reply.error {
            None => {
                track_position(shared, &bar, &intent);
                Response {
                    task: request.task,
                    error: None,
                    data: reply.data,
                }
            }
            Some(error) => Response::from_error(request.task, error),
        },
        Err(error) => Response::from_error(request.task, error),
    }
}

/// Optimistically track the position the accepted order implies, so
/// strategies consulting `get_position` see their own intent before the
/// next feed snapshot.
fn track_position(shared: &WorkerShared, bar: &Ohlc, intent: &Order) {
    let held = shared
        .database
        .get_position(&intent.instrument)
        .map(|position| position.amount)
        .unwrap_or(0);
    shared.database.record_position(Position::new(
        intent.instrument.clone(),
        held + intent.amount,
        bar.close,
        bar.close,
        bar.time,
    ));
}
