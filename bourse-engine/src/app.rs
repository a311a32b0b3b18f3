use crate::{
    broker::Broker,
    bundle::BundleStore,
    error::EngineError,
    feed::{BarrierSettings, Feed},
    ingest::Ingester,
    service::spawn_replier_service,
    simulation::{Simulation, SimulationContext},
};
use bourse_integration::{HandlerError, Replier, Router, SocketConfig, SocketPattern};
use bourse_markets::{BacktestResult, EngineConfig, IngestConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Engine construction parameters. Socket configs default to ephemeral
/// local listeners whose real ports are reported by `info`.
#[derive(Debug)]
pub struct EngineSettings {
    pub control: SocketConfig,
    pub feed: SocketConfig,
    pub broker: SocketConfig,
    pub barrier: BarrierSettings,
    pub capital_base: f64,
    pub commission_per_share: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            control: SocketConfig::listener(SocketPattern::Rep),
            feed: SocketConfig::listener(SocketPattern::Pub),
            broker: SocketConfig::listener(SocketPattern::Rep),
            barrier: BarrierSettings::default(),
            capital_base: 100_000.0,
            commission_per_share: 0.001,
        }
    }
}

/// `info` payload: where to find the engine's three sockets.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineInfo {
    pub socket: SocketConfig,
    pub feed: SocketNode,
    pub broker: SocketNode,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SocketNode {
    pub socket: SocketConfig,
}

/// `status` payload.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub configured: bool,
    pub day_completed: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RunAck {
    pub status: String,
}

/// The backtest engine application.
///
/// Owns the simulation clock and exposes three sockets: a control replier
/// (`info`, `ingest`, `configure`, `run`, `continue`, `status`, `stop`,
/// `result`), the market-data feed publisher, and the broker replier. The
/// control and broker endpoints serve concurrently with the clock task; the
/// clock itself is single-threaded.
pub struct Engine {
    shared: Arc<EngineShared>,
    service: JoinHandle<()>,
}

struct EngineShared {
    control_config: SocketConfig,
    online: Arc<AtomicBool>,
    sim_running: AtomicBool,
    simulation: Mutex<Option<Simulation>>,
    feed: Feed,
    broker: Broker,
    store: Mutex<BundleStore>,
    ingester: Box<dyn Ingester>,
    result: Mutex<Option<Result<BacktestResult, String>>>,
    sim_task: Mutex<Option<JoinHandle<()>>>,
    stop_lock: tokio::sync::Mutex<()>,
    capital_base: f64,
    commission_per_share: f64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("control", &self.shared.control_config.addr())
            .field("running", &self.shared.sim_running.load(Ordering::Acquire))
            .finish()
    }
}

impl Engine {
    /// Bind all three sockets and start serving the control endpoint.
    pub async fn start(
        settings: EngineSettings,
        store: BundleStore,
        ingester: Box<dyn Ingester>,
    ) -> Result<Self, EngineError> {
        let control = Arc::new(Replier::bind(settings.control).await?);
        let feed = Feed::bind(settings.feed, settings.barrier).await?;
        let broker = Broker::bind(settings.broker).await?;

        let online = Arc::new(AtomicBool::new(true));
        let shared = Arc::new(EngineShared {
            control_config: control.config().clone(),
            online: Arc::clone(&online),
            sim_running: AtomicBool::new(false),
            simulation: Mutex::new(None),
            feed,
            broker,
            store: Mutex::new(store),
            ingester,
            result: Mutex::new(None),
            sim_task: Mutex::new(None),
            stop_lock: tokio::sync::Mutex::new(()),
            capital_base: settings.capital_base,
            commission_per_share: settings.commission_per_share,
        });

        let router = Arc::new(build_control_router(Arc::clone(&shared))?);
        let service = spawn_replier_service(control, router, online);

        info!(
            control = %shared.control_config.addr(),
            feed = %shared.feed.config().addr(),
            broker = %shared.broker.config().addr(),
            "engine started"
        );

        Ok(Self { shared, service })
    }

    pub fn control_config(&self) -> &SocketConfig {
        &self.shared.control_config
    }

    pub fn feed_config(&self) -> &SocketConfig {
        self.shared.feed.config()
    }

    pub fn broker_config(&self) -> &SocketConfig {
        self.shared.broker.config()
    }

    /// Full shutdown: tear down the simulation, feed and broker, then the
    /// control endpoint itself.
    pub async fn stop(&self) {
        self.shared.stop().await;
        self.shared.online.store(false, Ordering::Release);
        self.service.abort();
    }
}

impl EngineShared {
    fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.sim_running.load(Ordering::Acquire),
            configured: self.simulation.lock().is_some(),
            day_completed: self.feed.day_completed(),
        }
    }

    /// Idempotent teardown of feed, broker and simulation clock. The
    /// exclusive lock keeps concurrent `stop` calls from double-closing.
    async fn stop(&self) {
        let _guard = self.stop_lock.lock().await;

        self.sim_running.store(false, Ordering::Release);
        if let Some(task) = self.sim_task.lock().take() {
            task.abort();
        }
        self.feed.stop().await;
        self.broker.stop();
    }
}

/// The simulation clock: replays every session through the feed barrier,
/// then emits `backtest_completed`.
async fn run_simulation(
    shared: Arc<EngineShared>,
    simulation: Simulation,
    context: SimulationContext,
) {
    let outcome = async {
        for date in &simulation.sessions {
            let bars = simulation.session_bars(*date);
            let period = context.advance_session(*date, bars.clone());
            shared.feed.handle_data(&period, &bars).await?;
        }
        shared.feed.backtest_completed().await?;
        Ok::<_, EngineError>(())
    }
    .await;

    match outcome {
        Ok(()) => {
            info!(
                sessions = simulation.sessions.len(),
                "backtest completed"
            );
            *shared.result.lock() = Some(Ok(context.result()));
        }
        Err(error) => {
            warn!(%error, "simulation aborted");
            *shared.result.lock() = Some(Err(error.to_string()));
        }
    }
    shared.sim_running.store(false, Ordering::Release);
}

fn build_control_router(shared: Arc<EngineShared>) -> Result<Router, EngineError> {
    let mut router = Router::new();

    let state = Arc::clone(&shared);
    router.register("info", move |_: ()| {
        let state = Arc::clone(&state);
        async move {
            Ok(EngineInfo {
                socket: state.control_config.clone(),
                feed: SocketNode {
                    socket: state.feed.config().clone(),
                },
                broker: SocketNode {
                    socket: state.broker.config().clone(),
                },
                running: state.sim_running.load(Ordering::Acquire),
            })
        }
    })?;

    let state = Arc::clone(&shared);
    router.register("ingest", move |config: IngestConfig| {
        let state = Arc::clone(&state);
        async move {
            let bundle = state.ingester.ingest(&config).await?;
            state.store.lock().insert(bundle)?;
            Ok(())
        }
    })?;

    let state = Arc::clone(&shared);
    router.register("configure", move |config: EngineConfig| {
        let state = Arc::clone(&state);
        async move {
            if state.sim_running.load(Ordering::Acquire) {
                return Err(config_error("cannot configure a running backtest"));
            }

            let bundle = state
                .store
                .lock()
                .get(&config.bundle)
                .ok_or_else(|| config_error(&format!("bundle {} not found", config.bundle)))?;

            let simulation = Simulation::build(config, bundle)?;
            info!(
                sessions = simulation.sessions.len(),
                bundle = %simulation.bundle.name,
                "backtest configured"
            );
            *state.simulation.lock() = Some(simulation);
            Ok(())
        }
    })?;

    let state = Arc::clone(&shared);
    router.register("run", move |_: ()| {
        let state = Arc::clone(&state);
        async move {
            if state.sim_running.load(Ordering::Acquire) {
                return Err(config_error("backtest is already running"));
            }
            let simulation = state
                .simulation
                .lock()
                .clone()
                .ok_or_else(|| config_error("backtest is not configured"))?;

            let universe: HashSet<_> = simulation.config.instruments.iter().cloned().collect();
            let context = SimulationContext::new(state.capital_base, state.commission_per_share);
            state.broker.start(context.clone(), universe)?;

            *state.result.lock() = None;
            state.sim_running.store(true, Ordering::Release);
            let task = tokio::spawn(run_simulation(Arc::clone(&state), simulation, context));
            *state.sim_task.lock() = Some(task);

            Ok(RunAck {
                status: "ok".to_string(),
            })
        }
    })?;

    let state = Arc::clone(&shared);
    router.register("continue", move |_: ()| {
        let state = Arc::clone(&state);
        async move {
            if !state.sim_running.load(Ordering::Acquire) {
                return Err(Box::new(EngineError::NotRunning) as HandlerError);
            }
            state.feed.release();
            Ok(())
        }
    })?;

    let state = Arc::clone(&shared);
    router.register("status", move |_: ()| {
        let state = Arc::clone(&state);
        async move { Ok(state.status()) }
    })?;

    let state = Arc::clone(&shared);
    router.register("stop", move |_: ()| {
        let state = Arc::clone(&state);
        async move {
            state.stop().await;
            Ok(())
        }
    })?;

    let state = Arc::clone(&shared);
    router.register("result", move |_: ()| {
        let state = Arc::clone(&state);
        async move {
            match &*state.result.lock() {
                Some(Ok(result)) => Ok(result.clone()),
                Some(Err(error)) => Err(HandlerError::from(error.clone())),
                None => Err(HandlerError::from("result not available")),
            }
        }
    })?;

    Ok(router)
}

fn config_error(message: &str) -> HandlerError {
    Box::new(EngineError::Config(message.to_string()))
}
