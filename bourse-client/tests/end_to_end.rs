//! Full-system scenarios: a live engine, a worker pool and strategy workers
//! coordinating over loopback sockets.

use bourse_client::{
    Algorithm, ClientError, Database, PoolConfig, WorkerPool, WorkerSpawn, ohlc_routes,
    run_worker,
    worker::WorkerSockets,
};
use bourse_engine::{Bundle, BundleStore, Engine, EngineSettings, SyntheticIngester, TradingCalendar};
use bourse_integration::{
    Replier, Request, Requester, Response, SocketConfig, SocketPattern, Subscriber, Surveyor,
};
use bourse_markets::{
    BacktestResult, Ohlc, Order, Parameters, WorkerConfig, factories,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

async fn start_engine() -> Engine {
    let config = factories::engine_config();
    let sessions = TradingCalendar::Xnys.sessions(config.start_date, config.end_date);

    let mut bundle = Bundle::new(config.bundle.clone(), config.calendar.clone());
    for instrument in &config.instruments {
        bundle.insert_series(
            instrument.clone(),
            factories::bar_series(instrument.as_str(), &sessions),
        );
    }
    let mut store = BundleStore::in_memory();
    store.insert(bundle).expect("seed bundle");

    Engine::start(
        EngineSettings::default(),
        store,
        Box::new(SyntheticIngester::default()),
    )
    .await
    .expect("engine start")
}

fn worker_config(engine: &Engine) -> WorkerConfig {
    let config = factories::engine_config();
    WorkerConfig {
        execution_id: "e2e".into(),
        execution_start_date: config.start_date,
        execution_end_date: config.end_date,
        database: None,
        parameters: Parameters::new(),
        broker: engine.broker_config().clone(),
    }
}

async fn control(engine: &Engine) -> Requester {
    Requester::connect(engine.control_config().to_dialer(SocketPattern::Req))
        .await
        .expect("control connect")
}

async fn engine_configure(controller: &Requester) {
    let response = controller
        .request(&Request::with_data("configure", &factories::engine_config()).expect("build"))
        .await
        .expect("configure");
    assert_eq!(response.error, None);
}

async fn fetch_result(controller: &Requester) -> BacktestResult {
    for _ in 0..40 {
        let response = controller
            .request(&Request::new("result"))
            .await
            .expect("result");
        if response.error.is_none() {
            return response.payload().expect("result payload");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("result never became available");
}

/// Orders ten shares of the benchmark on the first bar it sees, then stays
/// flat.
#[derive(Debug, Default)]
struct OrderOnce {
    ordered: AtomicBool,
}

impl Algorithm for OrderOnce {
    fn on_bar(
        &self,
        bar: &Ohlc,
        _: &dyn Database,
        _: &Parameters,
    ) -> Result<Option<Order>, ClientError> {
        if bar.instrument.as_str() == "AAPL" && !self.ordered.swap(true, Ordering::AcqRel) {
            Ok(Some(Order::market(bar.instrument.clone(), 10)))
        } else {
            Ok(None)
        }
    }
}

/// Counts the bars it is handed.
#[derive(Debug, Default)]
struct CountBars {
    bars: AtomicUsize,
}

impl Algorithm for CountBars {
    fn on_bar(
        &self,
        _: &Ohlc,
        _: &dyn Database,
        _: &Parameters,
    ) -> Result<Option<Order>, ClientError> {
        self.bars.fetch_add(1, Ordering::AcqRel);
        Ok(None)
    }
}

#[tokio::test]
async fn test_noop_pool_drives_a_full_run() {
    let engine = start_engine().await;
    let controller = control(&engine).await;
    engine_configure(&controller).await;

    let mut pool = WorkerPool::setup(
        PoolConfig {
            executors: 1,
            spawn: WorkerSpawn::Thread,
            ..PoolConfig::default()
        },
        ohlc_routes(Arc::new(bourse_client::strategy::Noop)),
    )
    .await
    .expect("pool setup");

    pool.configure(worker_config(&engine)).await.expect("pool configure");
    pool.run_backtest().await.expect("pool run_backtest");

    // Observe the feed alongside the pool; messages buffer while the pool
    // drives the run.
    let observer = Subscriber::dial(engine.feed_config().to_dialer(SocketPattern::Sub))
        .await
        .expect("observer connect");
    tokio::time::sleep(Duration::from_millis(50)).await;

    pool.run_session(
        engine.feed_config().to_dialer(SocketPattern::Sub),
        &controller,
    )
    .await
    .expect("session");

    let mut day_completed = 0;
    let mut last_task = String::new();
    loop {
        let message = observer.recv().await.expect("observer message");
        last_task = message.task.to_string();
        match message.task.as_str() {
            "day_completed" => day_completed += 1,
            "backtest_completed" => break,
            _ => {}
        }
    }
    assert_eq!(day_completed, 18);
    assert_eq!(last_task, "backtest_completed");

    let result = fetch_result(&controller).await;
    assert_eq!(result.periods.len(), 18);

    pool.stop().await.expect("pool stop");
    engine.stop().await;
}

#[tokio::test]
async fn test_strategy_order_deploys_capital() {
    let engine = start_engine().await;
    let controller = control(&engine).await;
    engine_configure(&controller).await;

    let mut pool = WorkerPool::setup(
        PoolConfig {
            executors: 1,
            spawn: WorkerSpawn::Thread,
            ..PoolConfig::default()
        },
        ohlc_routes(Arc::new(OrderOnce::default())),
    )
    .await
    .expect("pool setup");
    pool.configure(worker_config(&engine)).await.expect("pool configure");
    pool.run_backtest().await.expect("pool run_backtest");

    pool.run_session(
        engine.feed_config().to_dialer(SocketPattern::Sub),
        &controller,
    )
    .await
    .expect("session");

    let result = fetch_result(&controller).await;
    let last = result.periods.last().expect("periods");
    assert!(last.portfolio_value < 100_000.0);
    assert_eq!(last.longs_count, 1);
    let position = &last.positions[0];
    assert_eq!(position.instrument.as_str(), "AAPL");
    assert_eq!(position.amount, 10);

    pool.stop().await.expect("pool stop");
    engine.stop().await;
}

#[tokio::test]
async fn test_two_workers_handle_every_bar_between_them() {
    let engine = start_engine().await;
    let controller = control(&engine).await;
    engine_configure(&controller).await;

    let counter = Arc::new(CountBars::default());
    let algorithm: Arc<dyn Algorithm> = Arc::clone(&counter) as Arc<dyn Algorithm>;
    let mut pool = WorkerPool::setup(
        PoolConfig {
            executors: 2,
            spawn: WorkerSpawn::Thread,
            ..PoolConfig::default()
        },
        ohlc_routes(algorithm),
    )
    .await
    .expect("pool setup");
    pool.configure(worker_config(&engine)).await.expect("pool configure");
    pool.run_backtest().await.expect("pool run_backtest");

    pool.run_session(
        engine.feed_config().to_dialer(SocketPattern::Sub),
        &controller,
    )
    .await
    .expect("session");

    // 18 sessions x 2 instruments, each bar handled exactly once across the
    // pool.
    assert_eq!(counter.bars.load(Ordering::Acquire), 36);

    pool.stop().await.expect("pool stop");
    engine.stop().await;
}

#[tokio::test]
async fn test_worker_answers_unknown_survey_task_and_still_stops() {
    let surveyor = Surveyor::bind(SocketConfig::listener(SocketPattern::Surveyor))
        .await
        .expect("surveyor bind");
    let state = Subscriber::bind(
        SocketConfig::listener(SocketPattern::Sub).with_recv_timeout(Duration::from_millis(100)),
    )
    .await
    .expect("state bind");
    // Stand-in broker endpoint for the worker's configure step.
    let broker = Replier::bind(SocketConfig::listener(SocketPattern::Rep))
        .await
        .expect("broker bind");

    let sockets = WorkerSockets {
        surveyor: surveyor.config().to_dialer(SocketPattern::Respondent),
        state: state.config().to_dialer(SocketPattern::Pub),
    };
    let worker = tokio::spawn(run_worker(
        7,
        sockets,
        ohlc_routes(Arc::new(bourse_client::strategy::Noop)),
    ));

    loop {
        match state.recv().await {
            Ok(message) if message.task == "ready" => break,
            Ok(_) => {}
            Err(error) if error.is_timeout() => {}
            Err(error) => panic!("state socket failed: {error}"),
        }
    }
    while surveyor.respondent_count().await < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let responses = surveyor
        .survey(&Request::new("bogus"), 1, Duration::from_secs(1))
        .await
        .expect("survey");
    assert_eq!(responses[0].error.as_deref(), Some("task not found"));

    // The worker is still alive and configures normally afterwards.
    let config = WorkerConfig {
        execution_id: "survive".into(),
        execution_start_date: factories::engine_config().start_date,
        execution_end_date: factories::engine_config().end_date,
        database: None,
        parameters: Parameters::new(),
        broker: broker.config().clone(),
    };
    let responses: Vec<Response> = surveyor
        .survey(
            &Request::with_data("configure", &config).expect("build"),
            1,
            Duration::from_secs(1),
        )
        .await
        .expect("survey");
    assert_eq!(responses[0].error, None);

    let responses = surveyor
        .survey(&Request::new("stop"), 1, Duration::from_secs(1))
        .await
        .expect("survey");
    assert_eq!(responses[0].error, None);

    worker
        .await
        .expect("worker join")
        .expect("worker exits cleanly");
}
