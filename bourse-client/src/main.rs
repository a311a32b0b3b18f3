use bourse_client::{
    ClientError, PoolConfig, RegistryClient, StrategyRegistry, WorkerPool, WorkerSpawn,
    environment::threaded_execution,
    logging::init_logging,
    ohlc_routes,
    registry::{BacktestDefinition, Service, WorkerInstance},
    run_worker_from_env,
};
use bourse_integration::{Request, Requester, SocketConfig, SocketPattern};
use bourse_markets::{BacktestResult, EngineConfig, Symbol, WorkerConfig};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use smol_str::SmolStr;
use uuid::Uuid;

/// Bourse backtest client: manage the registry and run strategies against a
/// live engine.
#[derive(Debug, Parser)]
#[command(name = "bourse", version, about)]
struct Cli {
    /// HTTP registry to manage.
    #[arg(long, env = "BROKER_URL", default_value = "127.0.0.1:8080", global = true)]
    broker_url: String,

    /// Address advertised for listening sockets.
    #[arg(long, env = "LOCAL_HOST", default_value = "127.0.0.1", global = true)]
    local_host: String,

    /// Identity of this service in the registry.
    #[arg(long, env = "SERVICE_ID", global = true)]
    service_id: Option<String>,

    /// Identity of this instance in the registry.
    #[arg(long, env = "INSTANCE_ID", global = true)]
    instance_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage registered services.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Manage stored backtest definitions.
    Backtest {
        #[command(subcommand)]
        action: BacktestAction,
    },
    /// Manage worker launcher instances.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Run a strategy against a live engine.
    Run(RunArgs),
}

#[derive(Debug, Subcommand)]
enum ServiceAction {
    Create {
        name: String,
        #[arg(long)]
        image: Option<String>,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum BacktestAction {
    Create {
        name: String,
        #[command(flatten)]
        config: EngineConfigArgs,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum WorkerAction {
    Create {
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
        #[arg(long, env = "EXECUTORS", default_value_t = 1)]
        executors: usize,
    },
    List,
    Delete {
        id: String,
    },
    /// Internal: run one worker wired to a pool via the environment.
    #[command(hide = true)]
    Serve,
}

#[derive(Debug, Args)]
struct EngineConfigArgs {
    #[arg(long)]
    bundle: String,
    #[arg(long, default_value = "XNYS")]
    calendar: String,
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: NaiveDate,
    #[arg(long, default_value = "UTC")]
    timezone: String,
    #[arg(long)]
    benchmark: String,
    /// Instrument symbols, repeatable.
    #[arg(long = "instrument", required = true)]
    instruments: Vec<String>,
}

impl EngineConfigArgs {
    fn into_config(self) -> EngineConfig {
        EngineConfig {
            bundle: SmolStr::new(&self.bundle),
            calendar: SmolStr::new(&self.calendar),
            start_date: self.start,
            end_date: self.end,
            timezone: self.timezone,
            benchmark: Symbol::from(self.benchmark.as_str()),
            instruments: self
                .instruments
                .iter()
                .map(|symbol| Symbol::from(symbol.as_str()))
                .collect(),
        }
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Strategy name from the plugin registry.
    #[arg(default_value = "noop")]
    strategy: String,

    /// Engine control socket, `host:port`.
    #[arg(long, env = "ENGINE_URL")]
    engine: String,

    /// Worker count.
    #[arg(long, env = "EXECUTORS", default_value_t = 1)]
    executors: usize,

    /// Configure the engine first against this bundle. Requires `--start`,
    /// `--end`, `--benchmark` and at least one `--instrument`.
    #[arg(long)]
    bundle: Option<String>,

    #[arg(long, default_value = "XNYS")]
    calendar: String,

    #[arg(long)]
    start: Option<NaiveDate>,

    #[arg(long)]
    end: Option<NaiveDate>,

    #[arg(long, default_value = "UTC")]
    timezone: String,

    #[arg(long)]
    benchmark: Option<String>,

    /// Instrument symbols, repeatable.
    #[arg(long = "instrument")]
    instruments: Vec<String>,

    /// Strategy parameters as `key=value`, repeatable.
    #[arg(long = "param")]
    parameters: Vec<String>,
}

impl RunArgs {
    fn engine_config(&self) -> Result<Option<EngineConfig>, ClientError> {
        let Some(bundle) = &self.bundle else {
            return Ok(None);
        };
        let (Some(start), Some(end), Some(benchmark)) =
            (self.start, self.end, self.benchmark.as_deref())
        else {
            return Err(ClientError::Engine(
                "--bundle requires --start, --end and --benchmark".to_string(),
            ));
        };
        if self.instruments.is_empty() {
            return Err(ClientError::Engine(
                "--bundle requires at least one --instrument".to_string(),
            ));
        }

        Ok(Some(EngineConfig {
            bundle: SmolStr::new(bundle),
            calendar: SmolStr::new(&self.calendar),
            start_date: start,
            end_date: end,
            timezone: self.timezone.clone(),
            benchmark: Symbol::from(benchmark),
            instruments: self
                .instruments
                .iter()
                .map(|symbol| Symbol::from(symbol.as_str()))
                .collect(),
        }))
    }
}

/// Engine `info` payload, as seen from the client side of the wire.
#[derive(Debug, Deserialize)]
struct EngineEndpoints {
    feed: EndpointNode,
    broker: EndpointNode,
}

#[derive(Debug, Deserialize)]
struct EndpointNode {
    socket: SocketConfig,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_logging();
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), ClientError> {
    tracing::debug!(
        local_host = %cli.local_host,
        service_id = ?cli.service_id,
        instance_id = ?cli.instance_id,
        "bourse client starting"
    );

    match cli.command {
        Command::Service { action } => {
            let registry = RegistryClient::new(&cli.broker_url)?;
            match action {
                ServiceAction::Create { name, image } => {
                    let created = registry
                        .create_service(&Service {
                            id: None,
                            name,
                            image,
                        })
                        .await?;
                    println!("created service {}", created.id.unwrap_or_default());
                }
                ServiceAction::List => {
                    for service in registry.list_services().await? {
                        println!(
                            "{}\t{}",
                            service.id.unwrap_or_default(),
                            service.name
                        );
                    }
                }
                ServiceAction::Delete { id } => registry.delete_service(&id).await?,
            }
        }
        Command::Backtest { action } => {
            let registry = RegistryClient::new(&cli.broker_url)?;
            match action {
                BacktestAction::Create { name, config } => {
                    let created = registry
                        .create_backtest(&BacktestDefinition {
                            id: None,
                            name,
                            config: config.into_config(),
                        })
                        .await?;
                    println!("created backtest {}", created.id.unwrap_or_default());
                }
                BacktestAction::List => {
                    for backtest in registry.list_backtests().await? {
                        println!(
                            "{}\t{}\t{}",
                            backtest.id.unwrap_or_default(),
                            backtest.name,
                            backtest.config.bundle
                        );
                    }
                }
                BacktestAction::Delete { id } => registry.delete_backtest(&id).await?,
            }
        }
        Command::Worker { action } => match action {
            WorkerAction::Serve => {
                let strategies = StrategyRegistry::with_builtins();
                run_worker_from_env(&strategies).await?;
            }
            WorkerAction::Create {
                host,
                port,
                executors,
            } => {
                let registry = RegistryClient::new(&cli.broker_url)?;
                let created = registry
                    .create_worker(&WorkerInstance {
                        id: None,
                        host,
                        port,
                        executors,
                    })
                    .await?;
                println!("created worker {}", created.id.unwrap_or_default());
            }
            WorkerAction::List => {
                let registry = RegistryClient::new(&cli.broker_url)?;
                for worker in registry.list_workers().await? {
                    println!(
                        "{}\t{}:{}\t{}",
                        worker.id.unwrap_or_default(),
                        worker.host,
                        worker.port,
                        worker.executors
                    );
                }
            }
            WorkerAction::Delete { id } => {
                let registry = RegistryClient::new(&cli.broker_url)?;
                registry.delete_worker(&id).await?;
            }
        },
        Command::Run(args) => run_strategy(args).await?,
    }
    Ok(())
}

async fn run_strategy(args: RunArgs) -> Result<(), ClientError> {
    let strategies = StrategyRegistry::with_builtins();
    let algorithm = strategies.get(&args.strategy)?;

    let (host, port) = args
        .engine
        .rsplit_once(':')
        .and_then(|(host, port)| Some((host.to_string(), port.parse::<u16>().ok()?)))
        .ok_or_else(|| ClientError::Engine(format!("bad engine address {}", args.engine)))?;
    let control =
        Requester::connect(SocketConfig::dialer(SocketPattern::Req, host, port)).await?;

    let execution = match args.engine_config()? {
        Some(config) => {
            let response = control
                .request(&Request::with_data("configure", &config)?)
                .await?;
            if let Some(error) = response.error {
                return Err(ClientError::Engine(error));
            }
            Some((config.start_date, config.end_date))
        }
        None => None,
    };

    let endpoints: EngineEndpoints = {
        let response = control.request(&Request::new("info")).await?;
        if let Some(error) = response.error {
            return Err(ClientError::Engine(error));
        }
        response.payload()?
    };

    let spawn = if threaded_execution() {
        WorkerSpawn::Thread
    } else {
        WorkerSpawn::Process
    };
    let mut pool = WorkerPool::setup(
        PoolConfig {
            executors: args.executors,
            spawn,
            strategy: SmolStr::new(&args.strategy),
            ..PoolConfig::default()
        },
        ohlc_routes(algorithm),
    )
    .await?;

    let (start, end) = execution.unwrap_or_else(|| {
        let today = chrono::Utc::now().date_naive();
        (today, today)
    });
    let mut parameters = bourse_markets::Parameters::new();
    for pair in &args.parameters {
        match pair.split_once('=') {
            Some((key, value)) => {
                parameters.insert(SmolStr::new(key), value.to_string());
            }
            None => {
                return Err(ClientError::Algorithm(format!(
                    "parameter {pair} is not key=value"
                )));
            }
        }
    }

    let execution_id = std::env::var("BACKTEST_ID")
        .unwrap_or_else(|_| Uuid::new_v4().simple().to_string());
    pool.configure(WorkerConfig {
        execution_id: SmolStr::new(&execution_id),
        execution_start_date: start,
        execution_end_date: end,
        database: None,
        parameters,
        broker: endpoints.broker.socket,
    })
    .await?;
    pool.run_backtest().await?;

    let session = pool
        .run_session(
            endpoints.feed.socket.to_dialer(SocketPattern::Sub),
            &control,
        )
        .await;
    let stop = pool.stop().await;
    session?;
    stop?;

    // The engine stores the result just after the final feed message; give
    // it a moment to land.
    let mut response = control.request(&Request::new("result")).await?;
    for _ in 0..20 {
        if response.error.is_none() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        response = control.request(&Request::new("result")).await?;
    }
    match response.error {
        Some(error) => Err(ClientError::Engine(error)),
        None => {
            let result: BacktestResult = response.payload()?;
            let final_value = result
                .periods
                .last()
                .map(|period| period.portfolio_value)
                .unwrap_or_default();
            println!(
                "execution {execution_id}: {} periods, final portfolio value {final_value:.2}",
                result.periods.len()
            );
            Ok(())
        }
    }
}
