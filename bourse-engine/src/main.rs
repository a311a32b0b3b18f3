use bourse_engine::{BundleStore, CsvIngester, Engine, EngineSettings, SyntheticIngester};
use bourse_integration::{SocketConfig, SocketPattern};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bourse backtest engine service.
#[derive(Debug, Parser)]
#[command(name = "bourse-engine", version, about)]
struct Args {
    /// Address advertised for listening sockets.
    #[arg(long, env = "LOCAL_HOST", default_value = "127.0.0.1")]
    local_host: String,

    /// Control socket port (0 binds an ephemeral port).
    #[arg(long, env = "SOCKET_PORT", default_value_t = 0)]
    port: u16,

    /// HTTP registry this instance belongs to.
    #[arg(long, env = "BROKER_URL", default_value = "127.0.0.1:8080")]
    broker_url: String,

    /// Identity of this service in the registry.
    #[arg(long, env = "SERVICE_ID")]
    service_id: Option<String>,

    /// Identity of this instance in the registry.
    #[arg(long, env = "INSTANCE_ID")]
    instance_id: Option<String>,

    /// Directory bundles are persisted under.
    #[arg(long, env = "BOURSE_DATA", default_value = ".bourse/bundles")]
    data_dir: PathBuf,

    /// Directory of per-instrument CSV files to ingest from. Without it,
    /// ingestion generates deterministic synthetic series.
    #[arg(long, env = "BOURSE_CSV")]
    csv_dir: Option<PathBuf>,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "engine failed");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let store = BundleStore::with_root(&args.data_dir)?;
    let ingester: Box<dyn bourse_engine::Ingester> = match &args.csv_dir {
        Some(root) => Box::new(CsvIngester::new(root)),
        None => Box::new(SyntheticIngester::default()),
    };

    let settings = EngineSettings {
        control: SocketConfig::listener(SocketPattern::Rep)
            .with_host(args.local_host.clone())
            .with_port(args.port),
        feed: SocketConfig::listener(SocketPattern::Pub).with_host(args.local_host.clone()),
        broker: SocketConfig::listener(SocketPattern::Rep).with_host(args.local_host.clone()),
        ..EngineSettings::default()
    };

    let engine = Engine::start(settings, store, ingester).await?;
    info!(
        service_id = args.service_id.as_deref().unwrap_or("-"),
        instance_id = args.instance_id.as_deref().unwrap_or("-"),
        registry = %args.broker_url,
        control = %engine.control_config().addr(),
        "engine online; ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    engine.stop().await;
    Ok(())
}
