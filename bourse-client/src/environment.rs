use std::env;

/// Identity and connectivity settings resolved from the process
/// environment, with the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub service_name: Option<String>,
    pub service_id: Option<String>,
    pub instance_id: Option<String>,
    pub broker_url: Option<String>,
    pub local_host: Option<String>,
    pub backtest_id: Option<String>,
}

impl Environment {
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("SERVICE_NAME").ok(),
            service_id: env::var("SERVICE_ID").ok(),
            instance_id: env::var("INSTANCE_ID").ok(),
            broker_url: env::var("BROKER_URL").ok(),
            local_host: env::var("LOCAL_HOST").ok(),
            backtest_id: env::var("BACKTEST_ID").ok(),
        }
    }
}

/// Truthy `THREADED_EXECUTION` switches worker spawning from processes to
/// in-process threads.
pub fn threaded_execution() -> bool {
    env::var("THREADED_EXECUTION")
        .map(|raw| {
            matches!(
                raw.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}
