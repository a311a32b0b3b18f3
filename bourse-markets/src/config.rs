use crate::{error::MarketError, instrument::Symbol};
use bourse_integration::SocketConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Connection descriptor for an external relational price store.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub netloc: String,
    pub port: u16,
    pub dbname: String,
}

/// Instructs the engine to build a named bundle of historical bars.
/// Immutable once submitted.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct IngestConfig {
    pub name: SmolStr,
    pub calendar_name: SmolStr,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub instruments: Vec<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Simulation parameters for one engine run.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    pub bundle: SmolStr,
    pub calendar: SmolStr,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub benchmark: Symbol,
    pub instruments: Vec<Symbol>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.start_date > self.end_date {
            return Err(MarketError::InvalidConfig(format!(
                "start_date {} after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.instruments.is_empty() {
            return Err(MarketError::InvalidConfig(
                "no instruments configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Strategy parameters handed through to worker callbacks.
pub type Parameters = HashMap<SmolStr, String>;

/// Worker-side execution configuration, fanned out by the pool on
/// `configure`. Carries the descriptor of the engine's broker socket so
/// each worker can submit the orders its strategy emits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub execution_id: SmolStr,
    pub execution_start_date: NaiveDate,
    pub execution_end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub parameters: Parameters,
    pub broker: SocketConfig,
}
