use crate::error::ClientError;
use bourse_markets::EngineConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use url::Url;

/// A runnable service image known to the registry.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A stored backtest definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub name: String,
    pub config: EngineConfig,
}

/// A registered worker launcher instance.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct WorkerInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub executors: usize,
}

/// One launched run of a backtest definition.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    pub backtest_id: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Typed client for the HTTP registry: pure CRUD over services, backtests,
/// worker instances and sessions. Useful for launching, not part of the
/// simulation loop.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base: Url,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Accepts `host:port` or a full URL.
    pub fn new(broker_url: &str) -> Result<Self, ClientError> {
        let base = if broker_url.contains("://") {
            Url::parse(broker_url)?
        } else {
            Url::parse(&format!("http://{broker_url}"))?
        };
        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path)?)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Registry {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Self::decode(self.http.get(self.endpoint(path)?).send().await?).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        Self::decode(self.http.post(self.endpoint(path)?).json(body).send().await?).await
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let response = self.http.delete(self.endpoint(path)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Registry {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, ClientError> {
        self.get("/api/v1/services").await
    }

    pub async fn create_service(&self, service: &Service) -> Result<Service, ClientError> {
        self.post("/api/v1/services", service).await
    }

    pub async fn delete_service(&self, id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/api/v1/services/{id}")).await
    }

    pub async fn list_backtests(&self) -> Result<Vec<BacktestDefinition>, ClientError> {
        self.get("/api/v1/backtests").await
    }

    pub async fn create_backtest(
        &self,
        backtest: &BacktestDefinition,
    ) -> Result<BacktestDefinition, ClientError> {
        self.post("/api/v1/backtests", backtest).await
    }

    pub async fn delete_backtest(&self, id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/api/v1/backtests/{id}")).await
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerInstance>, ClientError> {
        self.get("/api/v1/workers").await
    }

    pub async fn create_worker(
        &self,
        worker: &WorkerInstance,
    ) -> Result<WorkerInstance, ClientError> {
        self.post("/api/v1/workers", worker).await
    }

    pub async fn delete_worker(&self, id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/api/v1/workers/{id}")).await
    }

    pub async fn create_session(&self, session: &Session) -> Result<Session, ClientError> {
        self.post("/api/v1/sessions", session).await
    }

    pub async fn get_session(&self, id: &str) -> Result<Session, ClientError> {
        self.get(&format!("/api/v1/sessions/{id}")).await
    }
}
