use crate::{
    error::RouterError,
    message::{Request, Response},
};
use futures::{FutureExt, future::BoxFuture};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use smol_str::SmolStr;
use std::{future::Future, sync::Arc};
use tracing::warn;

pub type FnvIndexMap<K, V> = indexmap::IndexMap<K, V, fnv::FnvBuildHasher>;

/// Errors a task handler may return. Their display form becomes the
/// `Response.error` string; nothing else crosses the socket.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type HandlerFn = Arc<
    dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Option<Value>, HandlerError>> + Send + Sync,
>;

/// Process-local table mapping a task name to its handler and payload
/// schema. Payload decoding happens at the registration boundary, so
/// handlers receive concrete types.
///
/// Unknown tasks answer `Response{task, error: "task not found"}`; a handler
/// failure of any kind is caught and carried in `Response.error`. Routes are
/// registered once at startup, re-registering a task is a configuration
/// error.
#[derive(Default)]
pub struct Router {
    routes: FnvIndexMap<SmolStr, HandlerFn>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `task`, decoding request payloads as
    /// `Payload`. Tasks without a payload decode `()` from JSON `null`.
    pub fn register<Payload, Reply, F, Fut>(
        &mut self,
        task: impl Into<SmolStr>,
        handler: F,
    ) -> Result<&mut Self, RouterError>
    where
        Payload: DeserializeOwned + Send + 'static,
        Reply: Serialize + Send + 'static,
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        let task = task.into();
        if self.routes.contains_key(&task) {
            return Err(RouterError::TaskAlreadyExists(task));
        }

        let handler = Arc::new(handler);
        let erased: HandlerFn = Arc::new(
            move |data: Option<Value>| -> BoxFuture<'static, Result<Option<Value>, HandlerError>> {
                let handler = Arc::clone(&handler);
                async move {
                    let payload: Payload = serde_json::from_value(data.unwrap_or(Value::Null))
                        .map_err(|error| format!("invalid payload: {error}"))?;
                    let reply = handler(payload).await?;
                    let value = serde_json::to_value(reply)
                        .map_err(|error| format!("unserialisable reply: {error}"))?;
                    Ok((!value.is_null()).then_some(value))
                }
                .boxed()
            },
        );

        self.routes.insert(task, erased);
        Ok(self)
    }

    pub fn contains(&self, task: &str) -> bool {
        self.routes.contains_key(task)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &SmolStr> {
        self.routes.keys()
    }

    /// Dispatch `request` to its handler, producing exactly one [`Response`]
    /// echoing the request task.
    pub async fn route(&self, request: Request) -> Response {
        let Request { task, data } = request;
        let Some(handler) = self.routes.get(&task) else {
            return Response::from_error(task, "task not found");
        };

        match handler(data).await {
            Ok(data) => Response {
                task,
                error: None,
                data,
            },
            Err(error) => {
                warn!(%task, %error, "task handler failed");
                Response::from_error(task, error)
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("tasks", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}
