use crate::error::SocketError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use smol_str::SmolStr;

/// Universal unit of transport: a task-keyed request envelope.
///
/// `task` is the route key, `data` an optional self-describing payload.
/// `load(dump(x)) == x` holds for every envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
    pub task: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    pub fn new(task: impl Into<SmolStr>) -> Self {
        Self {
            task: task.into(),
            data: None,
        }
    }

    /// Build a request carrying `data` serialised into the envelope.
    pub fn with_data<T>(task: impl Into<SmolStr>, data: &T) -> Result<Self, SocketError>
    where
        T: Serialize,
    {
        Ok(Self {
            task: task.into(),
            data: Some(serde_json::to_value(data).map_err(SocketError::Serialise)?),
        })
    }

    /// Decode the payload into a concrete type. A missing payload decodes as
    /// JSON `null`, so nullable schemas accept it.
    pub fn payload<T>(&self) -> Result<T, SocketError>
    where
        T: DeserializeOwned,
    {
        let data = self.data.clone().unwrap_or(Value::Null);
        let payload = data.to_string();
        serde_json::from_value(data).map_err(|error| SocketError::Deserialise { error, payload })
    }

    pub fn dump(&self) -> Result<Vec<u8>, SocketError> {
        serde_json::to_vec(self).map_err(SocketError::Serialise)
    }

    pub fn load(bytes: &[u8]) -> Result<Self, SocketError> {
        serde_json::from_slice(bytes).map_err(|error| SocketError::Deserialise {
            error,
            payload: String::from_utf8_lossy(bytes).into_owned(),
        })
    }
}

/// Response envelope answering a [`Request`], echoing its `task`.
///
/// User-visible failures travel in `error` as a short human-readable string;
/// in-process errors are never marshalled across a socket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    pub task: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(task: impl Into<SmolStr>) -> Self {
        Self {
            task: task.into(),
            error: None,
            data: None,
        }
    }

    pub fn with_data<T>(task: impl Into<SmolStr>, data: &T) -> Result<Self, SocketError>
    where
        T: Serialize,
    {
        Ok(Self {
            task: task.into(),
            error: None,
            data: Some(serde_json::to_value(data).map_err(SocketError::Serialise)?),
        })
    }

    pub fn from_error(task: impl Into<SmolStr>, error: impl std::fmt::Display) -> Self {
        Self {
            task: task.into(),
            error: Some(error.to_string()),
            data: None,
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Decode the payload, surfacing a carried `error` first.
    pub fn payload<T>(&self) -> Result<T, SocketError>
    where
        T: DeserializeOwned,
    {
        let data = self.data.clone().unwrap_or(Value::Null);
        let payload = data.to_string();
        serde_json::from_value(data).map_err(|error| SocketError::Deserialise { error, payload })
    }

    pub fn dump(&self) -> Result<Vec<u8>, SocketError> {
        serde_json::to_vec(self).map_err(SocketError::Serialise)
    }

    pub fn load(bytes: &[u8]) -> Result<Self, SocketError> {
        serde_json::from_slice(bytes).map_err(|error| SocketError::Deserialise {
            error,
            payload: String::from_utf8_lossy(bytes).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip_is_identity() {
        let request = Request::with_data("configure", &json!({"bundle": "demo", "port": 7}))
            .expect("serialisable");
        let loaded = Request::load(&request.dump().expect("dump")).expect("load");
        assert_eq!(loaded, request);
    }

    #[test]
    fn test_request_without_data_loads_none() {
        let request = Request::new("status");
        let loaded = Request::load(&request.dump().expect("dump")).expect("load");
        assert_eq!(loaded.data, None);
        assert_eq!(loaded, request);
    }

    #[test]
    fn test_response_round_trip_is_identity() {
        let response = Response::from_error("order", "order 123 not found");
        let loaded = Response::load(&response.dump().expect("dump")).expect("load");
        assert_eq!(loaded, response);
        assert!(loaded.is_err());
    }

    #[test]
    fn test_missing_payload_decodes_as_null() {
        let request = Request::new("info");
        let payload: Option<u32> = request.payload().expect("null payload");
        assert_eq!(payload, None);
    }

    #[test]
    fn test_payload_type_mismatch_is_deserialise_error() {
        let request = Request::with_data("ohlc", &json!({"open": "not-a-number"})).expect("build");
        let error = request.payload::<std::collections::HashMap<String, f64>>();
        assert!(matches!(error, Err(SocketError::Deserialise { .. })));
    }
}
