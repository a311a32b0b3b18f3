use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message pattern a socket endpoint speaks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketPattern {
    Req,
    Rep,
    Pub,
    Sub,
    Surveyor,
    Respondent,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Socket descriptor travelling on the wire and used to construct live
/// endpoints. Port `0` means "ephemeral, bind-and-report": after binding,
/// the config carries the real port.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SocketConfig {
    pub pattern: SocketPattern,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_listen")]
    pub listen: bool,
    #[serde(default = "default_timeout_ms")]
    pub send_timeout: u64,
    #[serde(default = "default_timeout_ms")]
    pub recv_timeout: u64,
}

impl SocketConfig {
    /// Listening endpoint on an ephemeral local port.
    pub fn listener(pattern: SocketPattern) -> Self {
        Self {
            pattern,
            host: default_host(),
            port: 0,
            listen: true,
            send_timeout: default_timeout_ms(),
            recv_timeout: default_timeout_ms(),
        }
    }

    /// Dialing endpoint towards `host:port`.
    pub fn dialer(pattern: SocketPattern, host: impl Into<String>, port: u16) -> Self {
        Self {
            pattern,
            host: host.into(),
            port,
            listen: false,
            send_timeout: default_timeout_ms(),
            recv_timeout: default_timeout_ms(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout.as_millis() as u64;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout.as_millis() as u64;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_deadline(&self) -> Duration {
        Duration::from_millis(self.send_timeout)
    }

    pub fn recv_deadline(&self) -> Duration {
        Duration::from_millis(self.recv_timeout)
    }

    /// Descriptor a remote peer uses to dial this endpoint.
    pub fn to_dialer(&self, pattern: SocketPattern) -> Self {
        Self {
            pattern,
            host: self.host.clone(),
            port: self.port,
            listen: false,
            send_timeout: self.send_timeout,
            recv_timeout: self.recv_timeout,
        }
    }
}
