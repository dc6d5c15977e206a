use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Configuration record for one external tool server.
///
/// The `id` is the sole identity key: live connections are matched to
/// configuration by id and nothing else. The display `name` can change freely
/// without affecting the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Opaque, stable identity. Empty means "let the store mint one on save".
    #[serde(default)]
    pub id: String,

    /// Display name. Not unique, never used for lookup.
    pub name: String,

    /// How to reach the server.
    pub spec: ConnectionSpec,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub owner_id: String,

    #[serde(default)]
    pub visibility: Visibility,
}

impl ServerConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, spec: ConnectionSpec) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            spec,
            enabled: true,
            owner_id: String::new(),
            visibility: Visibility::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Connection parameters for a tool server.
///
/// Structural equality of this type is what decides whether an edited
/// configuration needs a reconnect; name/owner/visibility edits do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionSpec {
    /// Subprocess speaking the protocol over stdin/stdout.
    Stdio {
        command: String,

        #[serde(default)]
        args: Vec<String>,

        #[serde(default)]
        env: HashMap<String, String>,
    },

    /// Remote HTTP/SSE endpoint.
    Remote {
        url: String,

        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// Tool exposed by a connected server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub input_schema: Value,
}

/// Lifecycle state of a single tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[derive(Error, Debug)]
pub enum SwitchboardError {
    #[error("config store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to connect to server '{server}': {message}")]
    ConnectError { server: String, message: String },

    #[error("server '{0}' is not connected")]
    NotConnected(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("server '{server}' reported an error: {message}")]
    RemoteError { server: String, message: String },

    #[error("unknown server id '{0}'")]
    UnknownServer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
