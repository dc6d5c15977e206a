//! Per-server client wrapper.
//!
//! A [`ClientWrapper`] owns exactly one connection to one external tool
//! server. It records connection status, the last error, and the discovered
//! tool catalog, and forwards tool calls over the live transport. It never
//! reconnects on its own: recovery is the connection manager's decision.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use switchboard_core::{
    ConnectionSpec, ConnectionStatus, Result, SwitchboardError, ToolDescriptor,
};

use crate::protocol::{
    ContentItem, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ToolCallParams, ToolCallResult,
};
use crate::transport::{Transport, TransportFactory};

const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct ClientState {
    status: ConnectionStatus,
    last_error: Option<String>,
    tools: Vec<ToolDescriptor>,
    connected_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a wrapper, safe to read from any context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub error: Option<String>,
    pub tools: Vec<ToolDescriptor>,
    pub connected_at: Option<DateTime<Utc>>,
}

pub struct ClientWrapper {
    id: String,
    name: String,
    spec: ConnectionSpec,
    connect_timeout: Duration,
    call_timeout: Duration,
    factory: Arc<dyn TransportFactory>,
    // Exclusive handle to the connection; None until a handshake commits.
    transport: Mutex<Option<Box<dyn Transport>>>,
    state: RwLock<ClientState>,
    request_seq: AtomicU64,
    // Set by disconnect(); a handshake that loses the race against it must
    // throw its transport away instead of resurrecting the wrapper.
    discarded: AtomicBool,
}

impl std::fmt::Debug for ClientWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientWrapper")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.state_read().status)
            .finish()
    }
}

impl ClientWrapper {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        spec: ConnectionSpec,
        connect_timeout: Duration,
        call_timeout: Duration,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            spec,
            connect_timeout,
            call_timeout,
            factory,
            transport: Mutex::new(None),
            state: RwLock::new(ClientState {
                status: ConnectionStatus::Connecting,
                last_error: None,
                tools: Vec::new(),
                connected_at: None,
            }),
            request_seq: AtomicU64::new(1),
            discarded: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name captured when the wrapper was built. Not identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The connection spec this wrapper was built from, used by the manager
    /// to detect configuration drift.
    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    /// Perform the handshake: open the transport, initialize, list tools.
    ///
    /// Bounded by the connect timeout; failure of any step records `Error`
    /// status with the message and leaves the wrapper unusable until the
    /// manager replaces it.
    pub async fn connect(&self) -> Result<Vec<ToolDescriptor>> {
        {
            let mut state = self.state_write();
            state.status = ConnectionStatus::Connecting;
            state.last_error = None;
        }
        info!(server = %self.id, "connecting to MCP server");

        let handshake = timeout(self.connect_timeout, self.handshake()).await;
        let (transport, tools) = match handshake {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let err = SwitchboardError::ConnectError {
                    server: self.id.clone(),
                    message: e.to_string(),
                };
                self.record_connect_failure(&err);
                return Err(err);
            }
            Err(_) => {
                let err = SwitchboardError::ConnectError {
                    server: self.id.clone(),
                    message: format!(
                        "handshake timed out after {}ms",
                        self.connect_timeout.as_millis()
                    ),
                };
                self.record_connect_failure(&err);
                return Err(err);
            }
        };

        {
            let mut slot = self.transport.lock().await;
            if self.discarded.load(Ordering::SeqCst) {
                let mut transport = transport;
                let _ = transport.close().await;
                return Err(SwitchboardError::ConnectError {
                    server: self.id.clone(),
                    message: "wrapper was discarded during handshake".to_string(),
                });
            }
            *slot = Some(transport);
        }

        {
            let mut state = self.state_write();
            state.status = ConnectionStatus::Connected;
            state.tools = tools.clone();
            state.connected_at = Some(Utc::now());
            state.last_error = None;
        }
        info!(server = %self.id, tools = tools.len(), "MCP server connected");
        Ok(tools)
    }

    async fn handshake(&self) -> Result<(Box<dyn Transport>, Vec<ToolDescriptor>)> {
        let mut transport = self.factory.open(&self.id, &self.spec).await?;

        let params = serde_json::to_value(InitializeParams::default())?;
        let request = JsonRpcRequest::new(self.next_request_id(), "initialize", Some(params));
        let response = exchange(transport.as_mut(), request).await?;
        let init: InitializeResult = parse_result(&self.id, response)?;
        debug!(
            server = %self.id,
            protocol = %init.protocol_version,
            remote = ?init.server_info.as_ref().map(|info| &info.name),
            "initialize complete"
        );

        transport
            .send_notification(JsonRpcNotification::new(
                "notifications/initialized",
                Some(serde_json::json!({})),
            ))
            .await?;

        let request = JsonRpcRequest::new(self.next_request_id(), "tools/list", None);
        let response = exchange(transport.as_mut(), request).await?;
        let listed: ListToolsResult = parse_result(&self.id, response)?;

        Ok((transport, listed.tools))
    }

    /// Last-known tool catalog. No I/O; empty if never connected.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.state_read().tools.clone()
    }

    /// Forward one tool call over the live connection.
    ///
    /// No retries happen here. A timed-out call is abandoned but the
    /// connection itself stays up.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
        timeout_override: Option<Duration>,
    ) -> Result<Vec<ContentItem>> {
        if self.state_read().status != ConnectionStatus::Connected {
            return Err(SwitchboardError::NotConnected(self.id.clone()));
        }

        let mut slot = self.transport.lock().await;
        let Some(transport) = slot.as_mut() else {
            return Err(SwitchboardError::NotConnected(self.id.clone()));
        };
        if !transport.is_connected().await {
            let mut state = self.state_write();
            state.status = ConnectionStatus::Disconnected;
            state.last_error = Some("connection closed by server".to_string());
            return Err(SwitchboardError::NotConnected(self.id.clone()));
        }

        let params = ToolCallParams {
            name: tool.to_string(),
            arguments,
        };
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "tools/call",
            Some(serde_json::to_value(params)?),
        );
        debug!(server = %self.id, tool, "calling tool");

        let wait = timeout_override.unwrap_or(self.call_timeout);
        let response = match timeout(wait, exchange(transport.as_mut(), request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SwitchboardError::Timeout {
                    operation: format!("tools/call '{tool}' on server '{}'", self.id),
                    timeout_ms: wait.as_millis() as u64,
                });
            }
        };

        let result: ToolCallResult = parse_result(&self.id, response)?;
        if result.is_error.unwrap_or(false) {
            return Err(SwitchboardError::RemoteError {
                server: self.id.clone(),
                message: format!("tool '{tool}' reported an error"),
            });
        }
        Ok(result.content)
    }

    /// Close the connection and mark the wrapper terminal. Idempotent, safe
    /// from any status.
    pub async fn disconnect(&self) {
        self.discarded.store(true, Ordering::SeqCst);

        let transport = self.transport.lock().await.take();
        if let Some(mut transport) = transport {
            if let Err(e) = transport.close().await {
                warn!(server = %self.id, "error closing transport: {e}");
            }
        }

        let mut state = self.state_write();
        state.status = ConnectionStatus::Disconnected;
        debug!(server = %self.id, "wrapper disconnected");
    }

    /// Non-blocking snapshot of status, last error, and catalog.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.state_read();
        StatusSnapshot {
            status: state.status,
            error: state.last_error.clone(),
            tools: state.tools.clone(),
            connected_at: state.connected_at,
        }
    }

    fn record_connect_failure(&self, err: &SwitchboardError) {
        warn!(server = %self.id, "connect failed: {err}");
        let mut state = self.state_write();
        if self.discarded.load(Ordering::SeqCst) {
            // Lost the race against disconnect(); Disconnected stands.
            return;
        }
        state.status = ConnectionStatus::Error;
        state.last_error = Some(err.to_string());
    }

    fn next_request_id(&self) -> String {
        self.request_seq.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn state_read(&self) -> RwLockReadGuard<'_, ClientState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state_write(&self) -> RwLockWriteGuard<'_, ClientState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Send a request and poll the transport until the matching response arrives.
/// Stale responses (from calls a caller abandoned) are discarded by id.
/// The caller bounds the overall wait.
async fn exchange(
    transport: &mut (dyn Transport + '_),
    request: JsonRpcRequest,
) -> Result<JsonRpcResponse> {
    let id = request.id.clone();
    transport.send_request(request).await?;

    loop {
        if let Some(response) = transport.try_receive().await? {
            if response.id == id {
                return Ok(response);
            }
            debug!("dropping stale response for request {}", response.id);
            continue;
        }
        tokio::time::sleep(RECEIVE_POLL_INTERVAL).await;
    }
}

/// Unwrap a JSON-RPC response into its deserialized result, mapping protocol
/// errors to `RemoteError`.
fn parse_result<T: serde::de::DeserializeOwned>(
    server: &str,
    response: JsonRpcResponse,
) -> Result<T> {
    if let Some(error) = response.error {
        return Err(SwitchboardError::RemoteError {
            server: server.to_string(),
            message: error.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| SwitchboardError::RemoteError {
            server: server.to_string(),
            message: "response missing result".to_string(),
        })?;
    Ok(serde_json::from_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DefaultTransportFactory;
    use serde_json::json;

    fn wrapper() -> ClientWrapper {
        ClientWrapper::new(
            "srv-1",
            "weather",
            ConnectionSpec::Stdio {
                command: "echo".to_string(),
                args: vec![],
                env: Default::default(),
            },
            Duration::from_secs(1),
            Duration::from_secs(1),
            Arc::new(DefaultTransportFactory),
        )
    }

    #[tokio::test]
    async fn call_before_connect_is_not_connected() {
        let wrapper = wrapper();
        let err = wrapper
            .call_tool("get_weather", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NotConnected(_)));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_from_any_status() {
        let wrapper = wrapper();
        wrapper.disconnect().await;
        wrapper.disconnect().await;
        assert_eq!(wrapper.status().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn fresh_wrapper_reports_connecting_and_empty_catalog() {
        let wrapper = wrapper();
        let snapshot = wrapper.status();
        assert_eq!(snapshot.status, ConnectionStatus::Connecting);
        assert!(snapshot.tools.is_empty());
        assert!(snapshot.error.is_none());
        assert!(wrapper.list_tools().is_empty());
    }

    #[test]
    fn parse_result_maps_protocol_error() {
        let response = JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: "1".to_string(),
            result: None,
            error: Some(crate::protocol::JsonRpcError {
                code: -32000,
                message: "kaboom".to_string(),
                data: None,
            }),
        };
        let err = parse_result::<ToolCallResult>("srv-1", response).unwrap_err();
        assert!(matches!(err, SwitchboardError::RemoteError { .. }));
    }
}
