//! Shared fixtures: scripted in-memory transports, a store with injectable
//! outages, and polling helpers for the fire-and-forget connect tasks.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use switchboard_core::{
    ConnectionSpec, ConnectionStatus, Result, ServerConfig, SwitchboardError, ToolDescriptor,
};
use switchboard_mcp::manager::{ConnectionManager, ManagerOptions};
use switchboard_mcp::protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolCallParams,
};
use switchboard_mcp::transport::{Transport, TransportFactory};
use switchboard_store::{ConfigStore, MemoryStore};

const WAIT_DEADLINE: Duration = Duration::from_secs(2);
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Scripted behavior for one fixture server.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    /// Marker echoed back in tool results so tests can tell servers apart.
    pub marker: String,
    pub tools: Vec<ToolDescriptor>,
    /// When false, requests are swallowed and the handshake times out.
    pub respond: bool,
    /// When true, opening the transport fails outright.
    pub fail_open: bool,
}

impl FakeBehavior {
    pub fn serving(marker: &str, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            marker: marker.to_string(),
            tools,
            respond: true,
            fail_open: false,
        }
    }

    pub fn silent() -> Self {
        Self {
            marker: "silent".to_string(),
            tools: vec![],
            respond: false,
            fail_open: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            marker: "unreachable".to_string(),
            tools: vec![],
            respond: false,
            fail_open: true,
        }
    }
}

/// In-memory transport that answers the MCP handshake and tool calls from a
/// script, without any process or socket.
#[derive(Debug)]
pub struct FakeTransport {
    behavior: FakeBehavior,
    connected: bool,
    queue: VecDeque<JsonRpcResponse>,
}

impl FakeTransport {
    fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            connected: true,
            queue: VecDeque::new(),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<()> {
        if !self.behavior.respond {
            return Ok(());
        }
        let result = match request.method.as_str() {
            "initialize" => json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": self.behavior.marker, "version": "1.0.0"},
            }),
            "tools/list" => serde_json::to_value(ListToolsResult {
                tools: self.behavior.tools.clone(),
            })?,
            "tools/call" => {
                let params: ToolCallParams =
                    serde_json::from_value(request.params.clone().unwrap_or(json!({})))?;
                json!({
                    "content": [{
                        "type": "text",
                        "text": format!("{}::{}", self.behavior.marker, params.name),
                    }],
                    "isError": false,
                })
            }
            _ => json!({}),
        };
        self.queue
            .push_back(JsonRpcResponse::result(request.id, result));
        Ok(())
    }

    async fn send_notification(&mut self, _notification: JsonRpcNotification) -> Result<()> {
        Ok(())
    }

    async fn try_receive(&mut self) -> Result<Option<JsonRpcResponse>> {
        Ok(self.queue.pop_front())
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

/// Factory handing out [`FakeTransport`]s by server id.
#[derive(Default)]
pub struct FakeFactory {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, server_id: &str, behavior: FakeBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(server_id.to_string(), behavior);
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn open(&self, server_id: &str, _spec: &ConnectionSpec) -> Result<Box<dyn Transport>> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(server_id)
            .cloned()
            .ok_or_else(|| SwitchboardError::ConnectError {
                server: server_id.to_string(),
                message: "no fixture registered for server".to_string(),
            })?;
        if behavior.fail_open {
            return Err(SwitchboardError::ConnectError {
                server: server_id.to_string(),
                message: "fixture is unreachable".to_string(),
            });
        }
        Ok(Box::new(FakeTransport::new(behavior)))
    }
}

/// Store delegating to a [`MemoryStore`] until an outage is injected.
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(configs: impl IntoIterator<Item = ServerConfig>) -> Self {
        Self {
            inner: MemoryStore::with_configs(configs),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SwitchboardError::StoreUnavailable(
                "injected outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConfigStore for FlakyStore {
    async fn load_all(&self) -> Result<Vec<ServerConfig>> {
        self.check()?;
        self.inner.load_all().await
    }

    async fn get(&self, id: &str) -> Result<Option<ServerConfig>> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn save(&self, config: ServerConfig) -> Result<ServerConfig> {
        self.check()?;
        self.inner.save(config).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(id).await
    }

    async fn has(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.has(id).await
    }
}

pub fn tool(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("fixture tool {name}"),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

pub fn stdio_config(id: &str, name: &str) -> ServerConfig {
    ServerConfig::new(
        id,
        name,
        ConnectionSpec::Stdio {
            command: format!("fixture-{id}"),
            args: vec![],
            env: HashMap::new(),
        },
    )
}

/// Short timeouts so silent fixtures fail fast.
pub fn fixture_options(factory: Arc<FakeFactory>) -> ManagerOptions {
    ManagerOptions {
        connect_timeout: Duration::from_millis(300),
        call_timeout: Duration::from_millis(500),
        transport_factory: factory,
    }
}

pub async fn wait_for_status(manager: &ConnectionManager, id: &str, status: ConnectionStatus) {
    let deadline = Instant::now() + WAIT_DEADLINE;
    loop {
        let observed = manager
            .get_clients()
            .await
            .into_iter()
            .find(|(client_id, _)| client_id == id)
            .map(|(_, wrapper)| wrapper.status().status);
        if observed == Some(status) {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for server '{id}' to reach {status:?}, last seen {observed:?}");
        }
        tokio::time::sleep(WAIT_POLL).await;
    }
}

/// Wait for a specific wrapper instance (possibly already evicted from the
/// manager) to finish disconnecting.
pub async fn wait_for_wrapper_disconnect(wrapper: &Arc<switchboard_mcp::ClientWrapper>) {
    let deadline = Instant::now() + WAIT_DEADLINE;
    while wrapper.status().status != ConnectionStatus::Disconnected {
        if Instant::now() > deadline {
            panic!(
                "timed out waiting for wrapper '{}' to disconnect",
                wrapper.id()
            );
        }
        tokio::time::sleep(WAIT_POLL).await;
    }
}

pub async fn wait_for_absent(manager: &ConnectionManager, id: &str) {
    let deadline = Instant::now() + WAIT_DEADLINE;
    loop {
        let tracked = manager
            .get_clients()
            .await
            .iter()
            .any(|(client_id, _)| client_id == id);
        if !tracked {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for server '{id}' to be discarded");
        }
        tokio::time::sleep(WAIT_POLL).await;
    }
}
