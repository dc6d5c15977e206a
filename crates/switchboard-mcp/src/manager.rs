//! Connection manager.
//!
//! Owns the map from server id to [`ClientWrapper`] and converges it against
//! the config store: new enabled configs get a connecting wrapper, changed
//! connection specs get a replacement wrapper, and removed or disabled
//! configs get disconnected. All map mutation funnels through the `ops`
//! mutex; connection handshakes run in spawned tasks so no caller ever waits
//! on a slow server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use switchboard_core::{ConnectionStatus, Result, ServerConfig, SwitchboardError};
use switchboard_store::ConfigStore;

use crate::catalog::{build_catalog, AggregatedToolCatalog};
use crate::client::ClientWrapper;
use crate::protocol::ContentItem;
use crate::transport::{DefaultTransportFactory, TransportFactory};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ManagerOptions {
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
    pub transport_factory: Arc<dyn TransportFactory>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            transport_factory: Arc::new(DefaultTransportFactory),
        }
    }
}

/// One row of the status view surfaced to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusReport {
    pub id: String,
    pub name: String,
    pub status: ConnectionStatus,
    pub error: Option<String>,
    pub tool_count: usize,
    pub connected_at: Option<DateTime<Utc>>,
}

pub struct ConnectionManager {
    store: Arc<dyn ConfigStore>,
    options: ManagerOptions,
    clients: RwLock<HashMap<String, Arc<ClientWrapper>>>,
    // Serializes reconcile/refresh/disconnect decisions. Concurrent refreshes
    // of one id queue here and apply last-writer-wins; every eviction
    // disconnects the evicted wrapper, so at most one per id is ever live.
    ops: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn ConfigStore>, options: ManagerOptions) -> Self {
        Self {
            store,
            options,
            clients: RwLock::new(HashMap::new()),
            ops: Mutex::new(()),
        }
    }

    /// Load all configs and dispatch a connection attempt for each enabled
    /// one. Returns once every attempt has been spawned, not once they have
    /// completed; the catalog fills in as handshakes land.
    ///
    /// A store failure propagates and leaves the manager empty; the periodic
    /// reconcile loop converges once the store recovers.
    pub async fn initialize(&self) -> Result<()> {
        let configs = self.store.load_all().await?;
        info!(configs = configs.len(), "initializing connection manager");

        let _guard = self.ops.lock().await;
        let mut clients = self.clients.write().await;
        for config in configs.into_iter().filter(|c| c.enabled) {
            if clients.contains_key(&config.id) {
                continue;
            }
            let wrapper = self.build_wrapper(&config);
            clients.insert(config.id.clone(), wrapper.clone());
            self.spawn_connect(wrapper);
        }
        Ok(())
    }

    /// Converge live wrappers onto the given full desired config list.
    ///
    /// Three diffs by id: absent or disabled configs disconnect, unseen
    /// enabled configs connect, and configs whose connection spec changed
    /// structurally get a fresh wrapper. Name/owner/visibility edits never
    /// reconnect. Idempotent: a second call with the same input is a no-op.
    pub async fn reconcile(&self, desired: Vec<ServerConfig>) {
        let _guard = self.ops.lock().await;

        let desired: HashMap<String, ServerConfig> = desired
            .into_iter()
            .filter(|c| c.enabled)
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut to_disconnect: Vec<Arc<ClientWrapper>> = Vec::new();
        let mut to_connect: Vec<Arc<ClientWrapper>> = Vec::new();
        {
            let mut clients = self.clients.write().await;

            let stale: Vec<String> = clients
                .keys()
                .filter(|id| !desired.contains_key(*id))
                .cloned()
                .collect();
            for id in stale {
                if let Some(wrapper) = clients.remove(&id) {
                    info!(server = %id, "config removed or disabled, disconnecting");
                    to_disconnect.push(wrapper);
                }
            }

            for (id, config) in &desired {
                match clients.get(id) {
                    None => {
                        info!(server = %id, "new config, connecting");
                        let wrapper = self.build_wrapper(config);
                        clients.insert(id.clone(), wrapper.clone());
                        to_connect.push(wrapper);
                    }
                    Some(existing) if existing.spec() != &config.spec => {
                        info!(server = %id, "connection spec changed, refreshing");
                        if let Some(old) = clients.remove(id) {
                            to_disconnect.push(old);
                        }
                        let wrapper = self.build_wrapper(config);
                        clients.insert(id.clone(), wrapper.clone());
                        to_connect.push(wrapper);
                    }
                    Some(_) => {}
                }
            }
        }

        // One slow teardown must not stall the other servers' convergence.
        for wrapper in to_disconnect {
            tokio::spawn(async move { wrapper.disconnect().await });
        }
        for wrapper in to_connect {
            self.spawn_connect(wrapper);
        }
    }

    /// Re-read the store and reconcile onto the result. A store failure is
    /// returned without touching any live connection.
    pub async fn reconcile_from_store(&self) -> Result<()> {
        let configs = self.store.load_all().await?;
        self.reconcile(configs).await;
        Ok(())
    }

    /// Tear down the wrapper for `id` (if any) and rebuild it from the
    /// store's current config. Unknown id is a no-op; a disabled config
    /// leaves the server disconnected.
    pub async fn refresh_client(&self, id: &str) -> Result<()> {
        // Read first: an unavailable store must not tear anything down.
        let config = self.store.get(id).await?;

        let _guard = self.ops.lock().await;
        let Some(config) = config else {
            debug!(server = %id, "refresh requested for unknown config, ignoring");
            return Ok(());
        };

        let old = self.clients.write().await.remove(id);
        if let Some(old) = old {
            old.disconnect().await;
        }

        if config.enabled {
            let wrapper = self.build_wrapper(&config);
            self.clients
                .write()
                .await
                .insert(config.id.clone(), wrapper.clone());
            self.spawn_connect(wrapper);
        }
        Ok(())
    }

    /// Disconnect and discard the wrapper for `id`; no-op if untracked.
    pub async fn disconnect_client(&self, id: &str) {
        let _guard = self.ops.lock().await;
        let wrapper = self.clients.write().await.remove(id);
        if let Some(wrapper) = wrapper {
            wrapper.disconnect().await;
        }
    }

    /// Snapshot of every tracked wrapper, including failed ones.
    pub async fn get_clients(&self) -> Vec<(String, Arc<ClientWrapper>)> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(id, wrapper)| (id.clone(), wrapper.clone()))
            .collect()
    }

    /// Status rows for every tracked server, connected or not.
    pub async fn server_statuses(&self) -> Vec<ServerStatusReport> {
        let mut reports: Vec<ServerStatusReport> = self
            .clients
            .read()
            .await
            .values()
            .map(|wrapper| {
                let snapshot = wrapper.status();
                ServerStatusReport {
                    id: wrapper.id().to_string(),
                    name: wrapper.name().to_string(),
                    status: snapshot.status,
                    error: snapshot.error,
                    tool_count: snapshot.tools.len(),
                    connected_at: snapshot.connected_at,
                }
            })
            .collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        reports
    }

    /// Tools of every `connected` server, namespaced by server id.
    /// Disconnected and erroring servers contribute nothing but stay tracked.
    pub async fn aggregated_tools(&self) -> AggregatedToolCatalog {
        let snapshots: Vec<_> = self
            .clients
            .read()
            .await
            .values()
            .filter_map(|wrapper| {
                let snapshot = wrapper.status();
                (snapshot.status == ConnectionStatus::Connected).then(|| {
                    (
                        wrapper.id().to_string(),
                        wrapper.name().to_string(),
                        snapshot.tools,
                    )
                })
            })
            .collect();
        build_catalog(snapshots)
    }

    /// Execute one tool call on the named server.
    pub async fn call_tool(
        &self,
        server_id: &str,
        tool: &str,
        arguments: Value,
        timeout_override: Option<Duration>,
    ) -> Result<Vec<ContentItem>> {
        let wrapper = self
            .clients
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| SwitchboardError::UnknownServer(server_id.to_string()))?;
        wrapper.call_tool(tool, arguments, timeout_override).await
    }

    /// Disconnect everything. The hosting process calls this at shutdown.
    pub async fn shutdown(&self) {
        info!("shutting down connection manager");
        let _guard = self.ops.lock().await;
        let drained: Vec<Arc<ClientWrapper>> = self.clients.write().await.drain().map(|(_, w)| w).collect();
        for wrapper in drained {
            wrapper.disconnect().await;
        }
    }

    fn build_wrapper(&self, config: &ServerConfig) -> Arc<ClientWrapper> {
        Arc::new(ClientWrapper::new(
            config.id.clone(),
            config.name.clone(),
            config.spec.clone(),
            self.options.connect_timeout,
            self.options.call_timeout,
            self.options.transport_factory.clone(),
        ))
    }

    fn spawn_connect(&self, wrapper: Arc<ClientWrapper>) {
        tokio::spawn(async move {
            if let Err(e) = wrapper.connect().await {
                warn!(server = %wrapper.id(), "connection attempt failed: {e}");
            }
        });
    }
}
