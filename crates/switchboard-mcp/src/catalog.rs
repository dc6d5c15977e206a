//! Aggregated tool catalog.
//!
//! A derived, read-only view over every connected server's tools, keyed by
//! (server id, tool name) so identically-named tools on different servers
//! never collide. Recomputed on demand, never persisted.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use switchboard_core::ToolDescriptor;

/// Namespaced catalog key. The server id component guarantees uniqueness
/// across servers even for identical tool names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolKey {
    pub server_id: String,
    pub tool_name: String,
}

impl ToolKey {
    pub fn new(server_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            tool_name: tool_name.into(),
        }
    }

    /// Flat rendering for surfaces that need a single name per tool.
    pub fn qualified(&self) -> String {
        format!("{}__{}", self.server_id, self.tool_name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedTool {
    pub server_id: String,
    pub server_name: String,
    pub tool: ToolDescriptor,
}

pub type AggregatedToolCatalog = HashMap<ToolKey, AggregatedTool>;

/// Build the catalog from `(server id, server name, tools)` snapshots of
/// connected servers. A duplicate tool name within one server is skipped;
/// the first occurrence wins.
pub(crate) fn build_catalog(
    servers: impl IntoIterator<Item = (String, String, Vec<ToolDescriptor>)>,
) -> AggregatedToolCatalog {
    let mut catalog = AggregatedToolCatalog::new();
    for (server_id, server_name, tools) in servers {
        for tool in tools {
            let key = ToolKey::new(&server_id, &tool.name);
            if catalog.contains_key(&key) {
                warn!(
                    server = %server_id,
                    tool = %tool.name,
                    "skipping duplicate tool name within server"
                );
                continue;
            }
            catalog.insert(
                key,
                AggregatedTool {
                    server_id: server_id.clone(),
                    server_name: server_name.clone(),
                    tool,
                },
            );
        }
    }
    catalog
}
