//! MCP client connection manager.
//!
//! Maintains a pool of long-lived, independently-failing connections to
//! external tool servers (stdio subprocesses or remote HTTP/SSE endpoints),
//! keeps them converged with a backing [`switchboard_store::ConfigStore`], and
//! exposes the aggregated tool catalog of every connected server to the
//! request pipeline.

pub mod catalog;
pub mod client;
pub mod manager;
pub mod protocol;
pub mod reconciler;
pub mod transport;

pub use catalog::{AggregatedTool, AggregatedToolCatalog, ToolKey};
pub use client::{ClientWrapper, StatusSnapshot};
pub use manager::{ConnectionManager, ManagerOptions, ServerStatusReport};
pub use reconciler::Reconciler;
pub use transport::{DefaultTransportFactory, Transport, TransportFactory};
