//! Example demonstrating the connection manager lifecycle
//!
//! This example shows how to:
//! 1. Seed a config store with MCP server definitions
//! 2. Initialize the connection manager and let it connect in the background
//! 3. Inspect server statuses and the aggregated tool catalog
//! 4. Run the periodic reconciliation loop

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use switchboard_core::{ConnectionSpec, ServerConfig};
use switchboard_mcp::{ConnectionManager, ManagerOptions, Reconciler};
use switchboard_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("switchboard_mcp=debug".parse()?),
        )
        .init();

    println!("🔌 switchboard connection manager demo");
    println!("======================================\n");

    // Any ConfigStore works here; the memory store keeps the demo self-contained.
    let store = Arc::new(MemoryStore::with_configs([ServerConfig::new(
        "everything",
        "everything",
        ConnectionSpec::Stdio {
            command: "npx".to_string(),
            args: vec![
                "-y".to_string(),
                "@modelcontextprotocol/server-everything".to_string(),
            ],
            env: Default::default(),
        },
    )]));

    let manager = Arc::new(ConnectionManager::new(
        store.clone(),
        ManagerOptions::default(),
    ));

    println!("Initializing connection manager...");
    manager.initialize().await?;

    // initialize() returns once connection attempts are dispatched; give the
    // handshakes a moment before inspecting.
    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("\n📊 Server statuses:");
    for report in manager.server_statuses().await {
        println!(
            "   - {} ({}): {:?}, {} tools{}",
            report.name,
            report.id,
            report.status,
            report.tool_count,
            report
                .error
                .map(|e| format!(", last error: {e}"))
                .unwrap_or_default(),
        );
    }

    let catalog = manager.aggregated_tools().await;
    println!("\n📦 Aggregated tools ({} total):", catalog.len());
    for key in catalog.keys().take(10) {
        println!("   - {}", key.qualified());
    }

    // Keep converging onto store edits until shutdown.
    let reconciler = Reconciler::spawn(manager.clone(), Duration::from_secs(30));

    println!("\nRunning for 60s; edit the store from another task to see reconciliation.");
    tokio::time::sleep(Duration::from_secs(60)).await;

    reconciler.stop();
    manager.shutdown().await;
    println!("Done.");
    Ok(())
}
