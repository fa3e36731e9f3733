//! Engine runner for cross-expiry futures arbitrage on OKX.
//!
//! Wires together:
//! - OKX REST client (instrument discovery and order placement)
//! - Public `books5` WebSocket feeding the depth model
//! - Private `orders` WebSocket feeding order events
//! - Audit trail (REST store when configured, in-memory otherwise)
//! - Arbitrage engine with the configured trigger strategy
//!
//! Usage:
//!   # Set environment variables in .env
//!   OKX_API_KEY=...
//!   OKX_API_SECRET=...
//!   OKX_PASSPHRASE=...
//!   OKX_SIMULATED=true          (default, uses the demo endpoints)
//!   UNDERLYING=BTC-USD          (default)
//!   ARB_CONFIG=./arb.json       (optional, defaults otherwise)
//!   AUDIT_REST_URL=...          (optional REST audit store)
//!   AUDIT_REST_KEY=...
//!   RECORD_TICKS=true           (optional tick recording for replay)
//!
//!   cargo run -p calendar-arb-strategy --example run_engine

use calendar_arb_strategy::{ArbitrageConfig, ArbitrageEngine, TickRecorder};
use calendar_data::{
    dispatch::BookListener,
    exchange::okx::{OKX_WS_PUBLIC, OKX_WS_PUBLIC_DEMO},
};
use calendar_execution::{
    Cooldown, OrderExecutor, OrderListener,
    audit::{AuditStore, InMemoryAuditStore, RestAuditStore, spawn_audit_writer},
    client::okx::{
        OKX_WS_PRIVATE, OKX_WS_PRIVATE_DEMO, OkxHttpClient, OkxHttpConfig, OkxSession,
    },
};
use calendar_integration::protocol::stream::{ConnectionConfig, PersistentConnection};
use std::sync::Arc;
use tracing::{error, info, warn};

fn main() {
    dotenv();
    init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build tokio runtime: {e}");
            return;
        }
    };

    runtime.block_on(run());
}

async fn run() {
    // Step 1: Configuration
    let config = ArbitrageConfig::from_env().expect("Failed to load arbitrage config");
    let http_config = OkxHttpConfig::from_env().expect("OKX credentials not configured");
    let simulated = http_config.simulated;
    let credentials = http_config.credentials.clone();
    let client = Arc::new(OkxHttpClient::new(http_config));
    info!(?config.strategy, simulated, "configuration loaded");

    // Step 2: Discover live contracts
    let underlying = std::env::var("UNDERLYING").unwrap_or_else(|_| "BTC-USD".to_string());
    let instruments = client
        .fetch_instruments(&underlying, config.leverage)
        .await
        .expect("Failed to fetch instruments");
    if instruments.len() < 2 {
        error!(%underlying, found = instruments.len(), "need at least two live contracts");
        return;
    }
    for instrument in instruments.iter() {
        info!(
            id = %instrument.id,
            expiry_class = ?instrument.expiry_class,
            expiry = %instrument.expiry,
            contract_value = %instrument.contract_value,
            "instrument"
        );
    }
    let ids: Vec<_> = instruments.ids().cloned().collect();

    // Step 3: Audit trail
    let store: Arc<dyn AuditStore> = match RestAuditStore::from_env() {
        Ok(store) => Arc::new(store),
        Err(error) => {
            warn!(?error, "REST audit store unavailable, auditing in memory");
            Arc::new(InMemoryAuditStore::new())
        }
    };
    let (audit, audit_writer) = spawn_audit_writer(store);

    // Step 4: Listeners and executor
    let books = Arc::new(BookListener::new());
    let orders = Arc::new(OrderListener::new());
    let executor = Arc::new(OrderExecutor::new(
        client,
        orders.clone(),
        audit,
        Cooldown::new(config.cooldown()),
    ));

    // Step 5: Engine
    let recorder = TickRecorder::from_env();
    if let Some(recorder) = &recorder {
        info!(path = ?recorder.path(), "Tick recording enabled");
    }
    let engine = ArbitrageEngine::new(config, instruments, executor, books.clone())
        .with_recorder(recorder)
        .start();

    // Step 6: Connections
    let (public_url, private_url) = if simulated {
        (OKX_WS_PUBLIC_DEMO, OKX_WS_PRIVATE_DEMO)
    } else {
        (OKX_WS_PUBLIC, OKX_WS_PRIVATE)
    };

    let public = OkxSession::public(public_url, ids, books).expect("Invalid public URL");
    let private =
        OkxSession::private(private_url, credentials, orders).expect("Invalid private URL");

    let public = tokio::spawn(async move {
        PersistentConnection::new(public, ConnectionConfig::default())
            .run()
            .await
    });
    let private = tokio::spawn(async move {
        PersistentConnection::new(private, ConnectionConfig::default())
            .run()
            .await
    });

    info!("Engine running. Press Ctrl+C to stop.");
    let _ = tokio::signal::ctrl_c().await;
    info!(
        live = engine.live_transactions(),
        outcomes = ?engine.outcomes(),
        "Shutting down..."
    );

    public.abort();
    private.abort();
    audit_writer.abort();
}

fn dotenv() {
    for path in &[".env", "../.env", "../../.env"] {
        if std::path::Path::new(path).exists() {
            if let Ok(contents) = std::fs::read_to_string(path) {
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((key, value)) = line.split_once('=') {
                        let key = key.trim();
                        let value = value.trim().trim_matches('"').trim_matches('\'');
                        if std::env::var(key).is_err() {
                            // Single-threaded: runs before the runtime is built
                            unsafe { std::env::set_var(key, value) };
                        }
                    }
                }
                break;
            }
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(cfg!(debug_assertions))
        .init()
}
