//! Ledger relay service.
//!
//! ```text
//!   caller ──▶ TransactionService ──▶ retry ──▶ circuit breaker ──▶ gateway (HTTP)
//!                    │                                                  ▲
//!                    ├── status poller ─────────────────────────────────┘
//!                    └── repository (in-memory, optional JSON snapshot)
//!
//!   health monitor ──▶ peer (TCP probe)         reconciliation sweep ──▶ gateway
//! ```
//!
//! Startup: config → logging/metrics → recovery of in-flight records →
//! bounded wait for the peer → background loops. Shutdown: signal → stop
//! background work → drain in-flight tasks with a deadline.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledger_relay::config::{load_config, RelayConfig};
use ledger_relay::gateway::{GatewayClient, HttpGatewayClient};
use ledger_relay::health::{ConnectionHealthMonitor, TcpPeerConnection};
use ledger_relay::lifecycle::{signals, Shutdown};
use ledger_relay::observability::{logging, metrics};
use ledger_relay::resilience::CircuitBreaker;
use ledger_relay::transaction::{
    spawn_reconciliation_loop, InMemoryRepository, TransactionRepository, TransactionService,
};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "ledger-relay")]
#[command(about = "Resilient transaction relay for a ledger gateway", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ledger-relay starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();

    let gateway: Arc<dyn GatewayClient> = Arc::new(HttpGatewayClient::new(&config.gateway)?);
    let repository: Arc<dyn TransactionRepository> = match &config.storage.snapshot_path {
        Some(path) => Arc::new(InMemoryRepository::with_snapshot(path)?),
        None => Arc::new(InMemoryRepository::new()),
    };
    let breaker = Arc::new(CircuitBreaker::new("gateway", &config.circuit_breaker));
    let service = TransactionService::new(gateway, repository, breaker, &config, shutdown.subscribe());

    let recovery = service.recover_in_flight().await?;
    tracing::info!(
        reattached = recovery.reattached,
        failed = recovery.failed,
        repaired = recovery.repaired,
        "Recovered in-flight transactions"
    );

    let peer = Arc::new(TcpPeerConnection::new(&config.peer));
    let mut background = Vec::new();

    if config.health_check.enabled {
        let monitor = Arc::new(ConnectionHealthMonitor::new(peer.clone(), &config.health_check));
        match monitor
            .wait_for_healthy(&shutdown.subscribe(), config.health_check.startup_wait())
            .await
        {
            Ok(status) => tracing::info!(endpoint = %status.endpoint, "Peer reachable"),
            Err(e) => tracing::warn!(error = %e, "Peer not healthy at startup, continuing"),
        }

        let was_healthy = AtomicBool::new(true);
        background.push(monitor.start_continuous_health_check(
            shutdown.subscribe(),
            config.health_check.interval(),
            move |status| {
                if status.healthy && !was_healthy.swap(true, Ordering::Relaxed) {
                    tracing::info!(endpoint = %status.endpoint, "Peer connection recovered");
                } else if !status.healthy {
                    was_healthy.store(false, Ordering::Relaxed);
                }
            },
        ));
    } else {
        tracing::info!("Peer health checks disabled");
    }

    if config.reconciliation.enabled {
        background.push(spawn_reconciliation_loop(
            service.clone(),
            Duration::from_secs(config.reconciliation.interval_secs),
            config.reconciliation.batch_size,
            shutdown.subscribe(),
        ));
    }

    tracing::info!(gateway = %config.gateway.base_url, "ledger-relay ready");

    signals::wait_for_signal().await;
    tracing::info!("Shutdown signal received, stopping background work");
    shutdown.trigger();
    peer.close();

    for handle in background {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    let remaining = service.tasks().wait_idle(DRAIN_TIMEOUT).await;
    if remaining > 0 {
        tracing::warn!(remaining, "Drain deadline reached with tasks still running");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
