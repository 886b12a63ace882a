//! Drift Signer - Entry Point
//!
//! Wires the adapters and use cases, then runs the operator console
//! until `quit`, end of input or SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Load the wallet keypair from WALLET_KEYPAIR_PATH
//! 4. Create the backend and Solana RPC clients
//! 5. Build the use cases (health, session, readiness, pipeline, pending, portfolio)
//! 6. Start the health probe, readiness watcher and pending-trade poll
//! 7. Spawn metrics recorder + health server on :8080 (/live /ready /metrics)
//! 8. Run the console until quit or SIGINT
//! 9. Graceful shutdown (cancel → stop timers → disconnect → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use drift_signer::adapters::backend::{BackendClient, HttpTradingBackend};
use drift_signer::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use drift_signer::adapters::rpc::SolanaRpcClient;
use drift_signer::adapters::wallet::KeypairWallet;
use drift_signer::config;
use drift_signer::console::Console;
use drift_signer::usecases::account_readiness::AccountReadinessCache;
use drift_signer::usecases::health_monitor::HealthMonitor;
use drift_signer::usecases::order_history::OrderHistory;
use drift_signer::usecases::order_pipeline::TradingPipeline;
use drift_signer::usecases::pending_trades::PendingTradeSync;
use drift_signer::usecases::portfolio::PortfolioService;
use drift_signer::usecases::submission::SubmissionEngine;
use drift_signer::usecases::wallet_session::WalletSessionManager;

const CONFIG_PATH_ENV: &str = "DRIFT_SIGNER_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        network = %config.app.network,
        "Starting drift-signer"
    );

    let shutdown = CancellationToken::new();

    // ── 3. Wallet keypair from env ──────────────────────────
    let wallet = Arc::new(
        KeypairWallet::from_env().context("Failed to load wallet keypair")?,
    );
    info!(pubkey = %wallet.pubkey(), "Wallet keypair loaded");

    // ── 4. Backend + RPC clients ────────────────────────────
    let backend_client = Arc::new(
        BackendClient::new(config.backend_client()).context("Failed to create backend client")?,
    );
    let backend = Arc::new(HttpTradingBackend::new(backend_client));
    let rpc = Arc::new(
        SolanaRpcClient::new(config.rpc_client()).context("Failed to create RPC client")?,
    );

    // ── 5. Use cases ────────────────────────────────────────
    let health = HealthMonitor::new(Arc::clone(&rpc), config.timing.health_interval());
    let sessions = Arc::new(WalletSessionManager::new(
        Arc::clone(&wallet),
        config.timing.wallet_error_ttl(),
    ));
    let readiness = Arc::new(AccountReadinessCache::new(
        Arc::clone(&backend),
        config.app.network.clone(),
    ));
    let submission = Arc::new(SubmissionEngine::new(
        Arc::clone(&rpc),
        health.subscribe(),
        config.app.network.clone(),
        config.confirmation_timing(),
    ));
    let history = Arc::new(OrderHistory::new());
    let pipeline = Arc::new(TradingPipeline::new(
        Arc::clone(&backend),
        Arc::clone(&readiness),
        Arc::clone(&sessions),
        Arc::clone(&submission),
        Arc::clone(&history),
    ));
    let pending = Arc::new(PendingTradeSync::new(
        Arc::clone(&backend),
        Arc::clone(&pipeline),
        config.timing.pending_poll(),
    ));
    let portfolio = Arc::new(PortfolioService::new(
        Arc::clone(&backend),
        Arc::clone(&rpc),
        health.subscribe(),
        config.app.network.clone(),
    ));

    // ── 6. Periodic tasks ───────────────────────────────────
    health.start();
    readiness.start(sessions.subscribe());
    pending.start();

    // ── 7. Metrics + health server ──────────────────────────
    let mut background = Vec::new();
    if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
        background.push(Arc::clone(&metrics).spawn_recorder(
            health.subscribe(),
            pending.subscribe(),
            sessions.subscribe_errors(),
            history.subscribe_settled(),
            shutdown.child_token(),
        ));

        let server = HealthServer::new(
            HealthState {
                connection: health.subscribe(),
                metrics,
            },
            config.metrics.health_port,
        );
        let server_cancel = shutdown.child_token();
        background.push(tokio::spawn(async move {
            if let Err(e) = server.run(server_cancel).await {
                error!(error = %e, "Health server failed");
            }
        }));
    }

    // ── 8. Console until quit or SIGINT ─────────────────────
    let console = Arc::new(Console::new(
        Arc::clone(&pipeline),
        Arc::clone(&pending),
        Arc::clone(&portfolio),
    ));
    let console_task = tokio::spawn(
        Arc::clone(&console).run(BufReader::new(tokio::io::stdin()), shutdown.clone()),
    );

    info!("All tasks spawned, console ready");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
        () = shutdown.cancelled() => {
            info!("Console requested shutdown");
        }
    }

    // ── 9. Graceful shutdown ────────────────────────────────

    // 1. Cancel outstanding wallet requests and background tasks
    shutdown.cancel();

    // 2. Stop timers; late poll results are discarded
    pending.shutdown();
    readiness.shutdown();
    health.shutdown();
    sessions.shutdown();

    // 3. Give an in-flight submission a chance to settle
    if pipeline.is_busy() {
        info!("Waiting for in-flight submission to settle...");
        if tokio::time::timeout(Duration::from_secs(30), submission.acquire()).await.is_err() {
            warn!("In-flight submission did not settle before shutdown");
        }
    }

    // 4. Disconnect the wallet
    if let Err(e) = sessions.disconnect().await {
        warn!(error = %e, "Wallet disconnect failed");
    }

    // 5. Wait for background tasks (up to 5s)
    let _ = tokio::time::timeout(Duration::from_secs(5), console_task).await;
    for handle in background {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");

    // The blocking stdin reader would keep the runtime alive until the next line.
    std::process::exit(0)
}
