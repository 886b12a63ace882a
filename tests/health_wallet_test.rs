//! Health Monitor, Wallet Session and Readiness Watcher Tests
//!
//! Timer-driven behavior runs on tokio's paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;

use common::*;
use drift_signer::domain::error::PipelineError;
use drift_signer::domain::order::{OrderIntent, OrderStatus, TradeSide};
use drift_signer::domain::wallet::{WalletError, WalletErrorKind, WalletStatus};
use drift_signer::ports::backend::AccountCheck;
use drift_signer::ports::chain::NodeVersion;
use drift_signer::usecases::account_readiness::AccountReadinessCache;
use drift_signer::usecases::health_monitor::HealthMonitor;
use drift_signer::usecases::order_history::OrderHistory;
use drift_signer::usecases::order_pipeline::TradingPipeline;
use drift_signer::usecases::portfolio::PortfolioService;
use drift_signer::usecases::submission::{ConfirmationTiming, SubmissionEngine};
use drift_signer::usecases::wallet_session::WalletSessionManager;

fn node() -> NodeVersion {
  NodeVersion {
    solana_core: "2.0.14".to_string(),
    feature_set: Some(3_746_964_731),
  }
}

// ── Health monitor ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_probe_publishes_reachability_and_failures() {
  let mut chain = MockChain::new();
  let mut calls = 0;
  chain.expect_version().returning(move || {
    calls += 1;
    match calls {
      1 => Ok(node()),
      2 | 3 => anyhow::bail!("error sending request: connection refused"),
      _ => Ok(node()),
    }
  });

  let monitor = HealthMonitor::new(Arc::new(chain), Duration::from_secs(30));
  assert!(!monitor.is_reachable());
  assert!(monitor.status().reachable.is_none());

  let mut rx = monitor.subscribe();
  monitor.start();

  rx.changed().await.unwrap();
  let status = rx.borrow_and_update().clone();
  assert!(status.is_reachable());
  assert_eq!(status.node_version.as_deref(), Some("2.0.14"));

  rx.changed().await.unwrap();
  rx.changed().await.unwrap();
  let status = rx.borrow_and_update().clone();
  assert!(!status.is_reachable());
  assert_eq!(status.consecutive_failures, 2);
  assert!(status.last_error.unwrap().contains("connection refused"));
  // Latency from the last good probe is kept.
  assert!(status.latency_ms.is_some());

  rx.changed().await.unwrap();
  let status = rx.borrow_and_update().clone();
  assert!(status.is_reachable());
  assert_eq!(status.consecutive_failures, 0);

  monitor.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_probing() {
  let mut chain = MockChain::new();
  chain.expect_version().times(1).returning(|| Ok(node()));

  let monitor = HealthMonitor::new(Arc::new(chain), Duration::from_secs(30));
  let mut rx = monitor.subscribe();
  monitor.start();
  rx.changed().await.unwrap();
  monitor.shutdown();

  tokio::time::sleep(Duration::from_secs(120)).await;
  assert!(monitor.is_reachable());
}

// ── Wallet session ──────────────────────────────────────────

fn wallet_for(key: Pubkey) -> MockWallet {
  let mut wallet = MockWallet::new();
  wallet.expect_name().returning(|| "Phantom".to_string());
  wallet.expect_connect().returning(move || Ok(key));
  wallet.expect_disconnect().returning(|| Ok(()));
  wallet
}

#[tokio::test]
async fn test_connect_and_disconnect_publish_sessions() {
  let key = Pubkey::new_unique();
  let sessions = WalletSessionManager::new(Arc::new(wallet_for(key)), Duration::from_secs(10));
  let rx = sessions.subscribe();

  assert_eq!(sessions.connect().await.unwrap(), key);
  assert_eq!(rx.borrow().status, WalletStatus::Connected);
  assert_eq!(rx.borrow().provider_name.as_deref(), Some("Phantom"));
  assert_eq!(rx.borrow().connect_epoch, 1);
  // Connecting twice keeps the session.
  assert_eq!(sessions.connect().await.unwrap(), key);
  assert_eq!(rx.borrow().connect_epoch, 1);

  sessions.disconnect().await.unwrap();
  assert_eq!(rx.borrow().status, WalletStatus::Disconnected);
  assert!(sessions.connected_key().is_none());

  sessions.connect().await.unwrap();
  assert_eq!(rx.borrow().connect_epoch, 2);
}

#[tokio::test]
async fn test_connection_rejection_is_translated() {
  let mut wallet = MockWallet::new();
  wallet.expect_name().returning(|| "Phantom".to_string());
  wallet.expect_connect().returning(|| {
    Err(WalletError::new(
      WalletErrorKind::ConnectionError,
      "User rejected the request.",
    ))
  });
  let sessions = WalletSessionManager::new(Arc::new(wallet), Duration::from_secs(10));

  assert!(sessions.connect().await.is_err());
  assert_eq!(sessions.session().status, WalletStatus::Disconnected);
  let error = sessions.current_error().unwrap();
  assert_eq!(error.name, "WalletConnectionError");
  assert_eq!(error.user_message, "Connection cancelled by user.");
}

#[tokio::test(start_paused = true)]
async fn test_wallet_error_clears_after_ttl() {
  let sessions = WalletSessionManager::new(
    Arc::new(wallet_for(Pubkey::new_unique())),
    Duration::from_secs(10),
  );
  sessions.record_error(&WalletError::new(WalletErrorKind::Timeout, "timed out"));
  assert!(sessions.current_error().is_some());

  tokio::time::sleep(Duration::from_secs(9)).await;
  assert!(sessions.current_error().is_some());

  tokio::time::sleep(Duration::from_secs(2)).await;
  assert!(sessions.current_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_newer_wallet_error_restarts_the_clock() {
  let sessions = WalletSessionManager::new(
    Arc::new(wallet_for(Pubkey::new_unique())),
    Duration::from_secs(10),
  );
  sessions.record_error(&WalletError::new(WalletErrorKind::Timeout, "first"));
  tokio::time::sleep(Duration::from_secs(6)).await;
  sessions.record_error(&WalletError::new(WalletErrorKind::WindowClosed, "second"));

  tokio::time::sleep(Duration::from_secs(6)).await;
  let error = sessions.current_error().unwrap();
  assert_eq!(error.message, "second");

  tokio::time::sleep(Duration::from_secs(5)).await;
  assert!(sessions.current_error().is_none());
}

// ── Readiness watcher ───────────────────────────────────────

#[tokio::test]
async fn test_readiness_follows_wallet_changes() {
  let key = Pubkey::new_unique();
  let mut backend = MockBackend::new();
  backend
    .expect_check_account()
    .withf(move |pk| pk == key.to_string())
    .times(1)
    .returning(|_| {
      Ok(AccountCheck {
        has_drift_account: true,
        drift_account_pubkey: Some("UserPda111".to_string()),
        network: "devnet".to_string(),
        message: None,
      })
    });

  let sessions = Arc::new(WalletSessionManager::new(
    Arc::new(wallet_for(key)),
    Duration::from_secs(10),
  ));
  let cache = Arc::new(AccountReadinessCache::new(Arc::new(backend), "devnet"));
  let mut readiness = cache.subscribe();
  cache.start(sessions.subscribe());

  sessions.connect().await.unwrap();
  readiness.wait_for(Option::is_some).await.unwrap();
  assert_eq!(cache.has_account(&key), Some(true));

  sessions.disconnect().await.unwrap();
  readiness.wait_for(Option::is_none).await.unwrap();
  assert_eq!(cache.has_account(&key), None);

  cache.shutdown();
}

// ── Connectivity gate ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_failed_health_checks_gate_orders_and_airdrops_until_recovery() {
  let key = Pubkey::new_unique();
  let mut chain = MockChain::new();
  let mut calls = 0;
  chain.expect_version().returning(move || {
    calls += 1;
    if calls <= 3 {
      anyhow::bail!("error sending request: connection refused")
    }
    Ok(node())
  });
  chain
    .expect_request_airdrop()
    .times(1)
    .returning(|_, _| Ok("airdropSig".to_string()));
  let chain = Arc::new(chain);

  let mut backend = MockBackend::new();
  backend.expect_build_order().times(1).returning(|_| Ok(mock_built()));
  let backend = Arc::new(backend);

  let monitor = HealthMonitor::new(Arc::clone(&chain), Duration::from_secs(30));
  let sessions = Arc::new(WalletSessionManager::new(
    Arc::new(wallet_for(key)),
    Duration::from_secs(10),
  ));
  let pipeline = TradingPipeline::new(
    Arc::clone(&backend),
    Arc::new(AccountReadinessCache::new(Arc::clone(&backend), "devnet")),
    Arc::clone(&sessions),
    Arc::new(SubmissionEngine::new(
      Arc::clone(&chain),
      monitor.subscribe(),
      "devnet",
      ConfirmationTiming::default(),
    )),
    Arc::new(OrderHistory::new()),
  );
  let portfolio = PortfolioService::new(
    Arc::clone(&backend),
    Arc::clone(&chain),
    monitor.subscribe(),
    "devnet",
  );
  sessions.connect().await.unwrap();

  let mut health = monitor.subscribe();
  monitor.start();
  health.wait_for(|s| s.consecutive_failures == 3).await.unwrap();

  let intent = OrderIntent::market("SOL-PERP", TradeSide::Buy, 0.5);
  let err = pipeline
    .place_order(intent.clone(), &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::Connectivity(ref reason) if reason.contains("connection refused")));
  let err = portfolio.request_airdrop(key, dec!(1)).await.unwrap_err();
  assert!(matches!(err, PipelineError::Connectivity(_)));
  assert_eq!(pipeline.history().len().await, 0);

  health.wait_for(|s| s.is_reachable()).await.unwrap();

  let record = pipeline
    .place_order(intent, &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(record.status, OrderStatus::Executed);
  assert_eq!(portfolio.request_airdrop(key, dec!(1)).await.unwrap(), "airdropSig");

  monitor.shutdown();
}
