//! Order Pipeline Integration Tests
//!
//! Drives `TradingPipeline` end to end against mockall port mocks and
//! hand fakes for the timing-sensitive cases.

mod common;

use std::sync::Arc;
use std::time::Duration;

use mockall::predicate::*;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use tokio_util::sync::CancellationToken;

use common::*;
use drift_signer::adapters::wallet::KeypairWallet;
use drift_signer::domain::connection::ConnectionStatus;
use drift_signer::domain::error::{BuildError, PipelineError};
use drift_signer::domain::order::{IntentError, OrderIntent, OrderStatus, TradeSide};
use drift_signer::domain::wallet::WalletError;
use drift_signer::ports::backend::{
  AccountCheck, BuildResponse, Position, PositionSide, TradingBackend,
};
use drift_signer::domain::transaction::DecodedTransaction;
use drift_signer::ports::chain::{ChainRpc, SendRejected};
use drift_signer::ports::wallet::WalletProvider;
use drift_signer::usecases::account_readiness::AccountReadinessCache;
use drift_signer::usecases::order_history::OrderHistory;
use drift_signer::usecases::order_pipeline::TradingPipeline;
use drift_signer::usecases::submission::{ConfirmationTiming, SubmissionEngine, SubmissionPhase};
use drift_signer::usecases::wallet_session::WalletSessionManager;

fn pipeline<B: TradingBackend, C: ChainRpc, W: WalletProvider>(
  backend: B,
  chain: C,
  wallet: W,
  health: tokio::sync::watch::Receiver<ConnectionStatus>,
) -> Arc<TradingPipeline<B, C, W>> {
  let backend = Arc::new(backend);
  let sessions = Arc::new(WalletSessionManager::new(Arc::new(wallet), Duration::from_secs(10)));
  let readiness = Arc::new(AccountReadinessCache::new(Arc::clone(&backend), "devnet"));
  let submission = Arc::new(SubmissionEngine::new(
    Arc::new(chain),
    health,
    "devnet",
    ConfirmationTiming::default(),
  ));
  Arc::new(TradingPipeline::new(
    backend,
    readiness,
    sessions,
    submission,
    Arc::new(OrderHistory::new()),
  ))
}

fn sol_buy() -> OrderIntent {
  OrderIntent::market("SOL-PERP", TradeSide::Buy, 0.5)
}

fn mock_wallet(key: Pubkey) -> MockWallet {
  let mut wallet = MockWallet::new();
  wallet.expect_name().returning(|| "Mock".to_string());
  wallet.expect_connect().returning(move || Ok(key));
  wallet
}

#[tokio::test]
async fn test_mock_mode_settles_without_rpc_calls() {
  let keypair = Keypair::new();
  let mut backend = MockBackend::new();
  backend.expect_build_order().times(1).returning(|_| Ok(mock_built()));
  // No chain expectations: any RPC call panics.
  let chain = MockChain::new();

  let pipeline = pipeline(backend, chain, KeypairWallet::new(keypair), reachable());
  pipeline.sessions().connect().await.unwrap();

  let record = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(record.status, OrderStatus::Executed);
  let signature = record.signature.unwrap();
  assert_eq!(signature, format!("MOCK_{}", record.id));
  assert_eq!(record.explorer_url.as_deref(), Some(""));
  assert_eq!(pipeline.history().len().await, 1);
  assert!(!pipeline.is_busy());
}

#[tokio::test]
async fn test_executes_v0_order_end_to_end() {
  let keypair = Keypair::new();
  let wallet = KeypairWallet::new(keypair);
  let key = wallet.pubkey();

  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .withf(move |req| req.user_pubkey == key.to_string() && req.market == "SOL-PERP")
    .times(1)
    .returning(move |_| Ok(built(unsigned_v0(&key))));

  let mut chain = MockChain::new();
  chain
    .expect_send_raw_transaction()
    .times(1)
    .returning(|wire| {
      let tx = drift_signer::domain::transaction::DecodedTransaction::from_wire(wire).unwrap();
      assert!(tx.is_versioned());
      assert!(tx.is_fully_signed());
      Ok(tx.first_signature().unwrap().to_string())
    });
  let mut polls = 0;
  chain.expect_signature_status().returning(move |_| {
    polls += 1;
    Ok((polls > 1).then(|| confirmed(42)))
  });

  let pipeline = pipeline(backend, chain, wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let record = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(record.status, OrderStatus::Executed);
  let signature = record.signature.unwrap();
  assert_eq!(
    record.explorer_url.unwrap(),
    format!("https://explorer.solana.com/tx/{signature}?cluster=devnet")
  );
}

#[tokio::test]
async fn test_account_missing_short_circuits_before_signing() {
  let key = Pubkey::new_unique();
  let mut backend = MockBackend::new();
  backend.expect_build_order().times(1).returning(|_| {
    Ok(BuildResponse {
      success: false,
      error: Some("DRIFT_ACCOUNT_NOT_FOUND: initialize your account".to_string()),
      ..BuildResponse::default()
    })
  });
  // No sign expectation: signing would panic.
  let wallet = mock_wallet(key);

  let pipeline = pipeline(backend, MockChain::new(), wallet, reachable());
  pipeline.sessions().connect().await.unwrap();
  pipeline.readiness().bind(Some(key));

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();

  assert_eq!(err, PipelineError::Build(BuildError::AccountMissing));
  assert_eq!(pipeline.readiness().has_account(&key), Some(false));
  let records = pipeline.history().snapshot().await;
  assert_eq!(records[0].status, OrderStatus::Failed);
  assert!(records[0].error.as_deref().unwrap().contains("initialize"));
}

#[tokio::test]
async fn test_wallet_rejection_fails_record_and_surfaces_error() {
  let key = Pubkey::new_unique();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .returning(move |_| Ok(built(unsigned_legacy(&key))));
  let mut wallet = mock_wallet(key);
  wallet
    .expect_sign_transaction()
    .times(1)
    .returning(|_| Err(WalletError::user_rejected()));

  let pipeline = pipeline(backend, MockChain::new(), wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::Wallet(_)));

  let record = &pipeline.history().snapshot().await[0];
  assert_eq!(record.status, OrderStatus::Failed);
  assert_eq!(record.error.as_deref(), Some("User rejected the request"));

  let surfaced = pipeline.sessions().current_error().unwrap();
  assert_eq!(surfaced.user_message, "Transaction cancelled by user.");
}

#[tokio::test]
async fn test_on_chain_error_fails_record() {
  let wallet = KeypairWallet::new(Keypair::new());
  let key = wallet.pubkey();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .returning(move |_| Ok(built(unsigned_legacy(&key))));

  let mut chain = MockChain::new();
  chain
    .expect_send_raw_transaction()
    .returning(|_| Ok("5sig".to_string()));
  chain.expect_signature_status().with(eq("5sig")).returning(|_| {
    Ok(Some(drift_signer::ports::chain::SignatureStatus {
      slot: 9,
      confirmations: Some(1),
      confirmation_status: Some("confirmed".to_string()),
      err: Some(serde_json::json!({"InstructionError": [0, {"Custom": 6010}]})),
    }))
  });

  let pipeline = pipeline(backend, chain, wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Confirmation(ref msg) if msg.contains("6010")));
  let record = &pipeline.history().snapshot().await[0];
  assert_eq!(record.status, OrderStatus::Failed);
  assert!(record.signature.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout() {
  let wallet = KeypairWallet::new(Keypair::new());
  let key = wallet.pubkey();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .returning(move |_| Ok(built(unsigned_v0(&key))));
  let mut chain = MockChain::new();
  chain
    .expect_send_raw_transaction()
    .returning(|_| Ok("lost".to_string()));
  chain.expect_signature_status().returning(|_| Ok(None));

  let pipeline = pipeline(backend, chain, wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();
  assert_eq!(
    err,
    PipelineError::Confirmation("confirmation timed out".to_string())
  );
  assert!(!pipeline.is_busy());
}

#[tokio::test]
async fn test_preconditions_create_no_record() {
  let key = Pubkey::new_unique();
  let (_tx, unreachable) = health_channel(ConnectionStatus::unknown().failed("connection refused"));
  let pipeline = pipeline(MockBackend::new(), MockChain::new(), mock_wallet(key), unreachable);

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();
  assert_eq!(err, PipelineError::NotConnected);

  pipeline.sessions().connect().await.unwrap();
  let err = pipeline
    .place_order(OrderIntent::market("SOL-PERP", TradeSide::Buy, 0.0), &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::InvalidIntent(_)));

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();
  assert_eq!(err, PipelineError::Connectivity("connection refused".to_string()));

  assert!(pipeline.history().is_empty().await);
}

#[tokio::test]
async fn test_wallet_mismatch_is_refused() {
  let wallet = KeypairWallet::new(Keypair::new());
  let other = Pubkey::new_unique();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .returning(move |_| Ok(built(unsigned_legacy(&other))));

  let pipeline = pipeline(backend, MockChain::new(), wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::WalletMismatch { ref expected, .. } if *expected == other.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_busy_lock_serializes_sign_and_submit() {
  let log = event_log();
  let wallet = SlowWallet::new(Duration::from_millis(200), Arc::clone(&log));
  let key = wallet.pubkey();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .times(2)
    .returning(move |_| Ok(built(unsigned_v0(&key))));
  let chain = SlowChain {
    delay: Duration::from_millis(300),
    log: Arc::clone(&log),
  };

  let pipeline = pipeline(backend, chain, wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let first = {
    let pipeline = Arc::clone(&pipeline);
    tokio::spawn(async move { pipeline.place_order(sol_buy(), &CancellationToken::new()).await })
  };
  let second = {
    let pipeline = Arc::clone(&pipeline);
    tokio::spawn(async move {
      pipeline
        .place_order(OrderIntent::market("BTC-PERP", TradeSide::Sell, 0.01), &CancellationToken::new())
        .await
    })
  };

  assert!(first.await.unwrap().is_ok());
  assert!(second.await.unwrap().is_ok());

  assert_eq!(
    events(&log),
    vec![
      "sign:start", "sign:end", "send:start", "send:end",
      "sign:start", "sign:end", "send:start", "send:end",
    ]
  );
  assert!(!pipeline.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_on_wallet() {
  let log = event_log();
  let wallet = SlowWallet::new(Duration::from_secs(3600), Arc::clone(&log));
  let key = wallet.pubkey();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .returning(move |_| Ok(built(unsigned_v0(&key))));

  let pipeline = pipeline(backend, MockChain::new(), wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let cancel = CancellationToken::new();
  let task = {
    let pipeline = Arc::clone(&pipeline);
    let cancel = cancel.clone();
    tokio::spawn(async move { pipeline.place_order(sol_buy(), &cancel).await })
  };

  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(pipeline.is_busy());
  cancel.cancel();

  assert_eq!(task.await.unwrap().unwrap_err(), PipelineError::Cancelled);
  assert_eq!(events(&log), vec!["sign:start"]);
  let record = &pipeline.history().snapshot().await[0];
  assert_eq!(record.status, OrderStatus::Failed);
  assert!(!pipeline.is_busy());
}

#[tokio::test]
async fn test_initialize_already_exists_skips_signing() {
  let key = Pubkey::new_unique();
  let mut backend = MockBackend::new();
  backend.expect_build_initialize().times(1).returning(|_| {
    Ok(BuildResponse {
      success: false,
      error: Some("User account already exists".to_string()),
      ..BuildResponse::default()
    })
  });
  backend.expect_check_account().times(1).returning(|_| {
    Ok(AccountCheck {
      has_drift_account: true,
      drift_account_pubkey: Some("DriftUser111".to_string()),
      network: "devnet".to_string(),
      message: None,
    })
  });

  let pipeline = pipeline(backend, MockChain::new(), mock_wallet(key), reachable());
  pipeline.sessions().connect().await.unwrap();
  pipeline.readiness().bind(Some(key));

  let outcome = pipeline.initialize_account(&CancellationToken::new()).await.unwrap();
  assert!(outcome.signature.is_none());
  assert!(outcome.readiness.has_trading_account);
  assert_eq!(pipeline.readiness().has_account(&key), Some(true));
}

#[tokio::test]
async fn test_lost_send_response_confirms_by_local_signature() {
  let wallet = KeypairWallet::new(Keypair::new());
  let key = wallet.pubkey();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .returning(move |_| Ok(built(unsigned_legacy(&key))));

  let mut chain = MockChain::new();
  chain
    .expect_send_raw_transaction()
    .times(1)
    .returning(|_| Err(anyhow::anyhow!("sendTransaction request failed: operation timed out")));
  chain
    .expect_signature_status()
    .times(1)
    .returning(|_| Ok(Some(confirmed(40))));

  let pipeline = pipeline(backend, chain, wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let record = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(record.status, OrderStatus::Executed);
  let signature = record.signature.unwrap();
  assert!(!signature.starts_with("MOCK_"));
  assert!(record.explorer_url.unwrap().contains(&signature));
}

#[tokio::test]
async fn test_node_refusal_fails_without_polling() {
  let wallet = KeypairWallet::new(Keypair::new());
  let key = wallet.pubkey();
  let mut backend = MockBackend::new();
  backend
    .expect_build_order()
    .returning(move |_| Ok(built(unsigned_legacy(&key))));

  let mut chain = MockChain::new();
  chain.expect_send_raw_transaction().times(1).returning(|_| {
    Err(SendRejected("Transaction simulation failed: Blockhash not found".to_string()).into())
  });
  chain.expect_signature_status().times(0);

  let pipeline = pipeline(backend, chain, wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let err = pipeline
    .place_order(sol_buy(), &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::Submission(ref msg) if msg.contains("Blockhash not found")));
  assert!(matches!(pipeline.submission().phase(), SubmissionPhase::Failed(_)));
}

#[tokio::test]
async fn test_unreachable_submit_settles_failed() {
  let (_tx, unreachable) = health_channel(ConnectionStatus::unknown().failed("connection refused"));
  let engine = SubmissionEngine::new(
    Arc::new(MockChain::new()),
    unreachable,
    "devnet",
    ConfirmationTiming::default(),
  );
  let transaction = DecodedTransaction::decode(&unsigned_legacy(&Pubkey::new_unique())).unwrap();

  let permit = engine.acquire().await;
  let err = engine.submit(&permit, &transaction).await.unwrap_err();

  assert_eq!(err, PipelineError::Connectivity("connection refused".to_string()));
  assert_eq!(
    engine.phase(),
    SubmissionPhase::Failed(err.to_string())
  );
}

fn sol_long(size: f64) -> Position {
  Position {
    market: "SOL-PERP".to_string(),
    market_index: 0,
    size,
    side: PositionSide::Long,
    entry_price: 150.0,
    unrealized_pnl: 3.2,
  }
}

#[tokio::test]
async fn test_close_position_executes_offsetting_order() {
  let wallet = KeypairWallet::new(Keypair::new());
  let key = wallet.pubkey();
  let mut backend = MockBackend::new();
  backend
    .expect_positions()
    .times(1)
    .returning(|_| Ok(vec![sol_long(2.5)]));
  backend
    .expect_build_close_position()
    .withf(move |user, market| user == key.to_string() && market == "SOL-PERP")
    .times(1)
    .returning(move |_, _| Ok(built(unsigned_v0(&key))));
  backend.expect_build_order().times(0);

  let mut chain = MockChain::new();
  chain
    .expect_send_raw_transaction()
    .times(1)
    .returning(|_| Ok("5close".to_string()));
  chain
    .expect_signature_status()
    .with(eq("5close"))
    .returning(|_| Ok(Some(confirmed(12))));

  let pipeline = pipeline(backend, chain, wallet, reachable());
  pipeline.sessions().connect().await.unwrap();

  let record = pipeline
    .close_position("SOL-PERP", &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(record.status, OrderStatus::Executed);
  assert_eq!(record.signature.as_deref(), Some("5close"));
  assert_eq!(record.intent.side, TradeSide::Sell);
  assert!((record.intent.size - 2.5).abs() < f64::EPSILON);
  assert_eq!(pipeline.history().snapshot().await[0].status, OrderStatus::Executed);
}

#[tokio::test]
async fn test_close_without_position_creates_no_record() {
  let key = Pubkey::new_unique();
  let mut backend = MockBackend::new();
  backend.expect_positions().returning(|_| Ok(vec![sol_long(0.0)]));
  backend.expect_build_close_position().times(0);

  let pipeline = pipeline(backend, MockChain::new(), mock_wallet(key), reachable());
  pipeline.sessions().connect().await.unwrap();

  let err = pipeline
    .close_position("SOL-PERP", &CancellationToken::new())
    .await
    .unwrap_err();
  assert_eq!(
    err,
    PipelineError::InvalidIntent(IntentError::NoOpenPosition("SOL-PERP".to_string()))
  );

  let unknown = pipeline
    .close_position("FOO-PERP", &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(unknown, PipelineError::InvalidIntent(IntentError::UnknownMarket(_))));
  assert_eq!(pipeline.history().len().await, 0);
}

#[tokio::test]
async fn test_close_in_mock_mode_settles_locally() {
  let key = Pubkey::new_unique();
  let mut backend = MockBackend::new();
  backend.expect_positions().returning(|_| Ok(vec![sol_long(-1.0)]));
  backend
    .expect_build_close_position()
    .times(1)
    .returning(|_, _| Ok(mock_built()));

  let pipeline = pipeline(backend, MockChain::new(), mock_wallet(key), reachable());
  pipeline.sessions().connect().await.unwrap();

  let record = pipeline
    .close_position("sol-perp", &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(record.status, OrderStatus::Executed);
  assert_eq!(record.signature, Some(format!("MOCK_{}", record.id)));
  assert!((record.intent.size - 1.0).abs() < f64::EPSILON);
}
