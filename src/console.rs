//! Operator Console - Line Commands over stdin
//!
//! Each line is parsed into a `Command` and run as its own task with a
//! child cancellation token, so `cancel` can abort a signing request
//! that is still waiting on the wallet and a pending-trade approval can
//! queue behind an order already holding the busy lock.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::error::PipelineError;
use crate::domain::order::{OrderIntent, TradeSide};
use crate::domain::pending::{PendingTrade, PendingTradeId};
use crate::ports::backend::TradingBackend;
use crate::ports::chain::ChainRpc;
use crate::ports::wallet::WalletProvider;
use crate::usecases::order_pipeline::TradingPipeline;
use crate::usecases::pending_trades::{ApprovalOutcome, PendingTradeSync};
use crate::usecases::portfolio::PortfolioService;

const DEFAULT_AIRDROP_SOL: Decimal = dec!(1);
const DEFAULT_TX_LIMIT: usize = 10;

pub const HELP: &str = "\
commands:
  connect | disconnect | status
  buy <market> <size> [limit-price]
  sell <market> <size> [limit-price]
  close <market>            flatten the open position
  init                      create the trading account
  pending | count           pending trades awaiting approval
  approve <id> | reject <id>
  history                   last 20 order attempts
  balance | airdrop [sol] | positions
  txs [limit] | tx <signature>
  cancel                    abort requests waiting on the wallet
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Connect,
  Disconnect,
  Status,
  Order(OrderIntent),
  Close(String),
  Initialize,
  Pending,
  Count,
  Approve(PendingTradeId),
  Reject(PendingTradeId),
  History,
  Balance,
  Airdrop(Decimal),
  Positions,
  Signatures(usize),
  Transaction(String),
  Cancel,
  Help,
  Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  #[error("empty command")]
  Empty,
  #[error("unknown command '{0}', try 'help'")]
  Unknown(String),
  #[error("usage: {0}")]
  Usage(&'static str),
  #[error("invalid {what}: '{value}'")]
  Invalid { what: &'static str, value: String },
}

fn parse_arg<T: FromStr>(value: &str, what: &'static str) -> Result<T, ParseError> {
  value.parse().map_err(|_| ParseError::Invalid {
    what,
    value: value.to_string(),
  })
}

fn parse_order(side: TradeSide, args: &[&str]) -> Result<Command, ParseError> {
  const USAGE: &str = "buy|sell <market> <size> [limit-price]";
  let (market, size, price) = match args {
    [market, size] => (market, size, None),
    [market, size, price] => (market, size, Some(price)),
    _ => return Err(ParseError::Usage(USAGE)),
  };
  let market = market.to_ascii_uppercase();
  let size: f64 = parse_arg(size, "size")?;
  let intent = match price {
    Some(price) => OrderIntent::limit(market, side, size, parse_arg(price, "price")?),
    None => OrderIntent::market(market, side, size),
  };
  Ok(Command::Order(intent))
}

impl FromStr for Command {
  type Err = ParseError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
      return Err(ParseError::Empty);
    };
    let args: Vec<&str> = words.collect();

    match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
      ("connect", []) => Ok(Self::Connect),
      ("disconnect", []) => Ok(Self::Disconnect),
      ("status", []) => Ok(Self::Status),
      ("buy", rest) => parse_order(TradeSide::Buy, rest),
      ("sell", rest) => parse_order(TradeSide::Sell, rest),
      ("close", [market]) => Ok(Self::Close(market.to_ascii_uppercase())),
      ("close", _) => Err(ParseError::Usage("close <market>")),
      ("init", []) => Ok(Self::Initialize),
      ("pending", []) => Ok(Self::Pending),
      ("count", []) => Ok(Self::Count),
      ("approve", [id]) => Ok(Self::Approve(parse_arg(id, "trade id")?)),
      ("approve", _) => Err(ParseError::Usage("approve <id>")),
      ("reject", [id]) => Ok(Self::Reject(parse_arg(id, "trade id")?)),
      ("reject", _) => Err(ParseError::Usage("reject <id>")),
      ("history", []) => Ok(Self::History),
      ("balance", []) => Ok(Self::Balance),
      ("airdrop", []) => Ok(Self::Airdrop(DEFAULT_AIRDROP_SOL)),
      ("airdrop", [sol]) => Ok(Self::Airdrop(parse_arg(sol, "amount")?)),
      ("positions", []) => Ok(Self::Positions),
      ("txs", []) => Ok(Self::Signatures(DEFAULT_TX_LIMIT)),
      ("txs", [limit]) => Ok(Self::Signatures(parse_arg(limit, "limit")?)),
      ("tx", [signature]) => Ok(Self::Transaction((*signature).to_string())),
      ("tx", _) => Err(ParseError::Usage("tx <signature>")),
      ("cancel", []) => Ok(Self::Cancel),
      ("help" | "?", _) => Ok(Self::Help),
      ("quit" | "exit", []) => Ok(Self::Quit),
      (other, _) => Err(ParseError::Unknown(other.to_string())),
    }
  }
}

pub struct Console<B: TradingBackend, C: ChainRpc, W: WalletProvider> {
  pipeline: Arc<TradingPipeline<B, C, W>>,
  pending: Arc<PendingTradeSync<B, C, W>>,
  portfolio: Arc<PortfolioService<B, C>>,
  /// Tokens of commands still running.
  in_flight: Mutex<Vec<CancellationToken>>,
}

impl<B: TradingBackend, C: ChainRpc, W: WalletProvider> Console<B, C, W> {
  pub fn new(
    pipeline: Arc<TradingPipeline<B, C, W>>,
    pending: Arc<PendingTradeSync<B, C, W>>,
    portfolio: Arc<PortfolioService<B, C>>,
  ) -> Self {
    Self {
      pipeline,
      pending,
      portfolio,
      in_flight: Mutex::new(Vec::new()),
    }
  }

  fn cancel_in_flight(&self) -> usize {
    let Ok(mut tokens) = self.in_flight.lock() else {
      return 0;
    };
    tokens.retain(|t| !t.is_cancelled());
    let count = tokens.len();
    for token in tokens.drain(..) {
      token.cancel();
    }
    count
  }

  fn track(&self, token: &CancellationToken) {
    if let Ok(mut tokens) = self.in_flight.lock() {
      tokens.retain(|t| !t.is_cancelled());
      tokens.push(token.clone());
    }
  }

  fn wallet(&self) -> Result<solana_sdk::pubkey::Pubkey, PipelineError> {
    self
      .pipeline
      .sessions()
      .connected_key()
      .ok_or(PipelineError::NotConnected)
  }

  async fn find_trade(&self, id: PendingTradeId) -> Result<PendingTrade, PipelineError> {
    if let Some(trade) = self.pending.find(id) {
      return Ok(trade);
    }
    self.pending.refresh().await?;
    self
      .pending
      .find(id)
      .ok_or_else(|| PipelineError::Backend(format!("no pending trade with id {id}")))
  }

  /// Run one command and render its output.
  pub async fn execute(&self, command: Command, cancel: &CancellationToken) -> Result<String, PipelineError> {
    let mut out = String::new();
    match command {
      Command::Connect => {
        let key = self
          .pipeline
          .sessions()
          .connect()
          .await
          .map_err(PipelineError::Wallet)?;
        let _ = write!(out, "connected {key}");
      }
      Command::Disconnect => {
        if let Err(e) = self.pipeline.sessions().disconnect().await {
          warn!(error = %e, "Wallet disconnect reported an error");
        }
        out.push_str("disconnected");
      }
      Command::Status => self.render_status(&mut out),
      Command::Order(intent) => {
        let record = self.pipeline.place_order(intent, cancel).await?;
        let _ = write!(
          out,
          "{} {} {}",
          record.intent,
          record.signature.unwrap_or_default(),
          record.explorer_url.unwrap_or_default()
        );
      }
      Command::Close(market) => {
        let record = self.pipeline.close_position(&market, cancel).await?;
        let _ = write!(
          out,
          "closed {market} with {} {}",
          record.intent,
          record.signature.unwrap_or_default()
        );
      }
      Command::Initialize => {
        let outcome = self.pipeline.initialize_account(cancel).await?;
        match outcome.signature {
          Some(signature) => {
            let _ = write!(out, "account initialized: {signature}");
          }
          None => out.push_str("account already initialized"),
        }
      }
      Command::Pending => {
        let trades = self.pending.refresh().await?;
        if trades.is_empty() {
          out.push_str("no pending trades");
        }
        for t in trades {
          let _ = writeln!(
            out,
            "#{} {} {} {} @ {} | {}",
            t.id, t.side, t.size, t.market, t.price_at_trigger, t.title
          );
        }
      }
      Command::Count => {
        let _ = write!(out, "{} pending", self.pending.pending_count().await?);
      }
      Command::Approve(id) => {
        let trade = self.find_trade(id).await?;
        match self.pending.approve(&trade, cancel).await? {
          ApprovalOutcome::Executed(record) => {
            let _ = write!(out, "approved #{id}: {}", record.signature.unwrap_or_default());
          }
          ApprovalOutcome::ExecutedUnreported { record, error } => {
            let _ = write!(
              out,
              "executed #{id} ({}) but the backend was not updated: {error}",
              record.signature.unwrap_or_default()
            );
          }
          ApprovalOutcome::Reconciled { signature } => {
            let _ = write!(out, "reported #{id}: {signature}");
          }
        }
      }
      Command::Reject(id) => {
        let trade = self.find_trade(id).await?;
        self.pending.reject(&trade).await?;
        let _ = write!(out, "rejected #{id}");
      }
      Command::History => {
        let records = self.pipeline.history().snapshot().await;
        if records.is_empty() {
          out.push_str("no orders yet");
        }
        for r in records {
          let detail = r.signature.or(r.error).unwrap_or_default();
          let _ = writeln!(
            out,
            "{} {:?} {} {}",
            r.timestamp.format("%H:%M:%S"),
            r.status,
            r.intent,
            detail
          );
        }
      }
      Command::Balance => {
        let balance = self.portfolio.refresh_balance(self.wallet()?).await?;
        let _ = write!(out, "{} SOL", balance.sol);
      }
      Command::Airdrop(sol) => {
        let signature = self.portfolio.request_airdrop(self.wallet()?, sol).await?;
        let _ = write!(out, "airdrop requested: {signature}");
      }
      Command::Positions => {
        let positions = self.portfolio.positions(self.wallet()?).await?;
        if positions.is_empty() {
          out.push_str("no open positions");
        }
        for p in positions {
          let _ = writeln!(
            out,
            "{} {:?} {} entry {} pnl {}",
            p.market, p.side, p.size, p.entry_price, p.unrealized_pnl
          );
        }
      }
      Command::Signatures(limit) => {
        let signatures = self.portfolio.recent_signatures(self.wallet()?, limit).await?;
        for s in signatures {
          let state = if s.err.is_some() { "failed" } else { "ok" };
          let _ = writeln!(out, "{} slot {} {state}", s.signature, s.slot);
        }
      }
      Command::Transaction(signature) => match self.portfolio.transaction(&signature).await? {
        Some(tx) => out.push_str(&serde_json::to_string_pretty(&tx).unwrap_or_default()),
        None => out.push_str("transaction not found"),
      },
      Command::Cancel => {
        let _ = write!(out, "cancelled {} request(s)", self.cancel_in_flight());
      }
      Command::Help => out.push_str(HELP),
      Command::Quit => {}
    }
    Ok(out.trim_end().to_string())
  }

  fn render_status(&self, out: &mut String) {
    let session = self.pipeline.sessions().session();
    let _ = writeln!(
      out,
      "wallet: {:?} {}",
      session.status,
      session.public_key.map(|k| k.to_string()).unwrap_or_default()
    );
    if let Some(readiness) = self.pipeline.readiness().readiness() {
      let _ = writeln!(
        out,
        "trading account: {} ({})",
        if readiness.has_trading_account { "ready" } else { "missing" },
        readiness.network
      );
    }
    let _ = writeln!(out, "network: {}", self.pipeline.submission().network());
    let _ = writeln!(out, "busy: {}", self.pipeline.is_busy());
    if let Some(error) = self.pipeline.sessions().current_error() {
      let _ = writeln!(out, "wallet error: {}", error.user_message);
    }
  }

  /// Read commands until `quit`, end of input or `shutdown` fires.
  pub async fn run<R>(self: Arc<Self>, input: R, shutdown: CancellationToken) -> anyhow::Result<()>
  where
    R: AsyncBufRead + Unpin,
  {
    let mut lines = input.lines();
    println!("{HELP}");
    loop {
      let line = tokio::select! {
        biased;
        () = shutdown.cancelled() => break,
        line = lines.next_line() => line?,
      };
      let Some(line) = line else {
        info!("Console input closed");
        break;
      };

      let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(ParseError::Empty) => continue,
        Err(e) => {
          println!("{e}");
          continue;
        }
      };
      if command == Command::Quit {
        shutdown.cancel();
        break;
      }

      let token = shutdown.child_token();
      self.track(&token);
      let console = Arc::clone(&self);
      tokio::spawn(async move {
        match console.execute(command, &token).await {
          Ok(text) if !text.is_empty() => println!("{text}"),
          Ok(_) => {}
          Err(e) => println!("error: {e}"),
        }
        token.cancel();
      });
    }
    self.cancel_in_flight();
    Ok(())
  }
}
