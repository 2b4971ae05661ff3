#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! txwatch: detect an incoming transfer and follow it to a confirmation threshold.
//!
//! ## What you implement
//! - [`ChainClient`]: fetch transactions, block height, block transaction hashes,
//!   and (optionally) a stream of pending transaction hashes. [`JsonRpcClient`]
//!   covers standard Ethereum nodes.
//! - [`WatchHooks`]: receive `Detected` / `NewConfirmation` / `Confirmed` events.
//! - [`CursorStore`] (optional): remember the last block scanned per watch.
//!
//! ## What the engine does
//! - Resolves the network's [`ChainProfile`] and picks pull (block polling) or
//!   push (pending-transaction subscription) detection from it.
//! - Runs every candidate through the matcher (recipient + exact amount, native
//!   or ERC-20).
//! - Tracks each match every block time until it has enough confirmations.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use txwatch::prelude::*;
//! use async_trait::async_trait;
//!
//! struct PrintHooks;
//! #[async_trait]
//! impl WatchHooks for PrintHooks {
//!     async fn on_event(&self, ev: WatchEvent) -> anyhow::Result<()> {
//!         println!("{:?} {:?} depth={}", ev.kind, ev.tx_hash, ev.num_confirmations);
//!         Ok(())
//!     }
//! }
//!
//! async fn run() -> anyhow::Result<()> {
//!     let registry = ChainRegistry::builtin();
//!     let client = JsonRpcClient::from_profile(registry.resolve("xdai")?);
//!     let watcher = TxWatcher::new(registry, client);
//!
//!     let request = WatchRequest::from_decimal("0xabc0000000000000000000000000000000000001", "0.5")?
//!         .with_confirmations(2);
//!     let handle = watcher.start("xdai", request, PrintHooks)?;
//!     println!("finished: {:?}", handle.join().await?);
//!     Ok(())
//! }
//! ```

/// Node connection abstraction and observed transaction type.
pub mod client;

/// Watch entry point, settings and session handle.
pub mod engine;

/// Error types.
pub mod error;

/// Callback sink for watch events.
pub mod hooks;

/// Recipient/amount predicates and the watch request.
pub mod matcher;

/// Per-network configuration.
pub mod profile;

/// Session life-cycle state and outcome.
pub mod session;

/// Poll-cursor persistence (trait, memory and SQLite implementations).
pub mod store;

/// Injectable timer.
pub mod timer;

/// Confirmation depth rules.
pub mod tracker;

/// Decimal amount conversion.
pub mod units;

/// Ethereum JSON-RPC client.
#[cfg(feature = "json-rpc")]
pub mod rpc;

// Internal:
mod detect;

// Public re-exports
pub use client::{ChainClient, ObservedTransaction, PendingTxStream, TxHash};
pub use engine::{TxWatcher, WatchHandle, WatchSettings};
pub use error::{ClientError, WatchError};
pub use hooks::{ChannelHooks, EventKind, WatchEvent, WatchHooks};
pub use matcher::WatchRequest;
pub use profile::{ChainProfile, ChainRegistry};
pub use session::{ConfirmationState, SessionOutcome};
pub use store::{CursorStore, MemoryStore};
pub use timer::{Timer, TokioTimer};

#[cfg(feature = "json-rpc")]
pub use rpc::JsonRpcClient;
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;

pub use primitive_types::{H256, U256};

/// Convenience prelude for end users.
pub mod prelude {
    pub use crate::{
        ChainClient, ChainRegistry, ChannelHooks, EventKind, SessionOutcome, TxWatcher,
        WatchEvent, WatchHooks, WatchRequest, U256,
    };

    #[cfg(feature = "json-rpc")]
    pub use crate::JsonRpcClient;
}
