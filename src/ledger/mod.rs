//! Double-entry ledger
//!
//! Atomic money transfers between accounts over a relational store.
//!
//! # Architecture
//!
//! Two layers:
//! - **Query Executor** ([`Querier`], [`Store`], [`Transaction`]): single-row
//!   primitives bound to one transaction handle
//! - **Transfer Coordinator** ([`TransferCoordinator`]): transaction lifecycle,
//!   write sequencing and lock ordering
//!
//! # Transfer write sequence
//!
//! ```text
//! BEGIN
//!   INSERT transfers (from, to, amount)
//!   INSERT entries   (from, -amount)
//!   INSERT entries   (to,   +amount)
//!   UPDATE accounts  balance += delta   -- min(from, to) first
//!   UPDATE accounts  balance += delta   -- max(from, to) second
//! COMMIT | ROLLBACK
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Conservation**: the two entries of a transfer sum to zero
//! 2. **Replayable balances**: an account balance equals the sum of its entries
//! 3. **Deadlock freedom**: concurrent transfers lock account rows in ascending id order

pub mod cancel;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod models;
pub mod queries;
pub mod state;
pub mod store;
pub mod types;


// Re-exports for convenience
pub use cancel::CancelSignal;
pub use coordinator::TransferCoordinator;
pub use error::{LedgerError, StoreError, ValidationError};
pub use memory::{FailPoint, MemoryStore, MemoryTx};
pub use models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListEntriesParams, ListTransfersParams, Transfer,
};
pub use queries::{PgQuerier, Querier};
pub use state::TransferTxState;
pub use store::{PgStore, PgTx, Store, Transaction};
pub use types::{OpenAccountParams, OpenAccountResult, TransferTxParams, TransferTxResult};
