//! Transfer Ledger - atomic double-entry transfers
//!
//! Moves money between accounts over a relational store: one transfer
//! record, two offsetting entries and both balance updates commit together
//! or not at all, and concurrent transfers over overlapping accounts cannot
//! deadlock.
//!
//! # Modules
//!
//! - [`ledger`] - Query executor, stores and the transfer coordinator
//! - [`db`] - PostgreSQL connection pool
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;

// Convenient re-exports at crate root
pub use ledger::{
    CancelSignal, LedgerError, MemoryStore, PgStore, Store, TransferCoordinator,
    TransferTxParams, TransferTxResult,
};
