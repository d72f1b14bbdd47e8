//! Transfer unit-of-work states
//!
//! ```text
//! STARTED → WRITING_TRANSFER → WRITING_ENTRIES → UPDATING_BALANCES → COMMITTED
//!    ↓             ↓                  ↓                  ↓
//!    └─────────────┴──────────────────┴──────────────────┴──→ ROLLED_BACK
//! ```
//!
//! States are per call and never persisted. There are no retries: a call
//! moves forward or ends in ROLLED_BACK.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferTxState {
    /// Transaction open, nothing written yet
    Started,
    WritingTransfer,
    WritingEntries,
    /// Ascending-id balance updates in progress; row locks being taken
    UpdatingBalances,
    /// Terminal: all writes committed
    Committed,
    /// Terminal: unit of work discarded
    RolledBack,
}

impl TransferTxState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferTxState::Committed | TransferTxState::RolledBack
        )
    }

    /// Legal forward step, or `None` from a terminal state
    pub fn next(&self) -> Option<Self> {
        match self {
            TransferTxState::Started => Some(TransferTxState::WritingTransfer),
            TransferTxState::WritingTransfer => Some(TransferTxState::WritingEntries),
            TransferTxState::WritingEntries => Some(TransferTxState::UpdatingBalances),
            TransferTxState::UpdatingBalances => Some(TransferTxState::Committed),
            TransferTxState::Committed | TransferTxState::RolledBack => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferTxState::Started => "STARTED",
            TransferTxState::WritingTransfer => "WRITING_TRANSFER",
            TransferTxState::WritingEntries => "WRITING_ENTRIES",
            TransferTxState::UpdatingBalances => "UPDATING_BALANCES",
            TransferTxState::Committed => "COMMITTED",
            TransferTxState::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for TransferTxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
