//! Transfer Coordinator
//!
//! Owns the transaction lifecycle of ledger units of work and the lock
//! ordering that keeps concurrent transfers deadlock-free.
//!
//! # Safety Invariants
//!
//! 1. **One transaction per call**: every write of a unit of work goes through
//!    the querier of the transaction opened for it, passed explicitly.
//! 2. **Ascending lock order**: balance rows are updated smaller id first,
//!    independent of transfer direction.
//! 3. **All or nothing**: any failure rolls back; a rollback failure is
//!    reported together with the failure that caused it.
//! 4. **No commit after cancel**: once cancellation is observed the
//!    transaction is rolled back.

use futures::future::BoxFuture;
use tracing::{debug, info};

use super::cancel::CancelSignal;
use super::error::{LedgerError, StoreError};
use super::models::{AddAccountBalanceParams, CreateEntryParams, CreateTransferParams};
use super::queries::Querier;
use super::state::TransferTxState;
use super::store::{Store, Transaction};
use super::types::{OpenAccountParams, OpenAccountResult, TransferTxParams, TransferTxResult};

/// Runs ledger units of work against a [`Store`].
///
/// Holds no locks of its own; share it behind an `Arc` across tasks.
pub struct TransferCoordinator<S> {
    store: S,
}

impl<S: Store> TransferCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` succeeds, rolls back otherwise. If `cancel` fires
    /// while the transaction is open, the in-flight step is abandoned, the
    /// transaction rolled back and [`LedgerError::Cancelled`] returned.
    pub async fn exec_tx<T, F>(&self, cancel: &CancelSignal, f: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut S::Tx) -> BoxFuture<'q, Result<T, LedgerError>> + Send,
    {
        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let mut tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
            begun = self.store.begin() => begun.map_err(LedgerError::Transaction)?,
        };
        debug!(state = %TransferTxState::Started, "Transaction begun");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LedgerError::Cancelled),
            res = f(&mut tx) => res,
        };

        let outcome = match outcome {
            Ok(_) if cancel.is_cancelled() => Err(LedgerError::Cancelled),
            other => other,
        };

        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(LedgerError::Transaction)?;
                debug!(state = %TransferTxState::Committed, "Transaction committed");
                Ok(value)
            }
            Err(cause) => {
                let rolled_back = tx.rollback().await;
                debug!(
                    state = %TransferTxState::RolledBack,
                    code = cause.code(),
                    rollback_ok = rolled_back.is_ok(),
                    "Transaction rolled back"
                );
                Err(compose_rollback(cause, rolled_back))
            }
        }
    }

    /// Transfer `arg.amount` between two accounts as one unit of work:
    /// the transfer record, a debit and a credit entry, and both balances.
    pub async fn transfer_tx(
        &self,
        arg: TransferTxParams,
        cancel: &CancelSignal,
    ) -> Result<TransferTxResult, LedgerError> {
        arg.validate()?;

        let result = self
            .exec_tx(cancel, move |q| Box::pin(transfer_steps(q, arg)))
            .await?;

        info!(
            transfer_id = result.transfer.id,
            from_account_id = arg.from_account_id,
            to_account_id = arg.to_account_id,
            amount = arg.amount,
            "Transfer committed"
        );
        Ok(result)
    }

    /// Create an account and book a non-zero opening balance as its first
    /// entry, so the balance always equals the sum of the account's entries.
    pub async fn open_account(
        &self,
        arg: OpenAccountParams,
        cancel: &CancelSignal,
    ) -> Result<OpenAccountResult, LedgerError> {
        arg.validate()?;

        let result = self
            .exec_tx(cancel, move |q| Box::pin(open_account_steps(q, arg)))
            .await?;

        info!(
            account_id = result.account.id,
            balance = result.account.balance,
            "Account opened"
        );
        Ok(result)
    }
}

fn compose_rollback(cause: LedgerError, rolled_back: Result<(), StoreError>) -> LedgerError {
    match rolled_back {
        Ok(()) => cause,
        Err(rollback) => LedgerError::Rollback {
            cause: Box::new(cause),
            rollback,
        },
    }
}

fn advance(state: &mut TransferTxState, to: TransferTxState) {
    debug_assert_eq!(state.next(), Some(to), "illegal transition from {}", state);
    debug!(from = %state, to = %to, "Transfer state");
    *state = to;
}

async fn transfer_steps<Q: Querier>(
    q: &mut Q,
    arg: TransferTxParams,
) -> Result<TransferTxResult, LedgerError> {
    let mut state = TransferTxState::Started;

    advance(&mut state, TransferTxState::WritingTransfer);
    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    advance(&mut state, TransferTxState::WritingEntries);
    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.from_account_id,
            amount: -arg.amount,
        })
        .await?;
    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    advance(&mut state, TransferTxState::UpdatingBalances);
    let [first, second] = arg.balance_updates();
    let first_account = q.add_account_balance(first).await?;
    let second_account = q.add_account_balance(second).await?;

    let (from_account, to_account) = if first.id == arg.from_account_id {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

async fn open_account_steps<Q: Querier>(
    q: &mut Q,
    arg: OpenAccountParams,
) -> Result<OpenAccountResult, LedgerError> {
    let account = q.create_account(arg.create_params()).await?;
    if arg.opening_balance == 0 {
        return Ok(OpenAccountResult {
            account,
            opening_entry: None,
        });
    }

    let entry = q
        .create_entry(CreateEntryParams {
            account_id: account.id,
            amount: arg.opening_balance,
        })
        .await?;
    let account = q
        .add_account_balance(AddAccountBalanceParams {
            id: account.id,
            amount: arg.opening_balance,
        })
        .await?;

    Ok(OpenAccountResult {
        account,
        opening_entry: Some(entry),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_rollback_ok_keeps_cause() {
        let err = compose_rollback(LedgerError::Cancelled, Ok(()));
        assert!(matches!(err, LedgerError::Cancelled));
    }

    #[test]
    fn test_compose_rollback_failure_wraps_both() {
        let err = compose_rollback(
            LedgerError::Cancelled,
            Err(StoreError::Injected("rollback")),
        );
        match err {
            LedgerError::Rollback { cause, rollback } => {
                assert!(matches!(*cause, LedgerError::Cancelled));
                assert!(matches!(rollback, StoreError::Injected("rollback")));
            }
            other => panic!("expected Rollback, got {other:?}"),
        }
    }
}
