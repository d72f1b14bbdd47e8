//! In-process ledger backend
//!
//! Behaves like a row-locking relational store at read committed:
//! - `add_account_balance` takes an exclusive lock on the account row and
//!   holds it until commit or rollback (or drop)
//! - writes stay private to the transaction until commit
//! - ids come from sequences that are not rolled back
//!
//! Lock waits are bounded by `lock_timeout` and reported as
//! [`StoreError::LockTimeout`], which is how a lock-order cycle surfaces.
//! [`FailPoint`]s inject one-shot faults for atomicity tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use super::error::StoreError;
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListEntriesParams, ListTransfersParams, Transfer,
};
use super::queries::Querier;
use super::store::{Store, Transaction};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Operation that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    CreateAccount,
    CreateTransfer,
    CreateEntry,
    AddAccountBalance,
    Commit,
    Rollback,
}

impl FailPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailPoint::Begin => "begin",
            FailPoint::CreateAccount => "create_account",
            FailPoint::CreateTransfer => "create_transfer",
            FailPoint::CreateEntry => "create_entry",
            FailPoint::AddAccountBalance => "add_account_balance",
            FailPoint::Commit => "commit",
            FailPoint::Rollback => "rollback",
        }
    }
}

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
}

struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
    faults: Mutex<Vec<FailPoint>>,
    /// Per committed transaction: account ids in balance-update order
    update_orders: Mutex<Vec<Vec<i64>>>,
    begin_count: AtomicUsize,
    lock_timeout: Duration,
}

impl Shared {
    fn row_lock(&self, id: i64) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.row_locks).entry(id).or_default().clone()
    }

    fn check_fault(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut faults = lock(&self.faults);
        match faults.iter().position(|p| *p == point) {
            Some(idx) => {
                faults.remove(idx);
                Err(StoreError::Injected(point.as_str()))
            }
            None => Ok(()),
        }
    }

    fn committed_account(&self, id: i64) -> Option<Account> {
        lock(&self.tables).accounts.get(&id).cloned()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_id(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::SeqCst)
}

fn page<T>(rows: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.skip(offset).take(limit).collect()
}

/// In-memory [`Store`]; cheap to clone, clones share state
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                account_seq: AtomicI64::new(1),
                entry_seq: AtomicI64::new(1),
                transfer_seq: AtomicI64::new(1),
                faults: Mutex::new(Vec::new()),
                update_orders: Mutex::new(Vec::new()),
                begin_count: AtomicUsize::new(0),
                lock_timeout,
            }),
        }
    }

    /// Insert a committed account directly, outside any transaction
    pub fn seed_account(&self, arg: CreateAccountParams) -> Account {
        let account = Account {
            id: next_id(&self.shared.account_seq),
            owner: arg.owner,
            balance: arg.balance,
            currency: arg.currency,
            created_at: Utc::now(),
        };
        lock(&self.shared.tables)
            .accounts
            .insert(account.id, account.clone());
        account
    }

    /// Make the next call at `point` fail with [`StoreError::Injected`]
    pub fn fail_next(&self, point: FailPoint) {
        lock(&self.shared.faults).push(point);
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        self.shared.committed_account(id)
    }

    pub fn entries(&self) -> Vec<Entry> {
        lock(&self.shared.tables).entries.values().cloned().collect()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        lock(&self.shared.tables).transfers.values().cloned().collect()
    }

    /// Balance-update order of every committed transaction, in commit order
    pub fn committed_update_orders(&self) -> Vec<Vec<i64>> {
        lock(&self.shared.update_orders).clone()
    }

    pub fn begin_count(&self) -> usize {
        self.shared.begin_count.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        self.shared.check_fault(FailPoint::Begin)?;
        self.shared.begin_count.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx {
            shared: self.shared.clone(),
            row_guards: HashMap::new(),
            accounts: BTreeMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
            update_order: Vec::new(),
        })
    }
}

/// Open transaction on a [`MemoryStore`]. Dropping it rolls back.
pub struct MemoryTx {
    shared: Arc<Shared>,
    row_guards: HashMap<i64, OwnedMutexGuard<()>>,
    /// Rows created or updated by this transaction
    accounts: BTreeMap<i64, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
    update_order: Vec<i64>,
}

impl MemoryTx {
    fn visible_account(&self, id: i64) -> Option<Account> {
        self.accounts
            .get(&id)
            .cloned()
            .or_else(|| self.shared.committed_account(id))
    }

    fn require_account(&self, id: i64) -> Result<(), StoreError> {
        match self.visible_account(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::Constraint(format!(
                "account {} is not present in table \"accounts\"",
                id
            ))),
        }
    }

    async fn lock_row(&mut self, id: i64) -> Result<(), StoreError> {
        if self.row_guards.contains_key(&id) {
            return Ok(());
        }
        let row = self.shared.row_lock(id);
        let guard = tokio::time::timeout(self.shared.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(id))?;
        self.row_guards.insert(id, guard);
        Ok(())
    }
}

#[async_trait]
impl Querier for MemoryTx {
    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, StoreError> {
        self.shared.check_fault(FailPoint::CreateAccount)?;
        let account = Account {
            id: next_id(&self.shared.account_seq),
            owner: arg.owner,
            balance: arg.balance,
            currency: arg.currency,
            created_at: Utc::now(),
        };
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError> {
        self.visible_account(id).ok_or(StoreError::NotFound {
            entity: "account",
            id,
        })
    }

    async fn add_account_balance(
        &mut self,
        arg: AddAccountBalanceParams,
    ) -> Result<Account, StoreError> {
        self.shared.check_fault(FailPoint::AddAccountBalance)?;
        let not_found = || StoreError::NotFound {
            entity: "account",
            id: arg.id,
        };
        if self.visible_account(arg.id).is_none() {
            return Err(not_found());
        }

        self.lock_row(arg.id).await?;

        // Re-read under the lock: the latest committed row
        let mut account = self.visible_account(arg.id).ok_or_else(not_found)?;
        account.balance = account
            .balance
            .checked_add(arg.amount)
            .ok_or_else(|| StoreError::Constraint(format!("balance overflow on account {}", arg.id)))?;

        self.accounts.insert(arg.id, account.clone());
        self.update_order.push(arg.id);
        Ok(account)
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, StoreError> {
        self.shared.check_fault(FailPoint::CreateEntry)?;
        self.require_account(arg.account_id)?;
        let entry = Entry {
            id: next_id(&self.shared.entry_seq),
            account_id: arg.account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, StoreError> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .or_else(|| lock(&self.shared.tables).entries.get(&id).cloned())
            .ok_or(StoreError::NotFound { entity: "entry", id })
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, StoreError> {
        let mut rows: Vec<Entry> = lock(&self.shared.tables)
            .entries
            .values()
            .filter(|e| e.account_id == arg.account_id)
            .cloned()
            .collect();
        rows.extend(
            self.entries
                .iter()
                .filter(|e| e.account_id == arg.account_id)
                .cloned(),
        );
        rows.sort_by_key(|e| e.id);
        Ok(page(rows.into_iter(), arg.limit, arg.offset))
    }

    async fn create_transfer(
        &mut self,
        arg: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        self.shared.check_fault(FailPoint::CreateTransfer)?;
        self.require_account(arg.from_account_id)?;
        self.require_account(arg.to_account_id)?;
        let transfer = Transfer {
            id: next_id(&self.shared.transfer_seq),
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, StoreError> {
        self.transfers
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .or_else(|| lock(&self.shared.tables).transfers.get(&id).cloned())
            .ok_or(StoreError::NotFound {
                entity: "transfer",
                id,
            })
    }

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError> {
        let matches = |t: &&Transfer| {
            t.from_account_id == arg.from_account_id || t.to_account_id == arg.to_account_id
        };
        let mut rows: Vec<Transfer> = lock(&self.shared.tables)
            .transfers
            .values()
            .filter(matches)
            .cloned()
            .collect();
        rows.extend(self.transfers.iter().filter(matches).cloned());
        rows.sort_by_key(|t| t.id);
        Ok(page(rows.into_iter(), arg.limit, arg.offset))
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn commit(self) -> Result<(), StoreError> {
        // On failure `self` drops here, releasing locks and discarding writes.
        self.shared.check_fault(FailPoint::Commit)?;

        let MemoryTx {
            shared,
            row_guards,
            accounts,
            entries,
            transfers,
            update_order,
        } = self;

        {
            let mut tables = lock(&shared.tables);
            tables.accounts.extend(accounts);
            tables.entries.extend(entries.into_iter().map(|e| (e.id, e)));
            tables
                .transfers
                .extend(transfers.into_iter().map(|t| (t.id, t)));
        }
        if !update_order.is_empty() {
            lock(&shared.update_orders).push(update_order);
        }

        // Row locks are released only after the writes are visible.
        drop(row_guards);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        let result = self.shared.check_fault(FailPoint::Rollback);
        drop(self);
        result
    }
}
