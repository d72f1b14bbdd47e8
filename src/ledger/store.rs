//! Transaction primitives over a persistence backend

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use super::error::StoreError;
use super::queries::{PgQuerier, Querier};
use crate::db::Database;

/// An open transaction. Queries issued through it are part of the unit of
/// work until `commit` or `rollback` consumes it.
#[async_trait]
pub trait Transaction: Querier + Sized {
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// A backend that can begin transactions
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// Transaction handle of [`PgStore`]
pub type PgTx = PgQuerier<sqlx::Transaction<'static, Postgres>>;

#[async_trait]
impl Transaction for PgTx {
    async fn commit(self) -> Result<(), StoreError> {
        self.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.into_inner().rollback().await?;
        Ok(())
    }
}

/// PostgreSQL-backed ledger store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }

    /// Non-transactional querier on a pooled connection, for lookups
    pub async fn acquire(&self) -> Result<PgQuerier<PoolConnection<Postgres>>, StoreError> {
        let conn = self.pool.acquire().await?;
        Ok(PgQuerier::new(conn))
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    /// Begins at the server default isolation (read committed)
    async fn begin(&self) -> Result<PgTx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgQuerier::new(tx))
    }
}
