//! Transfer Ledger CLI
//!
//! Runs a single transfer against the configured backend and prints the
//! committed result as JSON.
//!
//! ```text
//! transfer_ledger --env dev --from 2 --to 1 --amount 30
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, warn};

use transfer_ledger::config::{AppConfig, Backend};
use transfer_ledger::db::Database;
use transfer_ledger::ledger::{
    CancelSignal, LedgerError, MemoryStore, PgStore, Store, TransferCoordinator,
    TransferTxParams, TransferTxResult,
};
use transfer_ledger::logging::init_logging;

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_i64_arg(name: &str) -> anyhow::Result<i64> {
    let raw = get_arg(&[name]).with_context(|| format!("missing required argument {}", name))?;
    raw.parse::<i64>()
        .with_context(|| format!("{} must be an integer, got {:?}", name, raw))
}

async fn run_transfer<S: Store>(
    store: S,
    params: TransferTxParams,
    cancel: &CancelSignal,
) -> Result<TransferTxResult, LedgerError> {
    TransferCoordinator::new(store)
        .transfer_tx(params, cancel)
        .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);

    let params = TransferTxParams::new(
        get_i64_arg("--from")?,
        get_i64_arg("--to")?,
        get_i64_arg("--amount")?,
    );

    let cancel = Arc::new(CancelSignal::new());
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, cancelling transfer");
                cancel.cancel();
            }
        });
    }

    let result = match config.backend {
        Backend::Postgres => {
            let url = config
                .postgres_url
                .as_deref()
                .context("postgres_url is required for the postgres backend")?;
            let db = Database::connect(url, &config.database).await?;
            db.health_check().await?;
            run_transfer(PgStore::from_database(&db), params, &cancel).await
        }
        Backend::Memory => {
            let store = MemoryStore::with_lock_timeout(config.memory.lock_timeout());
            for account in &config.memory.seed_accounts {
                store.seed_account(account.clone());
            }
            run_transfer(store, params, &cancel).await
        }
    };

    match result {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            error!(code = e.code(), error = %e, "Transfer failed");
            Err(e.into())
        }
    }
}
