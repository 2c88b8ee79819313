//! Connection Pool + Transaction Manager (C6). Generalizes the teacher's
//! per-backend `MYSQL_POOLS` / `POSTGRES_POOLS` / `SQLITE_POOLS` statics into
//! a single map over `sqlx::Any`, keyed by data-source coordinates instead of
//! by backend name. Transaction scoping is task-local rather than
//! thread-local, since the whole core is async.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::Lazy;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyQueryResult, AnyRow};
use sqlx::{Any, Executor, Pool, Transaction};
use tokio::sync::{Mutex, RwLock};

use crate::config::{BackendKind, DataSourceConfig};
use crate::error::{Error, Result};

pub type AnyPool = Pool<Any>;

/// The connection backing the innermost active `transaction { … }` on this
/// task. `Option` inside the mutex lets the owning scope reclaim the
/// `Transaction` by value at commit/rollback time without needing sole
/// ownership of the `Arc`.
pub type TxHandle = Arc<Mutex<Option<Transaction<'static, Any>>>>;

tokio::task_local! {
    static CURRENT_TX: RefCell<Option<TxHandle>>;
}

static INSTALL_DRIVERS: Lazy<()> = Lazy::new(sqlx::any::install_default_drivers);

type PoolMap = RwLock<HashMap<String, AnyPool>>;

static POOLS: Lazy<PoolMap> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Builds a stable pool key from connection coordinates, deliberately
/// excluding the password — mirrors the teacher's `build_connection_key`.
fn descriptor_key(config: &DataSourceConfig) -> String {
    match config {
        DataSourceConfig::SqliteFile(path) => format!("sqlite:{path}"),
        DataSourceConfig::Structured(c) if !c.enable => "sqlite:disabled-fallback".to_string(),
        DataSourceConfig::Structured(c) => format!(
            "{:?}:{}:{}:{}",
            c.kind,
            c.host.as_deref().unwrap_or("localhost"),
            c.port.unwrap_or(0),
            c.database
        ),
    }
}

/// Returns the pool for `config`, creating and caching it on first use.
pub async fn get_pool(config: &DataSourceConfig, fallback_sqlite_path: &str) -> Result<AnyPool> {
    Lazy::force(&INSTALL_DRIVERS);
    let key = descriptor_key(config);

    {
        let pools = POOLS.read().await;
        if let Some(pool) = pools.get(&key) {
            log::debug!("reusing connection pool for {key}");
            return Ok(pool.clone());
        }
    }

    log::info!("creating new connection pool for {key}");
    let url = config.connection_url(fallback_sqlite_path);
    let max_connections = if config.kind() == BackendKind::Sqlite { 5 } else { 10 };
    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .map_err(|e| {
            log::error!("failed to create connection pool for {key}: {e}");
            Error::Pool(e.to_string())
        })?;

    let mut pools = POOLS.write().await;
    pools.entry(key).or_insert(pool.clone());
    Ok(pool)
}

pub async fn close_pool(config: &DataSourceConfig) {
    let key = descriptor_key(config);
    let mut pools = POOLS.write().await;
    if let Some(pool) = pools.remove(&key) {
        log::info!("closing connection pool for {key}");
        pool.close().await;
    }
}

pub async fn close_all_pools() {
    let mut pools = POOLS.write().await;
    for (key, pool) in pools.drain() {
        log::info!("closing connection pool for {key}");
        pool.close().await;
    }
}

/// The task-scoped current-transaction handle, if one is active. Consulted
/// by non-transactional `DataMapper` calls so they transparently join an
/// enclosing `transaction { … }`, and by cursor operations, which require it.
pub fn try_current_transaction() -> Option<TxHandle> {
    CURRENT_TX.try_with(|cell| cell.borrow().clone()).unwrap_or(None)
}

pub fn require_current_transaction() -> Result<TxHandle> {
    try_current_transaction().ok_or(Error::CursorWithoutTransaction)
}

/// A statement-execution target that transparently joins the calling task's
/// current transaction when one is active, so every mutation a `DataMapper`
/// call performs — including cascade writes into link targets and collection
/// child tables — shares the same connection and rolls back together
/// (§5 "Shared-resource policy", Testable Property 7).
#[derive(Clone)]
pub enum Exec<'a> {
    Pool(&'a AnyPool),
    Tx(TxHandle),
}

impl<'a> Exec<'a> {
    /// Resolves to the task's current transaction if one is active,
    /// otherwise to `pool` directly.
    pub fn current(pool: &'a AnyPool) -> Exec<'a> {
        match try_current_transaction() {
            Some(handle) => Exec::Tx(handle),
            None => Exec::Pool(pool),
        }
    }

    pub async fn execute(&self, sql: &str, args: AnyArguments<'static>) -> Result<AnyQueryResult> {
        match self {
            Exec::Pool(pool) => sqlx::query_with(sql, args).execute(*pool).await.map_err(Error::Database),
            Exec::Tx(handle) => {
                let mut guard = handle.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| Error::Pool("transaction handle consumed".into()))?;
                sqlx::query_with(sql, args).execute(&mut *conn).await.map_err(Error::Database)
            }
        }
    }

    pub async fn fetch_all(&self, sql: &str, args: AnyArguments<'static>) -> Result<Vec<AnyRow>> {
        match self {
            Exec::Pool(pool) => sqlx::query_with(sql, args).fetch_all(*pool).await.map_err(Error::Database),
            Exec::Tx(handle) => {
                let mut guard = handle.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| Error::Pool("transaction handle consumed".into()))?;
                sqlx::query_with(sql, args).fetch_all(&mut *conn).await.map_err(Error::Database)
            }
        }
    }

    pub async fn fetch_optional(&self, sql: &str, args: AnyArguments<'static>) -> Result<Option<AnyRow>> {
        match self {
            Exec::Pool(pool) => sqlx::query_with(sql, args).fetch_optional(*pool).await.map_err(Error::Database),
            Exec::Tx(handle) => {
                let mut guard = handle.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| Error::Pool("transaction handle consumed".into()))?;
                sqlx::query_with(sql, args).fetch_optional(&mut *conn).await.map_err(Error::Database)
            }
        }
    }

    /// Runs a plain (unparameterized) statement — used by schema/DDL and
    /// migration bookkeeping, which never bind user values.
    pub async fn execute_plain(&self, sql: &str) -> Result<AnyQueryResult> {
        match self {
            Exec::Pool(pool) => pool.execute(sql).await.map_err(Error::Database),
            Exec::Tx(handle) => {
                let mut guard = handle.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| Error::Pool("transaction handle consumed".into()))?;
                conn.execute(sql).await.map_err(Error::Database)
            }
        }
    }
}

/// Runs `f` against a transaction on `pool`. If the calling task already has
/// an active transaction, it is reused and this call neither commits nor
/// rolls back — the enclosing scope remains sole commit/rollback authority.
/// Otherwise a new transaction is begun, published as the current-transaction
/// handle for the duration of `f`, and committed on `Ok`/rolled back on `Err`.
pub async fn transaction<F, Fut, R>(pool: &AnyPool, f: F) -> Result<R>
where
    F: FnOnce(TxHandle) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    if let Some(existing) = try_current_transaction() {
        log::debug!("joining existing task-scoped transaction");
        return f(existing).await;
    }

    log::debug!("beginning new task-scoped transaction");
    let tx = pool.begin().await.map_err(Error::Database)?;
    let handle: TxHandle = Arc::new(Mutex::new(Some(tx)));

    CURRENT_TX
        .scope(RefCell::new(Some(handle.clone())), async move {
            let result = f(handle.clone()).await;
            let tx = handle
                .lock()
                .await
                .take()
                .ok_or_else(|| Error::Pool("transaction handle consumed twice".into()))?;
            match result {
                Ok(value) => {
                    tx.commit().await.map_err(Error::Database)?;
                    Ok(value)
                }
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        log::warn!("rollback after transaction error also failed: {rollback_err}");
                    }
                    Err(e)
                }
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_memory_pool_round_trips() {
        let config = DataSourceConfig::sqlite_file("file::memory:?cache=shared");
        let pool = get_pool(&config, "").await.expect("pool creation");
        let row: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("trivial query");
        assert_eq!(row.0, 1);
        close_pool(&config).await;
    }

    #[tokio::test]
    async fn no_transaction_by_default() {
        assert!(try_current_transaction().is_none());
    }
}
