//! PostgreSQL schema introspection.
//!
//! Implements [`SchemaIntrospector`] over `information_schema`, so the
//! source-availability checks run unchanged against a relational server.

use crate::storage::traits::SchemaIntrospector;
use crate::{Error, Result};
use deadpool_postgres::{Config, Pool, Runtime};
use std::future::Future;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_postgres::NoTls;

/// Helper to map pool errors.
fn pool_error(e: impl std::fmt::Display) -> Error {
    Error::StorageUnavailable {
        operation: "postgres_get_client".to_string(),
        cause: e.to_string(),
    }
}

/// Helper to map query errors.
fn query_error(op: &str, e: impl std::fmt::Display) -> Error {
    Error::StorageUnavailable {
        operation: op.to_string(),
        cause: e.to_string(),
    }
}

fn run_on_own_runtime<F, T>(f: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "postgres_create_runtime".to_string(),
            cause: e.to_string(),
        })?;
    rt.block_on(f)
}

/// [`SchemaIntrospector`] backed by a PostgreSQL connection pool.
pub struct PostgresIntrospector {
    pool: Pool,
    schema: String,
}

impl PostgresIntrospector {
    /// Default maximum connections in pool.
    const DEFAULT_POOL_MAX_SIZE: usize = 4;

    /// Creates an introspector for tables in the `public` schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the pool cannot be built.
    pub fn new(connection_url: &str) -> Result<Self> {
        Self::with_schema(connection_url, "public")
    }

    /// Creates an introspector for tables in the given schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the pool cannot be built.
    pub fn with_schema(connection_url: &str, schema: impl Into<String>) -> Result<Self> {
        let config = connection_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| Error::InvalidInput(format!("invalid PostgreSQL URL: {e}")))?;
        let pool = Self::build_pool_config(&config)
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| query_error("postgres_create_pool", e))?;
        Ok(Self {
            pool,
            schema: schema.into(),
        })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    #[cfg(unix)]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        match h {
            tokio_postgres::config::Host::Tcp(s) => s.clone(),
            tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
        }
    }

    #[cfg(not(unix))]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        let tokio_postgres::config::Host::Tcp(s) = h;
        s.clone()
    }

    fn build_pool_config(config: &tokio_postgres::Config) -> Config {
        let mut cfg = Config::new();
        cfg.host = config.get_hosts().first().map(Self::host_to_string);
        cfg.port = config.get_ports().first().copied();
        cfg.user = config.get_user().map(String::from);
        cfg.password = config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = config.get_dbname().map(String::from);
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: Self::DEFAULT_POOL_MAX_SIZE,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(std::time::Duration::from_secs(5)),
                create: Some(std::time::Duration::from_secs(5)),
                recycle: Some(std::time::Duration::from_secs(5)),
            },
            ..Default::default()
        });
        cfg
    }

    /// Runs a blocking operation on the async pool.
    ///
    /// Inside a multi-threaded runtime the worker blocks in place. A
    /// current-thread runtime cannot block its only worker, so the future is
    /// driven to completion on a scoped thread with its own runtime.
    fn block_on<F, T>(&self, f: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(f))
            },
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(move || run_on_own_runtime(f))
                    .join()
                    .unwrap_or_else(|_| {
                        Err(Error::OperationFailed {
                            operation: "postgres_block_on".to_string(),
                            cause: "introspection thread panicked".to_string(),
                        })
                    })
            }),
            Err(_) => run_on_own_runtime(f),
        }
    }

    async fn table_exists_async(&self, name: &str) -> Result<bool> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                )",
                &[&self.schema, &name],
            )
            .await
            .map_err(|e| query_error("postgres_table_exists", e))?;
        Ok(row.get(0))
    }

    async fn columns_async(&self, name: &str) -> Result<Vec<String>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let rows = client
            .query(
                "SELECT column_name::text FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&self.schema, &name],
            )
            .await
            .map_err(|e| query_error("postgres_columns", e))?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}

impl SchemaIntrospector for PostgresIntrospector {
    fn table_exists(&self, name: &str) -> Result<bool> {
        self.block_on(self.table_exists_async(name))
    }

    fn columns(&self, name: &str) -> Result<Vec<String>> {
        self.block_on(self.columns_async(name))
    }
}
