//! PostgreSQL and MySQL driver built on sqlx pools.
//!
//! Each cached "connection" is a database-specific sqlx pool (PgPool, MySqlPool)
//! created lazily: [`SqlxDriver::open`] never touches the network, the first
//! [`Connection::ping`] does. Authentication errors reported while connecting
//! carry SQLSTATE class `28` and are surfaced as `AuthenticationFailed`.

use crate::config::TlsSettings;
use crate::db::driver::{Connection, Driver};
use crate::db::options::ConnectionOptions;
use crate::error::DbaasResult;
use crate::models::DatabaseType;
use async_trait::async_trait;
use sqlx::Connection as _;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{MySqlPool, PgPool};
use tracing::{debug, warn};

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
}

impl DbPool {
    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
        }
    }

    /// Whether the pool has been closed.
    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
        }
    }

    /// Get the server version from the connected database.
    pub async fn server_version(&self) -> Option<String> {
        let result = match self {
            DbPool::MySql(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
        };
        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }
}

#[async_trait]
impl Connection for DbPool {
    async fn ping(&self) -> DbaasResult<()> {
        match self {
            DbPool::MySql(pool) => {
                let mut conn = pool.acquire().await?;
                conn.ping().await?;
            }
            DbPool::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                conn.ping().await?;
            }
        }
        Ok(())
    }

    async fn close(&self) -> DbaasResult<()> {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
        }
        Ok(())
    }
}

/// [`Driver`] producing lazily-connected sqlx pools.
#[derive(Debug, Clone, Copy)]
pub struct SqlxDriver {
    db_type: DatabaseType,
}

impl SqlxDriver {
    pub fn new(db_type: DatabaseType) -> Self {
        Self { db_type }
    }

    pub fn postgres() -> Self {
        Self::new(DatabaseType::PostgreSQL)
    }

    pub fn mysql() -> Self {
        Self::new(DatabaseType::MySQL)
    }

    fn pg_connect_options(options: &ConnectionOptions) -> DbaasResult<PgConnectOptions> {
        let (host, port) = options.endpoint()?;
        let mut connect = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&options.auth.username)
            .password(&options.auth.password);
        if !options.auth.database.is_empty() {
            connect = connect.database(&options.auth.database);
        }
        if let Some(name) = &options.application_name {
            connect = connect.application_name(name);
        }
        if let Some(TlsSettings { ca_cert_path }) = &options.tls {
            connect = connect.ssl_mode(PgSslMode::VerifyFull);
            if let Some(path) = ca_cert_path {
                connect = connect.ssl_root_cert(path);
            }
        }
        Ok(connect)
    }

    fn mysql_connect_options(options: &ConnectionOptions) -> DbaasResult<MySqlConnectOptions> {
        let (host, port) = options.endpoint()?;
        let mut connect = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&options.auth.username)
            .password(&options.auth.password)
            .charset("utf8mb4");
        if !options.auth.database.is_empty() {
            connect = connect.database(&options.auth.database);
        }
        if let Some(TlsSettings { ca_cert_path }) = &options.tls {
            connect = connect.ssl_mode(MySqlSslMode::VerifyIdentity);
            if let Some(path) = ca_cert_path {
                connect = connect.ssl_ca(path);
            }
        }
        Ok(connect)
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    type Conn = DbPool;

    fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    async fn open(&self, options: &ConnectionOptions) -> DbaasResult<DbPool> {
        let pool_opts = &options.pool;
        let acquire_timeout = options
            .connect_timeout
            .unwrap_or_else(|| pool_opts.acquire_timeout_or_default());

        debug!(
            db_type = %self.db_type,
            addr = ?options.addr,
            database = %options.auth.database,
            tls = options.tls.is_some(),
            "Opening connection pool"
        );

        match self.db_type {
            DatabaseType::MySQL => {
                let connect = Self::mysql_connect_options(options)?;
                let pool = MySqlPoolOptions::new()
                    .min_connections(pool_opts.min_connections_or_default())
                    .max_connections(pool_opts.max_connections_or_default())
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(Some(pool_opts.idle_timeout_or_default()))
                    .max_lifetime(Some(pool_opts.max_lifetime_or_default()))
                    .test_before_acquire(pool_opts.test_before_acquire_or_default())
                    .connect_lazy_with(connect);
                Ok(DbPool::MySql(pool))
            }
            DatabaseType::PostgreSQL => {
                let connect = Self::pg_connect_options(options)?;
                let pool = PgPoolOptions::new()
                    .min_connections(pool_opts.min_connections_or_default())
                    .max_connections(pool_opts.max_connections_or_default())
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(Some(pool_opts.idle_timeout_or_default()))
                    .max_lifetime(Some(pool_opts.max_lifetime_or_default()))
                    .test_before_acquire(pool_opts.test_before_acquire_or_default())
                    .connect_lazy_with(connect);
                Ok(DbPool::Postgres(pool))
            }
        }
    }
}
