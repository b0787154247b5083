//! Connection health protocol.
//!
//! [`DatabaseClient::get_connection`] hands back a cached connection after
//! checking it, in this order:
//!
//! 1. **Fetch or create** through the shared [`ConnectionCache`]; a miss
//!    provisions the database (`GetOrCreateDb`) and opens a connection.
//! 2. **Liveness**: ping. A failure evicts the connection and runs step 1
//!    once more; the fresh connection is not pinged again here.
//! 3. **Credential validity**: ping again. An authentication failure means the
//!    broker rotated the password; fresh credentials are looked up
//!    (`GetConnection`), the old connection is closed and a new one is opened
//!    and cached. The refreshed connection is returned without another ping.
//!    Any other failure is returned as is.
//!
//! Each failure class gets at most one recovery attempt per call.

use crate::broker::BrokerClient;
use crate::config::TlsSettings;
use crate::db::cache::{CacheKey, ConnectionCache};
use crate::db::database::Database;
use crate::db::driver::{Connection, Driver};
use crate::db::options::ConnectionOptions;
use crate::error::DbaasResult;
use crate::models::{BaseDbParams, ClassifierFn, LogicalDatabase, RequestContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Cache shared by every client created from one registry.
pub type SharedCache<D> = Arc<ConnectionCache<Arc<<D as Driver>::Conn>>>;

/// Client bound to one classifier function, role and option set.
pub struct DatabaseClient<D: Driver> {
    broker: Arc<dyn BrokerClient>,
    driver: Arc<D>,
    cache: SharedCache<D>,
    classifier: ClassifierFn,
    params: BaseDbParams,
    options: Option<ConnectionOptions>,
    tls: TlsSettings,
}

impl<D: Driver> Clone for DatabaseClient<D> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            driver: Arc::clone(&self.driver),
            cache: Arc::clone(&self.cache),
            classifier: Arc::clone(&self.classifier),
            params: self.params.clone(),
            options: self.options.clone(),
            tls: self.tls.clone(),
        }
    }
}

impl<D: Driver> DatabaseClient<D> {
    pub(crate) fn new(database: &Database<D>, options: Option<ConnectionOptions>) -> Self {
        Self {
            broker: Arc::clone(&database.broker),
            driver: Arc::clone(&database.driver),
            cache: Arc::clone(&database.cache),
            classifier: Arc::clone(&database.classifier),
            params: database.params.clone(),
            options,
            tls: database.tls.clone(),
        }
    }

    /// Cache key for the database selected by `ctx`.
    pub fn cache_key(&self, ctx: &RequestContext) -> DbaasResult<CacheKey> {
        let classifier = (self.classifier)(ctx)?;
        Ok(CacheKey::new(self.driver.database_type(), classifier))
    }

    /// Return a checked connection for the database selected by `ctx`.
    pub async fn get_connection(&self, ctx: &RequestContext) -> DbaasResult<Arc<D::Conn>> {
        let key = self.cache_key(ctx)?;
        let conn = self.fetch_or_create(ctx, &key).await?;
        let conn = self.ensure_alive(ctx, &key, conn).await?;
        self.ensure_authenticated(ctx, &key, conn).await
    }

    async fn fetch_or_create(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
    ) -> DbaasResult<Arc<D::Conn>> {
        self.cache
            .cache(key, move || async move {
                debug!(key = %key, "Creating database connection");
                let database = ctx
                    .run(
                        "get or create database",
                        self.broker
                            .get_or_create_db(key.db_type, &key.classifier, &self.params),
                    )
                    .await?;
                let conn = self.open(ctx, key, &database).await?;
                Ok(Arc::new(conn))
            })
            .await
    }

    async fn ensure_alive(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        conn: Arc<D::Conn>,
    ) -> DbaasResult<Arc<D::Conn>> {
        let Err(e) = ctx.run("ping", conn.ping()).await else {
            return Ok(conn);
        };

        warn!(
            key = %key,
            error = %e,
            "Connection ping failed, deleting it from cache and recreating connection"
        );
        let evicted = self
            .cache
            .delete_if(key, |cached| Arc::ptr_eq(cached, &conn))
            .await;
        if evicted {
            if let Err(close_err) = ctx.run("close connection", conn.close()).await {
                debug!(key = %key, error = %close_err, "Failed to close dead connection");
            }
        }
        self.fetch_or_create(ctx, key).await
    }

    async fn ensure_authenticated(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        conn: Arc<D::Conn>,
    ) -> DbaasResult<Arc<D::Conn>> {
        match ctx.run("ping", conn.ping()).await {
            Ok(()) => Ok(conn),
            Err(e) if e.is_authentication_failure() => {
                info!(key = %key, "Authentication error, requesting new password");
                self.cache
                    .delete_if(key, |cached| Arc::ptr_eq(cached, &conn))
                    .await;
                self.refresh(ctx, key, conn).await
            }
            Err(e) => {
                error!(key = %key, error = %e, "Connection validity check failed");
                Err(e)
            }
        }
    }

    /// Replace `stale` with a connection built from freshly looked-up credentials.
    ///
    /// When another caller filled the slot first, its connection is returned
    /// and `stale` is still closed on a best-effort basis.
    async fn refresh(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        stale: Arc<D::Conn>,
    ) -> DbaasResult<Arc<D::Conn>> {
        let refreshed = AtomicBool::new(false);
        let (ran, old) = (&refreshed, &stale);
        let outcome = self
            .cache
            .cache(key, move || async move {
                ran.store(true, Ordering::Relaxed);
                let database = ctx
                    .run(
                        "get connection",
                        self.broker
                            .get_connection(key.db_type, &key.classifier, &self.params),
                    )
                    .await
                    .inspect_err(|e| {
                        error!(key = %key, error = %e, "Can't update connection with DbaaS")
                    })?;

                ctx.run("close connection", old.close())
                    .await
                    .inspect_err(|e| {
                        error!(key = %key, error = %e, "Couldn't close existing connection")
                    })?;

                let conn = self.open(ctx, key, &database).await?;
                info!(key = %key, "Database password updated successfully");
                Ok(Arc::new(conn))
            })
            .await;

        let joined = !refreshed.load(Ordering::Relaxed);
        let replaced = outcome.as_ref().map_or(true, |conn| !Arc::ptr_eq(conn, &stale));
        if joined && replaced {
            debug!(key = %key, "Slot filled by another caller, closing stale connection");
            if let Err(e) = ctx.run("close connection", stale.close()).await {
                debug!(key = %key, error = %e, "Failed to close stale connection");
            }
        }
        outcome
    }

    /// Resolve credentials, build driver options and open a connection.
    async fn open(
        &self,
        ctx: &RequestContext,
        key: &CacheKey,
        database: &LogicalDatabase,
    ) -> DbaasResult<D::Conn> {
        let properties = database.connection_properties()?;
        let mut options = ConnectionOptions::build(self.options.as_ref(), &properties)?;
        if database.tls_enabled() {
            info!(key = %key, "Connection to database will be secured");
            options = options.with_tls(self.tls.clone());
        }

        debug!(key = %key, addr = ?options.addr, "Opening database connection");
        ctx.run("open connection", self.driver.open(&options))
            .await
            .inspect_err(|e| error!(key = %key, error = %e, "Error opening database connection"))
    }
}

impl<D: Driver> std::fmt::Debug for DatabaseClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseClient")
            .field("db_type", &self.driver.database_type())
            .field("params", &self.params)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
