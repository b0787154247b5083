//! Entry point producing service and tenant database handles.

use crate::broker::BrokerClient;
use crate::config::{DbaasSettings, TlsSettings};
use crate::db::cache::ConnectionCache;
use crate::db::client::SharedCache;
use crate::db::database::Database;
use crate::db::driver::{Connection, Driver};
use crate::error::DbaasResult;
use crate::models::{ClassifierFn, DbParams, service_classifier_fn, tenant_classifier_fn};
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the connection cache shared by every handle it creates.
pub struct Registry<D: Driver> {
    broker: Arc<dyn BrokerClient>,
    driver: Arc<D>,
    cache: SharedCache<D>,
    settings: DbaasSettings,
    tls: TlsSettings,
}

impl<D: Driver> Registry<D> {
    pub fn new(broker: Arc<dyn BrokerClient>, driver: D, settings: DbaasSettings) -> Self {
        Self {
            broker,
            driver: Arc::new(driver),
            cache: Arc::new(ConnectionCache::new()),
            settings,
            tls: TlsSettings::default(),
        }
    }

    /// TLS settings applied when the broker marks a database as TLS-only.
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    pub fn settings(&self) -> &DbaasSettings {
        &self.settings
    }

    /// Handle for the database owned by the microservice.
    pub fn service_database(&self, params: Option<DbParams>) -> Database<D> {
        self.database(service_classifier_fn(self.settings.clone()), params)
    }

    /// Handle for the database of the tenant named in each request context.
    pub fn tenant_database(&self, params: Option<DbParams>) -> Database<D> {
        self.database(tenant_classifier_fn(self.settings.clone()), params)
    }

    fn database(&self, default_classifier: ClassifierFn, params: Option<DbParams>) -> Database<D> {
        let params = params.unwrap_or_default();
        Database {
            broker: Arc::clone(&self.broker),
            driver: Arc::clone(&self.driver),
            cache: Arc::clone(&self.cache),
            classifier: params.classifier.unwrap_or(default_classifier),
            params: params.base,
            tls: self.tls.clone(),
        }
    }

    /// Number of connections currently cached.
    pub async fn cached_connection_count(&self) -> usize {
        self.cache.len().await
    }

    /// Empty the cache and close every connection it held.
    ///
    /// All connections are closed even if some fail; the first failure is returned.
    pub async fn close_all(&self) -> DbaasResult<()> {
        let entries = self.cache.drain().await;
        info!(count = entries.len(), "Closing cached connections");

        let mut first_err = None;
        for (key, conn) in entries {
            if let Err(e) = conn.close().await {
                warn!(key = %key, error = %e, "Failed to close connection");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<D: Driver> std::fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("db_type", &self.driver.database_type())
            .field("settings", &self.settings)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}
