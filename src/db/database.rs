//! Database handle bound to one classifier function and role.

use crate::broker::BrokerClient;
use crate::config::TlsSettings;
use crate::db::client::{DatabaseClient, SharedCache};
use crate::db::driver::Driver;
use crate::db::options::ConnectionOptions;
use crate::error::{DbaasError, DbaasResult};
use crate::models::{
    BaseDbParams, Classifier, ClassifierFn, ConnectionProperties, DatabaseType, RequestContext,
};
use std::sync::Arc;
use tracing::debug;

/// Handle produced by [`crate::db::Registry`].
///
/// Holds no state beyond its binding, so it can be kept and reused across
/// requests. Every handle from one registry shares that registry's cache.
pub struct Database<D: Driver> {
    pub(crate) broker: Arc<dyn BrokerClient>,
    pub(crate) driver: Arc<D>,
    pub(crate) cache: SharedCache<D>,
    pub(crate) classifier: ClassifierFn,
    pub(crate) params: BaseDbParams,
    pub(crate) tls: TlsSettings,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            driver: Arc::clone(&self.driver),
            cache: Arc::clone(&self.cache),
            classifier: Arc::clone(&self.classifier),
            params: self.params.clone(),
            tls: self.tls.clone(),
        }
    }
}

impl<D: Driver> Database<D> {
    pub fn database_type(&self) -> DatabaseType {
        self.driver.database_type()
    }

    pub fn params(&self) -> &BaseDbParams {
        &self.params
    }

    /// Classifier this handle resolves to for `ctx`.
    pub fn classifier(&self, ctx: &RequestContext) -> DbaasResult<Classifier> {
        (self.classifier)(ctx)
    }

    /// Create a client running the connection health protocol.
    ///
    /// `options` is the base the broker's address and credentials are merged
    /// into; its pool settings are validated here.
    pub fn get_client(&self, options: Option<ConnectionOptions>) -> DbaasResult<DatabaseClient<D>> {
        if let Some(options) = &options {
            options.pool.validate().map_err(DbaasError::invalid_input)?;
        }
        Ok(DatabaseClient::new(self, options))
    }

    /// Provision the database if needed and return its credentials.
    pub async fn get_connection_properties(
        &self,
        ctx: &RequestContext,
    ) -> DbaasResult<ConnectionProperties> {
        let classifier = self.classifier(ctx)?;
        debug!(classifier = %classifier, "Getting connection properties");
        let database = ctx
            .run(
                "get or create database",
                self.broker
                    .get_or_create_db(self.database_type(), &classifier, &self.params),
            )
            .await?;
        database.connection_properties()
    }

    /// Return credentials of an existing database; fails if it was never provisioned.
    pub async fn find_connection_properties(
        &self,
        ctx: &RequestContext,
    ) -> DbaasResult<ConnectionProperties> {
        let classifier = self.classifier(ctx)?;
        debug!(classifier = %classifier, "Looking up connection properties");
        let database = ctx
            .run(
                "get connection",
                self.broker
                    .get_connection(self.database_type(), &classifier, &self.params),
            )
            .await?;
        database.connection_properties()
    }
}

impl<D: Driver> std::fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_type", &self.database_type())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
