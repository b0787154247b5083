//! Broker (DBaaS agent) protocol.
//!
//! The broker provisions logical databases and hands out their credentials.
//! [`BrokerClient`] is the seam the connection protocol talks to;
//! [`HttpBrokerClient`] implements it over the agent's REST API.

pub mod http;

use crate::error::DbaasResult;
use crate::models::{BaseDbParams, Classifier, DatabaseType, LogicalDatabase};
use async_trait::async_trait;

pub use http::HttpBrokerClient;

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Return the database for `classifier`, provisioning it if it does not exist yet.
    async fn get_or_create_db(
        &self,
        db_type: DatabaseType,
        classifier: &Classifier,
        params: &BaseDbParams,
    ) -> DbaasResult<LogicalDatabase>;

    /// Look up an existing database for `classifier` without provisioning.
    ///
    /// Fails with the broker's status code (404) when the database does not exist.
    async fn get_connection(
        &self,
        db_type: DatabaseType,
        classifier: &Classifier,
        params: &BaseDbParams,
    ) -> DbaasResult<LogicalDatabase>;
}
