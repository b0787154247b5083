//! Driver protocol consumed by the connection cache.
//!
//! A [`Driver`] opens [`Connection`]s from [`ConnectionOptions`]. Opening is
//! allowed to be lazy; [`Connection::ping`] is what actually reaches the
//! server. Ping failures caused by rejected credentials must surface as
//! [`DbaasError::AuthenticationFailed`](crate::error::DbaasError::AuthenticationFailed)
//! so the protocol can tell a rotated password from a dead socket.

use crate::db::options::ConnectionOptions;
use crate::error::DbaasResult;
use crate::models::DatabaseType;
use async_trait::async_trait;

#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Round-trip to the server.
    async fn ping(&self) -> DbaasResult<()>;

    /// Release the connection. Further pings must fail.
    async fn close(&self) -> DbaasResult<()>;
}

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Conn: Connection;

    /// Engine served by this driver; part of every cache key.
    fn database_type(&self) -> DatabaseType;

    async fn open(&self, options: &ConnectionOptions) -> DbaasResult<Self::Conn>;
}
