//! Database connection layer.
//!
//! This module provides:
//! - Driver protocol and the bundled sqlx driver
//! - Option building from broker credentials
//! - Keyed single-flight connection cache
//! - Connection health protocol, database handles and the registry

pub mod cache;
pub mod client;
pub mod database;
pub mod driver;
pub mod options;
pub mod registry;
pub mod sqlx_driver;

pub use cache::{CacheKey, ConnectionCache};
pub use client::{DatabaseClient, SharedCache};
pub use database::Database;
pub use driver::{Connection, Driver};
pub use options::{Auth, ConnectionOptions, Dsn};
pub use registry::Registry;
pub use sqlx_driver::{DbPool, SqlxDriver};
