//! DBaaS Client Library
//!
//! Obtains database credentials from a DBaaS broker by classifier, keeps one
//! cached connection per classifier and repairs it when the socket dies or the
//! broker rotates the password.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use broker::{BrokerClient, HttpBrokerClient};
pub use config::Config;
pub use db::{Database, DatabaseClient, Registry, SqlxDriver};
pub use error::{DbaasError, DbaasResult};
pub use models::{Classifier, DbParams, RequestContext};
