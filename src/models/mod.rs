//! Data models for the DBaaS client.
//!
//! This module re-exports all model types used throughout the library.

pub mod classifier;
pub mod connection;

// Re-export commonly used types
pub use classifier::{
    Classifier, ClassifierFn, ClassifierValue, RequestContext, service_classifier,
    service_classifier_fn, tenant_classifier, tenant_classifier_fn,
};
pub use connection::{
    BaseDbParams, ConnectionProperties, DatabaseType, DbParams, LogicalDatabase,
};
