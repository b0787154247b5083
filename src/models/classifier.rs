//! Classifiers and the per-request context they are derived from.
//!
//! A classifier is the broker-side identity of a logical database. The two
//! built-in scopes mirror what the DBaaS agent expects:
//!
//! ```text
//! service: {"microserviceName": "orders", "namespace": "prod", "scope": "service"}
//! tenant:  {"microserviceName": "orders", "namespace": "prod", "scope": "tenant", "tenantId": "t-1"}
//! ```

use crate::config::DbaasSettings;
use crate::error::{DbaasError, DbaasResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const CLASSIFIER_MICROSERVICE_NAME: &str = "microserviceName";
pub const CLASSIFIER_NAMESPACE: &str = "namespace";
pub const CLASSIFIER_SCOPE: &str = "scope";
pub const CLASSIFIER_TENANT_ID: &str = "tenantId";

pub const SCOPE_SERVICE: &str = "service";
pub const SCOPE_TENANT: &str = "tenant";

/// Scalar value stored in a classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassifierValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl std::fmt::Display for ClassifierValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ClassifierValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ClassifierValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ClassifierValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ClassifierValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Key/value identity of a logical database.
///
/// Keys are kept sorted, so two classifiers built in a different insertion
/// order compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Classifier(BTreeMap<String, ClassifierValue>);

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ClassifierValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ClassifierValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ClassifierValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClassifierValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// Per-request data threaded through every broker and driver call.
///
/// Carries the tenant used by the tenant classifier and an optional deadline.
/// Dropping the future of an in-flight call cancels it; the deadline turns a
/// slow call into [`DbaasError::Timeout`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    tenant_id: Option<String>,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the deadline to `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run one network operation under this context's deadline.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> DbaasResult<T>
    where
        F: Future<Output = DbaasResult<T>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| DbaasError::timeout(operation))?,
            None => fut.await,
        }
    }
}

/// Function deriving a classifier from the request context.
pub type ClassifierFn = Arc<dyn Fn(&RequestContext) -> DbaasResult<Classifier> + Send + Sync>;

/// Classifier of the database owned by the microservice itself.
pub fn service_classifier(settings: &DbaasSettings, _ctx: &RequestContext) -> Classifier {
    Classifier::new()
        .with(CLASSIFIER_MICROSERVICE_NAME, settings.microservice_name.as_str())
        .with(CLASSIFIER_NAMESPACE, settings.namespace.as_str())
        .with(CLASSIFIER_SCOPE, SCOPE_SERVICE)
}

/// Classifier of the database owned by the tenant of the current request.
pub fn tenant_classifier(
    settings: &DbaasSettings,
    ctx: &RequestContext,
) -> DbaasResult<Classifier> {
    let tenant_id = ctx.tenant_id().ok_or_else(|| {
        DbaasError::classifier("Tenant id is required in the request context for a tenant database")
    })?;
    Ok(Classifier::new()
        .with(CLASSIFIER_MICROSERVICE_NAME, settings.microservice_name.as_str())
        .with(CLASSIFIER_NAMESPACE, settings.namespace.as_str())
        .with(CLASSIFIER_SCOPE, SCOPE_TENANT)
        .with(CLASSIFIER_TENANT_ID, tenant_id))
}

/// Wrap [`service_classifier`] as a [`ClassifierFn`] bound to `settings`.
pub fn service_classifier_fn(settings: DbaasSettings) -> ClassifierFn {
    Arc::new(move |ctx| Ok(service_classifier(&settings, ctx)))
}

/// Wrap [`tenant_classifier`] as a [`ClassifierFn`] bound to `settings`.
pub fn tenant_classifier_fn(settings: DbaasSettings) -> ClassifierFn {
    Arc::new(move |ctx| tenant_classifier(&settings, ctx))
}
