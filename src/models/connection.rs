//! Connection-related data models.
//!
//! This module defines the broker's view of a database ([`LogicalDatabase`]),
//! its typed credentials ([`ConnectionProperties`]) and the parameters a
//! database handle forwards to the broker.

use crate::error::{DbaasError, DbaasResult};
use crate::models::classifier::ClassifierFn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROPERTY_URL: &str = "url";
pub const PROPERTY_USERNAME: &str = "username";
pub const PROPERTY_PASSWORD: &str = "password";
pub const PROPERTY_TLS: &str = "tls";

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
        }
    }

    /// Type name used in broker requests.
    pub fn broker_type(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::PostgreSQL => 5432,
            Self::MySQL => 3306,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Database record returned by the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalDatabase {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default)]
    pub connection_properties: Map<String, Value>,
}

impl LogicalDatabase {
    /// Create a logical database from its property bag.
    pub fn new(id: impl Into<String>, connection_properties: Map<String, Value>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            connection_properties,
        }
    }

    /// Whether the broker asks for a TLS-secured transport.
    pub fn tls_enabled(&self) -> bool {
        self.connection_properties
            .get(PROPERTY_TLS)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Resolve the typed credentials from the property bag.
    pub fn connection_properties(&self) -> DbaasResult<ConnectionProperties> {
        ConnectionProperties::resolve(&self.connection_properties)
    }
}

/// Typed projection of the broker property bag.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionProperties {
    pub url: String,
    pub username: String,
    /// Sensitive - never log
    pub password: String,
}

impl ConnectionProperties {
    /// Read `url`, `username` and `password` as strings from a property bag.
    pub fn resolve(properties: &Map<String, Value>) -> DbaasResult<Self> {
        let field = |name: &str| -> DbaasResult<String> {
            properties
                .get(name)
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| DbaasError::invalid_property(name, "string"))
        };

        Ok(Self {
            url: field(PROPERTY_URL)?,
            username: field(PROPERTY_USERNAME)?,
            password: field(PROPERTY_PASSWORD)?,
        })
    }

    /// Copy of the properties safe to print.
    pub fn masked(&self) -> Self {
        Self {
            password: "****".to_string(),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProperties")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Parameters forwarded to the broker alongside the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseDbParams {
    /// Requested role, e.g. "admin" or "ro"
    pub role: Option<String>,
    /// Prefix for the generated physical database name
    pub name_prefix: Option<String>,
}

/// Classifier function and broker parameters bound to a database handle.
#[derive(Clone, Default)]
pub struct DbParams {
    /// Falls back to the scope's built-in classifier when absent.
    pub classifier: Option<ClassifierFn>,
    pub base: BaseDbParams,
}

impl DbParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, classifier: ClassifierFn) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.base.role = Some(role.into());
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.base.name_prefix = Some(prefix.into());
        self
    }
}

impl std::fmt::Debug for DbParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbParams")
            .field("has_classifier", &self.classifier.is_some())
            .field("base", &self.base)
            .finish()
    }
}
