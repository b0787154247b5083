//! Error types for the DBaaS client.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Variants follow the failure classes of the connection protocol: broker
//! provisioning failures, malformed broker data, transport failures and
//! authentication failures each get their own variant so callers can react
//! without string matching.

use thiserror::Error;

/// SQLSTATE class for "invalid authorization specification".
///
/// PostgreSQL reports `28P01` (invalid password) and `28000`; MySQL maps
/// error 1045 (access denied) to `28000`.
pub const AUTHENTICATION_FAILED_SQLSTATE_CLASS: &str = "28";

/// Clone lets every caller waiting on one cache creation receive the same error.
#[derive(Error, Debug, Clone)]
pub enum DbaasError {
    #[error("{message}")]
    Provisioning {
        message: String,
        /// Status code of the broker response, if one was received
        http_code: Option<u16>,
        /// True when the broker client gave up without exhausting its retries
        stop_retrying: bool,
    },

    #[error("Connection property '{field}' is missing or is not a {expected}")]
    InvalidProperty { field: String, expected: String },

    #[error("Malformed connection URL: {message}")]
    MalformedUrl { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Authentication failed (code {code}): {message}")]
    AuthenticationFailed { code: String, message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded the request deadline")]
    Timeout { operation: String },

    #[error("Classifier error: {message}")]
    Classifier { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbaasError {
    /// Create a provisioning error for a failed broker call.
    pub fn provisioning(
        message: impl Into<String>,
        http_code: Option<u16>,
        stop_retrying: bool,
    ) -> Self {
        Self::Provisioning {
            message: message.into(),
            http_code,
            stop_retrying,
        }
    }

    /// Create an error for a property bag field that is absent or mistyped.
    pub fn invalid_property(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidProperty {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// Create a malformed URL error.
    pub fn malformed_url(message: impl Into<String>) -> Self {
        Self::MalformedUrl {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an authentication failure error.
    pub fn authentication_failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a classifier error.
    pub fn classifier(message: impl Into<String>) -> Self {
        Self::Classifier {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::AuthenticationFailed { .. } => {
                Some("Credentials were rotated or revoked; request fresh ones from the broker")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Provisioning { stop_retrying, .. } => !stop_retrying,
            _ => false,
        }
    }

    /// Check if this error reports rejected credentials.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Status code returned by the broker, if any.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            Self::Provisioning { http_code, .. } => *http_code,
            _ => None,
        }
    }
}

/// Check whether a SQLSTATE code belongs to the authentication failure class.
pub fn is_authentication_sqlstate(code: &str) -> bool {
    code.starts_with(AUTHENTICATION_FAILED_SQLSTATE_CLASS)
}

/// Convert sqlx errors to DbaasError.
impl From<sqlx::Error> for DbaasError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbaasError::connection(
                msg.to_string(),
                "Check the connection properties returned by the broker",
            ),
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) if is_authentication_sqlstate(&code) => {
                    DbaasError::authentication_failed(code.to_string(), db_err.message())
                }
                code => DbaasError::database(
                    db_err.message(),
                    code.map(|c| c.to_string()),
                    "Check the database server logs",
                ),
            },
            sqlx::Error::PoolTimedOut => DbaasError::connection(
                "Timed out acquiring a connection from the pool",
                "Check that the database server is reachable",
            ),
            sqlx::Error::PoolClosed => {
                DbaasError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbaasError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbaasError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbaasError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => DbaasError::internal("Database worker crashed"),
            _ => DbaasError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert broker transport errors to DbaasError.
impl From<reqwest::Error> for DbaasError {
    fn from(err: reqwest::Error) -> Self {
        let http_code = err.status().map(|s| s.as_u16());
        if err.is_decode() {
            return DbaasError::provisioning(
                format!("Malformed response from DbaaS: {}", err),
                http_code,
                true,
            );
        }
        DbaasError::provisioning(format!("Failed to reach DbaaS: {}", err), http_code, false)
    }
}

impl From<url::ParseError> for DbaasError {
    fn from(err: url::ParseError) -> Self {
        DbaasError::malformed_url(err.to_string())
    }
}

/// Result type alias for DBaaS client operations.
pub type DbaasResult<T> = Result<T, DbaasError>;
