//! Configuration handling for the DBaaS client.
//!
//! Library consumers build [`DbaasSettings`], [`PoolOptions`] and [`TlsSettings`]
//! directly; the `dbaas-client` binary fills them from CLI arguments and
//! environment variables via [`Config`].

use crate::models::DatabaseType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DBAAS_AGENT_URL: &str = "http://dbaas-agent:8080";
pub const DEFAULT_BROKER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BROKER_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BROKER_RETRY_DELAY_MILLIS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Connection pool sizing passed through to the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10)
    pub max_connections: Option<u32>,
    /// Minimum idle connections kept open (default: 0)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Maximum lifetime of a pooled connection in seconds (default: 1800)
    pub max_lifetime_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value.
    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    /// Get max_lifetime with default value.
    pub fn max_lifetime_or_default(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs.unwrap_or(DEFAULT_MAX_LIFETIME_SECS))
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let (Some(min), Some(max)) = (self.min_connections, self.max_connections) {
            if min > max {
                return Err(format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    min, max
                ));
            }
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Identity of the running microservice, used by the built-in classifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbaasSettings {
    pub namespace: String,
    pub microservice_name: String,
}

impl DbaasSettings {
    pub fn new(namespace: impl Into<String>, microservice_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            microservice_name: microservice_name.into(),
        }
    }
}

/// TLS template applied to connections whose broker properties request TLS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// PEM bundle used to verify the server certificate. When absent the
    /// driver's default trust store is used.
    pub ca_cert_path: Option<PathBuf>,
}

/// Broker connection settings for [`crate::broker::HttpBrokerClient`].
#[derive(Clone)]
pub struct BrokerConfig {
    /// Base URL of the DBaaS agent.
    pub agent_url: String,
    pub namespace: String,
    pub microservice_name: String,
    pub username: Option<String>,
    /// Sensitive - never log
    pub password: Option<String>,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("agent_url", &self.agent_url)
            .field("namespace", &self.namespace)
            .field("microservice_name", &self.microservice_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl BrokerConfig {
    pub fn new(
        agent_url: impl Into<String>,
        namespace: impl Into<String>,
        microservice_name: impl Into<String>,
    ) -> Self {
        Self {
            agent_url: agent_url.into(),
            namespace: namespace.into(),
            microservice_name: microservice_name.into(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(DEFAULT_BROKER_TIMEOUT_SECS),
            max_attempts: DEFAULT_BROKER_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_BROKER_RETRY_DELAY_MILLIS),
        }
    }

    /// Set basic-auth credentials for the broker.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set how many times a provisioning request is attempted and the pause between attempts.
    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }
}

/// Database engine selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EngineArg {
    #[default]
    Postgresql,
    Mysql,
}

impl From<EngineArg> for DatabaseType {
    fn from(engine: EngineArg) -> Self {
        match engine {
            EngineArg::Postgresql => DatabaseType::PostgreSQL,
            EngineArg::Mysql => DatabaseType::MySQL,
        }
    }
}

/// Operation performed by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Get or create the database and print its connection properties
    Provision,
    /// Look up an existing database and print its connection properties
    Find,
    /// Open a verified connection and print the server version
    Connect,
}

/// Configuration for the `dbaas-client` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbaas-client",
    about = "Provision databases through DBaaS and open self-healing connections",
    version,
    author
)]
pub struct Config {
    /// DBaaS agent base URL
    #[arg(
        long,
        default_value = DEFAULT_DBAAS_AGENT_URL,
        env = "DBAAS_AGENT"
    )]
    pub dbaas_agent_url: String,

    /// Namespace of the microservice
    #[arg(long, env = "MICROSERVICE_NAMESPACE")]
    pub namespace: String,

    /// Name of the microservice owning the database
    #[arg(long, env = "MICROSERVICE_NAME")]
    pub microservice_name: String,

    /// Basic-auth user for the DBaaS agent
    #[arg(long, env = "DBAAS_CLUSTER_DBA_CREDENTIALS_USERNAME")]
    pub dbaas_username: Option<String>,

    /// Basic-auth password for the DBaaS agent
    #[arg(long, env = "DBAAS_CLUSTER_DBA_CREDENTIALS_PASSWORD", hide_env_values = true)]
    pub dbaas_password: Option<String>,

    /// Database engine
    #[arg(long, value_enum, default_value = "postgresql", env = "DBAAS_DB_TYPE")]
    pub db_type: EngineArg,

    /// Role requested from the broker (e.g. admin, rw, ro)
    #[arg(long, env = "DBAAS_ROLE")]
    pub role: Option<String>,

    /// Tenant identifier; selects the tenant database instead of the service database
    #[arg(long, env = "DBAAS_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// CA bundle used when the broker enables TLS
    #[arg(long, env = "DBAAS_TLS_CA_CERT")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Broker request timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_BROKER_TIMEOUT_SECS,
        env = "DBAAS_BROKER_TIMEOUT"
    )]
    pub broker_timeout: u64,

    /// Overall deadline for one command in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS,
        env = "DBAAS_REQUEST_TIMEOUT"
    )]
    pub request_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DBAAS_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBAAS_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Identity used by the built-in classifiers.
    pub fn settings(&self) -> DbaasSettings {
        DbaasSettings::new(&self.namespace, &self.microservice_name)
    }

    /// Broker client configuration.
    pub fn broker_config(&self) -> BrokerConfig {
        let mut broker = BrokerConfig::new(
            &self.dbaas_agent_url,
            &self.namespace,
            &self.microservice_name,
        );
        broker.request_timeout = self.broker_timeout_duration();
        if let (Some(user), Some(password)) = (&self.dbaas_username, &self.dbaas_password) {
            broker = broker.with_credentials(user, password);
        }
        broker
    }

    /// TLS template for broker-enabled TLS connections.
    pub fn tls_settings(&self) -> TlsSettings {
        TlsSettings {
            ca_cert_path: self.tls_ca_cert.clone(),
        }
    }

    /// Get the broker timeout as a Duration.
    pub fn broker_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.broker_timeout)
    }

    /// Get the request deadline as a Duration.
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
