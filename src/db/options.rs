//! Driver connection options and the option builder.
//!
//! [`ConnectionOptions::build`] merges the broker's credentials into an
//! optional caller-supplied base: address and auth come from the broker,
//! everything else (pool sizing, timeouts) is kept from the base.

use crate::config::{PoolOptions, TlsSettings};
use crate::error::{DbaasError, DbaasResult};
use crate::models::{ConnectionProperties, DatabaseType};
use std::time::Duration;
use url::Url;

/// Database credentials passed to the driver.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Auth {
    pub database: String,
    pub username: String,
    /// Sensitive - never log
    pub password: String,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Options handed to [`crate::db::Driver::open`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// `host:port` endpoints; the first one is dialed.
    pub addr: Vec<String>,
    pub auth: Auth,
    pub pool: PoolOptions,
    pub connect_timeout: Option<Duration>,
    /// Enabled when the broker marks the database as TLS-only.
    pub tls: Option<TlsSettings>,
    pub application_name: Option<String>,
}

/// Address and default database recovered from a broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub addr: String,
    pub database: String,
}

impl Dsn {
    /// Parse `scheme://[user[:pass]@]host[:port]/database[?params]`.
    ///
    /// A missing port falls back to the engine default derived from the scheme.
    pub fn parse(raw: &str) -> DbaasResult<Self> {
        let url = Url::parse(raw)?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DbaasError::malformed_url("connection URL has no host"))?;
        let port = url
            .port()
            .or_else(|| DatabaseType::from_connection_string(raw).map(|t| t.default_port()))
            .ok_or_else(|| {
                DbaasError::malformed_url(format!(
                    "connection URL with scheme '{}' has no port",
                    url.scheme()
                ))
            })?;
        let database = url.path().trim_matches('/').to_string();

        Ok(Self {
            addr: format!("{}:{}", host, port),
            database,
        })
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Build driver options from broker credentials on top of `base`.
    pub fn build(
        base: Option<&ConnectionOptions>,
        properties: &ConnectionProperties,
    ) -> DbaasResult<Self> {
        let dsn = Dsn::parse(&properties.url)?;
        let mut options = base.cloned().unwrap_or_default();
        options.addr = vec![dsn.addr];
        options.auth = Auth {
            database: dsn.database,
            username: properties.username.clone(),
            password: properties.password.clone(),
        };
        Ok(options)
    }

    /// Host and port of the first address.
    pub fn endpoint(&self) -> DbaasResult<(String, u16)> {
        let addr = self
            .addr
            .first()
            .ok_or_else(|| DbaasError::malformed_url("connection options have no address"))?;
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| DbaasError::malformed_url(format!("address '{}' has no port", addr)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| DbaasError::malformed_url(format!("invalid port in '{}': {}", addr, e)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok((host.to_string(), port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn props(url: &str) -> ConnectionProperties {
        ConnectionProperties {
            url: url.to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        }
    }

    #[test]
    fn test_build_from_properties() {
        let options = ConnectionOptions::build(None, &props("proto://host:9000/db")).unwrap();
        assert_eq!(options.addr, vec!["host:9000".to_string()]);
        assert_eq!(options.auth.database, "db");
        assert_eq!(options.auth.username, "u");
        assert_eq!(options.auth.password, "p");
        assert_eq!(options.pool, PoolOptions::default());
        assert!(options.tls.is_none());
    }

    #[test]
    fn test_build_preserves_base_non_auth_fields() {
        let base = ConnectionOptions::new()
            .with_pool(PoolOptions {
                max_connections: Some(7),
                min_connections: Some(2),
                max_lifetime_secs: Some(30),
                ..Default::default()
            })
            .with_connect_timeout(Duration::from_secs(3))
            .with_application_name("orders");
        let mut stale = base.clone();
        stale.addr = vec!["old:1".into()];
        stale.auth.password = "old".into();

        let options =
            ConnectionOptions::build(Some(&stale), &props("proto://host:9000/db")).unwrap();

        assert_eq!(options.addr, vec!["host:9000".to_string()]);
        assert_eq!(options.auth.password, "p");
        assert_eq!(options.pool, base.pool);
        assert_eq!(options.connect_timeout, base.connect_timeout);
        assert_eq!(options.application_name, base.application_name);
    }

    #[test]
    fn test_build_does_not_mutate_base() {
        let base = ConnectionOptions::new().with_application_name("orders");
        let _ = ConnectionOptions::build(Some(&base), &props("proto://host:9000/db")).unwrap();
        assert!(base.addr.is_empty());
        assert!(base.auth.password.is_empty());
    }

    #[test]
    fn test_build_malformed_url() {
        let result = ConnectionOptions::build(None, &props("not a url"));
        assert!(matches!(result, Err(DbaasError::MalformedUrl { .. })));
    }

    #[test]
    fn test_dsn_default_port_from_scheme() {
        let dsn = Dsn::parse("postgresql://pg-host/orders").unwrap();
        assert_eq!(dsn.addr, "pg-host:5432");
        assert_eq!(dsn.database, "orders");

        let dsn = Dsn::parse("mysql://my-host/app").unwrap();
        assert_eq!(dsn.addr, "my-host:3306");
    }

    #[test]
    fn test_dsn_unknown_scheme_without_port() {
        let result = Dsn::parse("clickhouse://ch-host/db");
        assert!(matches!(result, Err(DbaasError::MalformedUrl { .. })));
    }

    #[test]
    fn test_dsn_ignores_embedded_credentials_and_query() {
        let dsn = Dsn::parse("postgresql://x:y@pg:6432/orders?sslmode=disable").unwrap();
        assert_eq!(dsn.addr, "pg:6432");
        assert_eq!(dsn.database, "orders");
    }

    #[test]
    fn test_dsn_without_database() {
        let dsn = Dsn::parse("mysql://my-host:3306").unwrap();
        assert_eq!(dsn.database, "");
    }

    #[test]
    fn test_endpoint() {
        let options = ConnectionOptions::build(None, &props("proto://host:9000/db")).unwrap();
        assert_eq!(options.endpoint().unwrap(), ("host".to_string(), 9000));

        let options = ConnectionOptions::build(None, &props("postgresql://[::1]:5432/db")).unwrap();
        assert_eq!(options.endpoint().unwrap(), ("::1".to_string(), 5432));

        assert!(ConnectionOptions::new().endpoint().is_err());
    }

    #[test]
    fn test_with_tls() {
        let tls = TlsSettings {
            ca_cert_path: Some(PathBuf::from("/etc/ssl/ca.pem")),
        };
        let options = ConnectionOptions::new().with_tls(tls.clone());
        assert_eq!(options.tls, Some(tls));
    }

    #[test]
    fn test_debug_masks_password() {
        let options = ConnectionOptions::build(None, &props("proto://host:9000/db")).unwrap();
        let debug = format!("{:?}", options);
        assert!(debug.contains("****"));
        assert!(!debug.contains("password: \"p\""));
    }
}
