//! REST client for the DBaaS agent.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | get or create | `PUT {agent}/api/v3/dbaas/{namespace}/databases` |
//! | lookup | `POST {agent}/api/v3/dbaas/{namespace}/databases/get-by-classifier/{type}` |
//!
//! Provisioning answers `202 Accepted` while the database is still being
//! created; those responses and `5xx` failures are retried with a fixed delay.
//! Lookups are never retried.

use crate::broker::BrokerClient;
use crate::config::BrokerConfig;
use crate::error::{DbaasError, DbaasResult};
use crate::models::{BaseDbParams, Classifier, DatabaseType, LogicalDatabase};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};

const API_PREFIX: &str = "api/v3/dbaas";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDatabaseRequest<'a> {
    classifier: &'a Classifier,
    #[serde(rename = "type")]
    db_type: &'a str,
    origin_service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name_prefix: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetConnectionRequest<'a> {
    classifier: &'a Classifier,
    origin_service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_role: Option<&'a str>,
}

/// [`BrokerClient`] backed by the DBaaS agent REST API.
#[derive(Debug, Clone)]
pub struct HttpBrokerClient {
    client: Client,
    config: BrokerConfig,
}

impl HttpBrokerClient {
    /// Create a broker client from configuration.
    pub fn new(config: BrokerConfig) -> DbaasResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn databases_url(&self) -> String {
        format!(
            "{}/{}/{}/databases",
            self.config.agent_url.trim_end_matches('/'),
            API_PREFIX,
            self.config.namespace
        )
    }

    fn get_by_classifier_url(&self, db_type: DatabaseType) -> String {
        format!(
            "{}/get-by-classifier/{}",
            self.databases_url(),
            db_type.broker_type()
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.config.username, &self.config.password) {
            (Some(user), Some(password)) => request.basic_auth(user, Some(password)),
            _ => request,
        }
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn get_or_create_db(
        &self,
        db_type: DatabaseType,
        classifier: &Classifier,
        params: &BaseDbParams,
    ) -> DbaasResult<LogicalDatabase> {
        let url = self.databases_url();
        let body = CreateDatabaseRequest {
            classifier,
            db_type: db_type.broker_type(),
            origin_service: &self.config.microservice_name,
            user_role: params.role.as_deref(),
            name_prefix: params.name_prefix.as_deref(),
        };

        let mut last_status = None;
        for attempt in 1..=self.config.max_attempts {
            debug!(
                classifier = %classifier,
                db_type = %db_type,
                attempt,
                "Requesting database from DbaaS"
            );
            let response = self
                .authorized(self.client.put(&url))
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => match response.status() {
                    StatusCode::OK | StatusCode::CREATED => {
                        info!(
                            classifier = %classifier,
                            db_type = %db_type,
                            "Got database from DbaaS"
                        );
                        return Ok(response.json::<LogicalDatabase>().await?);
                    }
                    StatusCode::ACCEPTED => {
                        debug!(classifier = %classifier, "Database provisioning in progress");
                        last_status = Some(StatusCode::ACCEPTED.as_u16());
                    }
                    status if status.is_server_error() => {
                        warn!(
                            classifier = %classifier,
                            status = status.as_u16(),
                            attempt,
                            "DbaaS returned server error"
                        );
                        last_status = Some(status.as_u16());
                    }
                    status => {
                        return Err(DbaasError::provisioning(
                            format!(
                                "Failed to get response from DbaaS: unexpected status {}",
                                status.as_u16()
                            ),
                            Some(status.as_u16()),
                            true,
                        ));
                    }
                },
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(classifier = %classifier, error = %e, attempt, "DbaaS is unreachable");
                    last_status = None;
                }
                Err(e) => return Err(e.into()),
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(DbaasError::provisioning(
            format!(
                "Failed to get response from DbaaS after {} attempts",
                self.config.max_attempts
            ),
            last_status,
            true,
        ))
    }

    async fn get_connection(
        &self,
        db_type: DatabaseType,
        classifier: &Classifier,
        params: &BaseDbParams,
    ) -> DbaasResult<LogicalDatabase> {
        let body = GetConnectionRequest {
            classifier,
            origin_service: &self.config.microservice_name,
            user_role: params.role.as_deref(),
        };

        debug!(classifier = %classifier, db_type = %db_type, "Looking up database in DbaaS");
        let response = self
            .authorized(self.client.post(self.get_by_classifier_url(db_type)))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                classifier = %classifier,
                status = status.as_u16(),
                "DbaaS lookup failed"
            );
            return Err(DbaasError::provisioning(
                "Incorrect response from DbaaS. Stop retrying",
                Some(status.as_u16()),
                true,
            ));
        }

        Ok(response.json::<LogicalDatabase>().await?)
    }
}
