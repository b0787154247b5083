//! DBaaS Client - command line entry point.
//!
//! Provisions or looks up a database through the DBaaS agent and optionally
//! opens a verified connection to it.

use clap::Parser;
use dbaas_client::config::{Command, Config};
use dbaas_client::db::{Database, Registry, SqlxDriver};
use dbaas_client::error::DbaasResult;
use dbaas_client::models::{ConnectionProperties, DbParams, RequestContext};
use dbaas_client::HttpBrokerClient;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_properties(properties: &ConnectionProperties) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(&properties.masked())?);
    Ok(())
}

async fn run(
    command: Command,
    database: &Database<SqlxDriver>,
    ctx: &RequestContext,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Provision => {
            let properties = database.get_connection_properties(ctx).await?;
            print_properties(&properties)?;
        }
        Command::Find => {
            let properties = database.find_connection_properties(ctx).await?;
            print_properties(&properties)?;
        }
        Command::Connect => {
            let client = database.get_client(None)?;
            let conn = client.get_connection(ctx).await?;
            let version = conn.server_version().await;
            let output = serde_json::json!({
                "db_type": database.database_type(),
                "server_version": version,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn shutdown(registry: &Registry<SqlxDriver>) -> DbaasResult<()> {
    let count = registry.cached_connection_count().await;
    registry.close_all().await?;
    info!(count, "Closed cached connections");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        namespace = %config.namespace,
        microservice = %config.microservice_name,
        agent = %config.dbaas_agent_url,
        "Starting DBaaS client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let broker = Arc::new(HttpBrokerClient::new(config.broker_config())?);
    let driver = SqlxDriver::new(config.db_type.into());
    let registry =
        Registry::new(broker, driver, config.settings()).with_tls(config.tls_settings());

    let mut params = DbParams::new();
    if let Some(role) = &config.role {
        params = params.with_role(role);
    }

    let mut ctx = RequestContext::new().with_timeout(config.request_timeout_duration());
    let database = match &config.tenant_id {
        Some(tenant_id) => {
            ctx = ctx.with_tenant(tenant_id);
            registry.tenant_database(Some(params))
        }
        None => registry.service_database(Some(params)),
    };

    let result = run(config.command, &database, &ctx).await;
    shutdown(&registry).await?;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}
