//! Test doubles shared by the integration tests.
//!
//! `MockBroker` counts calls per endpoint and remembers which classifiers it
//! provisioned. `MockDriver` simulates a server with a current password and a
//! set of killed sessions; pings can also be scripted up front.

#![allow(dead_code)]

use async_trait::async_trait;
use dbaas_client::broker::BrokerClient;
use dbaas_client::config::DbaasSettings;
use dbaas_client::db::{Connection, ConnectionOptions, Driver, Registry};
use dbaas_client::error::{DbaasError, DbaasResult};
use dbaas_client::models::{BaseDbParams, Classifier, DatabaseType, LogicalDatabase};
use serde_json::{Map, Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "test_namespace";
pub const MICROSERVICE: &str = "service_test";
pub const DB_URL: &str = "postgresql://pg.test:5432/orders";
pub const USERNAME: &str = "dbaas_user";

pub fn settings() -> DbaasSettings {
    DbaasSettings::new(NAMESPACE, MICROSERVICE)
}

pub fn registry(broker: &Arc<MockBroker>, driver: &MockDriver) -> Registry<MockDriver> {
    Registry::new(broker.clone(), driver.clone(), settings())
}

/// Broker double returning one database per classifier.
#[derive(Default)]
pub struct MockBroker {
    create_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    url: Mutex<String>,
    username: Mutex<String>,
    password: Mutex<String>,
    lookup_password: Mutex<Option<String>>,
    tls: AtomicBool,
    omit_password: AtomicBool,
    create_delay: Mutex<Duration>,
    create_failure: Mutex<Option<DbaasError>>,
    lookup_failure: Mutex<Option<DbaasError>>,
    provisioned: Mutex<HashSet<Classifier>>,
    classifiers: Mutex<Vec<Classifier>>,
    params: Mutex<Vec<BaseDbParams>>,
}

impl MockBroker {
    pub fn new(password: &str) -> Arc<Self> {
        Self::with_database(DB_URL, USERNAME, password)
    }

    pub fn with_database(url: &str, username: &str, password: &str) -> Arc<Self> {
        let broker = Self::default();
        *broker.url.lock().unwrap() = url.to_string();
        *broker.username.lock().unwrap() = username.to_string();
        *broker.password.lock().unwrap() = password.to_string();
        Arc::new(broker)
    }

    /// Rotate the password handed out by both endpoints.
    pub fn set_password(&self, password: &str) {
        *self.password.lock().unwrap() = password.to_string();
        *self.lookup_password.lock().unwrap() = None;
    }

    /// Make the lookup endpoint return a different password than provisioning.
    pub fn set_lookup_password(&self, password: &str) {
        *self.lookup_password.lock().unwrap() = Some(password.to_string());
    }

    pub fn set_url(&self, url: &str) {
        *self.url.lock().unwrap() = url.to_string();
    }

    pub fn set_tls(&self, enabled: bool) {
        self.tls.store(enabled, Ordering::SeqCst);
    }

    pub fn omit_password(&self) {
        self.omit_password.store(true, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    pub fn fail_creates_with(&self, err: Option<DbaasError>) {
        *self.create_failure.lock().unwrap() = err;
    }

    pub fn fail_lookups_with(&self, err: Option<DbaasError>) {
        *self.lookup_failure.lock().unwrap() = err;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Every classifier received, in call order.
    pub fn classifiers(&self) -> Vec<Classifier> {
        self.classifiers.lock().unwrap().clone()
    }

    pub fn last_params(&self) -> Option<BaseDbParams> {
        self.params.lock().unwrap().last().cloned()
    }

    fn database(&self, password: String) -> LogicalDatabase {
        let mut properties = Map::new();
        properties.insert("url".into(), json!(*self.url.lock().unwrap()));
        properties.insert("username".into(), json!(*self.username.lock().unwrap()));
        if !self.omit_password.load(Ordering::SeqCst) {
            properties.insert("password".into(), Value::String(password));
        }
        if self.tls.load(Ordering::SeqCst) {
            properties.insert("tls".into(), json!(true));
        }
        LogicalDatabase::new("db-1", properties)
    }

    fn record(&self, classifier: &Classifier, params: &BaseDbParams) {
        self.classifiers.lock().unwrap().push(classifier.clone());
        self.params.lock().unwrap().push(params.clone());
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn get_or_create_db(
        &self,
        _db_type: DatabaseType,
        classifier: &Classifier,
        params: &BaseDbParams,
    ) -> DbaasResult<LogicalDatabase> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.record(classifier, params);

        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.create_failure.lock().unwrap().clone() {
            return Err(err);
        }

        self.provisioned.lock().unwrap().insert(classifier.clone());
        let password = self.password.lock().unwrap().clone();
        Ok(self.database(password))
    }

    async fn get_connection(
        &self,
        _db_type: DatabaseType,
        classifier: &Classifier,
        params: &BaseDbParams,
    ) -> DbaasResult<LogicalDatabase> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.record(classifier, params);

        if let Some(err) = self.lookup_failure.lock().unwrap().clone() {
            return Err(err);
        }
        if !self.provisioned.lock().unwrap().contains(classifier) {
            return Err(DbaasError::provisioning(
                "Incorrect response from DbaaS. Stop retrying",
                Some(404),
                true,
            ));
        }

        let password = self
            .lookup_password
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.password.lock().unwrap().clone());
        Ok(self.database(password))
    }
}

struct ServerState {
    password: Mutex<String>,
    dead_sessions: Mutex<HashSet<usize>>,
    ping_script: Mutex<VecDeque<DbaasResult<()>>>,
    open_failure: Mutex<Option<DbaasError>>,
    close_failure: Mutex<Option<DbaasError>>,
    hang_closes: AtomicBool,
    opened: Mutex<Vec<ConnectionOptions>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Driver double backed by a simulated server.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<ServerState>,
}

impl MockDriver {
    pub fn new(server_password: &str) -> Self {
        Self {
            state: Arc::new(ServerState {
                password: Mutex::new(server_password.to_string()),
                dead_sessions: Mutex::new(HashSet::new()),
                ping_script: Mutex::new(VecDeque::new()),
                open_failure: Mutex::new(None),
                close_failure: Mutex::new(None),
                hang_closes: AtomicBool::new(false),
                opened: Mutex::new(Vec::new()),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    /// Change the password the server accepts.
    pub fn set_server_password(&self, password: &str) {
        *self.state.password.lock().unwrap() = password.to_string();
    }

    /// Drop the server side of a session; its pings fail from now on.
    pub fn kill(&self, session: usize) {
        self.state.dead_sessions.lock().unwrap().insert(session);
    }

    /// Queue ping outcomes consumed before the simulated server is consulted.
    pub fn script_pings(&self, outcomes: Vec<DbaasResult<()>>) {
        self.state.ping_script.lock().unwrap().extend(outcomes);
    }

    pub fn fail_opens_with(&self, err: Option<DbaasError>) {
        *self.state.open_failure.lock().unwrap() = err;
    }

    pub fn fail_closes_with(&self, err: Option<DbaasError>) {
        *self.state.close_failure.lock().unwrap() = err;
    }

    /// Make `close` wait forever, like a pool waiting on a stuck checkout.
    pub fn hang_closes(&self, hang: bool) {
        self.state.hang_closes.store(hang, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Options of every successful open, in order.
    pub fn opened(&self) -> Vec<ConnectionOptions> {
        self.state.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Conn = MockConnection;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn open(&self, options: &ConnectionOptions) -> DbaasResult<MockConnection> {
        if let Some(err) = self.state.open_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let session = self.state.opens.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.opened.lock().unwrap().push(options.clone());
        Ok(MockConnection {
            session,
            password: options.auth.password.clone(),
            closed: AtomicBool::new(false),
            pings: AtomicUsize::new(0),
            server: Arc::clone(&self.state),
        })
    }
}

pub struct MockConnection {
    session: usize,
    password: String,
    closed: AtomicBool,
    pings: AtomicUsize,
    server: Arc<ServerState>,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("session", &self.session)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MockConnection {
    /// Sequence number of the open that produced this connection, starting at 1.
    pub fn session(&self) -> usize {
        self.session
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn ping(&self) -> DbaasResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(DbaasError::connection("connection is closed", "Reconnect"));
        }
        if let Some(outcome) = self.server.ping_script.lock().unwrap().pop_front() {
            return outcome;
        }
        if self.server.dead_sessions.lock().unwrap().contains(&self.session) {
            return Err(DbaasError::connection(
                "broken pipe",
                "Check network connectivity and database server status",
            ));
        }
        if *self.server.password.lock().unwrap() != self.password {
            return Err(auth_failure());
        }
        Ok(())
    }

    async fn close(&self) -> DbaasResult<()> {
        if self.server.hang_closes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failure = self.server.close_failure.lock().unwrap().clone();
        if let Some(err) = failure {
            return Err(err);
        }
        self.closed.store(true, Ordering::SeqCst);
        self.server.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn auth_failure() -> DbaasError {
    DbaasError::authentication_failed("28P01", "password authentication failed")
}
