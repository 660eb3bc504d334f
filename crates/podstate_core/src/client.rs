//! Client context: the one place backends are constructed.
//!
//! Built once at process start and handed to the view controller (or any
//! other front end), which takes the identity session, record feed and
//! mutator from it. There are no module-level store or auth handles.

use crate::auth::{AuthError, IdentityProvider, IdentitySession, LocalIdentityProvider};
use crate::config::{ClientConfig, ConfigError};
use crate::events::{FailureObserver, FailureReporter};
use crate::repo::calculation_repo::CalculationFeed;
use crate::service::calculation_service::CalculationService;
use crate::store::{DocumentStore, SqliteDocumentStore, StoreError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug)]
pub enum ClientError {
    Config(ConfigError),
    Store(StoreError),
    Auth(AuthError),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "document store init failed: {err}"),
            Self::Auth(err) => write!(f, "identity provider init failed: {err}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Auth(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<StoreError> for ClientError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<AuthError> for ClientError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

#[derive(Clone)]
pub struct ClientContext {
    config: Arc<ClientConfig>,
    store: Arc<dyn DocumentStore>,
    identity: Arc<IdentitySession>,
    failures: Arc<FailureReporter>,
}

impl ClientContext {
    /// Opens the local store and identity provider described by `config`.
    ///
    /// Both share `config.store_path` when set; otherwise each gets its own
    /// in-memory database.
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        let (store, provider) = match config.store_path.as_ref() {
            Some(path) => (
                SqliteDocumentStore::open(path)?,
                LocalIdentityProvider::open(path)?,
            ),
            None => (
                SqliteDocumentStore::open_in_memory()?,
                LocalIdentityProvider::open_in_memory()?,
            ),
        };
        Self::with_backends(config, Arc::new(store), Arc::new(provider))
    }

    /// Builds a context over caller-supplied backends.
    pub fn with_backends(
        config: ClientConfig,
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let failures = Arc::new(FailureReporter::new());
        let identity = Arc::new(IdentitySession::new(
            provider,
            config.initial_auth_token.clone(),
            Arc::clone(&failures),
        ));
        info!(
            "event=client_init module=client status=ok persistent={} injected_token={}",
            config.store_path.is_some(),
            config.initial_auth_token.is_some()
        );
        Ok(Self {
            config: Arc::new(config),
            store,
            identity,
            failures,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        self.config.app_namespace()
    }

    pub fn identity(&self) -> Arc<IdentitySession> {
        Arc::clone(&self.identity)
    }

    pub fn feed(&self) -> CalculationFeed {
        CalculationFeed::new(
            Arc::clone(&self.store),
            self.namespace(),
            Arc::clone(&self.failures),
        )
    }

    pub fn mutator(&self) -> CalculationService {
        CalculationService::new(
            Arc::clone(&self.store),
            self.namespace(),
            Arc::clone(&self.failures),
        )
    }

    pub fn failures(&self) -> Arc<FailureReporter> {
        Arc::clone(&self.failures)
    }

    /// Opts into failure events that are otherwise only logged.
    pub fn add_failure_observer(&self, observer: Arc<dyn FailureObserver>) {
        self.failures.add_observer(observer);
    }
}
