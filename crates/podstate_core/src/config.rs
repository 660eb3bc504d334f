//! Static client configuration.
//!
//! # Responsibility
//! - Parse the application credentials object.
//! - Resolve the app namespace used in partition paths.
//! - Pick up the optional injected initial-session token.
//!
//! # Invariants
//! - The namespace is a valid single path segment.
//! - The token is never read from anywhere but the caller or
//!   `PODSTATE_INITIAL_AUTH_TOKEN`.

use crate::store::path::is_valid_segment;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

/// Environment variable carrying the optional pre-issued sign-in token.
pub const INITIAL_AUTH_TOKEN_ENV: &str = "PODSTATE_INITIAL_AUTH_TOKEN";
/// Namespace used when neither an explicit namespace nor a project id is set.
pub const DEFAULT_APP_NAMESPACE: &str = "default-app-id";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    InvalidNamespace(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid credentials json: {err}"),
            Self::InvalidNamespace(value) => {
                write!(f, "app namespace `{value}` is not a valid path segment")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidNamespace(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Application credentials as issued by the hosting console.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppCredentials {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

impl Debug for AppCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("api_key", &"<redacted>")
            .field("auth_domain", &self.auth_domain)
            .field("project_id", &self.project_id)
            .field("storage_bucket", &self.storage_bucket)
            .field("messaging_sender_id", &self.messaging_sender_id)
            .field("app_id", &self.app_id)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub credentials: AppCredentials,
    /// Overrides the namespace derived from `credentials.project_id`.
    pub app_namespace: Option<String>,
    pub initial_auth_token: Option<String>,
    /// Database file backing the local store; in-memory when `None`.
    pub store_path: Option<PathBuf>,
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("credentials", &self.credentials)
            .field("app_namespace", &self.app_namespace)
            .field(
                "initial_auth_token",
                &self.initial_auth_token.as_ref().map(|_| "<redacted>"),
            )
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(credentials: AppCredentials) -> Self {
        Self {
            credentials,
            app_namespace: None,
            initial_auth_token: None,
            store_path: None,
        }
    }

    /// Parses the credentials JSON object (`apiKey`, `projectId`, ...).
    pub fn from_credentials_json(json: &str) -> ConfigResult<Self> {
        let credentials = serde_json::from_str::<AppCredentials>(json)?;
        let config = Self::new(credentials);
        config.validate()?;
        Ok(config)
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn with_initial_auth_token(mut self, token: Option<String>) -> Self {
        self.initial_auth_token = normalize_token(token);
        self
    }

    /// Reads [`INITIAL_AUTH_TOKEN_ENV`]; blank values count as absent.
    pub fn with_env_token(self) -> Self {
        let token = std::env::var(INITIAL_AUTH_TOKEN_ENV).ok();
        self.with_initial_auth_token(token)
    }

    pub fn with_app_namespace(mut self, namespace: impl Into<String>) -> ConfigResult<Self> {
        self.app_namespace = Some(namespace.into());
        self.validate()?;
        Ok(self)
    }

    /// Explicit namespace, else project id, else [`DEFAULT_APP_NAMESPACE`].
    pub fn app_namespace(&self) -> &str {
        let explicit = self.app_namespace.as_deref().map(str::trim);
        match explicit {
            Some(value) if !value.is_empty() => value,
            _ => match self.credentials.project_id.trim() {
                "" => DEFAULT_APP_NAMESPACE,
                project_id => project_id,
            },
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let namespace = self.app_namespace();
        if !is_valid_segment(namespace) {
            return Err(ConfigError::InvalidNamespace(namespace.to_string()));
        }
        Ok(())
    }
}

fn normalize_token(token: Option<String>) -> Option<String> {
    token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{AppCredentials, ClientConfig, ConfigError, DEFAULT_APP_NAMESPACE};

    const CREDENTIALS: &str = r#"{
        "apiKey": "secret-key",
        "authDomain": "demo.example.com",
        "projectId": "demo-project",
        "storageBucket": "demo.appspot.com",
        "messagingSenderId": "42",
        "appId": "1:42:web:abc"
    }"#;

    #[test]
    fn namespace_defaults_to_project_id() {
        let config = ClientConfig::from_credentials_json(CREDENTIALS).unwrap();
        assert_eq!(config.app_namespace(), "demo-project");
        assert_eq!(config.credentials.app_id, "1:42:web:abc");
    }

    #[test]
    fn namespace_falls_back_when_project_id_missing() {
        let config = ClientConfig::new(AppCredentials::default());
        assert_eq!(config.app_namespace(), DEFAULT_APP_NAMESPACE);
    }

    #[test]
    fn explicit_namespace_must_be_a_segment() {
        let config = ClientConfig::from_credentials_json(CREDENTIALS).unwrap();
        let err = config.clone().with_app_namespace("a/b").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNamespace(_)));

        let config = config.with_app_namespace("custom").unwrap();
        assert_eq!(config.app_namespace(), "custom");
    }

    #[test]
    fn blank_token_counts_as_absent() {
        let config = ClientConfig::new(AppCredentials::default())
            .with_initial_auth_token(Some("   ".to_string()));
        assert!(config.initial_auth_token.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = ClientConfig::from_credentials_json(CREDENTIALS)
            .unwrap()
            .with_initial_auth_token(Some("tok".to_string()));
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(!rendered.contains("\"tok\""));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ClientConfig::from_credentials_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
