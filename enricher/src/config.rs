use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Timeout cannot be 0 for {0}")]
    InvalidTimeout(&'static str),

    #[error("Route path prefix cannot be empty")]
    EmptyPathPrefix,

    #[error("Route action has an empty resource or method")]
    EmptyAction,

    #[error("Empty caller token")]
    EmptyCallerToken,

    #[error("Duplicate caller token for caller: {0}")]
    DuplicateCallerToken(String),

    #[error("All-establishments marker cannot be empty")]
    EmptyAllEstablishments,
}

/// Enrichment gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming requests
    pub listener: Listener,
    /// Admin listener for health, readiness and reload endpoints
    pub admin_listener: Listener,
    /// The source-of-truth service whose responses get enriched
    pub upstream: UpstreamConfig,
    /// The plugin runner that fans queries out to providers
    pub runner: RunnerConfig,
    /// Locations of the access-control, sources and resources documents
    pub documents: DocumentsConfig,
    /// Routes whose responses are candidates for enrichment
    pub routes: Vec<Route>,
    /// Callers allowed to trigger enrichment, keyed by credential token
    #[serde(default)]
    pub callers: Vec<CallerConfig>,
    /// Establishment value that requests aggregation across every
    /// establishment of the project
    #[serde(default = "default_all_establishments")]
    pub all_establishments: String,
}

fn default_all_establishments() -> String {
    "all".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.upstream.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("upstream"));
        }
        if self.runner.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("runner"));
        }

        for route in &self.routes {
            route.validate()?;
        }

        let mut tokens = HashSet::new();
        for caller in &self.callers {
            if caller.token.is_empty() {
                return Err(ValidationError::EmptyCallerToken);
            }
            if !tokens.insert(&caller.token) {
                return Err(ValidationError::DuplicateCallerToken(caller.name.clone()));
            }
        }

        if self.all_establishments.is_empty() {
            return Err(ValidationError::EmptyAllEstablishments);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    pub url: Url,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Endpoint accepting `POST` queries
    pub url: Url,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DocumentsConfig {
    pub acl: PathBuf,
    pub sources: PathBuf,
    pub resources: PathBuf,
    /// Namespace the runner loads provider plugins from
    pub plugins_module: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CallerConfig {
    pub token: String,
    pub name: String,
    #[serde(default)]
    pub superuser: bool,
}

/// Routing rule configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Route {
    /// Conditions for matching incoming requests
    pub r#match: Match,
    /// Resource and method the matched requests are enriched as
    pub action: Action,
}

impl Route {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.r#match.path_prefix.is_empty() {
            return Err(ValidationError::EmptyPathPrefix);
        }
        if self.action.resource.is_empty() || self.action.method.is_empty() {
            return Err(ValidationError::EmptyAction);
        }
        Ok(())
    }
}

/// Request matching criteria
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Match {
    /// Optional hostname to match (e.g., "api.example.com")
    pub host: Option<String>,
    /// Path prefix to match (e.g., "/api/members/")
    pub path_prefix: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Action {
    pub resource: String,
    pub method: String,
    /// Index of the path segment holding the resource id, counting
    /// non-empty segments from 0
    pub id_segment: usize,
}
