use thiserror::Error;

/// Result type alias for enrichment operations
pub type Result<T, E = EnrichError> = std::result::Result<T, E>;

/// A required request fact could not be derived.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("request was not marked for enrichment")]
    MissingMarker,

    #[error("no resource id found in the request path")]
    MissingId,

    #[error("id segment {index} is out of range for a path with {segments} segments")]
    IdSegmentOutOfRange { index: usize, segments: usize },

    #[error("missing required query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("could not determine the request host")]
    MissingHost,

    #[error("could not determine the remote address")]
    MissingRemoteIp,

    #[error("response body is not valid JSON: {0}")]
    MalformedBody(String),
}

/// The runner collaborator failed as a whole.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("runner request failed: {0}")]
    Transport(String),

    #[error("runner timed out")]
    Timeout,

    #[error("runner answered with status {0}")]
    Status(u16),

    #[error("runner returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("dispatch task failed: {0}")]
    Join(String),
}

/// The configuration documents could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration document {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse configuration document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration document: {0}")]
    Invalid(String),
}

/// Errors that terminate enrichment of a request.
///
/// Every variant is reported to the client as `{"error": "<message>"}` with status 500.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("{0}")]
    Providers(String),

    #[error("could not serialize merged payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnrichError {
    /// Short label used to tag metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichError::Classification(_) => "classification",
            EnrichError::Dispatch(_) => "dispatch",
            EnrichError::Configuration(_) => "configuration",
            EnrichError::Providers(_) => "providers",
            EnrichError::Serialization(_) => "serialization",
        }
    }
}

/// Forwarding the request to the upstream service failed.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream {0} timed out")]
    Timeout(String),

    #[error("upstream {0} request failed: {1}")]
    RequestFailed(String, String),

    #[error("could not read upstream response body: {0}")]
    ResponseBody(String),
}
