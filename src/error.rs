use std::error::Error as StdError;
use thiserror::Error;

/// Failures talking to the panel's HTTP API.
///
/// Transport variants carry the rendered error chain so fakes and tests can
/// build them without a live `reqwest::Error`.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection reset by device: {0}")]
    Reset(String),
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("BAD {status}: {body}")]
    Status { status: u16, body: String },
    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid reading: {0}")]
    Invalid(String),
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        let msg = error_chain(&e);
        if e.is_timeout() {
            DeviceError::Timeout(msg)
        } else if e.is_connect() {
            DeviceError::Connect(msg)
        } else if (e.is_request() && !e.is_builder()) || e.is_body() {
            // the connection was dropped or spoke garbage before a full response arrived
            DeviceError::Reset(msg)
        } else {
            DeviceError::Transport(msg)
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DB error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store rejected insert with {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("device unreachable after {attempts} attempts. Last error: {last}")]
    DeviceUnreachable {
        attempts: u32,
        #[source]
        last: DeviceError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CollectorError>;

/// Render an error with all of its sources, `outer: inner: root`.
pub(crate) fn error_chain(e: &dyn StdError) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        let text = s.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = s.source();
    }
    out
}
