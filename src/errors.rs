//! Error hierarchy for the Consul parameter provider
//!
//! Errors are grouped by the phase that produces them: start-up failures
//! abort [`crate::Provider::start`], store failures are transient inside the
//! watch loop, and [`Error::Cancelled`] is the clean-shutdown sentinel.

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures that abort provider start-up
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// Transport or protocol failures talking to the store
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Settings could not be loaded or deserialized
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings were loaded but failed validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The operation observed the cancellation signal
    #[error("operation cancelled")]
    Cancelled,

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether this error is the cancellation sentinel rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The chained source never supplied the store address
    #[error(
        "error initializing Consul KV provider: Consul URL is expected to be provided on parameter {reference:?}, but it wasn't"
    )]
    MissingReference { reference: String },

    /// The chained source failed while being asked for the store address
    #[error("error reading Consul URL from parameter {reference:?}: {message}")]
    UpstreamLookup { reference: String, message: String },

    /// The resolved address is not something the client can connect to
    #[error("Invalid Consul address: {0:?}")]
    InvalidAddress(String),

    /// The HTTP client could not be constructed
    #[error("Failed to build Consul client: {0}")]
    ClientBuild(String),

    /// No address resolution strategy was configured
    #[error("Provider has no address resolver; use an address or a parameter reference")]
    MissingResolver,

    /// `start` was called while a worker is still running
    #[error("Provider is already started")]
    AlreadyStarted,

    /// The background worker ended before reporting its first snapshot
    #[error("Update worker exited before producing the initial snapshot")]
    WorkerExited,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection, timeout or body transfer failures
    #[error("Consul request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status other than 404
    #[error("Unexpected response code: {status} ({body})")]
    UnexpectedStatus { status: u16, body: String },

    /// Blocking queries are impossible without the index header
    #[error("Missing X-Consul-Index header in response")]
    MissingIndexHeader,

    #[error("Failed to parse X-Consul-Index header: {0:?}")]
    InvalidIndexHeader(String),

    /// Response body is not the expected KV listing
    #[error("Failed to decode KV response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Value of key {key:?} is not valid base64")]
    InvalidValueEncoding {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

// ============== Conversion Implementations ============== //
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Store(StoreError::Request(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(StoreError::Decode(e))
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::Fatal(format!("Background task failed: {err}"))
    }
}
