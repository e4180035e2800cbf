use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Engine error taxonomy. Parse/Mapping are configuration-time validation
/// failures; Auth/Sync/Lookup/Network surface from the live pipeline and
/// never roll back the caller's local invoice record.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed curl capture. Local, authoring-time, recoverable by re-editing.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid mapping JSON, unknown placeholder token, or an unresolved
    /// placeholder at send time.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Login or CSRF failure against the remote system.
    #[error("authentication failed: {message}")]
    Auth { status: Option<u16>, message: String },

    /// The remote system rejected the invoice creation.
    #[error("invoice sync failed: {message}")]
    Sync { status: Option<u16>, message: String },

    /// No matching remote invoice / PDF.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Timeout, connection refused, DNS.
    #[error("network error: {0}")]
    Network(String),
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth {
            status: None,
            message: message.into(),
        }
    }

    pub fn auth_status(status: u16, message: impl Into<String>) -> Self {
        Error::Auth {
            status: Some(status),
            message: format!("HTTP {}: {}", status, message.into()),
        }
    }

    pub fn sync_status(status: u16, message: impl Into<String>) -> Self {
        Error::Sync {
            status: Some(status),
            message: format!("HTTP {}: {}", status, message.into()),
        }
    }

    /// Classifies a reqwest transport failure. Status-carrying responses are
    /// handled by the callers; everything that never produced a response is
    /// a network error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_request() {
            "request could not be sent"
        } else {
            "transport error"
        };
        Error::Network(format!("{}: {}", kind, err))
    }
}
