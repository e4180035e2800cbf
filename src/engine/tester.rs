use serde::{Deserialize, Serialize};

use super::session::Session;
use crate::error::Error;

/// Outcome of a configuration test, shaped for the settings UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConnectionResult {
    pub success: bool,
    pub message: String,
}

/// Maps the login-handshake outcome to a distinguishing operator message:
/// network/timeout failure, HTTP-status failure and missing-CSRF-token
/// failure each read differently. The tester runs only the handshake and
/// has zero side effects on the remote system.
pub fn result_from(outcome: Result<Session, Error>) -> TestConnectionResult {
    match outcome {
        Ok(session) => TestConnectionResult {
            success: true,
            message: format!(
                "login succeeded, {} session cookie(s) captured",
                session.cookies().len()
            ),
        },
        Err(Error::Network(message)) => TestConnectionResult {
            success: false,
            message: format!("network failure: {}", message),
        },
        Err(Error::Auth { message, .. }) => TestConnectionResult {
            success: false,
            // Carries the HTTP status for status failures and the selector
            // for a missing CSRF token.
            message,
        },
        Err(other) => TestConnectionResult {
            success: false,
            message: other.to_string(),
        },
    }
}
