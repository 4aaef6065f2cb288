//! Errors raised by the login handshake and the token operations

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a login, refresh or token-exchange operation.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A step that expected success got a non-2xx answer.
    #[error("Authentication request failed with status {0}")]
    Transport(StatusCode),

    /// A response violated the expected protocol shape.
    #[error("Unexpected authentication flow: {0}")]
    Protocol(String),

    /// The server demanded multi-factor authentication and no resolver or
    /// code was supplied.
    #[error(
        "Account has multi-factor authentication enabled. You must supply a passcode or backup passcode"
    )]
    MfaRequired,

    /// The account has no `token:software` factor enrolled, which is the
    /// only factor type the passcode flow can answer.
    #[error("No software MFA factor is enrolled for this account")]
    NoSoftwareMfaFactor,

    /// The server rejected or flagged the supplied passcode or backup code.
    #[error("The multi-factor verification code could not be validated")]
    MfaVerification,

    /// A token-exchange leg reported an unexpected token type.
    #[error("Token exchange returned an unexpected token type")]
    TokenExchange,

    /// Login was called with an empty email or password.
    #[error("Email and password must not be empty")]
    InvalidCredentials,

    #[allow(missing_docs)]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[allow(missing_docs)]
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
