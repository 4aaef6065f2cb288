//! Errors that can occur when calling the Owner API

use reqwest::StatusCode;
use thiserror::Error;

/// Errors from performing authenticated Owner API requests.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("Received error message from server: [{}]", .status)]
    ResponseContent { status: StatusCode },

    #[error(transparent)]
    VehicleAsleep(#[from] VehicleAsleepError),
    #[error(transparent)]
    InvalidToken(#[from] InvalidTokenError),
}

/// The vehicle did not answer (HTTP 408). The caller is expected to wake it
/// up and try again; the client never retries this on its own.
#[derive(Debug, Error)]
#[error("The vehicle is asleep and must be woken up before this call can succeed")]
pub struct VehicleAsleepError;

/// The service token was rejected and no replacement could be obtained,
/// either because no refresh capability was registered or because the
/// refreshed token was rejected as well.
#[derive(Debug, Error)]
#[error("The access token is invalid and could not be refreshed")]
pub struct InvalidTokenError;
