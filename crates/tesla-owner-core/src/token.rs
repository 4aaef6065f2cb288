//! The service token record and the trait for renewing it. The renewal
//! implementation lives in the `tesla-owner-auth` crate; the client only
//! knows the capability.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The durable Owner API token produced by a login or refresh, together
/// with everything needed to renew it later. Persisting this record between
/// runs is the caller's responsibility.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The service access token sent as the Bearer credential on every call.
    pub token: String,
    /// Long-lived token accepted by the refresh grant.
    pub refresh_token: String,
    /// Server-reported creation time of the service token.
    pub created_utc: DateTime<Utc>,
    /// Local exchange time plus the server-reported `expires_in`.
    pub expiration_utc: DateTime<Utc>,
}

impl AccessToken {
    /// True when the token expires within `margin` of now. Callers that
    /// persist the record use this to refresh ahead of time instead of
    /// waiting for the first 401.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expiration_utc <= Utc::now() + margin
    }
}

/// Capability for renewing the service token after the server rejects it.
///
/// Implementations are expected to run a refresh-token exchange and persist
/// the resulting [`AccessToken`] record; the client only needs the new token
/// string. Returning `None` means renewal is not possible and the rejection
/// is final.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns a fresh service token, or `None` when renewal failed.
    async fn refresh_access_token(&self) -> Option<String>;
}
