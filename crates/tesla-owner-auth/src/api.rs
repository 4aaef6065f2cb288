//! Wire shapes of the SSO and Owner API token endpoints, and the senders
//! shared between the login and refresh flows.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tesla_owner_core::AccessToken;

use crate::{AuthError, AuthSettings};

/// Body returned by every OAuth token endpoint.
#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub created_at: i64,
    pub token_type: String,
}

/// One enrolled multi-factor method.
#[derive(Deserialize, Debug)]
pub(crate) struct MfaFactor {
    pub id: String,
    #[serde(rename = "factorType")]
    pub factor_type: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct MfaFactorList {
    pub data: Vec<MfaFactor>,
}

/// `{"data": ...}` wrapper around the verification outcomes.
#[derive(Deserialize, Debug)]
pub(crate) struct MfaOutcome<T> {
    pub data: T,
}

#[derive(Deserialize, Debug)]
pub(crate) struct PasscodeVerification {
    pub approved: bool,
    pub flagged: bool,
    pub valid: bool,
}

#[derive(Deserialize, Debug)]
pub(crate) struct BackupCodeVerification {
    pub valid: bool,
}

/// Reads a token endpoint response, insisting on the exact `token_type` the
/// leg is specified to return. The SSO endpoint reports `Bearer`, the
/// service-token endpoint `bearer`; the case difference is intentional
/// vendor behavior.
pub(crate) async fn read_token_response(
    response: reqwest::Response,
    expected_token_type: &str,
) -> Result<TokenResponse, AuthError> {
    let status = response.status();
    tracing::debug!(%status, "token endpoint response");
    if !status.is_success() {
        return Err(AuthError::Transport(status));
    }

    let body = response.text().await?;
    tracing::trace!(payload = %body);

    let token: TokenResponse = serde_json::from_str(&body)?;
    if token.token_type != expected_token_type {
        return Err(AuthError::TokenExchange);
    }
    Ok(token)
}

/// Trades a short-lived SSO bearer token for the durable service token.
pub(crate) async fn exchange_for_service_token(
    http: &reqwest::Client,
    settings: &AuthSettings,
    bearer_token: &str,
) -> Result<TokenResponse, AuthError> {
    let url = settings.service_token_url();
    tracing::debug!(%url, "POST service token exchange");
    let response = http
        .post(url)
        .bearer_auth(bearer_token)
        .json(&json!({
            "grant_type": "urn:ietf:params:oauth:grant-type:jwt-bearer",
            "client_id": settings.client_id,
            "client_secret": settings.client_secret,
        }))
        .send()
        .await?;

    read_token_response(response, "bearer").await
}

/// Builds the persisted record from the service-token response and the
/// refresh token captured during the SSO exchange. The expiration is always
/// derived from the server-reported `expires_in`, never guessed.
pub(crate) fn build_access_token(
    service: TokenResponse,
    refresh_token: String,
) -> Result<AccessToken, AuthError> {
    let created_utc = DateTime::<Utc>::from_timestamp(service.created_at, 0)
        .ok_or_else(|| AuthError::Protocol("created_at timestamp is out of range".into()))?;

    Ok(AccessToken {
        token: service.access_token,
        refresh_token,
        created_utc,
        expiration_utc: Utc::now() + Duration::seconds(service.expires_in),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_record_uses_the_reported_created_at() {
        let service = TokenResponse {
            access_token: "S1".into(),
            refresh_token: None,
            expires_in: 300,
            created_at: 1_700_000_000,
            token_type: "bearer".into(),
        };
        let record = build_access_token(service, "R1".into()).unwrap();
        assert_eq!(
            record.created_utc,
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
        );
        assert_eq!(record.token, "S1");
        assert_eq!(record.refresh_token, "R1");
        assert!(record.expiration_utc > record.created_utc);
    }

    #[test]
    fn out_of_range_created_at_is_a_protocol_error() {
        let service = TokenResponse {
            access_token: "S1".into(),
            refresh_token: None,
            expires_in: 300,
            created_at: i64::MAX,
            token_type: "bearer".into(),
        };
        assert!(matches!(
            build_access_token(service, "R1".into()),
            Err(AuthError::Protocol(_))
        ));
    }
}
