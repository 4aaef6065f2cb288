//! The multi-leg web login handshake and its sibling token operations.
//!
//! The flow is linear with one conditional branch: obtain the login form,
//! submit credentials, optionally answer a multi-factor challenge, collect
//! the authorization code from the redirect, exchange it for a bearer and
//! refresh token, and finally trade the bearer token for the durable
//! service token. Each attempt uses a fresh connection with its own cookie
//! jar and redirects disabled, because the `Location` header of the 3xx
//! answer is part of the protocol payload.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::{StatusCode, Url, header};
use serde_json::json;
use tesla_owner_core::AccessToken;
use tesla_owner_core::client::client_settings::USER_AGENT;

use crate::api::{
    BackupCodeVerification, MfaFactorList, MfaOutcome, PasscodeVerification, build_access_token,
    exchange_for_service_token, read_token_response,
};
use crate::pkce::PkceMaterial;
use crate::settings::{SCOPES, SSO_CLIENT_ID};
use crate::{AuthError, AuthSettings};

/// Marker in the credential-submission response that signals a pending
/// multi-factor challenge.
const MFA_MARKER: &str = "/mfa/verify";

/// The factor type the passcode flow can answer.
const SOFTWARE_FACTOR: &str = "token:software";

static HIDDEN_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#)
        .expect("static regex should be valid")
});

/// Answer to a multi-factor challenge: exactly one of the two code kinds.
#[derive(Debug, Clone)]
pub enum MfaCode {
    /// Time-based passcode from an enrolled software authenticator.
    Passcode(String),
    /// One of the account's single-use backup codes.
    BackupCode(String),
}

/// Caller-supplied hook invoked once per login attempt that requires
/// multi-factor authentication. Returning `None` fails the login with
/// [`AuthError::MfaRequired`] before any verification request is made.
pub trait MfaResolver: Send + Sync {
    /// Produce the code for the pending challenge.
    fn resolve(&self) -> Option<MfaCode>;
}

impl<F> MfaResolver for F
where
    F: Fn() -> Option<MfaCode> + Send + Sync,
{
    fn resolve(&self) -> Option<MfaCode> {
        self()
    }
}

/// Turns account credentials into an [`AccessToken`] record. Stateless: the
/// caller owns the returned record and its persistence.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    settings: AuthSettings,
}

impl Authenticator {
    /// Authenticator against the production endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticator against explicit endpoints, used by tests.
    pub fn with_settings(settings: AuthSettings) -> Self {
        Self { settings }
    }

    /// Runs the full login handshake.
    ///
    /// The password never appears in log output below trace level, and the
    /// PKCE material is discarded when this call returns.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        mfa_resolver: Option<&dyn MfaResolver>,
    ) -> Result<AccessToken, AuthError> {
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let pkce = PkceMaterial::generate();
        let http = build_login_http()?;
        let authorize_url = self.authorize_url(&pkce)?;

        tracing::info!("step 1: obtaining the login page");
        tracing::debug!(%authorize_url, "GET authorize");
        let response = http.get(authorize_url.clone()).send().await?;
        let status = response.status();
        tracing::debug!(%status, "authorize response");
        if !status.is_success() {
            return Err(AuthError::Transport(status));
        }

        let page = response.text().await?;
        tracing::trace!(payload = %page);
        let mut form = hidden_inputs(&page);
        let transaction_id = form
            .get("transaction_id")
            .cloned()
            .ok_or_else(|| {
                AuthError::Protocol("login form is missing the transaction_id field".into())
            })?;
        form.insert("identity".into(), email.into());
        form.insert("credential".into(), password.into());

        tracing::info!("step 2: submitting credentials for an authorization code");
        tracing::debug!(%authorize_url, "POST authorize");
        let response = http
            .post(authorize_url.clone())
            .header(
                header::CONTENT_TYPE,
                "application/x-www-form-urlencoded; charset=utf-8",
            )
            .body(serde_qs::to_string(&form).expect("Serialize should be infallible"))
            .send()
            .await?;
        let status = response.status();
        tracing::debug!(%status, "credential submission response");

        let redirect = if status.is_redirection() {
            // No MFA: the authorization code comes straight back.
            response
        } else if status == StatusCode::OK {
            let body = response.text().await?;
            tracing::trace!(payload = %body);

            if body.contains(MFA_MARKER) {
                tracing::info!("step 2a: multi-factor authentication is required");
                let code = mfa_resolver
                    .and_then(MfaResolver::resolve)
                    .ok_or(AuthError::MfaRequired)?;
                self.verify_mfa(&http, &transaction_id, code).await?;
            }

            // Confirm the transaction to pick up the redirect.
            tracing::debug!(%authorize_url, "POST authorize (confirm transaction)");
            let response = http
                .post(authorize_url)
                .json(&json!({ "transaction_id": transaction_id }))
                .send()
                .await?;
            tracing::debug!(status = %response.status(), "transaction confirmation response");
            response
        } else {
            return Err(AuthError::Transport(status));
        };

        if !redirect.status().is_redirection() {
            return Err(AuthError::Protocol(
                "expected a redirect carrying the authorization code".into(),
            ));
        }
        let location = redirect
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AuthError::Protocol("redirect is missing a Location header".into()))?;
        let code = authorization_code_from(location)?;

        tracing::info!("step 3: exchanging the authorization code for a bearer token");
        let sso_token_url = self.settings.sso_token_url();
        tracing::debug!(%sso_token_url, "POST code exchange");
        let response = http
            .post(sso_token_url)
            .json(&json!({
                "grant_type": "authorization_code",
                "client_id": SSO_CLIENT_ID,
                "code": code,
                "code_verifier": pkce.verifier,
                "redirect_uri": self.settings.redirect_uri(),
            }))
            .send()
            .await?;
        let bearer = read_token_response(response, "Bearer").await?;
        let refresh_token = bearer.refresh_token.ok_or_else(|| {
            AuthError::Protocol("code exchange response is missing refresh_token".into())
        })?;

        tracing::info!("step 4: exchanging the bearer token for a service token");
        let service =
            exchange_for_service_token(&http, &self.settings, &bearer.access_token).await?;

        build_access_token(service, refresh_token)
    }

    /// Exchanges a stored refresh token for a new [`AccessToken`] record.
    /// Safe to call repeatedly; the vendor rotates tokens on every call.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let http = build_login_http()?;
        let sso_token_url = self.settings.sso_token_url();

        tracing::info!("refreshing the service token");
        tracing::debug!(%sso_token_url, "POST refresh grant");
        let response = http
            .post(sso_token_url)
            .json(&json!({
                "grant_type": "refresh_token",
                "client_id": SSO_CLIENT_ID,
                "refresh_token": refresh_token,
                "scope": SCOPES,
            }))
            .send()
            .await?;
        let bearer = read_token_response(response, "Bearer").await?;
        let refresh_token = bearer.refresh_token.ok_or_else(|| {
            AuthError::Protocol("refresh response is missing refresh_token".into())
        })?;

        let service =
            exchange_for_service_token(&http, &self.settings, &bearer.access_token).await?;

        build_access_token(service, refresh_token)
    }

    /// Best-effort revocation of a service token. Failures are logged and
    /// reported as `false`, never raised.
    pub async fn revoke(&self, token: &str) -> bool {
        let http = match build_login_http() {
            Ok(http) => http,
            Err(error) => {
                tracing::warn!(%error, "could not build a client for token revocation");
                return false;
            }
        };

        let revoke_url = self.settings.revoke_url();
        tracing::debug!(%revoke_url, "POST token revocation");
        match http.post(revoke_url).json(&json!({ "token": token })).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "token revocation was not accepted");
                false
            }
            Err(error) => {
                tracing::warn!(%error, "token revocation request failed");
                false
            }
        }
    }

    fn authorize_url(&self, pkce: &PkceMaterial) -> Result<Url, AuthError> {
        let redirect_uri = self.settings.redirect_uri();
        Url::parse_with_params(
            &self.settings.authorize_url(),
            &[
                ("client_id", SSO_CLIENT_ID),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", pkce.state.as_str()),
            ],
        )
        .map_err(|error| AuthError::Protocol(format!("invalid authorize url: {error}")))
    }

    /// Resolves the pending challenge with the verification endpoint. The
    /// passcode outcome must be valid, approved and unflagged; the backup
    /// code outcome only valid. The asymmetry is vendor behavior.
    async fn verify_mfa(
        &self,
        http: &reqwest::Client,
        transaction_id: &str,
        code: MfaCode,
    ) -> Result<(), AuthError> {
        let body = match &code {
            MfaCode::Passcode(passcode) => {
                let factors_url = format!(
                    "{}?transaction_id={transaction_id}",
                    self.settings.mfa_factors_url()
                );
                tracing::debug!(%factors_url, "GET mfa factors");
                let response = http.get(&factors_url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(AuthError::Transport(status));
                }
                let text = response.text().await?;
                tracing::trace!(payload = %text);

                let factors: MfaFactorList = serde_json::from_str(&text)?;
                let factor = factors
                    .data
                    .into_iter()
                    .find(|factor| factor.factor_type == SOFTWARE_FACTOR)
                    .ok_or(AuthError::NoSoftwareMfaFactor)?;

                json!({
                    "transaction_id": transaction_id,
                    "factor_id": factor.id,
                    "passcode": passcode,
                })
            }
            MfaCode::BackupCode(backup_code) => json!({
                "transaction_id": transaction_id,
                "backup_code": backup_code,
            }),
        };

        let verify_url = self.settings.mfa_verify_url();
        tracing::debug!(%verify_url, "POST mfa verify");
        let response = http.post(verify_url).json(&body).send().await?;
        let status = response.status();
        tracing::debug!(%status, "mfa verify response");
        if !status.is_success() {
            return Err(AuthError::Transport(status));
        }

        let text = response.text().await?;
        tracing::trace!(payload = %text);
        if text.contains("error") {
            return Err(AuthError::MfaVerification);
        }

        match code {
            MfaCode::Passcode(_) => {
                let outcome: MfaOutcome<PasscodeVerification> = serde_json::from_str(&text)?;
                let data = outcome.data;
                if !data.valid || data.flagged || !data.approved {
                    return Err(AuthError::MfaVerification);
                }
            }
            MfaCode::BackupCode(_) => {
                let outcome: MfaOutcome<BackupCodeVerification> = serde_json::from_str(&text)?;
                if !outcome.data.valid {
                    return Err(AuthError::MfaVerification);
                }
            }
        }
        Ok(())
    }
}

/// Connection for one login attempt: cookie jar on, redirects off.
fn build_login_http() -> Result<reqwest::Client, AuthError> {
    Ok(reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(USER_AGENT)
        .build()?)
}

/// Collects every hidden input of the login form into name/value pairs.
fn hidden_inputs(page: &str) -> BTreeMap<String, String> {
    HIDDEN_INPUT
        .captures_iter(page)
        .map(|capture| (capture[1].to_string(), capture[2].to_string()))
        .collect()
}

/// Pulls the `code` query parameter out of the redirect target.
fn authorization_code_from(location: &str) -> Result<String, AuthError> {
    let url = Url::parse(location)
        .map_err(|error| AuthError::Protocol(format!("invalid redirect location: {error}")))?;
    url.query_pairs()
        .find(|(name, _)| name == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            AuthError::Protocol("redirect location is missing the code parameter".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form method="post" id="form">
            <input type="hidden" name="_csrf" value="abc123">
            <input type="hidden" name="_phase" value="authenticate">
            <input type="hidden" name="_process" value="1">
            <input type="hidden" name="transaction_id" value="tx-9000">
            <input type="hidden" name="cancel" value="">
            <input type="text" name="identity">
        </form>
        </body></html>"#;

    #[test]
    fn hidden_inputs_are_collected_by_name() {
        let form = hidden_inputs(LOGIN_PAGE);
        assert_eq!(form.len(), 5);
        assert_eq!(form.get("transaction_id").map(String::as_str), Some("tx-9000"));
        assert_eq!(form.get("cancel").map(String::as_str), Some(""));
        // Visible inputs are not part of the replayed form state.
        assert!(!form.contains_key("identity"));
    }

    #[test]
    fn authorization_code_is_extracted_from_the_location_query() {
        let code = authorization_code_from(
            "https://auth.tesla.com/void/callback?code=ABC123&state=xyz",
        )
        .unwrap();
        assert_eq!(code, "ABC123");
    }

    #[test]
    fn location_without_a_code_is_a_protocol_error() {
        let err =
            authorization_code_from("https://auth.tesla.com/void/callback?state=xyz").unwrap_err();
        assert!(matches!(err, AuthError::Protocol(_)));
    }

    #[test]
    fn unparsable_location_is_a_protocol_error() {
        assert!(matches!(
            authorization_code_from("/void/callback?code=ABC123"),
            Err(AuthError::Protocol(_))
        ));
    }
}
