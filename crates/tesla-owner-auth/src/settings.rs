//! Vendor endpoint constants and the settings struct that lets tests point
//! the handshake at a mock server. The path layout and client identity are
//! vendor-defined and must be preserved exactly.

use tesla_owner_core::client::client_settings::OWNER_API_URL;

/// Production SSO base.
pub const AUTH_URL: &str = "https://auth.tesla.com/";

/// OAuth client id used for the web login and refresh grants.
pub const SSO_CLIENT_ID: &str = "ownerapi";

/// Scopes requested by the authorization and refresh legs.
pub const SCOPES: &str = "openid email offline_access";

/// Fixed vendor-issued identity for the service-token exchange. Not a
/// secret in any meaningful sense; it ships in every Owner API client.
pub const OWNER_CLIENT_ID: &str =
    "81527cff06843c8634fdc09e8ac0abefb46ac849f38fe1e431c2ef2106796384";
/// Companion secret to [`OWNER_CLIENT_ID`].
pub const OWNER_CLIENT_SECRET: &str =
    "c7257eb71a564034f9419ee651c7d0e5f7aa6bfbd18bafb5c5c033b093bb2fa3";

const AUTHORIZE_PATH: &str = "oauth2/v3/authorize";
const MFA_FACTORS_PATH: &str = "oauth2/v3/authorize/mfa/factors";
const MFA_VERIFY_PATH: &str = "oauth2/v3/authorize/mfa/verify";
const SSO_TOKEN_PATH: &str = "oauth2/v3/token";
const REDIRECT_PATH: &str = "void/callback";
const SERVICE_TOKEN_PATH: &str = "oauth/token";
const REVOKE_PATH: &str = "oauth/revoke";

/// Targets and client identity for one authenticator instance. Defaults to
/// the production endpoints; only tests should need to change the urls.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// SSO base url. Defaults to `https://auth.tesla.com/`
    pub auth_url: String,
    /// Owner API base url, used for the service-token and revocation legs.
    /// Defaults to `https://owner-api.teslamotors.com/`
    pub owner_api_url: String,
    /// Client id for the service-token exchange.
    pub client_id: String,
    /// Client secret for the service-token exchange.
    pub client_secret: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            auth_url: AUTH_URL.into(),
            owner_api_url: OWNER_API_URL.into(),
            client_id: OWNER_CLIENT_ID.into(),
            client_secret: OWNER_CLIENT_SECRET.into(),
        }
    }
}

impl AuthSettings {
    pub(crate) fn authorize_url(&self) -> String {
        format!("{}{}", self.auth_url, AUTHORIZE_PATH)
    }

    pub(crate) fn mfa_factors_url(&self) -> String {
        format!("{}{}", self.auth_url, MFA_FACTORS_PATH)
    }

    pub(crate) fn mfa_verify_url(&self) -> String {
        format!("{}{}", self.auth_url, MFA_VERIFY_PATH)
    }

    pub(crate) fn sso_token_url(&self) -> String {
        format!("{}{}", self.auth_url, SSO_TOKEN_PATH)
    }

    pub(crate) fn redirect_uri(&self) -> String {
        format!("{}{}", self.auth_url, REDIRECT_PATH)
    }

    pub(crate) fn service_token_url(&self) -> String {
        format!("{}{}", self.owner_api_url, SERVICE_TOKEN_PATH)
    }

    pub(crate) fn revoke_url(&self) -> String {
        format!("{}{}", self.owner_api_url, REVOKE_PATH)
    }
}
