use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Production Owner API base. The path layout below it is a vendor constant
/// and must not change.
pub const OWNER_API_URL: &str = "https://owner-api.teslamotors.com/";

/// User agent the vendor endpoints are known to accept.
pub const USER_AGENT: &str = "curl / 6.14.0";

/// Basic client behavior settings. These specify the target and transport
/// behavior of the Owner API client and are uneditable once the client is
/// initialized.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ClientSettings {
    /// The Owner API base url. Defaults to `https://owner-api.teslamotors.com/`
    pub owner_api_url: String,
    /// The user_agent sent with every request. Defaults to `curl / 6.14.0`
    pub user_agent: String,
    /// Optional per-request deadline. Applies to every network call made by
    /// the client, including the retried attempt after a token refresh.
    #[serde(skip)]
    pub request_timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            owner_api_url: OWNER_API_URL.into(),
            user_agent: USER_AGENT.into(),
            request_timeout: None,
        }
    }
}
