use std::sync::Arc;

use reqwest::{Method, StatusCode, header};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::{
    ApiError, InvalidTokenError, VehicleAsleepError,
    client::{
        ClientSettings,
        response::{ListResponse, OneResponse},
    },
    models::{CommandResponse, Vehicle},
    token::TokenRefresher,
};

/// The current token and the connection built for it. The connection is
/// dropped whenever the token changes so the next attempt picks up the new
/// Bearer header.
struct SessionState {
    token: String,
    http: Option<reqwest::Client>,
}

/// The main struct to interact with the Owner API.
///
/// Every operation goes through the same recovery pass: a 401/403 response
/// triggers at most one invocation of the injected [`TokenRefresher`]
/// followed by exactly one retry with the replacement token. A 408 means
/// the vehicle is asleep and is surfaced as [`VehicleAsleepError`] without
/// any retry, and a 404 maps to an empty/default result across all
/// operations.
#[derive(Clone)]
pub struct TeslaClient {
    state: Arc<Mutex<SessionState>>,
    settings: ClientSettings,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl TeslaClient {
    /// Create a client from a previously obtained service token. Calls fail
    /// with [`InvalidTokenError`] once the server rejects the token.
    pub fn from_token(token: impl Into<String>, settings: Option<ClientSettings>) -> Self {
        Self::new_internal(token.into(), settings.unwrap_or_default(), None)
    }

    /// Create a client that renews its token through `refresher` when the
    /// server rejects it. The refresher is fixed for the client's lifetime.
    pub fn with_refresher(
        token: impl Into<String>,
        settings: Option<ClientSettings>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self::new_internal(token.into(), settings.unwrap_or_default(), Some(refresher))
    }

    fn new_internal(
        token: String,
        settings: ClientSettings,
        refresher: Option<Arc<dyn TokenRefresher>>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState { token, http: None })),
            settings,
            refresher,
        }
    }

    /// List all vehicles on the account.
    pub async fn vehicles(&self) -> Result<Vec<Vehicle>, ApiError> {
        self.get_list("").await
    }

    /// Fetch the summary record of a single vehicle.
    pub async fn vehicle(&self, id: u64) -> Result<Vehicle, ApiError> {
        self.get_one(&id.to_string()).await
    }

    /// Ask a sleeping vehicle to come online. This is the call to make after
    /// a [`VehicleAsleepError`].
    pub async fn wake_up(&self, id: u64) -> Result<Vehicle, ApiError> {
        self.post_command(&format!("{id}/wake_up")).await
    }

    /// Issue a fire-and-forget vehicle command such as `honk_horn` or
    /// `door_lock`.
    pub async fn command(&self, id: u64, name: &str) -> Result<CommandResponse, ApiError> {
        self.post_command(&format!("{id}/command/{name}")).await
    }

    /// GET an endpoint returning a `{"response": T}` envelope. A 404 yields
    /// `T::default()`.
    pub async fn get_one<T: DeserializeOwned + Default>(
        &self,
        endpoint: &str,
    ) -> Result<T, ApiError> {
        match self.execute(Method::GET, endpoint).await? {
            Some(body) => Ok(serde_json::from_str::<OneResponse<T>>(&body)?.response),
            None => Ok(T::default()),
        }
    }

    /// GET an endpoint returning a `{"response": [T], "count": n}` envelope.
    /// A 404 yields an empty list.
    pub async fn get_list<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, ApiError> {
        match self.execute(Method::GET, endpoint).await? {
            Some(body) => {
                let list = serde_json::from_str::<ListResponse<T>>(&body)?;
                tracing::debug!(count = ?list.count, "list response");
                Ok(list.response)
            }
            None => Ok(Vec::new()),
        }
    }

    /// POST a command endpoint returning a `{"response": T}` envelope. A 404
    /// yields `T::default()`.
    pub async fn post_command<T: DeserializeOwned + Default>(
        &self,
        endpoint: &str,
    ) -> Result<T, ApiError> {
        match self.execute(Method::POST, endpoint).await? {
            Some(body) => Ok(serde_json::from_str::<OneResponse<T>>(&body)?.response),
            None => Ok(T::default()),
        }
    }

    /// Runs one logical call. The loop is two iterations at most: the second
    /// pass happens only after a successful refresh-and-swap, which makes
    /// the exactly-once retry guarantee structural.
    async fn execute(&self, method: Method, endpoint: &str) -> Result<Option<String>, ApiError> {
        let url = format!("{}api/1/vehicles/{}", self.settings.owner_api_url, endpoint);

        for is_retry in [false, true] {
            let (http, token_used) = self.connection().await?;

            tracing::debug!(%method, %url, is_retry, "owner api request");
            let response = http.request(method.clone(), &url).send().await?;
            let status = response.status();
            tracing::debug!(%status, "owner api response");

            match status {
                s if s.is_success() => {
                    let body = response.text().await?;
                    tracing::trace!(payload = %body);
                    return Ok(Some(body));
                }
                StatusCode::REQUEST_TIMEOUT => return Err(VehicleAsleepError.into()),
                StatusCode::NOT_FOUND => return Ok(None),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    if is_retry {
                        return Err(InvalidTokenError.into());
                    }
                    self.refresh_rejected_token(&token_used).await?;
                }
                s => return Err(ApiError::ResponseContent { status: s }),
            }
        }

        Err(InvalidTokenError.into())
    }

    /// Returns the cached connection, building it on first use.
    async fn connection(&self) -> Result<(reqwest::Client, String), ApiError> {
        let mut state = self.state.lock().await;
        let http = match &state.http {
            Some(http) => http.clone(),
            None => {
                let http = self.build_http(&state.token)?;
                state.http = Some(http.clone());
                http
            }
        };
        Ok((http, state.token.clone()))
    }

    /// Refresh-and-swap after a 401/403. Runs entirely inside the session
    /// mutex so concurrent calls observing the same expired token cannot
    /// trigger a second refresh or see a half-updated token/connection pair.
    async fn refresh_rejected_token(&self, token_used: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        if state.token != token_used {
            // Another in-flight call already swapped the token; just retry.
            return Ok(());
        }

        let Some(refresher) = &self.refresher else {
            return Err(InvalidTokenError.into());
        };

        tracing::info!("access token was rejected, requesting a replacement");
        let Some(token) = refresher.refresh_access_token().await else {
            return Err(InvalidTokenError.into());
        };

        state.token = token;
        state.http = None;
        Ok(())
    }

    fn build_http(&self, token: &str) -> Result<reqwest::Client, ApiError> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::try_from(format!("Bearer {token}"))
            .map_err(|_| InvalidTokenError)?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(self.settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    use super::*;

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
        token: Option<String>,
    }

    #[async_trait::async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh_access_token(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token.clone()
        }
    }

    fn settings_for(server: &MockServer) -> ClientSettings {
        ClientSettings {
            owner_api_url: format!("{}/", server.uri()),
            ..ClientSettings::default()
        }
    }

    fn vehicle_body(name: &str) -> String {
        format!(
            r#"{{"response": {{"id": 42, "vin": "5YJ3E1EA7HF000001", "display_name": "{name}", "state": "online"}}}}"#
        )
    }

    #[tokio::test]
    async fn get_one_deserializes_the_response_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(vehicle_body("Kitt")))
            .mount(&server)
            .await;

        let client = TeslaClient::from_token("tok", Some(settings_for(&server)));
        let vehicle = client.vehicle(42).await.unwrap();
        assert_eq!(vehicle.display_name, "Kitt");
        assert_eq!(vehicle.vin, "5YJ3E1EA7HF000001");
    }

    #[tokio::test]
    async fn get_list_deserializes_the_list_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"response": [{"id": 1, "vin": "V1", "display_name": "A", "state": "asleep"}], "count": 1}"#,
            ))
            .mount(&server)
            .await;

        let client = TeslaClient::from_token("tok", Some(settings_for(&server)));
        let vehicles = client.vehicles().await.unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].state, "asleep");
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_and_retried_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string(vehicle_body("Kitt")))
            .expect(1)
            .mount(&server)
            .await;

        let refresher = Arc::new(CountingRefresher {
            token: Some("fresh".into()),
            ..CountingRefresher::default()
        });
        let client =
            TeslaClient::with_refresher("stale", Some(settings_for(&server)), refresher.clone());

        let vehicle = client.vehicle(42).await.unwrap();
        assert_eq!(vehicle.display_name, "Kitt");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn second_consecutive_rejection_fails_without_a_third_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let refresher = Arc::new(CountingRefresher {
            token: Some("fresh".into()),
            ..CountingRefresher::default()
        });
        let client =
            TeslaClient::with_refresher("stale", Some(settings_for(&server)), refresher.clone());

        let err = client.vehicle(42).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejection_without_a_refresher_is_an_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client = TeslaClient::from_token("tok", Some(settings_for(&server)));
        let err = client.vehicle(42).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn refresher_yielding_no_token_fails_after_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let refresher = Arc::new(CountingRefresher::default());
        let client =
            TeslaClient::with_refresher("stale", Some(settings_for(&server)), refresher.clone());

        let err = client.vehicle(42).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_timeout_status_maps_to_vehicle_asleep() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1/vehicles/42/command/honk_horn"))
            .respond_with(ResponseTemplate::new(408))
            .expect(1)
            .mount(&server)
            .await;

        let refresher = Arc::new(CountingRefresher {
            token: Some("fresh".into()),
            ..CountingRefresher::default()
        });
        let client =
            TeslaClient::with_refresher("tok", Some(settings_for(&server)), refresher.clone());

        let err = client.command(42, "honk_horn").await.unwrap_err();
        assert!(matches!(err, ApiError::VehicleAsleep(_)));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn not_found_maps_to_a_default_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = TeslaClient::from_token("tok", Some(settings_for(&server)));
        let vehicle = client.vehicle(42).await.unwrap();
        assert_eq!(vehicle, Vehicle::default());
    }

    #[tokio::test]
    async fn not_found_maps_to_an_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = TeslaClient::from_token("tok", Some(settings_for(&server)));
        assert!(client.vehicles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_error_statuses_carry_the_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1/vehicles/42"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = TeslaClient::from_token("tok", Some(settings_for(&server)));
        let err = client.vehicle(42).await.unwrap_err();
        match err {
            ApiError::ResponseContent { status } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_response_reports_result_and_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1/vehicles/42/command/door_lock"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"response": {"result": false, "reason": "already locked"}}"#),
            )
            .mount(&server)
            .await;

        let client = TeslaClient::from_token("tok", Some(settings_for(&server)));
        let response = client.command(42, "door_lock").await.unwrap();
        assert!(!response.result);
        assert_eq!(response.reason, "already locked");
    }
}
