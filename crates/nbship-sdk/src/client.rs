//! HTTP client for the Nbship API
//!
//! This module provides a type-safe client for interacting with the Nbship
//! API. Every request carries the current bearer token, and an expired token
//! is recovered transparently: the first request to see a 401 drives a
//! single refresh call while concurrent failures queue behind it, then all
//! of them replay with the fresh credential.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use nbship_sdk::{ClientBuilder, NbshipClient};
//!
//! # async fn example() -> nbship_sdk::Result<()> {
//! // Direct token authentication with refresh support
//! let client = ClientBuilder::default()
//!     .base_url("https://api.nbship.dev")
//!     .with_tokens("access_token", "refresh_token")
//!     .build()?;
//!
//! // Or use file-based authentication (reads from ~/.local/share/nbship/)
//! let client = ClientBuilder::default()
//!     .base_url("https://api.nbship.dev")
//!     .with_file_auth()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::auth::refresh::RefreshRole;
use crate::auth::{
    FileTokenStore, LoginRequest, MemoryTokenStore, RefreshCoordinator, RefreshOutcome,
    RefreshRequest, SessionExpired, TokenResponse, TokenSet, TokenStore,
};
use crate::error::{ApiError, ErrorResponse, Result};
use crate::types::{
    Build, DeployNotebookRequest, HealthCheckResponse, ModelVersion, Pipeline,
    SetActiveVersionRequest,
};

/// Default timeout in seconds for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A request captured for replay after a token refresh.
///
/// The body is serialized once, up front; a replay reuses the original
/// parameters verbatim instead of re-validating them.
struct RequestSpec {
    method: Method,
    url: String,
    body: Option<serde_json::Value>,
}

impl RequestSpec {
    fn new(method: Method, url: String, body: Option<serde_json::Value>) -> Self {
        Self { method, url, body }
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// HTTP client for interacting with the Nbship API
pub struct NbshipClient {
    http_client: reqwest::Client,
    base_url: String,
    token_store: Arc<dyn TokenStore>,
    refresh: RefreshCoordinator,
}

impl NbshipClient {
    /// Create a new client (private - use ClientBuilder instead)
    fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        connect_timeout: Option<Duration>,
        token_store: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(connect_timeout) = connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let http_client = builder.build().map_err(ApiError::Network)?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            token_store,
            refresh: RefreshCoordinator::new(),
        })
    }

    /// Subscribe to fatal session-expiry events.
    ///
    /// The hosting application uses this to send the user back to its login
    /// surface. Exactly one event fires per fatal expiry.
    pub fn subscribe_session_expiry(&self) -> broadcast::Receiver<SessionExpired> {
        self.refresh.subscribe()
    }

    /// The token store backing this client.
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.token_store
    }

    // ===== Auth =====

    /// Log in with email and password, storing the issued credential.
    ///
    /// Login never enters the refresh path: a 401 here means bad
    /// credentials, not an expired token.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenSet> {
        let url = self.url_for(nbship_common::AUTH_LOGIN_PATH);
        let response = self
            .http_client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(ApiError::Network)?;

        if !response.status().is_success() {
            return self.handle_error_response(response).await;
        }

        let minted: TokenResponse = decode_body(response).await?;
        let tokens = TokenSet::from(minted);
        self.token_store.store(&tokens);
        info!("Logged in, credential stored");
        Ok(tokens)
    }

    /// Log out: best-effort server-side revocation, then clear the local
    /// credential unconditionally.
    pub async fn logout(&self) {
        let spec = RequestSpec::new(
            Method::POST,
            self.url_for(nbship_common::AUTH_LOGOUT_PATH),
            None,
        );
        if let Err(e) = self.execute(&spec).await {
            debug!("Logout request failed: {}", e);
        }
        self.token_store.clear();
        info!("Logged out, credential cleared");
    }

    // ===== Builds & Pipelines =====

    /// Get the current state of a build
    pub async fn get_build(&self, build_id: &str) -> Result<Build> {
        self.get(&format!("/builds/{build_id}")).await
    }

    /// Get the current state of a deploy pipeline
    pub async fn get_pipeline(&self, pipeline_id: &str) -> Result<Pipeline> {
        self.get(&format!("/pipelines/{pipeline_id}")).await
    }

    /// Upload a notebook and start its deploy pipeline
    pub async fn deploy_notebook(&self, request: DeployNotebookRequest) -> Result<Pipeline> {
        self.post("/pipelines", &request).await
    }

    // ===== Model Versions =====

    /// List the versions of a deployed model
    pub async fn list_model_versions(&self, model_id: &str) -> Result<Vec<ModelVersion>> {
        self.get(&format!("/models/{model_id}/versions")).await
    }

    /// Mark one version of a model as the version serving traffic
    pub async fn set_active_version(&self, model_id: &str, version: &str) -> Result<ModelVersion> {
        self.put(
            &format!("/models/{model_id}/active-version"),
            &SetActiveVersionRequest { version },
        )
        .await
    }

    /// Delete one version of a deployed model
    pub async fn delete_model_version(&self, model_id: &str, version: &str) -> Result<()> {
        let spec = RequestSpec::new(
            Method::DELETE,
            self.url_for(&format!("/models/{model_id}/versions/{version}")),
            None,
        );
        let response = self.send_raw(&spec).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error_response(response).await
        }
    }

    // ===== Health =====

    /// Health check
    pub async fn health_check(&self) -> Result<HealthCheckResponse> {
        self.get("/health").await
    }

    // ===== Private Helper Methods =====

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Generic GET request
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let spec = RequestSpec::new(Method::GET, self.url_for(path), None);
        let response = self.send_raw(&spec).await?;
        self.handle_response(response).await
    }

    /// Generic POST request
    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest {
            message: format!("Failed to serialize request body: {}", e),
        })?;
        let spec = RequestSpec::new(Method::POST, self.url_for(path), Some(body));
        let response = self.send_raw(&spec).await?;
        self.handle_response(response).await
    }

    /// Generic PUT request
    async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest {
            message: format!("Failed to serialize request body: {}", e),
        })?;
        let spec = RequestSpec::new(Method::PUT, self.url_for(path), Some(body));
        let response = self.send_raw(&spec).await?;
        self.handle_response(response).await
    }

    /// Issue one attempt of a request, attaching the current access token.
    ///
    /// The token is read from the store at send time, so a replay after a
    /// refresh automatically picks up the freshest credential.
    async fn execute(&self, spec: &RequestSpec) -> Result<Response> {
        let mut request = self.http_client.request(spec.method.clone(), &spec.url);
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        if let Some(tokens) = self.token_store.load() {
            request = request.header("Authorization", format!("Bearer {}", tokens.access_token));
        }
        request.send().await.map_err(ApiError::Network)
    }

    /// Send a request, absorbing a recoverable authorization failure.
    ///
    /// A 401 triggers the single-flight refresh protocol and exactly one
    /// replay. A request is never retried a second time, and any non-401
    /// response passes through untouched.
    async fn send_raw(&self, spec: &RequestSpec) -> Result<Response> {
        let response = self.execute(spec).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // No credential at all: nothing to refresh with.
        let Some(tokens) = self.token_store.load() else {
            return Err(ApiError::MissingAuthentication {
                message: format!("{} requires authentication; no credential stored", spec),
            });
        };

        debug!("{} returned 401, entering refresh protocol", spec);
        self.recover_authorization(&tokens).await?;

        let response = self.execute(spec).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // The refreshed token was rejected too. Fatal. A whole batch of
            // queued replays can land here; only the one that still finds a
            // credential clears it and broadcasts, so one session death
            // produces one expiry event.
            let message = format!("{} rejected the refreshed access token", spec);
            if self.token_store.is_authenticated() {
                self.token_store.clear();
                self.refresh.notify_session_expired(&message);
            }
            return Err(ApiError::Authentication { message });
        }
        Ok(response)
    }

    /// Run or await the single in-flight refresh for this client.
    ///
    /// The leader performs the refresh network call and settles the queue
    /// through its lease; followers suspend until that settlement and share
    /// its outcome. If the leader's future is dropped mid-refresh, the lease
    /// releases the queue and every follower sees the abandonment.
    async fn recover_authorization(&self, current: &TokenSet) -> Result<()> {
        match self.refresh.acquire() {
            RefreshRole::Leader(lease) => {
                debug!("Access token rejected, refreshing");
                match self.perform_refresh(&current.refresh_token).await {
                    Ok(tokens) => {
                        lease.settle(RefreshOutcome::Refreshed(tokens));
                        Ok(())
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        self.token_store.clear();
                        self.refresh.notify_session_expired(&reason);
                        lease.settle(RefreshOutcome::Failed(reason.clone()));
                        Err(ApiError::SessionExpired { message: reason })
                    }
                }
            }
            RefreshRole::Follower(rx) => {
                debug!("Refresh already in flight, queueing request");
                match rx.await {
                    Ok(RefreshOutcome::Refreshed(_)) => Ok(()),
                    Ok(RefreshOutcome::Failed(reason)) => {
                        Err(ApiError::SessionExpired { message: reason })
                    }
                    Err(_) => Err(ApiError::SessionExpired {
                        message: "Refresh was abandoned before settling".into(),
                    }),
                }
            }
        }
    }

    /// Exchange the refresh token for a fresh credential and store it.
    ///
    /// This call goes straight to the wire: a 401 from the refresh endpoint
    /// is a final failure, never a trigger for another refresh.
    async fn perform_refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let url = self.url_for(nbship_common::AUTH_REFRESH_PATH);
        let response = self
            .http_client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(ApiError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Authentication {
                message: format!("Token refresh failed with status {}: {}", status, body),
            });
        }

        let minted: TokenResponse = decode_body(response).await?;
        let tokens = TokenSet::from(minted);
        self.token_store.store(&tokens);
        info!("Access token refreshed");
        Ok(tokens)
    }

    /// Handle successful response
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        if response.status().is_success() {
            decode_body(response).await
        } else {
            self.handle_error_response(response).await
        }
    }

    /// Handle error response
    async fn handle_error_response<T>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();

        // Try to parse the error envelope
        if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
            let message = error_response.error.message;
            match status {
                StatusCode::UNAUTHORIZED => Err(ApiError::Authentication { message }),
                StatusCode::FORBIDDEN => Err(ApiError::Authorization { message }),
                StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimitExceeded),
                StatusCode::NOT_FOUND => Err(ApiError::NotFound { resource: message }),
                StatusCode::BAD_REQUEST => Err(ApiError::BadRequest { message }),
                _ => Err(ApiError::Internal { message }),
            }
        } else {
            // Fallback if we can't parse the error
            match status {
                StatusCode::UNAUTHORIZED => Err(ApiError::Authentication {
                    message: "Authentication failed".into(),
                }),
                StatusCode::FORBIDDEN => Err(ApiError::Authorization {
                    message: "Access forbidden".into(),
                }),
                StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimitExceeded),
                StatusCode::NOT_FOUND => Err(ApiError::NotFound {
                    resource: "Resource not found".into(),
                }),
                StatusCode::BAD_REQUEST => Err(ApiError::BadRequest {
                    message: error_text,
                }),
                _ => Err(ApiError::Internal {
                    message: format!("Request failed with status {status}: {error_text}"),
                }),
            }
        }
    }
}

/// Deserialize a 2xx body, surfacing a malformed payload as a distinct
/// validation error rather than a decoded default.
async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await.map_err(ApiError::Network)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Validation {
        message: format!("Malformed response body: {}", e),
    })
}

/// Builder for constructing an NbshipClient with custom configuration
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    token_store: Option<Arc<dyn TokenStore>>,
    use_file_auth: bool,
}

impl ClientBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL for the API
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set tokens for direct authentication (both tokens required)
    pub fn with_tokens(
        mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.refresh_token = Some(refresh_token.into());
        self.use_file_auth = false;
        self
    }

    /// Use file-based authentication (reads tokens from ~/.local/share/nbship/)
    pub fn with_file_auth(mut self) -> Self {
        self.use_file_auth = true;
        self.access_token = None;
        self.refresh_token = None;
        self
    }

    /// Inject a custom token store
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<NbshipClient> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| nbship_common::DEFAULT_API_URL.to_string());

        let token_store: Arc<dyn TokenStore> = if let Some(store) = self.token_store {
            store
        } else if let (Some(access_token), Some(refresh_token)) =
            (self.access_token, self.refresh_token)
        {
            Arc::new(MemoryTokenStore::with_tokens(TokenSet::bearer(
                access_token,
                refresh_token,
            )))
        } else if self.use_file_auth {
            Arc::new(FileTokenStore::new()?)
        } else {
            // No credential yet: the caller logs in through this client.
            Arc::new(MemoryTokenStore::new())
        };

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        NbshipClient::new(base_url, timeout, self.connect_timeout, token_store)
    }
}
