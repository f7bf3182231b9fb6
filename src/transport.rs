//! Authenticated HTTP transport.
//!
//! Every request goes through [`ApiClient::send`], which injects the current
//! bearer token, replays a request once after a successful token refresh, and
//! classifies every other failure exactly once.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::auth;
use crate::classify::{self, Classification, Effect, EffectSink, ErrorCategory, TracingSink};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::grace::{GracePeriodGate, PaymentEventStore};
use crate::session::SessionStore;

/// Which send of a logical request this is. A request is replayed at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Replay,
}

/// API client for the dashboard backend.
///
/// Cheap to clone; clones share the session store, refresh guard, and
/// connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<ClientConfig>,
    session: Arc<dyn SessionStore>,
    grace: Arc<GracePeriodGate>,
    effects: Arc<dyn EffectSink>,
    refresh_guard: Arc<Mutex<()>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.config.api_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client with the given session store.
    ///
    /// The grace gate starts with an empty in-memory payment store; wire the
    /// store your checkout handler writes to with
    /// [`with_payment_store`](Self::with_payment_store). Effects are only
    /// logged until [`with_effect_sink`](Self::with_effect_sink) is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig, session: Arc<dyn SessionStore>) -> Result<Self, Error> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let grace = GracePeriodGate::default().with_grace_period(config.grace_period);

        Ok(Self {
            http,
            config: Arc::new(config),
            session,
            grace: Arc::new(grace),
            effects: Arc::new(TracingSink),
            refresh_guard: Arc::new(Mutex::new(())),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    ///
    /// The configured request timeout is not applied to a custom client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Read payment events from `store` when deciding how to surface a 402.
    #[must_use]
    pub fn with_payment_store(self, store: Arc<dyn PaymentEventStore>) -> Self {
        self.with_grace_gate(GracePeriodGate::new(store))
    }

    /// Use a custom grace gate (e.g. with a test clock).
    ///
    /// The window is always the configured
    /// [`grace_period`](ClientConfig::grace_period).
    #[must_use]
    pub fn with_grace_gate(mut self, gate: GracePeriodGate) -> Self {
        self.grace = Arc::new(gate.with_grace_period(self.config.grace_period));
        self
    }

    /// Route UI effects to `sink`.
    #[must_use]
    pub fn with_effect_sink(mut self, sink: Arc<dyn EffectSink>) -> Self {
        self.effects = sink;
        self
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared session store.
    #[must_use]
    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    /// The gate consulted on 402 responses.
    #[must_use]
    pub fn grace_gate(&self) -> &GracePeriodGate {
        &self.grace
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Send a request built by `build`, with auth and error handling.
    ///
    /// `build` is called once per attempt so the request can be rebuilt for
    /// a replay after a token refresh; it must not attach the `Authorization`
    /// header itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] for every classified failure. The matching UI
    /// effect has already been applied when this returns.
    pub async fn send<F>(&self, build: F) -> Result<Response, Error>
    where
        F: Fn(&Client) -> Result<RequestBuilder, Error>,
    {
        let mut attempt = Attempt::First;
        loop {
            // Read at send time: a refresh may have landed since the last attempt.
            let sent_token = self.session.get()?.map(|c| c.access_token);

            let mut request = match build(&self.http) {
                Ok(request) => request,
                Err(e) => return Err(self.surface(classify::classify_client(&e.to_string()))),
            };
            if let Some(token) = &sent_token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => return Err(self.surface_transport_error(&e)),
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED {
                match attempt {
                    Attempt::First => {
                        attempt = Attempt::Replay;
                        self.recover_session(sent_token.as_deref()).await?;
                        tracing::debug!(url = %response.url(), "Replaying request after refresh");
                        continue;
                    }
                    Attempt::Replay => {
                        tracing::warn!(url = %response.url(), "Replayed request rejected");
                        return Err(self.end_session("replayed request rejected"));
                    }
                }
            }

            return Err(self.surface_response_error(response).await);
        }
    }

    /// `GET` a JSON resource.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send); a body that does not decode is classified as
    /// an unexpected client-side failure.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.config.endpoint(path)?;
        let response = self.send(|http| Ok(http.get(url.clone()))).await?;
        self.decode(response).await
    }

    /// `POST` a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path)?;
        let response = self
            .send(|http| Ok(http.post(url.clone()).json(body)))
            .await?;
        self.decode(response).await
    }

    pub(crate) async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, Error> {
        let url = response.url().clone();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.surface_transport_error(&e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(url = %url, error = %e, "Unexpected response payload");
            self.surface(classify::classify_client(&format!("unexpected response: {e}")))
        })
    }

    /// Obtain fresh credentials after `failed_token` was rejected.
    ///
    /// Refreshes are serialised. If another request already rotated the
    /// token while this one waited, no exchange happens and the caller
    /// replays with the current token.
    async fn recover_session(&self, failed_token: Option<&str>) -> Result<(), Error> {
        let _guard = self.refresh_guard.lock().await;

        let current = self.session.get()?;
        if let Some(current) = &current {
            if failed_token != Some(current.access_token.as_str()) {
                tracing::debug!("Token already rotated by a concurrent refresh");
                return Ok(());
            }
        }

        let Some(refresh_token) = current.and_then(|c| c.refresh_token) else {
            tracing::info!("Unauthorized with no refresh token");
            return Err(self.surface(classify::session_ended(
                "no refresh token",
                &self.config.login_path,
            )));
        };

        match auth::exchange_refresh_token(&self.http, &self.config, &refresh_token).await {
            Ok(tokens) => {
                self.session.set(tokens.into_credentials(Some(refresh_token)))?;
                tracing::info!("Access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                Err(self.end_session("token refresh failed"))
            }
        }
    }

    /// Clear credentials and send the user to login.
    fn end_session(&self, detail: &str) -> Error {
        if let Err(e) = self.session.clear() {
            tracing::error!(error = %e, "Failed to clear session");
        }
        self.surface(classify::session_ended(detail, &self.config.login_path))
    }

    fn surface_transport_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            tracing::warn!(error = %e, "No response from server");
            self.surface(classify::classify_network(&e.to_string()))
        } else {
            tracing::error!(error = %e, "Client-side request failure");
            self.surface(classify::classify_client(&e.to_string()))
        }
    }

    async fn surface_response_error(&self, response: Response) -> Error {
        let status = response.status().as_u16();
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let in_grace = status == StatusCode::PAYMENT_REQUIRED.as_u16()
            && self.grace.is_in_grace_period();

        let classification =
            classify::classify_response(status, &body, in_grace, self.config.destinations());
        tracing::warn!(
            url = %url,
            status,
            category = %classification.error.category,
            in_grace,
            "Request failed"
        );
        self.surface(classification)
    }

    /// Surface invalid input caught before any request was sent.
    pub(crate) fn reject_locally(&self, message: String) -> Error {
        tracing::warn!(message = %message, "Request rejected locally");
        self.effects.apply(&Effect::Notify {
            category: ErrorCategory::ValidationError,
            message: message.clone(),
        });
        Error::Validation(message)
    }

    /// Apply the effect once and hand back the error.
    fn surface(&self, classification: Classification) -> Error {
        self.effects.apply(&classification.effect);
        Error::Api(classification.error)
    }
}
