//! Login, logout and the refresh-token exchange.

use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::transport::ApiClient;
use crate::types::SessionCredentials;

/// Token response from `POST /auth/login` and `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl TokenResponse {
    /// Convert into stored credentials.
    ///
    /// Servers that do not rotate refresh tokens omit `refresh_token`; the
    /// previous one is kept in that case.
    #[must_use]
    pub fn into_credentials(self, previous_refresh: Option<String>) -> SessionCredentials {
        SessionCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Exchange a refresh token for a new pair.
///
/// Goes straight to the HTTP client: a rejected refresh must never re-enter
/// the transport's own 401 handling.
pub(crate) async fn exchange_refresh_token(
    http: &reqwest::Client,
    config: &ClientConfig,
    refresh_token: &str,
) -> Result<TokenResponse, Error> {
    let response = http
        .post(config.endpoint("auth/refresh")?)
        .json(&RefreshRequest { refresh_token })
        .send()
        .await?;

    let response = ensure_success(response, "token refresh").await?;
    response.json::<TokenResponse>().await.map_err(Into::into)
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Auth {
        operation,
        status: Some(status),
        detail: body,
    })
}

impl ApiClient {
    /// Log in with email and password and persist the returned tokens.
    ///
    /// Login failures are returned to the caller (the login form shows them);
    /// no UI effect is applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Auth`] if the
    /// server rejects the credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, Error> {
        let response = self
            .http()
            .post(self.config().endpoint("auth/login")?)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let response = ensure_success(response, "login").await?;
        let tokens = response.json::<TokenResponse>().await?;
        self.session().set(tokens.clone().into_credentials(None))?;
        tracing::info!("Logged in");
        Ok(tokens)
    }

    /// Drop the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the session store cannot be cleared.
    pub fn logout(&self) -> Result<(), Error> {
        self.session().clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Whether credentials are currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.session().get(), Ok(Some(_)))
    }
}
