//! HTTP client for the application backend's credential exchange.
//!
//! The backend is an opaque REST service with two relevant endpoints:
//! `POST /login` for password exchanges and `POST /{provider}-login` for
//! exchanging a provider principal for an application token. Non-2xx
//! responses carry an `error` field that is surfaced to the user verbatim.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use crate::session::identity::Principal;

/// Errors from the credential exchange.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend rejected the exchange with a user-facing message.
    #[error("{0}")]
    Rejected(String),

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered 2xx with a body we could not decode.
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Shown to the user when the backend gives no message of its own.
    pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";
}

/// Successful exchange payload: the backend's user record plus the
/// application access token.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeOutcome {
    pub user: BackendUser,
    pub token: String,
}

/// User record as the backend returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendUser {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

impl From<BackendUser> for Principal {
    fn from(user: BackendUser) -> Self {
        let mut principal = Principal::new(user.id);
        principal.email = user.email;
        principal.display_name = user.name;
        principal.avatar_url = user.photo;
        principal
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct ProviderLoginRequest<'a> {
    id: &'a str,
    email: Option<&'a str>,
    name: Option<&'a str>,
    photo: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    error: Option<String>,
}

/// Thin reqwest client over the backend exchange endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// `POST /login` with email/password credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<ExchangeOutcome, BackendError> {
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `POST /register` for new accounts. Same error contract as login.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<ExchangeOutcome, BackendError> {
        let response = self
            .http
            .post(format!("{}/register", self.base_url))
            .json(&RegisterRequest {
                name,
                email,
                password,
            })
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `POST /{provider}-login`: exchange a provider principal (authenticated
    /// by its bearer token) for an application token.
    #[instrument(skip(self, bearer))]
    pub async fn provider_login(
        &self,
        provider: &str,
        principal: &Principal,
        bearer: &str,
    ) -> Result<ExchangeOutcome, BackendError> {
        let response = self
            .http
            .post(format!("{}/{}-login", self.base_url, provider))
            .bearer_auth(bearer)
            .json(&ProviderLoginRequest {
                id: &principal.id,
                email: principal.email.as_deref(),
                name: principal.display_name.as_deref(),
                photo: principal.avatar_url.as_deref(),
            })
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<ExchangeOutcome, BackendError> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
        } else {
            let message = response
                .json::<BackendErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| BackendError::GENERIC_MESSAGE.to_string());
            Err(BackendError::Rejected(message))
        }
    }
}
