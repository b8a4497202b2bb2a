//! HTTP client for the auth service (`/auth/login`, `/auth/register`).

use tracing::{debug, warn};

use crate::error::{AuthError, RegistrationError};
use crate::messages::{LoginRequest, LoginResponse, RegisterRequest, RegistrationResult};

/// Auth service client rooted at e.g. `http://localhost:3001/api`.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /auth/login`. Only the transport and status are checked here; the
    /// session store validates the body.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let url = format!("{}/auth/login", self.base_url);
        debug!(%username, "sending login request");
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), %username, "login rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: non_empty_or(body.trim(), "Login failed"),
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    /// `POST /auth/register`. Error bodies are `{"message": ...}`; a plain-text
    /// body is passed through as is.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<RegistrationResult, RegistrationError> {
        let url = format!("{}/auth/register", self.base_url);
        debug!(%username, %email, "sending registration request");
        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest {
                email,
                username,
                password,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<RegistrationResult> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            warn!(status = status.as_u16(), %username, "registration rejected");
            let message = parsed
                .and_then(|r| r.message)
                .unwrap_or_else(|| non_empty_or(body.trim(), "Registration failed"));
            return Err(RegistrationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(parsed.unwrap_or_default())
    }
}

fn non_empty_or(text: &str, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}
