//! JSON wire types for the auth service, the chat socket and the chat history endpoint.

use serde::{Deserialize, Serialize};

/// One chat frame, both directions: `{"content", "username", "user_id"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub username: String,
    pub user_id: i64,
}

impl ChatMessage {
    /// Parse an inbound text frame. Frames with empty content are rejected.
    pub fn from_frame(text: &str) -> Result<Self, String> {
        let message: ChatMessage = serde_json::from_str(text).map_err(|e| e.to_string())?;
        if message.content.is_empty() {
            return Err("empty content".into());
        }
        Ok(message)
    }
}

/// Client → auth: `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Client → auth: `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// Auth → client: login answer. Every field is optional on the wire so that a
/// short answer can be reported as a protocol violation instead of a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<LoginUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginUser {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Auth → client: registration answer, also the shape of its error bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegistrationResult {
    #[serde(default)]
    pub message: Option<String>,
}

/// Chat service → client: one stored message from `GET /history`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}
