//! Chat history from the chat service's `GET /history` endpoint, plus the
//! admin-only `DELETE /delete_message` next to it.

use tracing::info;

use crate::config::Config;
use crate::error::ApiError;
use crate::forum::execute;
use crate::messages::HistoryEntry;
use crate::session::SessionStore;

#[derive(Debug, Clone)]
pub struct ChatHistory {
    http: reqwest::Client,
    url: String,
    session: SessionStore,
}

impl ChatHistory {
    pub fn new(url: impl Into<String>, session: SessionStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn from_config(config: &Config, session: SessionStore) -> Self {
        Self::new(config.history_url(), session)
    }

    /// The `limit` most recent messages, oldest first.
    pub async fn fetch(&self, limit: usize) -> Result<Vec<HistoryEntry>, ApiError> {
        let request = self.session.authorize(self.http.get(&self.url));
        let body = execute(&self.session, request).await?;
        let entries: Option<Vec<HistoryEntry>> = serde_json::from_str(&body)?;
        let mut entries = entries.unwrap_or_default();
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        Ok(entries)
    }

    /// Remove a stored message by its history id. The service only allows
    /// admins; anyone else gets `ApiError::Status` with 403.
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let request = self
            .http
            .delete(self.delete_url())
            .query(&[("id", id)]);
        execute(&self.session, self.session.authorize(request)).await?;
        info!(id, "chat message deleted");
        Ok(())
    }

    /// `/delete_message` lives beside `/history` on the chat service.
    fn delete_url(&self) -> String {
        let base = self
            .url
            .rsplit_once('/')
            .map_or(self.url.as_str(), |(base, _)| base);
        format!("{base}/delete_message")
    }
}
