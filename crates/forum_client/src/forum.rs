//! REST client for the forum service: categories, posts and comments.
//!
//! Mutating calls carry the session's bearer token. A 401 from any call means
//! the credential is no longer accepted, so the session is invalidated.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub creator_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Serialize)]
struct NewCategory<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPost<'a> {
    title: &'a str,
    content: &'a str,
    category_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewComment<'a> {
    content: &'a str,
    post_id: i64,
}

/// Forum service client rooted at e.g. `http://localhost:3002/api/forum`.
#[derive(Debug, Clone)]
pub struct ForumClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl ForumClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            session,
        }
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.list(self.http.get(self.url("/categories"))).await
    }

    pub async fn create_category(&self, name: &str, description: &str) -> Result<Category, ApiError> {
        let request = self
            .http
            .post(self.url("/categories"))
            .json(&NewCategory { name, description });
        self.fetch(self.session.authorize(request)).await
    }

    pub async fn delete_category(&self, id: i64) -> Result<(), ApiError> {
        self.delete("/delete_category", id).await
    }

    pub async fn posts(&self) -> Result<Vec<Post>, ApiError> {
        self.list(self.http.get(self.url("/posts"))).await
    }

    pub async fn post(&self, id: i64) -> Result<Post, ApiError> {
        self.fetch(self.http.get(self.url(&format!("/posts/{id}")))).await
    }

    pub async fn create_post(&self, title: &str, content: &str, category_id: i64) -> Result<Post, ApiError> {
        let request = self.http.post(self.url("/posts")).json(&NewPost {
            title,
            content,
            category_id,
        });
        self.fetch(self.session.authorize(request)).await
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), ApiError> {
        self.delete("/delete_post", id).await
    }

    pub async fn comments(&self, post_id: i64) -> Result<Vec<Comment>, ApiError> {
        let request = self
            .http
            .get(self.url("/comments"))
            .query(&[("post_id", post_id)]);
        self.list(request).await
    }

    pub async fn create_comment(&self, content: &str, post_id: i64) -> Result<Comment, ApiError> {
        let request = self
            .http
            .post(self.url("/comments"))
            .json(&NewComment { content, post_id });
        self.fetch(self.session.authorize(request)).await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<(), ApiError> {
        self.delete("/delete_comment", id).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn delete(&self, path: &str, id: i64) -> Result<(), ApiError> {
        let request = self.http.post(self.url(path)).query(&[("id", id)]);
        execute(&self.session, self.session.authorize(request)).await?;
        Ok(())
    }

    async fn fetch<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let body = execute(&self.session, request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Lists come back as `null` when empty.
    async fn list<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<Vec<T>, ApiError> {
        let body = execute(&self.session, request).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let items: Option<Vec<T>> = serde_json::from_str(&body)?;
        Ok(items.unwrap_or_default())
    }
}

/// Send `request` and return the body of a 2xx answer. A 401 invalidates the
/// session.
pub(crate) async fn execute(
    session: &SessionStore,
    request: reqwest::RequestBuilder,
) -> Result<String, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    let url = response.url().path().to_string();
    let body = response.text().await?;

    if status == reqwest::StatusCode::UNAUTHORIZED {
        warn!(%url, "credential rejected; logging out");
        session.invalidate();
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        debug!(%url, status = status.as_u16(), "request failed");
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: body.trim().to_string(),
        });
    }
    Ok(body)
}
