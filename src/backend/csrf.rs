//! CSRF token acquisition
//!
//! The backend rejects calls without a `csrf-token` header. Tokens are
//! fetched fresh for each call; the session cookie lives in the shared
//! client's cookie store.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::{error_for_status, read_json};
use crate::error::ApiError;

/// Header carrying the token
pub const CSRF_HEADER: &str = "csrf-token";

/// Source of CSRF tokens for outbound calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, ApiError>;
}

/// Preconfigured token
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

/// Fetches a token from the backend's token endpoint
pub struct CsrfTokenFetcher {
    http: reqwest::Client,
    url: Url,
}

impl CsrfTokenFetcher {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl TokenProvider for CsrfTokenFetcher {
    async fn token(&self) -> Result<String, ApiError> {
        let response = self.http.get(self.url.clone()).send().await?;
        let response = error_for_status(response)
            .await
            .map_err(|e| ApiError::Token(e.to_string()))?;
        let body: Value = read_json(response).await?;
        parse_token(&body).ok_or_else(|| ApiError::Token("response has no csrfToken".to_string()))
    }
}

fn parse_token(body: &Value) -> Option<String> {
    ["csrfToken", "csrf_token"]
        .iter()
        .find_map(|key| body.get(*key))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::testing::TestBackend;

    #[test]
    fn test_parse_token_shapes() {
        assert_eq!(parse_token(&json!({"csrfToken": "abc"})).as_deref(), Some("abc"));
        assert_eq!(parse_token(&json!({"csrf_token": "def"})).as_deref(), Some("def"));
        assert_eq!(parse_token(&json!({"csrfToken": ""})), None);
        assert_eq!(parse_token(&json!({"token": "abc"})), None);
    }

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticToken::new("fixed");
        assert_eq!(provider.token().await.unwrap(), "fixed");
    }

    #[tokio::test]
    async fn test_fetcher_reads_token_endpoint() {
        let server = TestBackend::new()
            .route("GET", "/api/csrf/token", 200, json!({"csrfToken": "from-server"}))
            .serve()
            .await;
        let url = Url::parse(&format!("{}/api/csrf/token", server.base_url)).unwrap();
        let fetcher = CsrfTokenFetcher::new(reqwest::Client::new(), url);

        assert_eq!(fetcher.token().await.unwrap(), "from-server");
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_fetcher_without_endpoint_is_token_error() {
        let server = TestBackend::new().serve().await;
        let url = Url::parse(&format!("{}/api/csrf/token", server.base_url)).unwrap();
        let fetcher = CsrfTokenFetcher::new(reqwest::Client::new(), url);

        assert!(matches!(fetcher.token().await, Err(ApiError::Token(_))));
    }
}
