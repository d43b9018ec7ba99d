//! Invoicing Backend Clients
//!
//! All requests go through [`ApiClient`], which resolves paths against the
//! configured base endpoint and attaches a CSRF token to every call.

pub mod csrf;
pub mod customers;
pub mod invoices;
pub mod vehicles;

use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::ApiError;
use csrf::{CsrfTokenFetcher, StaticToken, TokenProvider, CSRF_HEADER};

pub use customers::HttpCustomerDirectory;
pub use invoices::{HttpInvoiceBackend, InvoiceBackend};
pub use vehicles::{HttpVehicleLookup, VehicleLookup};

/// HTTP client bound to one backend
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(config.base_url.clone()));
        }

        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build()?;

        let tokens: Arc<dyn TokenProvider> = match &config.static_csrf_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => {
                let url = join_path(&base_url, &config.csrf_token_path)?;
                Arc::new(CsrfTokenFetcher::new(http.clone(), url))
            }
        };

        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL for `segments` appended to the base path, each segment escaped
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url`; returns the raw response so callers can inspect the status
    pub async fn get(&self, url: Url) -> Result<Response, ApiError> {
        let token = self.tokens.token().await?;
        debug!("GET {}", url);
        Ok(self.http.get(url).header(CSRF_HEADER, token).send().await?)
    }

    /// POST a JSON body to `url`
    pub async fn post_json<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<Response, ApiError> {
        let token = self.tokens.token().await?;
        debug!("POST {}", url);
        Ok(self
            .http
            .post(url)
            .header(CSRF_HEADER, token)
            .json(body)
            .send()
            .await?)
    }
}

/// Join a configured absolute path onto the base URL
fn join_path(base: &Url, path: &str) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

/// Turn a non-success response into [`ApiError::Status`] with the server's detail
pub async fn error_for_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        detail: parse_detail(&body),
    })
}

/// Decode a JSON response body
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// `detail` from an error body; validation errors carry a list, kept as JSON
fn parse_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
