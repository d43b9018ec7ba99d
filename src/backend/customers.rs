//! Customer search
//!
//! `GET /api/qb/customers?query=&limit=`: name search over the accounting
//! system's customers. An empty query lists the first `limit` customers.

use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{error_for_status, read_json, ApiClient};
use crate::error::ApiError;
use crate::workflow::models::CustomerSelection;

/// Largest page the backend serves
pub const MAX_RESULTS: u32 = 100;

pub struct HttpCustomerDirectory {
    api: Arc<ApiClient>,
}

impl HttpCustomerDirectory {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    fn search_url(&self, query: &str, limit: u32) -> Result<Url, ApiError> {
        let mut url = self.api.endpoint(&["api", "qb", "customers"])?;
        url.query_pairs_mut()
            .append_pair("query", query.trim())
            .append_pair("limit", &limit.clamp(1, MAX_RESULTS).to_string());
        Ok(url)
    }

    /// Customers whose display name contains `query`
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<CustomerSelection>, ApiError> {
        let response = error_for_status(self.api.get(self.search_url(query, limit)?).await?).await?;
        let body: Value = read_json(response).await?;

        let customers = parse_customers(&body);
        debug!("Customer search '{}' matched {}", query, customers.len());
        Ok(customers)
    }
}

/// Customer list from a bare array or a `{"customers": [...]}` wrapper.
///
/// Entries without an id are skipped; a missing name falls back to the id.
fn parse_customers(body: &Value) -> Vec<CustomerSelection> {
    let entries = match body {
        Value::Array(entries) => entries.as_slice(),
        _ => body
            .get("customers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            let id = match entry.get("id").or_else(|| entry.get("Id"))? {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let name = ["display_name", "name", "DisplayName"]
                .iter()
                .filter_map(|key| entry.get(*key).and_then(Value::as_str))
                .find(|name| !name.trim().is_empty())
                .map(|name| name.trim().to_string())
                .unwrap_or_else(|| id.clone());
            Some(CustomerSelection::new(id, name))
        })
        .collect()
}
