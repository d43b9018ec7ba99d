//! Invoice endpoints
//!
//! - `GET  /api/qb/customers/{id}/invoices/today`: today's invoice, 404 when none
//! - `POST /api/qb/customers/{id}/invoices/today`: create it with a first line
//! - `POST /api/invoices/items`: append a line to an existing invoice
//! - `POST /api/invoices/send`: email a finished invoice to its customer
//! - `POST /api/reset-customer`: clear the server session's customer

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{error_for_status, read_json, ApiClient};
use crate::error::{ApiError, InvoiceError};
use crate::workflow::models::{LineItemPayload, SentInvoice};

/// Invoice operations the binder needs
#[async_trait]
pub trait InvoiceBackend: Send + Sync {
    /// Id of today's invoice for `customer_id`, `None` when there is none yet
    async fn todays_invoice(&self, customer_id: &str) -> Result<Option<String>, InvoiceError>;

    /// Create today's invoice with `line` as its first line; returns the new id
    async fn create_invoice(&self, customer_id: &str, line: &LineItemPayload) -> Result<String, InvoiceError>;

    /// Add `line` to an existing invoice
    async fn append_line(&self, invoice_id: &str, line: &LineItemPayload) -> Result<(), InvoiceError>;

    /// Send a finished invoice to its customer and end the customer session
    async fn send_invoice(&self, invoice_id: &str) -> Result<SentInvoice, InvoiceError>;
}

pub struct HttpInvoiceBackend {
    api: Arc<ApiClient>,
}

impl HttpInvoiceBackend {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    fn todays_url(&self, customer_id: &str) -> Result<reqwest::Url, ApiError> {
        self.api
            .endpoint(&["api", "qb", "customers", customer_id, "invoices", "today"])
    }
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    invoice_id: &'a str,
    #[serde(flatten)]
    line: &'a LineItemPayload,
}

#[async_trait]
impl InvoiceBackend for HttpInvoiceBackend {
    async fn todays_invoice(&self, customer_id: &str) -> Result<Option<String>, InvoiceError> {
        let response = self.api.get(self.todays_url(customer_id)?).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("No invoice today for customer {}", customer_id);
            return Ok(None);
        }

        let body: Value = read_json(error_for_status(response).await?).await?;
        if body.is_null() {
            return Ok(None);
        }
        parse_invoice_id(&body).map(Some).ok_or(InvoiceError::MissingInvoiceId)
    }

    async fn create_invoice(&self, customer_id: &str, line: &LineItemPayload) -> Result<String, InvoiceError> {
        let url = self.todays_url(customer_id)?;
        let response = error_for_status(self.api.post_json(url, &json!({ "line": line })).await?).await?;
        let body: Value = read_json(response).await?;

        let invoice_id = parse_invoice_id(&body).ok_or(InvoiceError::MissingInvoiceId)?;
        info!("Created invoice {} for customer {}", invoice_id, customer_id);
        Ok(invoice_id)
    }

    async fn append_line(&self, invoice_id: &str, line: &LineItemPayload) -> Result<(), InvoiceError> {
        let url = self.api.endpoint(&["api", "invoices", "items"])?;
        let request = AppendRequest { invoice_id, line };
        error_for_status(self.api.post_json(url, &request).await?).await?;
        info!("Appended '{}' to invoice {}", line.item_name, invoice_id);
        Ok(())
    }

    async fn send_invoice(&self, invoice_id: &str) -> Result<SentInvoice, InvoiceError> {
        let url = self.api.endpoint(&["api", "invoices", "send"])?;
        let response = error_for_status(self.api.post_json(url, &json!({ "invoice_id": invoice_id })).await?).await?;
        let body: Value = read_json(response).await?;
        let sent = SentInvoice {
            invoice_id: invoice_id.to_string(),
            invoice_number: text_field(&body, &["invoice_number", "DocNumber"]),
            customer: text_field(&body, &["customer"]),
        };
        info!("Sent invoice {} ({:?})", invoice_id, sent.invoice_number);

        // The invoice is already out; a stale session customer is only logged
        let url = self.api.endpoint(&["api", "reset-customer"])?;
        match self.api.post_json(url, &json!({})).await {
            Ok(response) => {
                if let Err(e) = error_for_status(response).await {
                    warn!("Could not reset the session customer: {}", e);
                }
            }
            Err(e) => warn!("Could not reset the session customer: {}", e),
        }
        Ok(sent)
    }
}

/// First non-empty string or number among `keys`
fn text_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|key| body.get(*key)).find_map(|value| match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Invoice id from a create or lookup response.
///
/// Accepts the accounting system's `Id` (top level or under `Invoice`) as
/// well as the backend's own `invoiceId`/`invoice_id`/`id`, string or number.
pub fn parse_invoice_id(body: &Value) -> Option<String> {
    const KEYS: &[&str] = &["Id", "invoiceId", "invoice_id", "id"];

    let scopes = [Some(body), body.get("Invoice"), body.get("invoice")];
    scopes
        .into_iter()
        .flatten()
        .find_map(|scope| text_field(scope, KEYS))
}
