//! Workflow domain types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{InvoiceError, LookupError};
use crate::vision::is_vin_shaped;

/// Decoded vehicle attributes for one VIN.
///
/// The VIN is fixed at construction; its last six characters are always
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    vin: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub body_type: Option<String>,
    pub fuel_type: Option<String>,
    pub manufacturer: Option<String>,
    pub plant_country: Option<String>,
}

impl VehicleRecord {
    /// Record with no attributes yet; fails unless `vin` is VIN-shaped
    pub fn new(vin: impl Into<String>) -> Result<Self, LookupError> {
        let vin = vin.into();
        if !is_vin_shaped(&vin) {
            return Err(LookupError::InvalidVin(vin));
        }
        Ok(Self {
            vin,
            make: None,
            model: None,
            year: None,
            body_type: None,
            fuel_type: None,
            manufacturer: None,
            plant_country: None,
        })
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    /// Last six characters of the VIN
    pub fn last_six(&self) -> &str {
        &self.vin[self.vin.len() - 6..]
    }
}

/// Customer chosen for a workflow run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSelection {
    id: String,
    name: String,
}

impl CustomerSelection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Catalog item picked by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Backend item id, when known; the backend resolves by name otherwise
    pub id: Option<String>,
    pub name: String,
}

impl CatalogItem {
    pub fn new(id: Option<String>, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Line item being prepared for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemDraft {
    item: CatalogItem,
    description: String,
    rate: Decimal,
    qty: u32,
}

impl LineItemDraft {
    pub fn new(
        item: CatalogItem,
        description: impl Into<String>,
        rate: Decimal,
        qty: u32,
    ) -> Result<Self, InvoiceError> {
        if item.name.trim().is_empty() {
            return Err(InvoiceError::InvalidDraft("catalog item name is empty".into()));
        }
        if rate < Decimal::ZERO {
            return Err(InvoiceError::InvalidDraft(format!("rate must not be negative, got {}", rate)));
        }
        if qty == 0 {
            return Err(InvoiceError::InvalidDraft("quantity must be at least 1".into()));
        }

        let draft = Self {
            item,
            description: String::new(),
            rate,
            qty,
        };
        draft.with_description(description)
    }

    /// Replace the description (operator edit)
    pub fn with_description(mut self, description: impl Into<String>) -> Result<Self, InvoiceError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(InvoiceError::InvalidDraft("description is empty".into()));
        }
        self.description = description;
        Ok(self)
    }

    pub fn item(&self) -> &CatalogItem {
        &self.item
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn qty(&self) -> u32 {
        self.qty
    }
}

/// Line item body sent to the invoicing backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItemPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub item_name: String,
    pub description: String,
    pub qty: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
}

/// A line item accepted by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub item: CatalogItem,
    pub description: String,
    pub rate: Decimal,
    pub qty: u32,
    pub vin: Option<String>,
}

/// Receipt for an invoice sent to its customer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentInvoice {
    pub invoice_id: String,
    /// Document number shown to the customer
    pub invoice_number: Option<String>,
    /// Customer the invoice went to, as the backend names them
    pub customer: Option<String>,
}

/// Today's invoice for the selected customer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceContext {
    /// `None` means no invoice exists yet today
    pub invoice_id: Option<String>,
    /// Lines added during this run, in submission order
    pub line_items: Vec<LineItem>,
}

impl InvoiceContext {
    #[cfg(test)]
    pub fn with_invoice(invoice_id: Option<String>) -> Self {
        Self {
            invoice_id,
            line_items: Vec::new(),
        }
    }
}
