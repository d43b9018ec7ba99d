//! Invoice line binder
//!
//! Turns an operator's line item into either a new invoice (first line of
//! the day) or an append to the invoice already known for the customer.

use std::sync::Arc;
use tracing::{info, warn};

use super::models::{CustomerSelection, InvoiceContext, LineItem, LineItemDraft, LineItemPayload, VehicleRecord};
use crate::backend::InvoiceBackend;
use crate::error::InvoiceError;

const UNKNOWN: &str = "Unknown";
const UNKNOWN_SUFFIX: &str = "XXXXXX";

/// Default description for a line item
///
/// `**{item}**` on the first line, then year, make, model and the VIN's last
/// six characters.
pub fn describe_line(item_name: &str, vehicle: Option<&VehicleRecord>) -> String {
    let year = vehicle
        .and_then(|v| v.year)
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let make = vehicle.and_then(|v| v.make.as_deref()).unwrap_or(UNKNOWN);
    let model = vehicle.and_then(|v| v.model.as_deref()).unwrap_or(UNKNOWN);
    let last_six = vehicle.map(VehicleRecord::last_six).unwrap_or(UNKNOWN_SUFFIX);

    format!("**{}**\n{} {} {} (…{})", item_name, year, make, model, last_six)
}

/// Which invoice call a submission will make
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceAction {
    Create,
    Append(String),
}

/// Create when no invoice is known for today, otherwise append to it
pub fn decide(context: &InvoiceContext) -> InvoiceAction {
    match &context.invoice_id {
        None => InvoiceAction::Create,
        Some(id) => InvoiceAction::Append(id.clone()),
    }
}

pub struct InvoiceLineBinder {
    invoices: Arc<dyn InvoiceBackend>,
}

impl InvoiceLineBinder {
    pub fn new(invoices: Arc<dyn InvoiceBackend>) -> Self {
        Self { invoices }
    }

    pub fn backend(&self) -> &Arc<dyn InvoiceBackend> {
        &self.invoices
    }

    /// Submit `draft` for `customer`, updating `context` on success.
    ///
    /// A created invoice's id is stored in `context`, so later lines append.
    /// On failure `context` is left untouched.
    pub async fn submit(
        &self,
        customer: &CustomerSelection,
        context: &mut InvoiceContext,
        draft: LineItemDraft,
        vin: Option<&str>,
    ) -> Result<InvoiceAction, InvoiceError> {
        let payload = payload_for(&draft, vin);
        let action = decide(context);

        match &action {
            InvoiceAction::Create => {
                let invoice_id = self
                    .invoices
                    .create_invoice(customer.id(), &payload)
                    .await
                    .map_err(|e| {
                        warn!("Create invoice for {} failed: {}", customer.name(), e);
                        e
                    })?;
                if invoice_id.trim().is_empty() {
                    return Err(InvoiceError::MissingInvoiceId);
                }
                info!("Invoice {} opened for {}", invoice_id, customer.name());
                context.invoice_id = Some(invoice_id);
            }
            InvoiceAction::Append(invoice_id) => {
                self.invoices
                    .append_line(invoice_id, &payload)
                    .await
                    .map_err(|e| {
                        warn!("Append to invoice {} failed: {}", invoice_id, e);
                        e
                    })?;
            }
        }

        context.line_items.push(LineItem {
            item: draft.item().clone(),
            description: draft.description().to_string(),
            rate: draft.rate(),
            qty: draft.qty(),
            vin: vin.map(str::to_string),
        });
        Ok(action)
    }
}

fn payload_for(draft: &LineItemDraft, vin: Option<&str>) -> LineItemPayload {
    LineItemPayload {
        item_id: draft.item().id.clone(),
        item_name: draft.item().name.clone(),
        description: draft.description().to_string(),
        qty: draft.qty(),
        rate: draft.rate(),
        vin: vin.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeInvoices, InvoiceCall};
    use crate::workflow::models::CatalogItem;
    use rust_decimal::Decimal;

    const VIN: &str = "1HGCM82633A123456";

    fn accord() -> VehicleRecord {
        let mut record = VehicleRecord::new(VIN).unwrap();
        record.make = Some("Honda".into());
        record.model = Some("Accord".into());
        record.year = Some(2003);
        record
    }

    fn draft(name: &str, vehicle: Option<&VehicleRecord>) -> LineItemDraft {
        LineItemDraft::new(
            CatalogItem::new(Some("31".into()), name),
            describe_line(name, vehicle),
            Decimal::new(8500, 2),
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_describe_full_vehicle() {
        assert_eq!(
            describe_line("Key creation", Some(&accord())),
            "**Key creation**\n2003 Honda Accord (…123456)"
        );
    }

    #[test]
    fn test_describe_missing_fields() {
        let mut record = VehicleRecord::new(VIN).unwrap();
        record.make = Some("Honda".into());

        assert_eq!(
            describe_line("Key creation", Some(&record)),
            "**Key creation**\nUnknown Honda Unknown (…123456)"
        );
        assert_eq!(
            describe_line("Key creation", None),
            "**Key creation**\nUnknown Unknown Unknown (…XXXXXX)"
        );
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(&InvoiceContext::default()), InvoiceAction::Create);
        assert_eq!(
            decide(&InvoiceContext::with_invoice(Some("INV-42".into()))),
            InvoiceAction::Append("INV-42".into())
        );
    }

    #[tokio::test]
    async fn test_create_path_persists_invoice_id() {
        let backend = Arc::new(FakeInvoices::new(None).creating("INV-100"));
        let binder = InvoiceLineBinder::new(backend.clone());
        let customer = CustomerSelection::new("58", "Lakeside Motors");
        let mut context = InvoiceContext::default();
        let vehicle = accord();

        let action = binder
            .submit(&customer, &mut context, draft("Key creation", Some(&vehicle)), Some(VIN))
            .await
            .unwrap();

        assert_eq!(action, InvoiceAction::Create);
        assert_eq!(context.invoice_id.as_deref(), Some("INV-100"));
        assert_eq!(context.line_items.len(), 1);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            InvoiceCall::Create { customer_id, line } => {
                assert_eq!(customer_id, "58");
                assert_eq!(line.description, "**Key creation**\n2003 Honda Accord (…123456)");
                assert_eq!(line.rate, Decimal::new(8500, 2));
                assert_eq!(line.qty, 1);
                assert_eq!(line.vin.as_deref(), Some(VIN));
            }
            other => panic!("unexpected call: {other:?}"),
        }

        // Second line of the run appends to the invoice just created
        let action = binder
            .submit(&customer, &mut context, draft("Remote start", Some(&vehicle)), Some(VIN))
            .await
            .unwrap();
        assert_eq!(action, InvoiceAction::Append("INV-100".into()));
        assert_eq!(backend.create_count(), 1);
        assert_eq!(context.line_items.len(), 2);
    }

    #[tokio::test]
    async fn test_append_path_never_creates() {
        let backend = Arc::new(FakeInvoices::new(Some("INV-42")));
        let binder = InvoiceLineBinder::new(backend.clone());
        let customer = CustomerSelection::new("58", "Lakeside Motors");
        let mut context = InvoiceContext::with_invoice(Some("INV-42".into()));

        for _ in 0..3 {
            binder
                .submit(&customer, &mut context, draft("Key creation", None), None)
                .await
                .unwrap();
        }

        assert_eq!(backend.create_count(), 0);
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls
            .iter()
            .all(|c| matches!(c, InvoiceCall::Append { invoice_id, .. } if invoice_id == "INV-42")));
        assert_eq!(context.invoice_id.as_deref(), Some("INV-42"));
    }

    #[tokio::test]
    async fn test_failed_create_leaves_context_unchanged() {
        let backend = Arc::new(FakeInvoices::new(None).rejecting("No QuickBooks customer selected."));
        let binder = InvoiceLineBinder::new(backend.clone());
        let customer = CustomerSelection::new("58", "Lakeside Motors");
        let mut context = InvoiceContext::default();

        let err = binder
            .submit(&customer, &mut context, draft("Key creation", None), None)
            .await
            .unwrap_err();

        match err {
            InvoiceError::Rejected { detail, .. } => {
                assert_eq!(detail.as_deref(), Some("No QuickBooks customer selected."))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(context.invoice_id.is_none());
        assert!(context.line_items.is_empty());
    }

    #[tokio::test]
    async fn test_empty_created_id_is_rejected() {
        let backend = Arc::new(FakeInvoices::new(None).creating(""));
        let binder = InvoiceLineBinder::new(backend);
        let customer = CustomerSelection::new("58", "Lakeside Motors");
        let mut context = InvoiceContext::default();

        let result = binder
            .submit(&customer, &mut context, draft("Key creation", None), None)
            .await;

        assert!(matches!(result, Err(InvoiceError::MissingInvoiceId)));
        assert!(context.invoice_id.is_none());
    }
}
