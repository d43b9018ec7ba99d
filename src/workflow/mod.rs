//! Workflow Coordinator
//!
//! Sequences customer selection, VIN scan, vehicle lookup and the invoice
//! decision, holding only what the next step needs.

pub mod binder;
pub mod models;

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{InvoiceBackend, VehicleLookup};
use crate::capture::CameraDevice;
use crate::error::WorkflowError;
use crate::scan::{ScanOutcome, ScanReport, ScanScheduler};
pub use binder::{decide, describe_line, InvoiceAction, InvoiceLineBinder};
use models::{CatalogItem, CustomerSelection, InvoiceContext, LineItemDraft, SentInvoice, VehicleRecord};

pub struct WorkflowCoordinator {
    lookup: Arc<dyn VehicleLookup>,
    binder: InvoiceLineBinder,
    customer: Option<CustomerSelection>,
    vehicle: Option<VehicleRecord>,
    invoice: InvoiceContext,
    /// Whether `invoice` reflects the backend for the current customer
    invoice_checked: bool,
}

impl WorkflowCoordinator {
    pub fn new(lookup: Arc<dyn VehicleLookup>, invoices: Arc<dyn InvoiceBackend>) -> Self {
        Self {
            lookup,
            binder: InvoiceLineBinder::new(invoices),
            customer: None,
            vehicle: None,
            invoice: InvoiceContext::default(),
            invoice_checked: false,
        }
    }

    pub fn customer(&self) -> Option<&CustomerSelection> {
        self.customer.as_ref()
    }

    pub fn vehicle(&self) -> Option<&VehicleRecord> {
        self.vehicle.as_ref()
    }

    pub fn invoice(&self) -> &InvoiceContext {
        &self.invoice
    }

    /// Select a customer and check for today's invoice.
    ///
    /// The previous customer's invoice state is dropped before the check.
    pub async fn select_customer(&mut self, customer: CustomerSelection) -> Result<&InvoiceContext, WorkflowError> {
        info!("Customer selected: {} ({})", customer.name(), customer.id());
        self.customer = Some(customer);
        self.invoice = InvoiceContext::default();
        self.invoice_checked = false;

        self.refresh_invoice().await?;
        Ok(&self.invoice)
    }

    /// Re-query today's invoice for the selected customer
    pub async fn refresh_invoice(&mut self) -> Result<Option<&str>, WorkflowError> {
        let customer = self.customer.as_ref().ok_or(WorkflowError::NoCustomer)?;
        self.invoice_checked = false;

        let found = self.binder.backend().todays_invoice(customer.id()).await?;
        match found {
            Some(id) => {
                info!("Customer {} has invoice {} today", customer.name(), id);
                self.invoice.invoice_id = Some(id);
            }
            None => match &self.invoice.invoice_id {
                // Created during this run; never fall back to creating a second one
                Some(known) => warn!("Backend reports no invoice for {}; keeping {}", customer.name(), known),
                None => info!("Customer {} has no invoice today", customer.name()),
            },
        }

        self.invoice_checked = true;
        Ok(self.invoice.invoice_id.as_deref())
    }

    /// Scan for a VIN and resolve it.
    ///
    /// The camera is released before the lookup starts.
    pub async fn scan_vin(
        &mut self,
        scheduler: &ScanScheduler,
        camera: &mut dyn CameraDevice,
        cancel: &CancellationToken,
    ) -> Result<&VehicleRecord, WorkflowError> {
        let report: ScanReport = scheduler.run(camera, cancel).await;
        match report.outcome {
            ScanOutcome::Found(vin) => self.on_vin_found(&vin).await,
            ScanOutcome::TimedOut => Err(WorkflowError::NoVinFound),
            ScanOutcome::Cancelled => Err(WorkflowError::ScanCancelled),
            ScanOutcome::Failed(e) => Err(e.into()),
        }
    }

    /// Look up a scanned VIN, then re-check the customer's invoice.
    ///
    /// On lookup failure no vehicle is held; the VIN is not retried.
    pub async fn on_vin_found(&mut self, vin: &str) -> Result<&VehicleRecord, WorkflowError> {
        self.vehicle = None;

        let record = match self.lookup.lookup(vin).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Lookup for {} failed: {}", vin, e);
                return Err(e.into());
            }
        };
        self.vehicle = Some(record);

        if self.customer.is_some() {
            self.refresh_invoice().await?;
        }

        self.vehicle.as_ref().ok_or(WorkflowError::NoVehicle)
    }

    /// The invoice call a submission would make now, once the check has run
    pub fn next_action(&self) -> Option<InvoiceAction> {
        self.invoice_checked.then(|| decide(&self.invoice))
    }

    /// Draft a line for the current vehicle with the generated description
    pub fn draft_line(&self, item: CatalogItem, rate: Decimal, qty: u32) -> Result<LineItemDraft, WorkflowError> {
        let description = describe_line(&item.name, self.vehicle.as_ref());
        Ok(LineItemDraft::new(item, description, rate, qty)?)
    }

    /// Submit a line for the current vehicle.
    ///
    /// Takes `&mut self`, so one submission is in flight at a time.
    pub async fn submit(&mut self, draft: LineItemDraft) -> Result<InvoiceAction, WorkflowError> {
        if self.customer.is_none() {
            return Err(WorkflowError::NoCustomer);
        }
        if self.vehicle.is_none() {
            return Err(WorkflowError::NoVehicle);
        }
        if !self.invoice_checked {
            self.refresh_invoice().await?;
        }

        let customer = self.customer.as_ref().ok_or(WorkflowError::NoCustomer)?;
        let vin = self.vehicle.as_ref().map(VehicleRecord::vin);
        let action = self.binder.submit(customer, &mut self.invoice, draft, vin).await?;
        Ok(action)
    }

    /// Send today's invoice to the customer and end the customer session.
    ///
    /// On success the customer, vehicle and invoice state are all cleared;
    /// on failure everything is kept so the send can be retried.
    pub async fn complete_invoice(&mut self) -> Result<SentInvoice, WorkflowError> {
        if self.customer.is_none() {
            return Err(WorkflowError::NoCustomer);
        }
        if !self.invoice_checked {
            self.refresh_invoice().await?;
        }
        let invoice_id = self.invoice.invoice_id.clone().ok_or(WorkflowError::NoInvoice)?;

        let sent = self.binder.backend().send_invoice(&invoice_id).await?;
        info!(
            "Invoice {} sent with {} line(s) added this run",
            invoice_id,
            self.invoice.line_items.len()
        );

        self.customer = None;
        self.vehicle = None;
        self.invoice = InvoiceContext::default();
        self.invoice_checked = false;
        Ok(sent)
    }
}
