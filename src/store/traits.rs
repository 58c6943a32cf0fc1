//! `RecordStore` trait — single async interface for all persistence.
//!
//! "Not found" is an `Option`, "already exists" is `InsertOutcome::Duplicate`.
//! Both are expected, frequent outcomes — never errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::model::{
    ApprovalStatus, Invoice, InvoiceStatus, NewInvoice, NewPurchaseOrder, NewValidationReport,
    PendingApproval, PurchaseOrder, SummaryRow, ValidationReport,
};

/// Result of inserting a uniquely-keyed entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row created; carries the new id.
    Inserted(Uuid),
    /// The unique key already exists — nothing was written.
    Duplicate,
}

impl InsertOutcome {
    /// The new id, if the insert happened.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Self::Inserted(id) => Some(*id),
            Self::Duplicate => None,
        }
    }
}

/// Backend-agnostic record store covering purchase orders, invoices,
/// and validation reports.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Purchase orders ─────────────────────────────────────────────

    /// Register a purchase order. `Duplicate` if the po_number is taken.
    async fn insert_purchase_order(
        &self,
        po: &NewPurchaseOrder,
    ) -> Result<InsertOutcome, DatabaseError>;

    /// Resolve a purchase order by number, regardless of status.
    async fn lookup_purchase_order(
        &self,
        po_number: &str,
    ) -> Result<Option<PurchaseOrder>, DatabaseError>;

    // ── Invoices ────────────────────────────────────────────────────

    /// Store a new invoice with status `pending`.
    /// `Duplicate` if the invoice_number already exists.
    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InsertOutcome, DatabaseError>;

    /// Get an invoice by id.
    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, DatabaseError>;

    /// Get an invoice by its invoice number.
    async fn get_invoice_by_number(
        &self,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, DatabaseError>;

    /// Update an invoice's status and (optionally) its one-line
    /// validation result.
    async fn update_invoice_status(
        &self,
        id: Uuid,
        status: InvoiceStatus,
        validation_result: Option<&str>,
    ) -> Result<(), DatabaseError>;

    // ── Validation reports ──────────────────────────────────────────

    /// Persist one reconciliation run: the invoice status update and the
    /// new report are written in a single transaction. Returns the
    /// report id.
    async fn record_validation(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        validation_result: &str,
        report: &NewValidationReport,
    ) -> Result<Uuid, DatabaseError>;

    /// Get a validation report by id.
    async fn get_report(&self, report_id: Uuid) -> Result<Option<ValidationReport>, DatabaseError>;

    /// Persist one approval decision: the report's approval status and
    /// appended comment, plus the mirrored invoice status, in a single
    /// transaction.
    async fn record_decision(
        &self,
        report_id: Uuid,
        invoice_id: Uuid,
        status: ApprovalStatus,
        comment: &str,
    ) -> Result<(), DatabaseError>;

    /// Reports awaiting an approver decision, newest first.
    async fn list_requiring_approval(&self) -> Result<Vec<PendingApproval>, DatabaseError>;

    /// Invoices created in `[start, end)` joined with their latest
    /// report, newest first.
    async fn summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SummaryRow>, DatabaseError>;
}
