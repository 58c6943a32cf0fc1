//! Reconciliation engine — compares an invoice against its referenced
//! purchase order and records the outcome.
//!
//! One call to `reconcile` is one atomic run: the invoice status update
//! and the validation report land in the same store transaction. The
//! approver notification that may follow is best-effort and never
//! unwinds the persisted result.

use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::notify::Notifier;
use crate::store::RecordStore;
use crate::store::model::{
    ApprovalStatus, Discrepancy, DiscrepancyField, Invoice, InvoiceStatus, NewValidationReport,
    PurchaseOrder,
};

/// Amount differences at or below this are tolerated (rounding noise).
const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

const PO_NOT_FOUND: &str = "Purchase order not found";
const RESULT_CLEAN: &str = "Invoice matches purchase order";
const RESULT_DISCREPANCIES: &str = "Discrepancies found between invoice and purchase order";

/// Outcome of one reconciliation run.
#[derive(Debug)]
pub enum ReconOutcome {
    /// The invoice was compared against its purchase order.
    Reconciled(ReconResult),
    /// The referenced purchase order does not resolve. The invoice is
    /// marked `error`; no comparison report exists for this run.
    PurchaseOrderMissing { invoice_id: Uuid },
}

/// Result of a completed comparison run.
#[derive(Debug)]
pub struct ReconResult {
    pub status: InvoiceStatus,
    pub invoice_id: Uuid,
    pub report_id: Uuid,
    pub discrepancies: Vec<Discrepancy>,
    pub report_content: String,
}

/// Reconciliation engine.
pub struct ReconEngine {
    store: Arc<dyn RecordStore>,
    notifier: Option<Arc<dyn Notifier>>,
    approver_email: Option<String>,
}

impl ReconEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Option<Arc<dyn Notifier>>,
        approver_email: Option<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            approver_email,
        }
    }

    /// Reconcile one stored invoice against its referenced purchase order.
    pub async fn reconcile(&self, invoice: &Invoice) -> Result<ReconOutcome, DatabaseError> {
        let po = match invoice.po_number.as_deref() {
            Some(number) => self.store.lookup_purchase_order(number).await?,
            None => None,
        };

        let Some(po) = po else {
            warn!(
                invoice_number = %invoice.invoice_number,
                po_number = invoice.po_number.as_deref().unwrap_or("(none)"),
                "Purchase order not found for invoice"
            );
            self.store
                .update_invoice_status(invoice.id, InvoiceStatus::Error, Some(PO_NOT_FOUND))
                .await?;
            return Ok(ReconOutcome::PurchaseOrderMissing {
                invoice_id: invoice.id,
            });
        };

        let discrepancies = compare_fields(&po, invoice);

        let (status, validation_result) = if discrepancies.is_empty() {
            (InvoiceStatus::Validated, RESULT_CLEAN)
        } else {
            (InvoiceStatus::DiscrepanciesFound, RESULT_DISCREPANCIES)
        };

        let report_content = render_report(invoice, &po, status, &discrepancies);

        let approval_status = if discrepancies.is_empty() {
            ApprovalStatus::AutoApproved
        } else {
            ApprovalStatus::RequiresApproval
        };

        let report_id = self
            .store
            .record_validation(
                invoice.id,
                status,
                validation_result,
                &NewValidationReport {
                    report_content: report_content.clone(),
                    discrepancies: discrepancies.clone(),
                    approval_status,
                },
            )
            .await?;

        info!(
            invoice_number = %invoice.invoice_number,
            status = %status,
            discrepancies = discrepancies.len(),
            "Invoice reconciled"
        );

        if !discrepancies.is_empty() {
            self.notify_approver(invoice, status, &report_content).await;
        }

        Ok(ReconOutcome::Reconciled(ReconResult {
            status,
            invoice_id: invoice.id,
            report_id,
            discrepancies,
            report_content,
        }))
    }

    /// Best-effort discrepancy notification with the invoice file attached.
    async fn notify_approver(&self, invoice: &Invoice, status: InvoiceStatus, report: &str) {
        let (Some(notifier), Some(approver)) = (&self.notifier, &self.approver_email) else {
            return;
        };

        let subject = format!(
            "Invoice Validation Report - {}",
            status.to_string().to_uppercase()
        );
        let attachment = invoice.file_path.as_deref().map(Path::new);

        if let Err(e) = notifier.send(approver, &subject, report, attachment).await {
            warn!(
                invoice_number = %invoice.invoice_number,
                error = %e,
                "Failed to send validation report"
            );
        }
    }
}

/// Compare purchase-order fields against invoice fields.
///
/// Absence of either side's value is never a mismatch. Vendor names
/// compare case-insensitively with surrounding whitespace ignored;
/// amounts tolerate differences up to (and including) 0.01.
fn compare_fields(po: &PurchaseOrder, invoice: &Invoice) -> Vec<Discrepancy> {
    let mut discrepancies = Vec::new();

    let po_vendor = po.vendor_name.trim();
    if let Some(invoice_vendor) = invoice.vendor_name.as_deref().map(str::trim) {
        if !po_vendor.is_empty()
            && !invoice_vendor.is_empty()
            && po_vendor.to_lowercase() != invoice_vendor.to_lowercase()
        {
            discrepancies.push(Discrepancy {
                field: DiscrepancyField::VendorName,
                po_value: po_vendor.to_string(),
                invoice_value: invoice_vendor.to_string(),
                difference: None,
            });
        }
    }

    if let Some(invoice_amount) = invoice.total_amount {
        let difference = (po.total_amount - invoice_amount).abs();
        if difference > AMOUNT_TOLERANCE {
            discrepancies.push(Discrepancy {
                field: DiscrepancyField::TotalAmount,
                po_value: po.total_amount.to_string(),
                invoice_value: invoice_amount.to_string(),
                difference: Some(difference),
            });
        }
    }

    discrepancies
}

/// Render the human-readable validation report.
fn render_report(
    invoice: &Invoice,
    po: &PurchaseOrder,
    status: InvoiceStatus,
    discrepancies: &[Discrepancy],
) -> String {
    let invoice_amount = invoice
        .total_amount
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".into());

    format!(
        "Invoice Validation Report\n\
         -------------------------\n\
         Invoice Number: {}\n\
         Purchase Order: {}\n\
         Validation Status: {}\n\
         \n\
         Details:\n\
         - Invoice Vendor: {}\n\
         - PO Vendor: {}\n\
         - Invoice Amount: ${}\n\
         - PO Amount: ${}\n\
         \n\
         Discrepancies:\n\
         {}\n",
        invoice.invoice_number,
        po.po_number,
        status,
        invoice.vendor_name.as_deref().unwrap_or("unknown"),
        po.vendor_name,
        invoice_amount,
        po.total_amount,
        format_discrepancies(discrepancies),
    )
}

/// Format the discrepancy list for the report body.
fn format_discrepancies(discrepancies: &[Discrepancy]) -> String {
    if discrepancies.is_empty() {
        return "None found".into();
    }

    discrepancies
        .iter()
        .map(|d| match d.difference {
            Some(diff) => format!(
                "- {}: PO: ${} vs Invoice: ${} (Difference: ${})",
                d.field.label(),
                d.po_value,
                d.invoice_value,
                diff
            ),
            None => format!(
                "- {}: PO: {} vs Invoice: {}",
                d.field.label(),
                d.po_value,
                d.invoice_value
            ),
        })
        .collect::<Vec<String>>()
        .join("\n")
}
