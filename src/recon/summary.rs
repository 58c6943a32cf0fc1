//! Period summary reports for approvers.

use chrono::{DateTime, Utc};

use crate::store::model::{InvoiceStatus, PendingApproval, SummaryRow};

/// A rendered summary report ready for delivery.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    pub subject: String,
    pub body: String,
}

/// Render the processing summary for a period.
pub fn render_summary(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rows: &[SummaryRow],
    pending: &[PendingApproval],
) -> SummaryReport {
    let period = format!("{} to {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"));

    let count = |status: InvoiceStatus| rows.iter().filter(|r| r.status == status).count();

    let mut body = format!(
        "Invoice Processing Summary Report\n\
         ================================\n\
         Period: {period}\n\
         \n\
         Summary:\n\
         - Total Invoices Processed: {}\n\
         - Invoices Requiring Approval: {}\n\
         - Validated Invoices: {}\n\
         - Approved Invoices: {}\n\
         - Rejected Invoices: {}\n\
         - Pending Invoices: {}\n\
         \n\
         Pending Approvals:\n\
         {}\n",
        rows.len(),
        pending.len(),
        count(InvoiceStatus::Validated),
        count(InvoiceStatus::Approved),
        count(InvoiceStatus::Rejected),
        count(InvoiceStatus::Pending),
        format_pending_approvals(pending),
    );

    if !rows.is_empty() {
        body.push_str("\nInvoices:\n");
        for row in rows {
            body.push_str(&format!(
                "- {} | PO {} | {} | {} | {}\n",
                row.invoice_number,
                row.po_number.as_deref().unwrap_or("(none)"),
                row.vendor_name.as_deref().unwrap_or("unknown"),
                row.status,
                row.approval_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
            ));
        }
    }

    SummaryReport {
        subject: format!("Invoice Processing Summary Report - {period}"),
        body,
    }
}

fn format_pending_approvals(pending: &[PendingApproval]) -> String {
    if pending.is_empty() {
        return "None".into();
    }

    pending
        .iter()
        .map(|p| {
            format!(
                "- Invoice #{} from {} for PO #{} (Amount: ${})",
                p.invoice_number,
                p.vendor_name.as_deref().unwrap_or("unknown"),
                p.po_number.as_deref().unwrap_or("(none)"),
                p.total_amount
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "unknown".into()),
            )
        })
        .collect::<Vec<String>>()
        .join("\n")
}
