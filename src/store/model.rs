//! Invoice data model — purchase orders, invoices, validation reports.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a registered purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    /// Open for invoicing.
    Active,
    /// Closed — kept for history, no longer advertised to new invoices.
    Inactive,
}

impl Default for PoStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for PoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for PoStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("Unknown PO status: {}", s)),
        }
    }
}

/// Lifecycle status of an invoice.
///
/// `Pending` → `Validated`/`DiscrepanciesFound`/`Error` is written by the
/// reconciliation engine; `Approved`/`Rejected` only by the approval flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Stored, not yet reconciled.
    Pending,
    /// Reconciled clean against its purchase order.
    Validated,
    /// Reconciled with at least one discrepancy.
    DiscrepanciesFound,
    /// Reconciliation could not run (e.g. purchase order missing).
    Error,
    /// Approver accepted the invoice.
    Approved,
    /// Approver rejected the invoice.
    Rejected,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Validated => write!(f, "validated"),
            Self::DiscrepanciesFound => write!(f, "discrepancies_found"),
            Self::Error => write!(f, "error"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "validated" => Ok(Self::Validated),
            "discrepancies_found" => Ok(Self::DiscrepanciesFound),
            "error" => Ok(Self::Error),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown invoice status: {}", s)),
        }
    }
}

/// Approval lifecycle of a validation report.
///
/// Creation-time value is `AutoApproved` (clean reconciliation) or
/// `RequiresApproval` (discrepancies). `Approved`/`Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Clean reconciliation — no human action required.
    AutoApproved,
    /// Discrepancies found — waiting on an approver decision.
    RequiresApproval,
    /// Approver accepted.
    Approved,
    /// Approver rejected.
    Rejected,
}

impl ApprovalStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoApproved => write!(f, "auto_approved"),
            Self::RequiresApproval => write!(f, "requires_approval"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_approved" => Ok(Self::AutoApproved),
            "requires_approval" => Ok(Self::RequiresApproval),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown approval status: {}", s)),
        }
    }
}

/// Supported invoice currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Cad,
    Aud,
    Chf,
}

impl Default for Currency {
    fn default() -> Self {
        Self::Usd
    }
}

impl Currency {
    /// Parse a 3-letter code, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::Usd),
            "EUR" => Some(Self::Eur),
            "GBP" => Some(Self::Gbp),
            "JPY" => Some(Self::Jpy),
            "CAD" => Some(Self::Cad),
            "AUD" => Some(Self::Aud),
            "CHF" => Some(Self::Chf),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Jpy => "JPY",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
            Self::Chf => "CHF",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ── Entities ────────────────────────────────────────────────────────

/// A registered purchase order. Created before invoices reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub po_number: String,
    pub vendor_name: String,
    /// Issue date as written on the order (free-form, not compared).
    pub issue_date: String,
    pub total_amount: Decimal,
    pub status: PoStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields for registering a new purchase order.
#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub po_number: String,
    pub vendor_name: String,
    pub issue_date: String,
    pub total_amount: Decimal,
    pub status: PoStatus,
}

/// A stored invoice.
///
/// Extraction gaps stay `None` — absent is distinct from zero/empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    /// Soft reference — may point at no registered purchase order.
    pub po_number: Option<String>,
    pub vendor_name: Option<String>,
    /// Date token as extracted from the document.
    pub invoice_date: Option<String>,
    pub total_amount: Option<Decimal>,
    pub due_date: Option<String>,
    pub tax_amount: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub currency: Currency,
    pub file_path: Option<String>,
    pub status: InvoiceStatus,
    /// One-line outcome of the latest reconciliation run.
    pub validation_result: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for storing a newly extracted invoice.
#[derive(Debug, Clone, Default)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub po_number: Option<String>,
    pub vendor_name: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<Decimal>,
    pub due_date: Option<String>,
    pub tax_amount: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub currency: Currency,
    pub file_path: Option<String>,
}

/// Which invoice field a discrepancy was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyField {
    VendorName,
    TotalAmount,
}

impl DiscrepancyField {
    /// Human-readable label used in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::VendorName => "Vendor Name",
            Self::TotalAmount => "Total Amount",
        }
    }
}

/// A detected mismatch between a purchase-order field and the
/// corresponding invoice field, beyond the defined tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: DiscrepancyField,
    pub po_value: String,
    pub invoice_value: String,
    /// Absolute difference, for numeric fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<Decimal>,
}

/// Durable record of one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub report_content: String,
    pub discrepancies: Vec<Discrepancy>,
    pub approval_status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a validation report within a reconciliation run.
#[derive(Debug, Clone)]
pub struct NewValidationReport {
    pub report_content: String,
    pub discrepancies: Vec<Discrepancy>,
    pub approval_status: ApprovalStatus,
}

/// A report awaiting an approver decision, joined with its invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub report_id: Uuid,
    pub invoice_number: String,
    pub po_number: Option<String>,
    pub vendor_name: Option<String>,
    pub total_amount: Option<Decimal>,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of the period summary (invoice joined with its latest report).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub invoice_number: String,
    pub po_number: Option<String>,
    pub vendor_name: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<Decimal>,
    pub status: InvoiceStatus,
    pub validation_result: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
}
