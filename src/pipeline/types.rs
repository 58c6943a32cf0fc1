//! Shared types for the document processing pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::model::{Currency, NewInvoice};

/// One inbound document, already decoded from its channel-native form.
///
/// Channel adapters (see `channels::email::parse_inbound`) convert a raw
/// message into this struct; the pipeline never touches wire formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundDocument {
    /// Opaque channel-native message identifier, used for dedup.
    pub message_id: String,
    /// Sender identifier (email address or display form).
    pub sender: Option<String>,
    /// Subject line, if the channel has one.
    pub subject: Option<String>,
    /// Decoded body text.
    pub body: String,
    /// Attachment files saved to disk by the channel adapter.
    pub attachments: Vec<PathBuf>,
    /// When the document was received.
    pub received_at: DateTime<Utc>,
}

/// Structured fields pulled out of one document's text.
///
/// Every field an extraction rule failed to match stays `None`; only
/// `currency` has a default. Absent is never conflated with zero or
/// empty-string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedInvoice {
    pub invoice_number: Option<String>,
    pub purchase_order: Option<String>,
    pub total_amount: Option<Decimal>,
    pub invoice_date: Option<String>,
    pub vendor_name: Option<String>,
    pub due_date: Option<String>,
    pub tax_amount: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub currency: Currency,
    pub file_path: Option<String>,
}

impl ExtractedInvoice {
    /// Convert to a storable invoice. `None` when no invoice number was
    /// extracted — an invoice without its unique key cannot be stored.
    pub fn into_new_invoice(self) -> Option<NewInvoice> {
        let invoice_number = self.invoice_number?;
        Some(NewInvoice {
            invoice_number,
            po_number: self.purchase_order,
            vendor_name: self.vendor_name,
            invoice_date: self.invoice_date,
            total_amount: self.total_amount,
            due_date: self.due_date,
            tax_amount: self.tax_amount,
            subtotal: self.subtotal,
            currency: self.currency,
            file_path: self.file_path,
        })
    }
}
