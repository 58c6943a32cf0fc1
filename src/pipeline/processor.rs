//! Document processor — drives one inbound document through the
//! detection, extraction, and reconciliation pipeline.
//!
//! Two independent idempotency guarantees:
//! 1. Per-message dedup via the injected `ProcessedSet` — the same
//!    inbound document is never processed twice across restarts.
//! 2. Per-invoice dedup via the store's invoice_number uniqueness — two
//!    different documents can never create two rows for one invoice.

use std::sync::Arc;
use std::sync::Mutex;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dedup::ProcessedSet;
use crate::doctext::DocumentText;
use crate::error::PipelineError;
use crate::pipeline::detector;
use crate::pipeline::extractor::FieldExtractor;
use crate::pipeline::types::InboundDocument;
use crate::recon::ReconEngine;
use crate::store::model::PoStatus;
use crate::store::{InsertOutcome, RecordStore};

/// Document processor wiring detector → extractor → store → engine.
pub struct DocumentProcessor {
    store: Arc<dyn RecordStore>,
    doctext: Arc<dyn DocumentText>,
    extractor: FieldExtractor,
    engine: ReconEngine,
    dedup: Mutex<ProcessedSet>,
}

impl DocumentProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        doctext: Arc<dyn DocumentText>,
        engine: ReconEngine,
        dedup: ProcessedSet,
    ) -> Self {
        Self {
            store,
            doctext,
            extractor: FieldExtractor::new(),
            engine,
            dedup: Mutex::new(dedup),
        }
    }

    /// Process one inbound document. Returns the ids of invoices stored
    /// (and reconciled) from it.
    pub async fn process(&self, doc: &InboundDocument) -> Result<Vec<Uuid>, PipelineError> {
        {
            let mut dedup = self.dedup.lock().unwrap();
            if dedup.contains(&doc.message_id) {
                info!(message_id = %doc.message_id, "Document already processed, skipping");
                return Ok(Vec::new());
            }
            dedup.insert(&doc.message_id);
        }

        if !detector::is_invoice(&doc.body) {
            info!(
                subject = doc.subject.as_deref().unwrap_or(""),
                "No invoice detected in document body"
            );
            return Ok(Vec::new());
        }

        info!(
            subject = doc.subject.as_deref().unwrap_or(""),
            attachments = doc.attachments.len(),
            "Potential invoice document detected"
        );

        let mut processed = Vec::new();
        for attachment in &doc.attachments {
            let text = self.doctext.extract_text(attachment);
            if !detector::is_invoice(&text) {
                info!(path = %attachment.display(), "Attachment is not an invoice");
                continue;
            }

            let fields = self.extractor.extract(
                &text,
                attachment.to_str(),
                doc.subject.as_deref(),
                doc.sender.as_deref(),
            );

            // Advisory check only — reconciliation re-resolves the PO and
            // owns the error path.
            if let Some(po_number) = fields.purchase_order.as_deref() {
                match self.store.lookup_purchase_order(po_number).await? {
                    Some(po) if po.status == PoStatus::Active => {
                        debug!(po_number, "Purchase order is valid");
                    }
                    Some(_) => warn!(po_number, "Purchase order is inactive"),
                    None => warn!(po_number, "Purchase order is not registered"),
                }
            }

            let Some(new_invoice) = fields.into_new_invoice() else {
                warn!(
                    path = %attachment.display(),
                    "No invoice number extracted; cannot store"
                );
                continue;
            };

            let invoice_number = new_invoice.invoice_number.clone();
            match self.store.insert_invoice(&new_invoice).await? {
                InsertOutcome::Duplicate => {
                    warn!(invoice_number = %invoice_number, "Duplicate invoice, skipping");
                }
                InsertOutcome::Inserted(id) => {
                    let invoice = self
                        .store
                        .get_invoice(id)
                        .await?
                        .ok_or(PipelineError::InvoiceVanished { invoice_id: id })?;
                    self.engine.reconcile(&invoice).await?;
                    processed.push(id);
                }
            }
        }

        Ok(processed)
    }

    /// Rewrite the processed-message set to disk. Called by the polling
    /// loop after each batch; failures are logged, not fatal.
    pub fn persist_dedup(&self) {
        let dedup = self.dedup.lock().unwrap();
        if let Err(e) = dedup.save() {
            warn!(error = %e, "Failed to save processed-message set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    use crate::doctext::PlainTextReader;
    use crate::store::LibSqlBackend;
    use crate::store::model::{InvoiceStatus, NewPurchaseOrder};

    const INVOICE_TEXT: &str = "Invoice # INV100\n\
         Vendor: Acme\n\
         Purchase Order # PO100\n\
         Invoice Date: 03/25/2026\n\
         Total Amount: $500.00\n";

    struct Fixture {
        processor: DocumentProcessor,
        store: Arc<dyn RecordStore>,
        dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        store
            .insert_purchase_order(&NewPurchaseOrder {
                po_number: "PO100".into(),
                vendor_name: "Acme".into(),
                issue_date: "2026-03-20".into(),
                total_amount: dec!(500.00),
                status: crate::store::model::PoStatus::Active,
            })
            .await
            .unwrap();

        let engine = ReconEngine::new(Arc::clone(&store), None, None);
        let dedup = ProcessedSet::load(dir.path().join("processed.json"));
        let processor = DocumentProcessor::new(
            Arc::clone(&store),
            Arc::new(PlainTextReader),
            engine,
            dedup,
        );
        Fixture {
            processor,
            store,
            dir,
        }
    }

    fn write_attachment(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn doc(message_id: &str, body: &str, attachments: Vec<PathBuf>) -> InboundDocument {
        InboundDocument {
            message_id: message_id.into(),
            sender: Some("billing@acme.example.com".into()),
            subject: Some("Invoice attached".into()),
            body: body.into(),
            attachments,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn processes_attachment_end_to_end() {
        let fx = fixture().await;
        let attachment = write_attachment(&fx.dir, "invoice.txt", INVOICE_TEXT);

        let ids = fx
            .processor
            .process(&doc("<msg-1>", INVOICE_TEXT, vec![attachment]))
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        let invoice = fx.store.get_invoice(ids[0]).await.unwrap().unwrap();
        assert_eq!(invoice.invoice_number, "INV100");
        assert_eq!(invoice.status, InvoiceStatus::Validated);
    }

    #[tokio::test]
    async fn same_message_id_is_processed_once() {
        let fx = fixture().await;
        let attachment = write_attachment(&fx.dir, "invoice.txt", INVOICE_TEXT);

        let first = fx
            .processor
            .process(&doc("<msg-1>", INVOICE_TEXT, vec![attachment.clone()]))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = fx
            .processor
            .process(&doc("<msg-1>", INVOICE_TEXT, vec![attachment]))
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn non_invoice_body_short_circuits() {
        let fx = fixture().await;
        let attachment = write_attachment(&fx.dir, "invoice.txt", INVOICE_TEXT);

        let ids = fx
            .processor
            .process(&doc(
                "<msg-2>",
                "Hey, want to grab lunch tomorrow?",
                vec![attachment],
            ))
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn empty_attachment_text_is_not_an_invoice() {
        let fx = fixture().await;
        let attachment = write_attachment(&fx.dir, "scan.pdf", "");

        let ids = fx
            .processor
            .process(&doc("<msg-3>", INVOICE_TEXT, vec![attachment]))
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn duplicate_invoice_number_across_documents_is_rejected() {
        let fx = fixture().await;
        let first = write_attachment(&fx.dir, "a.txt", INVOICE_TEXT);
        let second = write_attachment(&fx.dir, "b.txt", INVOICE_TEXT);

        let ids = fx
            .processor
            .process(&doc("<msg-4>", INVOICE_TEXT, vec![first]))
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        // Different message, same invoice number: rejected by the store,
        // no new invoice.
        let ids = fx
            .processor
            .process(&doc("<msg-5>", INVOICE_TEXT, vec![second]))
            .await
            .unwrap();
        assert!(ids.is_empty());

        let stored = fx
            .store
            .get_invoice_by_number("INV100")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvoiceStatus::Validated);
    }

    #[tokio::test]
    async fn attachment_without_invoice_number_is_skipped() {
        let fx = fixture().await;
        let text = "Statement enclosed.\nTotal Amount: $12.00\nSubtotal: $10.00\nVAT: $2.00\n";
        let attachment = write_attachment(&fx.dir, "statement.txt", text);

        let ids = fx
            .processor
            .process(&doc("<msg-6>", text, vec![attachment]))
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn dedup_set_survives_persist() {
        let fx = fixture().await;
        let attachment = write_attachment(&fx.dir, "invoice.txt", INVOICE_TEXT);
        fx.processor
            .process(&doc("<msg-7>", INVOICE_TEXT, vec![attachment]))
            .await
            .unwrap();
        fx.processor.persist_dedup();

        let reloaded = ProcessedSet::load(fx.dir.path().join("processed.json"));
        assert!(reloaded.contains("<msg-7>"));
    }
}
