//! End-to-end reconciliation scenarios: raw mail in, decided invoice out.

use std::sync::Arc;

use rust_decimal_macros::dec;

use invoice_assist::channels::parse_inbound;
use invoice_assist::dedup::ProcessedSet;
use invoice_assist::doctext::PlainTextReader;
use invoice_assist::pipeline::DocumentProcessor;
use invoice_assist::recon::{ApprovalFlow, Decision, ReconEngine};
use invoice_assist::store::model::{
    ApprovalStatus, DiscrepancyField, InvoiceStatus, NewPurchaseOrder, PoStatus,
};
use invoice_assist::store::{LibSqlBackend, RecordStore};

fn raw_invoice_mail(message_id: &str, invoice_number: &str, vendor: &str, amount: &str) -> Vec<u8> {
    format!(
        "Message-ID: <{message_id}>\r\n\
         From: Billing <billing@acme.example.com>\r\n\
         Subject: Invoice {invoice_number}\r\n\
         Content-Type: multipart/mixed; boundary=\"sep\"\r\n\
         \r\n\
         --sep\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         Please find attached invoice {invoice_number}. The total amount\r\n\
         references purchase order PO100.\r\n\
         --sep\r\n\
         Content-Type: text/plain; name=\"{invoice_number}.txt\"\r\n\
         Content-Disposition: attachment; filename=\"{invoice_number}.txt\"\r\n\
         \r\n\
         Invoice # {invoice_number}\r\n\
         Vendor: {vendor}\r\n\
         Purchase Order # PO100\r\n\
         Invoice Date: 03/25/2026\r\n\
         Total Amount: ${amount}\r\n\
         --sep--\r\n"
    )
    .into_bytes()
}

struct Harness {
    store: Arc<dyn RecordStore>,
    processor: DocumentProcessor,
    download_dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let download_dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());

    store
        .insert_purchase_order(&NewPurchaseOrder {
            po_number: "PO100".into(),
            vendor_name: "Acme".into(),
            issue_date: "2026-03-01".into(),
            total_amount: dec!(500.00),
            status: PoStatus::Active,
        })
        .await
        .unwrap();

    let engine = ReconEngine::new(Arc::clone(&store), None, None);
    let dedup = ProcessedSet::load(download_dir.path().join("processed.json"));
    let processor = DocumentProcessor::new(
        Arc::clone(&store),
        Arc::new(PlainTextReader),
        engine,
        dedup,
    );

    Harness {
        store,
        processor,
        download_dir,
    }
}

impl Harness {
    async fn deliver(&self, raw: &[u8]) -> Vec<uuid::Uuid> {
        let doc = parse_inbound(raw, self.download_dir.path()).unwrap();
        self.processor.process(&doc).await.unwrap()
    }
}

#[tokio::test]
async fn clean_invoice_is_validated_and_auto_approved() {
    let h = harness().await;

    let ids = h
        .deliver(&raw_invoice_mail("e2e-1@mail", "INV1", "Acme", "500.00"))
        .await;
    assert_eq!(ids.len(), 1);

    let invoice = h.store.get_invoice(ids[0]).await.unwrap().unwrap();
    assert_eq!(invoice.invoice_number, "INV1");
    assert_eq!(invoice.status, InvoiceStatus::Validated);
    assert_eq!(invoice.total_amount, Some(dec!(500.00)));
    assert_eq!(
        invoice.validation_result.as_deref(),
        Some("Invoice matches purchase order")
    );

    // Clean run: nothing awaits approval.
    assert!(h.store.list_requiring_approval().await.unwrap().is_empty());

    // The latest report for the invoice is auto-approved.
    let rows = h
        .store
        .summary(
            chrono::Utc::now() - chrono::Duration::days(1),
            chrono::Utc::now() + chrono::Duration::days(1),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].approval_status, Some(ApprovalStatus::AutoApproved));
}

#[tokio::test]
async fn mismatched_invoice_requires_approval_with_both_discrepancies() {
    let h = harness().await;

    let ids = h
        .deliver(&raw_invoice_mail("e2e-2@mail", "INV2", "Acme Inc", "540.00"))
        .await;
    assert_eq!(ids.len(), 1);

    let invoice = h.store.get_invoice(ids[0]).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::DiscrepanciesFound);

    let pending = h.store.list_requiring_approval().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].invoice_number, "INV2");

    let report = h
        .store
        .get_report(pending[0].report_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.approval_status, ApprovalStatus::RequiresApproval);
    assert_eq!(report.discrepancies.len(), 2);

    let vendor = report
        .discrepancies
        .iter()
        .find(|d| d.field == DiscrepancyField::VendorName)
        .expect("vendor discrepancy");
    assert_eq!(vendor.po_value, "Acme");
    assert_eq!(vendor.invoice_value, "Acme Inc");

    let amount = report
        .discrepancies
        .iter()
        .find(|d| d.field == DiscrepancyField::TotalAmount)
        .expect("amount discrepancy");
    assert_eq!(amount.difference, Some(dec!(40.00)));

    assert!(report.report_content.contains("Invoice Number: INV2"));
    assert!(report.report_content.contains("Purchase Order: PO100"));
}

#[tokio::test]
async fn approver_decision_completes_the_lifecycle() {
    let h = harness().await;
    h.deliver(&raw_invoice_mail("e2e-3@mail", "INV2", "Acme Inc", "540.00"))
        .await;

    let pending = h.store.list_requiring_approval().await.unwrap();
    let report_id = pending[0].report_id;

    let flow = ApprovalFlow::new(Arc::clone(&h.store));
    flow.decide(report_id, Decision::Approved, Some("Verified with the vendor"))
        .await
        .unwrap();

    let invoice = h
        .store
        .get_invoice_by_number("INV2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Approved);

    // Decided reports leave the pending queue.
    assert!(h.store.list_requiring_approval().await.unwrap().is_empty());

    // Decisions are final: a second, conflicting decision is refused.
    let err = flow.decide(report_id, Decision::Rejected, None).await;
    assert!(err.is_err());
    let report = h.store.get_report(report_id).await.unwrap().unwrap();
    assert_eq!(report.approval_status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn redelivered_message_and_reused_invoice_number_are_both_idempotent() {
    let h = harness().await;

    let first = h
        .deliver(&raw_invoice_mail("e2e-4@mail", "INV1", "Acme", "500.00"))
        .await;
    assert_eq!(first.len(), 1);

    // Same message id redelivered: dropped by the message-level dedup.
    let redelivered = h
        .deliver(&raw_invoice_mail("e2e-4@mail", "INV1", "Acme", "500.00"))
        .await;
    assert!(redelivered.is_empty());

    // Different message, same invoice number: rejected by the store's
    // uniqueness constraint, no second row and no second report.
    let reused = h
        .deliver(&raw_invoice_mail("e2e-5@mail", "INV1", "Acme", "999.00"))
        .await;
    assert!(reused.is_empty());

    let stored = h
        .store
        .get_invoice_by_number("INV1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_amount, Some(dec!(500.00)));
    assert_eq!(stored.status, InvoiceStatus::Validated);
}

#[tokio::test]
async fn unregistered_purchase_order_marks_the_invoice_errored() {
    let h = harness().await;

    let raw = format!(
        "Message-ID: <e2e-6@mail>\r\n\
         From: billing@unknown.example.com\r\n\
         Subject: Invoice INV9\r\n\
         Content-Type: multipart/mixed; boundary=\"sep\"\r\n\
         \r\n\
         --sep\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         Invoice INV9 attached; total amount billed against purchase order PO999.\r\n\
         --sep\r\n\
         Content-Type: text/plain; name=\"inv9.txt\"\r\n\
         Content-Disposition: attachment; filename=\"inv9.txt\"\r\n\
         \r\n\
         Invoice # INV9\r\n\
         Vendor: Nowhere Goods\r\n\
         Purchase Order # PO999\r\n\
         Total Amount: $10.00\r\n\
         --sep--\r\n"
    );
    let ids = h.deliver(raw.as_bytes()).await;
    assert_eq!(ids.len(), 1);

    let invoice = h.store.get_invoice(ids[0]).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Error);
    assert_eq!(
        invoice.validation_result.as_deref(),
        Some("Purchase order not found")
    );

    // No comparison report was created for the errored run.
    assert!(h.store.list_requiring_approval().await.unwrap().is_empty());
}
