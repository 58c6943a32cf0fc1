//! Mailbox polling loop — fetches raw mail, drives the pipeline, and
//! persists the dedup set after each batch.
//!
//! Single cooperative task: one document at a time, shutdown checked
//! between documents, never mid-document. Transient fetch failures are
//! retried a fixed number of times with a fixed delay; exhausting the
//! retries abandons that poll cycle, not the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::channels::email::{MailboxSource, RawMail, parse_inbound};
use crate::config::MonitorConfig;
use crate::error::ChannelError;
use crate::notify::Notifier;
use crate::pipeline::processor::DocumentProcessor;
use crate::recon::summary::render_summary;
use crate::store::RecordStore;

/// Spawn the background polling task.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop
/// polling after the in-flight document completes.
pub fn spawn_poller(
    config: MonitorConfig,
    mailbox: Arc<dyn MailboxSource>,
    processor: Arc<DocumentProcessor>,
    store: Arc<dyn RecordStore>,
    notifier: Option<Arc<dyn Notifier>>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Mailbox poller started, polling every {}s",
            config.poll_interval.as_secs()
        );

        let mut tick = tokio::time::interval(config.poll_interval);
        let mut last_summary = Utc::now();

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Mailbox poller shutting down");
                return;
            }

            poll_once(&config, &mailbox, &processor, &shutdown).await;

            if let Some(due) = summary_due(&config, last_summary) {
                send_summary(&config, &store, notifier.as_ref(), due).await;
                last_summary = Utc::now();
            }
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle: fetch (with retries) → parse → process →
/// persist the dedup set.
pub async fn poll_once(
    config: &MonitorConfig,
    mailbox: &Arc<dyn MailboxSource>,
    processor: &Arc<DocumentProcessor>,
    shutdown: &AtomicBool,
) {
    let mails = match fetch_with_retry(
        mailbox,
        config.fetch_attempts,
        config.fetch_retry_delay,
    )
    .await
    {
        Ok(mails) => mails,
        Err(e) => {
            error!(error = %e, "Poll cycle abandoned");
            return;
        }
    };

    if mails.is_empty() {
        return;
    }

    info!(count = mails.len(), "Fetched new messages");

    for mail in &mails {
        // Cooperative cancellation between documents only.
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let doc = match parse_inbound(&mail.bytes, &config.download_dir) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable message");
                continue;
            }
        };

        if let Err(e) = processor.process(&doc).await {
            error!(message_id = %doc.message_id, error = %e, "Failed to process document");
        }
    }

    processor.persist_dedup();
}

/// Fetch with a fixed number of attempts and a fixed delay in between.
async fn fetch_with_retry(
    mailbox: &Arc<dyn MailboxSource>,
    attempts: u32,
    delay: std::time::Duration,
) -> Result<Vec<RawMail>, ChannelError> {
    let mut last_reason = String::new();
    for attempt in 1..=attempts.max(1) {
        match mailbox.fetch_new().await {
            Ok(mails) => return Ok(mails),
            Err(e) => {
                warn!(attempt, attempts, error = %e, "Mailbox fetch failed");
                last_reason = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(ChannelError::RetriesExhausted {
        attempts,
        reason: last_reason,
    })
}

/// The summary window to report on, when one is due.
fn summary_due(config: &MonitorConfig, last_summary: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let interval = chrono::Duration::from_std(config.summary_interval).ok()?;
    (Utc::now() - last_summary >= interval).then(Utc::now)
}

/// Build and deliver the period summary. Best-effort.
async fn send_summary(
    config: &MonitorConfig,
    store: &Arc<dyn RecordStore>,
    notifier: Option<&Arc<dyn Notifier>>,
    end: DateTime<Utc>,
) {
    let (Some(notifier), Some(approver)) = (notifier, config.approver_email.as_deref()) else {
        return;
    };

    let window = match chrono::Duration::from_std(config.summary_window) {
        Ok(w) => w,
        Err(_) => return,
    };
    let start = end - window;

    let rows = match store.summary(start, end).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "Failed to build summary rows");
            return;
        }
    };
    if rows.is_empty() {
        info!("No invoice data for summary report");
        return;
    }

    let pending = store.list_requiring_approval().await.unwrap_or_default();
    let report = render_summary(start, end, &rows, &pending);

    if let Err(e) = notifier.send(approver, &report.subject, &report.body, None).await {
        warn!(error = %e, "Failed to send summary report");
    } else {
        info!(approver, "Summary report sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::dedup::ProcessedSet;
    use crate::doctext::PlainTextReader;
    use crate::recon::ReconEngine;
    use crate::store::LibSqlBackend;
    use crate::store::model::{InvoiceStatus, NewPurchaseOrder, PoStatus};

    /// Mailbox that fails a set number of times, then yields its queue.
    struct FlakyMailbox {
        failures_left: Mutex<u32>,
        queue: Mutex<Vec<RawMail>>,
        calls: Mutex<u32>,
    }

    impl FlakyMailbox {
        fn new(failures: u32, mails: Vec<RawMail>) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                queue: Mutex::new(mails),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl MailboxSource for FlakyMailbox {
        async fn fetch_new(&self) -> Result<Vec<RawMail>, ChannelError> {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ChannelError::FetchFailed("connection refused".into()));
            }
            Ok(std::mem::take(&mut *self.queue.lock().unwrap()))
        }
    }

    fn invoice_mail() -> RawMail {
        RawMail {
            bytes: "Message-ID: <poll-1@mail.example>\r\n\
                From: billing@acme.example.com\r\n\
                Subject: Invoice\r\n\
                Content-Type: multipart/mixed; boundary=\"sep\"\r\n\
                \r\n\
                --sep\r\n\
                Content-Type: text/plain\r\n\
                \r\n\
                Invoice # INV300 attached, see total amount and purchase order within.\r\n\
                --sep\r\n\
                Content-Type: text/plain; name=\"invoice.txt\"\r\n\
                Content-Disposition: attachment; filename=\"invoice.txt\"\r\n\
                \r\n\
                Invoice # INV300\r\n\
                Vendor: Acme\r\n\
                Purchase Order # PO300\r\n\
                Total Amount: $75.00\r\n\
                --sep--\r\n"
                .as_bytes()
                .to_vec(),
        }
    }

    async fn test_config_and_processor() -> (MonitorConfig, Arc<DocumentProcessor>, Arc<dyn RecordStore>, tempfile::TempDir)
    {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig {
            download_dir: dir.path().join("invoices"),
            dedup_path: dir.path().join("processed.json"),
            fetch_attempts: 3,
            fetch_retry_delay: Duration::from_millis(1),
            ..Default::default()
        };

        let store: Arc<dyn RecordStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        store
            .insert_purchase_order(&NewPurchaseOrder {
                po_number: "PO300".into(),
                vendor_name: "Acme".into(),
                issue_date: "2026-03-20".into(),
                total_amount: dec!(75.00),
                status: PoStatus::Active,
            })
            .await
            .unwrap();

        let engine = ReconEngine::new(Arc::clone(&store), None, None);
        let processor = Arc::new(DocumentProcessor::new(
            Arc::clone(&store),
            Arc::new(PlainTextReader),
            engine,
            ProcessedSet::load(&config.dedup_path),
        ));
        (config, processor, store, dir)
    }

    #[tokio::test]
    async fn poll_cycle_processes_fetched_mail() {
        let (config, processor, store, _dir) = test_config_and_processor().await;
        let mailbox: Arc<dyn MailboxSource> = Arc::new(FlakyMailbox::new(0, vec![invoice_mail()]));

        poll_once(&config, &mailbox, &processor, &AtomicBool::new(false)).await;

        let invoice = store
            .get_invoice_by_number("INV300")
            .await
            .unwrap()
            .expect("invoice stored from polled mail");
        assert_eq!(invoice.status, InvoiceStatus::Validated);

        // Dedup set was persisted after the batch.
        let reloaded = ProcessedSet::load(&config.dedup_path);
        assert!(reloaded.contains("poll-1@mail.example"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_the_cycle() {
        let (config, processor, store, _dir) = test_config_and_processor().await;
        let mailbox = Arc::new(FlakyMailbox::new(2, vec![invoice_mail()]));
        let source: Arc<dyn MailboxSource> = mailbox.clone();

        poll_once(&config, &source, &processor, &AtomicBool::new(false)).await;

        assert_eq!(*mailbox.calls.lock().unwrap(), 3);
        assert!(
            store
                .get_invoice_by_number("INV300")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn exhausted_retries_abandon_the_cycle() {
        let (config, processor, store, _dir) = test_config_and_processor().await;
        let mailbox = Arc::new(FlakyMailbox::new(10, vec![invoice_mail()]));
        let source: Arc<dyn MailboxSource> = mailbox.clone();

        poll_once(&config, &source, &processor, &AtomicBool::new(false)).await;

        // Three attempts, then the cycle gave up without processing.
        assert_eq!(*mailbox.calls.lock().unwrap(), 3);
        assert!(
            store
                .get_invoice_by_number("INV300")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn shutdown_flag_stops_between_documents() {
        let (config, processor, _store, _dir) = test_config_and_processor().await;
        let mailbox: Arc<dyn MailboxSource> = Arc::new(FlakyMailbox::new(0, vec![invoice_mail()]));

        let shutdown = AtomicBool::new(true);
        poll_once(&config, &mailbox, &processor, &shutdown).await;

        // Fetched but never processed: flag was already set.
        let reloaded = ProcessedSet::load(&config.dedup_path);
        assert!(!reloaded.contains("poll-1@mail.example"));
    }
}
