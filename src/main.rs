use std::sync::Arc;
use std::sync::atomic::Ordering;

use invoice_assist::channels::{SpoolMailbox, spawn_poller};
use invoice_assist::config::MonitorConfig;
use invoice_assist::dedup::ProcessedSet;
use invoice_assist::doctext::PlainTextReader;
use invoice_assist::notify::{Notifier, SmtpConfig, SmtpNotifier};
use invoice_assist::pipeline::DocumentProcessor;
use invoice_assist::recon::ReconEngine;
use invoice_assist::store::{LibSqlBackend, RecordStore};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Tracing to stderr plus a daily-rotated log file
    let log_dir = std::env::var("INVOICE_LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    let file_appender = tracing_appender::rolling::daily(&log_dir, "invoice-assist.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(file_writer.and(std::io::stderr))
        .with_ansi(false)
        .init();

    let config = MonitorConfig::from_env();

    let db_path = std::env::var("INVOICE_DB_PATH")
        .unwrap_or_else(|_| "./data/invoice-assist.db".to_string());
    let spool_dir = std::env::var("INVOICE_SPOOL_DIR").unwrap_or_else(|_| "./inbox".to_string());

    eprintln!("Invoice Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);
    eprintln!("   Spool:    {}", spool_dir);
    eprintln!("   Download: {}", config.download_dir.display());
    eprintln!(
        "   Approver: {}",
        config.approver_email.as_deref().unwrap_or("(not configured)")
    );

    let store: Arc<dyn RecordStore> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database at {db_path}: {e}"))?,
    );

    let notifier: Option<Arc<dyn Notifier>> = SmtpConfig::from_env()
        .map(|smtp| Arc::new(SmtpNotifier::new(smtp)) as Arc<dyn Notifier>);
    if notifier.is_none() {
        tracing::warn!("SMTP_HOST not set; notifications disabled");
    }

    let engine = ReconEngine::new(
        Arc::clone(&store),
        notifier.clone(),
        config.approver_email.clone(),
    );

    let dedup = ProcessedSet::load(&config.dedup_path);
    let processor = Arc::new(DocumentProcessor::new(
        Arc::clone(&store),
        Arc::new(PlainTextReader),
        engine,
        dedup,
    ));

    let mailbox = Arc::new(SpoolMailbox::new(&spool_dir));

    let (poller, shutdown) = spawn_poller(
        config,
        mailbox,
        Arc::clone(&processor),
        Arc::clone(&store),
        notifier,
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    shutdown.store(true, Ordering::Relaxed);
    processor.persist_dedup();
    poller.abort();

    Ok(())
}
