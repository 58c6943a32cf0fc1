//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory attachments are downloaded into.
    pub download_dir: PathBuf,
    /// Path of the persisted processed-message set.
    pub dedup_path: PathBuf,
    /// Mailbox poll interval.
    pub poll_interval: Duration,
    /// Fetch attempts per poll cycle before giving up on the cycle.
    pub fetch_attempts: u32,
    /// Delay between fetch attempts.
    pub fetch_retry_delay: Duration,
    /// How often the period summary is sent to the approver.
    pub summary_interval: Duration,
    /// How far back each summary looks.
    pub summary_window: Duration,
    /// Approver address for discrepancy reports and summaries.
    pub approver_email: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./invoices"),
            dedup_path: PathBuf::from("./data/processed_messages.json"),
            poll_interval: Duration::from_secs(60),
            fetch_attempts: 3,
            fetch_retry_delay: Duration::from_secs(60),
            summary_interval: Duration::from_secs(86_400), // daily
            summary_window: Duration::from_secs(86_400),
            approver_email: None,
        }
    }
}

impl MonitorConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            download_dir: std::env::var("INVOICE_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            dedup_path: std::env::var("INVOICE_PROCESSED_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.dedup_path),
            poll_interval: secs("INVOICE_POLL_INTERVAL_SECS", defaults.poll_interval),
            fetch_attempts: std::env::var("INVOICE_FETCH_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_attempts),
            fetch_retry_delay: secs("INVOICE_FETCH_RETRY_SECS", defaults.fetch_retry_delay),
            summary_interval: secs("INVOICE_SUMMARY_INTERVAL_SECS", defaults.summary_interval),
            summary_window: secs("INVOICE_SUMMARY_WINDOW_SECS", defaults.summary_window),
            approver_email: std::env::var("APPROVER_EMAIL").ok(),
        }
    }
}
