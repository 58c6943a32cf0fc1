//! Error types for Invoice Assist.

use uuid::Uuid;

use crate::store::model::ApprovalStatus;

/// Top-level error type for the monitor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record-store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox/channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Mailbox fetch failed: {0}")]
    FetchFailed(String),

    #[error("Mailbox fetch failed after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound notification errors. Call sites log these and continue —
/// a failed delivery never rolls back a persisted result.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Notifications not configured: {0}")]
    NotConfigured(String),
}

/// Document-pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invoice {invoice_id} vanished mid-reconciliation")]
    InvoiceVanished { invoice_id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Approval decision errors.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("Validation report {report_id} not found")]
    ReportNotFound { report_id: Uuid },

    #[error("Report {report_id} already decided ({current}); decisions are final")]
    AlreadyDecided {
        report_id: Uuid,
        current: ApprovalStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the monitor.
pub type Result<T> = std::result::Result<T, Error>;
