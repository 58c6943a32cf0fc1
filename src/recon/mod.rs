//! Reconciliation — PO comparison, approval lifecycle, summaries.

pub mod approval;
pub mod engine;
pub mod summary;

pub use approval::{ApprovalFlow, Decision};
pub use engine::{ReconEngine, ReconOutcome, ReconResult};
