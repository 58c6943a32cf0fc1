//! Document processing pipeline.
//!
//! Every inbound document flows through:
//! 1. `detector::is_invoice()` — fast vocabulary gate (no extraction)
//! 2. `FieldExtractor::extract()` — ordered pattern rules per field
//! 3. `DocumentProcessor` — store writes and reconciliation

pub mod detector;
pub mod extractor;
pub mod processor;
pub mod types;

pub use extractor::FieldExtractor;
pub use processor::DocumentProcessor;
pub use types::{ExtractedInvoice, InboundDocument};
