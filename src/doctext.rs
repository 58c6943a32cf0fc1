//! Document-to-text boundary.
//!
//! OCR and PDF-page rasterization live outside this crate; the pipeline
//! only consumes their output through this trait. Total failure is an
//! empty string — the detector then treats the document as "not an
//! invoice" instead of erroring.

use std::path::Path;

/// Extracts plain text from a document file on disk.
pub trait DocumentText: Send + Sync {
    /// Best-effort text extraction. Empty string on any failure.
    fn extract_text(&self, path: &Path) -> String;
}

/// Reads UTF-8 text files directly; anything else yields empty text.
///
/// The production OCR/PDF collaborator plugs in behind the same trait.
#[derive(Debug, Default)]
pub struct PlainTextReader;

impl DocumentText for PlainTextReader {
    fn extract_text(&self, path: &Path) -> String {
        match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No text extracted from file");
                String::new()
            }
        }
    }
}
