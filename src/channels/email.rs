//! Email channel — parses raw inbound messages into pipeline documents.
//!
//! Mailbox I/O (IMAP, retries over the wire) lives behind the
//! `MailboxSource` trait; this module only consumes raw RFC 822 bytes.
//! Attachments with invoice-bearing extensions are saved to the
//! download directory so the document-to-text collaborator can read
//! them from disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::pipeline::types::InboundDocument;

/// One raw message as fetched from the mailbox.
#[derive(Debug, Clone)]
pub struct RawMail {
    pub bytes: Vec<u8>,
}

/// Mailbox collaborator — yields unseen messages as raw bytes.
///
/// Implementations own all network I/O and are expected to mark
/// returned messages so they are not yielded again.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    async fn fetch_new(&self) -> Result<Vec<RawMail>, ChannelError>;
}

/// Attachment extensions worth running through text extraction.
const INVOICE_ATTACHMENT_EXTS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tiff", "bmp", "txt"];

/// Parse a raw RFC 822 message into an `InboundDocument`, saving
/// invoice-bearing attachments under `download_dir`.
pub fn parse_inbound(raw: &[u8], download_dir: &Path) -> Result<InboundDocument, ChannelError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ChannelError::InvalidMessage("unparseable RFC 822 message".into()))?;

    let message_id = parsed
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string());

    let subject = parsed.subject().map(|s| s.to_string());

    let body = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    let received_at = parse_date(&parsed).unwrap_or_else(Utc::now);

    let mut attachments = Vec::new();
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        let Some(name) = MimeHeaders::attachment_name(part) else {
            continue;
        };
        if !has_invoice_extension(name) {
            debug!(name, "Skipping attachment with non-invoice extension");
            continue;
        }
        match save_attachment(download_dir, name, part.contents()) {
            Ok(path) => {
                info!(path = %path.display(), "Downloaded attachment");
                attachments.push(path);
            }
            Err(e) => {
                error!(name, error = %e, "Attachment download failed");
            }
        }
    }

    Ok(InboundDocument {
        message_id,
        sender,
        subject,
        body,
        attachments,
        received_at,
    })
}

/// Whether the filename carries an extension we run through extraction.
fn has_invoice_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_ascii_lowercase();
            INVOICE_ATTACHMENT_EXTS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Write attachment bytes to the download directory with a timestamp
/// prefix so repeated filenames don't collide.
fn save_attachment(download_dir: &Path, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(download_dir)?;
    // Keep only the final path component of the advertised filename.
    let safe_name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".into());
    let stamped = format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S%f"), safe_name);
    let path = download_dir.join(stamped);
    std::fs::write(&path, contents)?;
    Ok(path)
}

/// Message date as a UTC timestamp, when the header is present.
fn parse_date(parsed: &mail_parser::Message) -> Option<DateTime<Utc>> {
    let d = parsed.date()?;
    let naive = chrono::NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))?
        .and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))?;
    Some(naive.and_utc())
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
