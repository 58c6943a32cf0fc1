//! Field extractor — pulls structured fields out of document text.
//!
//! Each field has an ordered list of pattern rules: a primary pattern
//! tried first, then fallbacks, first successful match wins. Source
//! documents vary enormously in phrasing; single fixed formats would
//! produce unacceptable false-negative rates, so the rule lists are
//! deliberately layered.
//!
//! Extraction never fails. Unmatched fields stay unset.

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::pipeline::types::ExtractedInvoice;
use crate::store::model::Currency;

/// A single extraction rule: a compiled pattern and which capture group
/// carries the field value (0 = the whole match).
struct FieldRule {
    regex: Regex,
    group: usize,
}

impl FieldRule {
    fn new(pattern: &str, group: usize) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            group,
        }
    }
}

/// Ordered rule list for one field, evaluated first-match-wins.
struct FieldRules {
    rules: Vec<FieldRule>,
}

impl FieldRules {
    fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    /// First successful capture across the rule list, trimmed.
    fn first_capture(&self, text: &str) -> Option<String> {
        for rule in &self.rules {
            if let Some(caps) = rule.regex.captures(text) {
                if let Some(m) = caps.get(rule.group) {
                    return Some(m.as_str().trim().to_string());
                }
            }
        }
        None
    }
}

/// Numeric grammar shared by the amount fields: optional thousands
/// separators, at most 2 decimal places.
const NUMBER: &str = r"(\d+(?:,\d{3})*(?:\.\d{2})?)";

/// Date grammar shared by the labeled-date rules: numeric D/M/Y with
/// `-` or `/` separators, or a spelled month form.
const DATE: &str = r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|\w+\s+\d{1,2},?\s+\d{4})";

/// Field extractor with compiled per-field rule lists.
pub struct FieldExtractor {
    invoice_number: FieldRules,
    purchase_order: FieldRules,
    total_amount: FieldRules,
    invoice_date: FieldRules,
    vendor_name: FieldRules,
    due_date: FieldRules,
    tax_amount: FieldRules,
    subtotal: FieldRules,
    currency_code: Regex,
    sender_local_part: Regex,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor {
    /// Build the extractor with the default rule set.
    pub fn new() -> Self {
        Self {
            invoice_number: FieldRules::new(vec![
                FieldRule::new(r"(?i)invoice\s*#\s*(\w+)", 1),
                FieldRule::new(r"(?i)invoice\s*(?:no|number|num)[.:\s]*(\w+[-\w]*)", 1),
            ]),
            purchase_order: FieldRules::new(vec![
                FieldRule::new(r"(?i)purchase\s*order\s*#\s*(\w+)", 1),
                FieldRule::new(r"(?i)(?:po|p\.o\.|purchase\s*order)[.:\s#]*(\w+[-\w]*)", 1),
            ]),
            total_amount: FieldRules::new(vec![
                FieldRule::new(&format!(r"(?i)total\s*amount[.:\s]*[$€£]?\s*{NUMBER}"), 1),
                FieldRule::new(
                    &format!(
                        r"(?i)(?:total|amount\s*due|balance\s*due|grand\s*total)[.:\s]*[$€£]?\s*{NUMBER}"
                    ),
                    1,
                ),
            ]),
            invoice_date: FieldRules::new(vec![
                FieldRule::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b", 0),
                FieldRule::new(
                    &format!(r"(?i)(?:invoice|bill|statement)\s*date[.:\s]*{DATE}"),
                    1,
                ),
            ]),
            vendor_name: FieldRules::new(vec![FieldRule::new(
                r"(?i)(?:vendor|supplier|from|bill\s*from|sold\s*by)[.:\s]*([A-Za-z0-9\s.,&]+?)(?:\n|Inc\.|\bLLC\b|\bLtd\b|\bCorp\.?\b)",
                1,
            )]),
            due_date: FieldRules::new(vec![FieldRule::new(
                &format!(r"(?i)(?:due|payment\s*due|due\s*date)[.:\s]*{DATE}"),
                1,
            )]),
            tax_amount: FieldRules::new(vec![FieldRule::new(
                &format!(r"(?i)(?:tax|vat|gst)[.:\s]*[$€£]?\s*{NUMBER}"),
                1,
            )]),
            subtotal: FieldRules::new(vec![FieldRule::new(
                &format!(r"(?i)(?:subtotal|sub\s*total)[.:\s]*[$€£]?\s*{NUMBER}"),
                1,
            )]),
            currency_code: Regex::new(r"(?i)(?:currency|in)[.:\s]*(USD|EUR|GBP|JPY|CAD|AUD|CHF)")
                .unwrap(),
            sender_local_part: Regex::new(r"([^<@]+)@").unwrap(),
        }
    }

    /// Extract structured invoice fields from document text.
    ///
    /// `email_sender` feeds the vendor-name fallback; `email_subject` is
    /// only logged for traceability.
    pub fn extract(
        &self,
        text: &str,
        file_path: Option<&str>,
        email_subject: Option<&str>,
        email_sender: Option<&str>,
    ) -> ExtractedInvoice {
        debug!(
            subject = email_subject.unwrap_or(""),
            sender = email_sender.unwrap_or(""),
            "Extracting invoice fields"
        );

        let vendor_name = self
            .vendor_name
            .first_capture(text)
            .or_else(|| email_sender.and_then(|s| self.vendor_from_sender(s)));

        ExtractedInvoice {
            invoice_number: self.invoice_number.first_capture(text),
            purchase_order: self.purchase_order.first_capture(text),
            total_amount: self.total_amount.first_capture(text).and_then(parse_amount),
            invoice_date: self.invoice_date.first_capture(text),
            vendor_name,
            due_date: self.due_date.first_capture(text),
            tax_amount: self.tax_amount.first_capture(text).and_then(parse_amount),
            subtotal: self.subtotal.first_capture(text).and_then(parse_amount),
            currency: self.detect_currency(text),
            file_path: file_path.map(String::from),
        }
    }

    /// Explicit 3-letter code takes priority; else infer from the first
    /// matched symbol among $, €, £ (in that order); default USD.
    fn detect_currency(&self, text: &str) -> Currency {
        if let Some(caps) = self.currency_code.captures(text) {
            if let Some(currency) = Currency::from_code(&caps[1]) {
                return currency;
            }
        }
        if text.contains('$') {
            Currency::Usd
        } else if text.contains('€') {
            Currency::Eur
        } else if text.contains('£') {
            Currency::Gbp
        } else {
            Currency::default()
        }
    }

    /// Derive a vendor display name from the sender's local part:
    /// dot-separated tokens, title-cased.
    fn vendor_from_sender(&self, sender: &str) -> Option<String> {
        let caps = self.sender_local_part.captures(sender)?;
        let local = caps[1].replace('.', " ");
        let name = title_case(local.trim());
        if name.is_empty() { None } else { Some(name) }
    }
}

/// Strip thousands separators and parse as a fixed-point decimal.
fn parse_amount(raw: String) -> Option<Decimal> {
    raw.replace(',', "").parse().ok()
}

/// Uppercase the first letter of each whitespace-separated word,
/// lowercase the rest.
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
