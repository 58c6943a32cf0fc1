//! Invoice-likelihood detector — scores raw text for invoice-ness.
//!
//! Pure gate in front of the field extractor. Keeps obviously
//! non-financial documents (newsletters, plain correspondence, empty
//! OCR output) from ever reaching extraction.

use std::sync::LazyLock;

use regex::Regex;

/// Vocabulary of invoice-indicative terms, matched as case-insensitive
/// substrings against the lower-cased text.
static INVOICE_VOCABULARY: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "invoice",
        "bill",
        "receipt",
        "statement",
        "total amount",
        "due date",
        "tax invoice",
        "payment due",
        "charges",
        "order number",
        "balance due",
        "purchase order",
        "vat",
        "gst",
        "invoice number",
        "invoice date",
        "billing date",
        "payment terms",
        "subtotal",
        "total due",
        "amount due",
        "invoice total",
        "account number",
        "customer id",
    ]
});

/// Terms that upgrade a weak two-keyword match to a positive.
static STRONG_TERMS: &[&str] = &["invoice number", "purchase order", "total amount"];

static INVOICE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"invoice\s*#\s*\w+").unwrap());

static TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"total\s*[:$]?\s*\d+").unwrap());

/// Decide whether raw text likely represents an invoice.
///
/// Returns true if any of:
/// - at least 3 distinct vocabulary terms are present;
/// - at least 2 are present and one of them is a strong term
///   ("invoice number" / "purchase order" / "total amount");
/// - an `invoice #<token>` pattern and a `total[:$]<digits>` pattern
///   both match.
///
/// Deterministic, no side effects. Empty text is never an invoice.
pub fn is_invoice(text: &str) -> bool {
    let text_lower = text.to_lowercase();

    let keyword_matches = INVOICE_VOCABULARY
        .iter()
        .filter(|kw| text_lower.contains(*kw))
        .count();

    if keyword_matches >= 3 {
        return true;
    }
    if keyword_matches >= 2 && STRONG_TERMS.iter().any(|t| text_lower.contains(t)) {
        return true;
    }
    INVOICE_NUMBER_RE.is_match(&text_lower) && TOTAL_RE.is_match(&text_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_not_an_invoice() {
        assert!(!is_invoice(""));
    }

    #[test]
    fn fewer_than_two_keywords_is_never_an_invoice() {
        assert!(!is_invoice("Hey, can we reschedule the 3pm meeting?"));
        assert!(!is_invoice("Here is the statement you asked for"));
        assert!(!is_invoice("Please pay the bill"));
    }

    #[test]
    fn three_keywords_is_an_invoice() {
        assert!(is_invoice(
            "Invoice attached. Subtotal and total amount listed below, payment terms net 30."
        ));
    }

    #[test]
    fn two_keywords_need_a_strong_term() {
        // "bill" + "charges" — two weak terms, no strong term.
        assert!(!is_invoice("Your bill includes the following charges."));
        // "charges" + "total amount" — the strong term upgrades the match.
        assert!(is_invoice("Charges are listed; the total amount is below."));
    }

    #[test]
    fn invoice_hash_plus_total_pattern_is_an_invoice() {
        // Only one vocabulary keyword ("invoice"), but both regexes hit.
        assert!(is_invoice("INVOICE # A17 ... Total: 980"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(is_invoice("TAX INVOICE - VAT registration, TOTAL DUE: 50"));
    }

    #[test]
    fn newsletter_is_not_an_invoice() {
        assert!(!is_invoice(
            "Welcome to our weekly newsletter! Click here to unsubscribe."
        ));
    }
}
