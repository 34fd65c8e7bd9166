//! Fields derived once, at ingestion time

use crate::envelope::html::html_to_text;
use crate::envelope::Envelope;

const SNIPPET_LENGTH: usize = 200;

/// Lowercased, whitespace-collapsed text that free-text search runs against.
pub fn search_text(envelope: &Envelope) -> String {
    let mut parts: Vec<String> = Vec::new();

    for header in ["From", "Subject", "To", "Cc", "Bcc", "Reply-To", "Return-Path"] {
        let value = envelope.header(header);
        if !value.is_empty() {
            parts.push(value.to_string());
        }
    }
    // decoded subject as well, the raw header may be encoded-word
    if !envelope.subject.is_empty() {
        parts.push(envelope.subject.clone());
    }
    for address in envelope
        .from
        .iter()
        .chain(&envelope.to)
        .chain(&envelope.cc)
        .chain(&envelope.bcc)
        .chain(&envelope.reply_to)
    {
        parts.push(address.to_string());
    }

    if !envelope.text.trim().is_empty() {
        parts.push(envelope.text.clone());
    } else if !envelope.html.is_empty() {
        parts.push(html_to_text(&envelope.html));
    }

    for part in envelope.attachments.iter().chain(&envelope.inlines) {
        if !part.filename.is_empty() {
            parts.push(part.filename.clone());
        }
    }

    collapse_whitespace(&parts.join(" ")).to_lowercase()
}

/// Short plain-text preview. HTML is preferred over the text part.
pub fn snippet(envelope: &Envelope) -> String {
    let source = if !envelope.html.trim().is_empty() {
        html_to_text(&envelope.html)
    } else {
        envelope.text.clone()
    };

    let collapsed = collapse_whitespace(&source);
    if collapsed.chars().count() <= SNIPPET_LENGTH {
        return collapsed;
    }

    let truncated: String = collapsed.chars().take(SNIPPET_LENGTH).collect();
    format!("{}...", truncated.trim_end())
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Address, Part};

    fn envelope() -> Envelope {
        Envelope {
            headers: vec![
                ("from".to_string(), "Alice <alice@example.com>".to_string()),
                ("subject".to_string(), "Quarterly   Report".to_string()),
            ],
            subject: "Quarterly   Report".to_string(),
            from: vec![Address::new("Alice", "alice@example.com")],
            to: vec![Address::new("", "bob@example.com")],
            text: "Numbers\n\tare  UP".to_string(),
            attachments: vec![Part {
                part_id: "2".to_string(),
                filename: "Q3.pdf".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_search_text_flattens_fields() {
        let text = search_text(&envelope());
        assert!(text.contains("alice <alice@example.com>"));
        assert!(text.contains("quarterly report"));
        assert!(text.contains("bob@example.com"));
        assert!(text.contains("numbers are up"));
        assert!(text.contains("q3.pdf"));
        assert!(!text.contains("  "));
        assert_eq!(text, text.to_lowercase());
    }

    #[test]
    fn test_search_text_uses_html_without_text() {
        let mut env = envelope();
        env.text.clear();
        env.html = "<p>Hello <b>World</b></p>".to_string();
        assert!(search_text(&env).contains("hello world"));
    }

    #[test]
    fn test_snippet_prefers_html() {
        let mut env = envelope();
        env.html = "<div>From   the <i>HTML</i> part</div>".to_string();
        assert_eq!(snippet(&env), "From the HTML part");

        env.html.clear();
        assert_eq!(snippet(&env), "Numbers are UP");
    }

    #[test]
    fn test_snippet_truncated() {
        let mut env = envelope();
        env.text = "word ".repeat(100);
        let snippet = snippet(&env);
        assert!(snippet.ends_with("..."));
        assert!(snippet.chars().count() <= SNIPPET_LENGTH + 3);
    }
}
