use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A mailbox address. Either field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub address: String,
}

impl Address {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Address {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name.is_empty(), self.address.is_empty()) {
            (true, _) => write!(f, "{}", self.address),
            (false, true) => write!(f, "{}", self.name),
            (false, false) => write!(f, "{} <{}>", self.name, self.address),
        }
    }
}

/// A non-body MIME part (inline image, attachment, related resource)
#[derive(Debug, Clone, Default)]
pub struct Part {
    /// Position in the MIME tree, e.g. "2" or "1.3"
    pub part_id: String,
    pub filename: String,
    pub content_type: String,
    /// Content-ID without angle brackets
    pub content_id: String,
    /// Lowercased Content-Disposition type, empty when absent
    pub disposition: String,
    /// Decoded content
    pub content: Vec<u8>,
}

impl Part {
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Parts without a filename or content-id cannot be referenced by a client.
    pub fn is_referenceable(&self) -> bool {
        !self.filename.is_empty() || !self.content_id.is_empty()
    }
}

/// Parsed representation of a raw email
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Top-level headers in order: (lowercased name, unfolded raw value)
    pub headers: Vec<(String, String)>,
    /// Decoded subject
    pub subject: String,
    pub from: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Vec<Address>,
    /// Date header, if present and parseable
    pub date: Option<DateTime<Utc>>,
    /// Plain text body (converted from HTML when there is no text part)
    pub text: String,
    pub html: String,
    pub inlines: Vec<Part>,
    pub other_parts: Vec<Part>,
    pub attachments: Vec<Part>,
}

impl Envelope {
    /// First raw value of a header (case-insensitive), or "" when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Canonical sender: first parsed address, else a name-only address
    /// built from the raw header, else `None`.
    pub fn canonical_from(&self) -> Option<Address> {
        if let Some(first) = self.from.first() {
            return Some(first.clone());
        }

        let raw = self.header("From").trim();
        if raw.is_empty() {
            None
        } else {
            Some(Address::new(raw, ""))
        }
    }

    /// Message-ID without surrounding angle brackets
    pub fn message_id(&self) -> String {
        trim_brackets(self.header("Message-ID"))
    }

    /// Search inline parts, then other parts, then attachments.
    pub fn find_part(&self, part_id: &str) -> Option<&Part> {
        self.inlines
            .iter()
            .chain(self.other_parts.iter())
            .chain(self.attachments.iter())
            .find(|p| p.part_id == part_id)
    }
}

pub(crate) fn trim_brackets(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '<' || c == '>')
        .to_string()
}
