use crate::envelope::html::html_to_text;
use crate::envelope::types::{trim_brackets, Address, Envelope, Part};
use crate::error::{MailError, Result};
use chrono::{TimeZone, Utc};
use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use std::collections::HashSet;

/// Envelope parser on top of `mail-parser`
pub struct EnvelopeParser;

impl EnvelopeParser {
    /// Parse a raw email into an [`Envelope`].
    ///
    /// Fails with [`MailError::MalformedInput`] when the input has no header
    /// block at all.
    pub fn parse(raw: &[u8]) -> Result<Envelope> {
        let headers = Self::parse_headers(&Self::header_block(raw));
        if headers.is_empty() {
            return Err(MailError::MalformedInput(
                "no header block found".to_string(),
            ));
        }

        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| MailError::MalformedInput("unparseable message".to_string()))?;

        let subject = message
            .subject()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| header_value(&headers, "subject").trim().to_string());

        let date = message
            .date()
            .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single());

        let html = Self::html_body(&message);
        let mut text = Self::text_body(&message);
        if text.trim().is_empty() && !html.is_empty() {
            text = html_to_text(&html);
        }

        let mut envelope = Envelope {
            subject,
            from: Self::addresses(message.from()),
            to: Self::addresses(message.to()),
            cc: Self::addresses(message.cc()),
            bcc: Self::addresses(message.bcc()),
            reply_to: Self::addresses(message.reply_to()),
            date,
            text,
            html,
            ..Default::default()
        };

        Self::collect_parts(&message, &mut envelope);
        envelope.headers = headers;

        Ok(envelope)
    }

    /// Raw bytes up to the first blank line
    fn header_block(raw: &[u8]) -> String {
        let crlf = find(raw, b"\r\n\r\n");
        let lf = find(raw, b"\n\n");
        let end = match (crlf, lf) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => raw.len(),
        };
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Unfold headers into ordered (lowercased name, value) pairs
    fn parse_headers(headers_str: &str) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        let mut current_header: Option<(String, String)> = None;

        for line in headers_str.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation of previous header (folded header)
                if let Some((_, ref mut value)) = current_header {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            } else if let Some(colon_pos) = line.find(':') {
                if let Some(header) = current_header.take() {
                    headers.push(header);
                }

                let name = line[..colon_pos].trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    continue;
                }
                let value = line[colon_pos + 1..].trim().to_string();
                current_header = Some((name.to_lowercase(), value));
            }
        }

        if let Some(header) = current_header {
            headers.push(header);
        }

        headers
    }

    fn addresses(value: Option<&mail_parser::Address<'_>>) -> Vec<Address> {
        let Some(value) = value else {
            return Vec::new();
        };

        let addrs: Vec<&mail_parser::Addr<'_>> = match value {
            mail_parser::Address::List(list) => list.iter().collect(),
            mail_parser::Address::Group(groups) => {
                groups.iter().flat_map(|g| g.addresses.iter()).collect()
            }
        };

        addrs
            .into_iter()
            .filter_map(|addr| {
                let address = addr.address()?.trim();
                if !address.contains('@') {
                    return None;
                }
                Some(Address::new(addr.name().unwrap_or("").trim(), address))
            })
            .collect()
    }

    fn text_body(message: &Message<'_>) -> String {
        message
            .text_body
            .iter()
            .filter_map(|id| match &message.parts.get(*id)?.body {
                PartType::Text(text) => Some(text.as_ref()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn html_body(message: &Message<'_>) -> String {
        message
            .html_body
            .iter()
            .find_map(|id| match &message.parts.get(*id)?.body {
                PartType::Html(html) => Some(html.to_string()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Sort every non-body leaf part into inlines, other parts or attachments.
    fn collect_parts(message: &Message<'_>, envelope: &mut Envelope) {
        let mut leaves = Vec::new();
        walk_parts(message, 0, "", &mut leaves);

        let body_ids: HashSet<usize> = message
            .text_body
            .iter()
            .chain(message.html_body.iter())
            .copied()
            .filter(|id| {
                matches!(
                    message.parts.get(*id).map(|p| &p.body),
                    Some(PartType::Text(_)) | Some(PartType::Html(_))
                )
            })
            .collect();

        for (part_id, index) in leaves {
            if body_ids.contains(&index) {
                continue;
            }
            let Some(mime_part) = message.parts.get(index) else {
                continue;
            };

            let content_type = mime_part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| default_content_type(&mime_part.body).to_string())
                .to_lowercase();

            let part = Part {
                part_id,
                filename: mime_part.attachment_name().unwrap_or("").trim().to_string(),
                content_type,
                content_id: trim_brackets(mime_part.content_id().unwrap_or("")),
                disposition: mime_part
                    .content_disposition()
                    .map(|d| d.ctype().to_lowercase())
                    .unwrap_or_default(),
                content: mime_part.contents().to_vec(),
            };

            match part.disposition.as_str() {
                "inline" => envelope.inlines.push(part),
                "attachment" => envelope.attachments.push(part),
                _ if !part.content_id.is_empty() => envelope.other_parts.push(part),
                _ => envelope.attachments.push(part),
            }
        }
    }
}

/// Depth-first walk collecting (part id, index) for every leaf part.
fn walk_parts(message: &Message<'_>, index: usize, path: &str, out: &mut Vec<(String, usize)>) {
    let Some(part) = message.parts.get(index) else {
        return;
    };

    match &part.body {
        PartType::Multipart(children) => {
            for (n, child) in children.iter().enumerate() {
                let child_path = if path.is_empty() {
                    (n + 1).to_string()
                } else {
                    format!("{}.{}", path, n + 1)
                };
                walk_parts(message, *child, &child_path, out);
            }
        }
        _ => {
            let id = if path.is_empty() { "0" } else { path };
            out.push((id.to_string(), index));
        }
    }
}

fn default_content_type(body: &PartType<'_>) -> &'static str {
    match body {
        PartType::Text(_) => "text/plain",
        PartType::Html(_) => "text/html",
        PartType::Message(_) => "message/rfc822",
        _ => "application/octet-stream",
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> &'a str {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: Bob <bob@example.com>, carol@example.com\r\n\
Cc: Dave <dave@example.com>\r\n\
Subject: Quarterly report\r\n\
Message-ID: <report-1@example.com>\r\n\
Date: Tue, 1 Oct 2024 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/related; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>See <b>attached</b></p><img src=\"cid:logo@example.com\">\r\n\
--inner\r\n\
Content-Type: image/png\r\n\
Content-ID: <logo@example.com>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer--\r\n";

    #[test]
    fn test_parse_headers_folded() {
        let headers = EnvelopeParser::parse_headers(
            "Subject: This is a very long subject\n that spans multiple lines\nX-Tags: a",
        );

        assert_eq!(
            headers[0],
            (
                "subject".to_string(),
                "This is a very long subject that spans multiple lines".to_string()
            )
        );
        assert_eq!(headers[1], ("x-tags".to_string(), "a".to_string()));
    }

    #[test]
    fn test_header_block_stops_at_blank_line() {
        let block = EnvelopeParser::header_block(b"Subject: Hi\n\nBody: not a header\r\n\r\n");
        assert_eq!(block, "Subject: Hi");
    }

    #[test]
    fn test_parse_simple_text_email() {
        let envelope = EnvelopeParser::parse(
            b"From: sender@example.com\nTo: recipient@example.com\nSubject: Test\n\nHello World",
        )
        .unwrap();

        assert_eq!(envelope.subject, "Test");
        assert_eq!(envelope.from, vec![Address::new("", "sender@example.com")]);
        assert_eq!(envelope.to, vec![Address::new("", "recipient@example.com")]);
        assert_eq!(envelope.text.trim(), "Hello World");
        assert!(envelope.html.is_empty());
        assert!(envelope.date.is_none());
        assert!(envelope.attachments.is_empty());
    }

    #[test]
    fn test_parse_multipart_email() {
        let envelope = EnvelopeParser::parse(MULTIPART).unwrap();

        assert_eq!(envelope.subject, "Quarterly report");
        assert_eq!(envelope.message_id(), "report-1@example.com");
        assert_eq!(envelope.to.len(), 2);
        assert_eq!(envelope.cc, vec![Address::new("Dave", "dave@example.com")]);
        assert_eq!(
            envelope.date.map(|d| d.to_rfc3339()),
            Some("2024-10-01T10:00:00+00:00".to_string())
        );
        assert!(envelope.html.contains("attached"));
        assert!(envelope.text.contains("attached"));

        assert_eq!(envelope.other_parts.len(), 1);
        assert_eq!(envelope.other_parts[0].content_id, "logo@example.com");
        assert_eq!(envelope.other_parts[0].part_id, "1.2");

        assert_eq!(envelope.attachments.len(), 1);
        let pdf = &envelope.attachments[0];
        assert_eq!(pdf.filename, "report.pdf");
        assert_eq!(pdf.content_type, "application/pdf");
        assert_eq!(pdf.part_id, "2");
        assert_eq!(pdf.content, b"%PDF-1.4\n".to_vec());
    }

    #[test]
    fn test_parse_rejects_headerless_input() {
        assert!(matches!(
            EnvelopeParser::parse(b""),
            Err(MailError::MalformedInput(_))
        ));
        assert!(matches!(
            EnvelopeParser::parse(b"just some words\nwithout any header\n"),
            Err(MailError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_unparseable_from_kept_as_raw_header() {
        let envelope =
            EnvelopeParser::parse(b"From: Undisclosed\nSubject: x\n\nbody").unwrap();
        assert_eq!(
            envelope.canonical_from().map(|a| a.name),
            Some("Undisclosed".to_string())
        );
    }
}
