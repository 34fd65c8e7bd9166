use serde::{Deserialize, Serialize};

/// Parsed `List-Unsubscribe` / `List-Unsubscribe-Post` header pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListUnsubscribe {
    /// Raw `List-Unsubscribe` value
    pub header: String,
    /// Valid `mailto:` and `http(s)://` targets, in header order
    pub links: Vec<String>,
    /// Problems found while parsing, empty when the header is well formed
    pub errors: Vec<String>,
    /// Raw `List-Unsubscribe-Post` value
    pub header_post: String,
}

impl ListUnsubscribe {
    /// Parse the header pair. Returns `None` when `List-Unsubscribe` is absent.
    pub fn parse(header: &str, header_post: &str) -> Option<Self> {
        let header = header.trim();
        if header.is_empty() {
            return None;
        }

        let mut result = ListUnsubscribe {
            header: header.to_string(),
            header_post: header_post.trim().to_string(),
            ..Default::default()
        };

        for item in header.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let Some(uri) = item.strip_prefix('<').and_then(|i| i.strip_suffix('>')) else {
                result
                    .errors
                    .push(format!("\"{}\" is not enclosed in angle brackets", item));
                continue;
            };

            let uri = uri.trim();
            let lower = uri.to_ascii_lowercase();
            if lower.starts_with("mailto:") {
                if uri.len() == "mailto:".len() {
                    result.errors.push("empty mailto: address".to_string());
                } else {
                    result.links.push(uri.to_string());
                }
            } else if lower.starts_with("http://") || lower.starts_with("https://") {
                if uri.contains(char::is_whitespace) {
                    result
                        .errors
                        .push(format!("\"{}\" contains whitespace", uri));
                } else {
                    result.links.push(uri.to_string());
                }
            } else {
                result
                    .errors
                    .push(format!("\"{}\" is not a mailto: or http(s) link", uri));
            }
        }

        if !result.header_post.is_empty()
            && !result
                .header_post
                .eq_ignore_ascii_case("List-Unsubscribe=One-Click")
        {
            result.errors.push(format!(
                "unexpected List-Unsubscribe-Post value \"{}\"",
                result.header_post
            ));
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_header() {
        assert!(ListUnsubscribe::parse("", "").is_none());
        assert!(ListUnsubscribe::parse("   ", "List-Unsubscribe=One-Click").is_none());
    }

    #[test]
    fn test_valid_links() {
        let parsed = ListUnsubscribe::parse(
            "<mailto:leave@lists.example.com?subject=unsubscribe>, <https://example.com/u/123>",
            "List-Unsubscribe=One-Click",
        )
        .unwrap();

        assert_eq!(
            parsed.links,
            vec![
                "mailto:leave@lists.example.com?subject=unsubscribe".to_string(),
                "https://example.com/u/123".to_string()
            ]
        );
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.header_post, "List-Unsubscribe=One-Click");
    }

    #[test]
    fn test_errors_are_collected() {
        let parsed = ListUnsubscribe::parse(
            "https://example.com/bare, <ftp://example.com/x>, <mailto:>, <http://ok.example.com>",
            "",
        )
        .unwrap();

        assert_eq!(parsed.links, vec!["http://ok.example.com".to_string()]);
        assert_eq!(parsed.errors.len(), 3);
        assert!(parsed.errors[0].contains("angle brackets"));
    }

    #[test]
    fn test_unexpected_post_value() {
        let parsed = ListUnsubscribe::parse("<https://example.com/u>", "yes please").unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.errors.len(), 1);
    }
}
