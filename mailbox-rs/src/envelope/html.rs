//! HTML to plain text conversion for bodies without a text part

use html2text::render::text_renderer::TrivialDecorator;

/// Wrap width handed to the renderer. Wide enough that paragraphs stay on
/// one line.
const RENDER_WIDTH: usize = 1000;

/// Convert HTML to readable plain text.
///
/// Entities are decoded and markup is dropped without link footnotes or
/// emphasis markers. Runs of blank lines are collapsed to one.
pub fn html_to_text(html: &str) -> String {
    let rendered =
        html2text::from_read_with_decorator(html.as_bytes(), RENDER_WIDTH, TrivialDecorator::new());

    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(rendered.len());
    for line in rendered.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().filter(|l| !l.trim().is_empty()).collect()
    }

    #[test]
    fn test_block_elements_become_lines() {
        let text = html_to_text("<P>First</P><div class=\"x\">Second<BR>Third</div>");
        assert_eq!(lines(&text), vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_named_and_numeric_entities() {
        let text = html_to_text("<p>Caf&eacute; &mdash; today&#8217;s menu &#x263A;</p>");
        assert!(text.contains("Café"));
        assert!(text.contains('\u{2014}'));
        assert!(text.contains("today\u{2019}s"));
        assert!(text.contains('\u{263A}'));
        assert!(!text.contains('&'));
    }

    #[test]
    fn test_markup_dropped_without_decoration() {
        let text = html_to_text(r#"<p>Read <b>this</b> <a href="https://example.com/x">now</a></p>"#);
        assert_eq!(text, "Read this now");
    }

    #[test]
    fn test_no_double_decoding() {
        assert_eq!(html_to_text("<p>&amp;lt;</p>"), "&lt;");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(html_to_text(""), "");
    }
}
