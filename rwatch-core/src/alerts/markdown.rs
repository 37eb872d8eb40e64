//! Markdown-to-HTML rendering for the email channel.
//!
//! Only inline links (`[text](url)`) are recognised. Everything is
//! HTML-escaped first and links are substituted afterwards, so text in the
//! message can never inject markup.

use regex::Regex;
use std::sync::LazyLock;

const LINK_PATTERN: &str = r"\[(.*?)\]\((.*?)\)";

// Constant pattern; `test_link_pattern_compiles` guards it.
#[allow(clippy::expect_used)]
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(LINK_PATTERN).expect("link pattern is a valid regex"));

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Render a message body as a minimal HTML document.
pub fn markdown_to_html(message: &str) -> String {
    let escaped = escape_html(message);
    let linked = LINK_RE.replace_all(&escaped, r#"<a href="$2">$1</a>"#);
    let body = linked.replace('\n', "<br>");
    format!("<html><body><p>{body}</p></body></html>")
}
