use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::dom::{self, Element};

// Matched against already-escaped text; the markers contain no escapable chars.
static CHORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[ch\](.*?)\[/ch\]").unwrap());
static TAB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[tab\](.*?)\[/tab\]").unwrap());

pub const CHORD_CLASS: &str = "chord";
pub const TAB_CLASS: &str = "tab";

/// Escape every HTML-significant character. Applied to the whole payload
/// before any marker is touched.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 8);
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape first, then swap the recognized marker pairs for spans we emit
/// ourselves. Nothing from the input can reach the output unescaped.
pub fn to_safe_html(raw: &str) -> String {
    let escaped = escape_html(raw);
    let chords = CHORD_RE.replace_all(&escaped, format!(r#"<span class="{CHORD_CLASS}">$1</span>"#));
    TAB_RE
        .replace_all(&chords, format!(r#"<span class="{TAB_CLASS}">$1</span>"#))
        .into_owned()
}

/// Convert a wiki-tab payload into a detached `<pre>` fragment.
/// Anything other than a JSON string is rejected.
pub fn convert(content: &Value) -> Option<Element> {
    let raw = content.as_str()?;
    Some(convert_str(raw))
}

pub fn convert_str(raw: &str) -> Element {
    let mut pre = Element::new("pre");
    pre.children = dom::parse_fragment(&to_safe_html(raw));
    pre
}
