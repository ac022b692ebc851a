#![forbid(unsafe_code)]

//! Character escaping for canonical output.
//!
//! - Text nodes: `&`, `<`, `>` and carriage return
//! - Attribute values: `&`, `<`, `"`, tab, newline and carriage return
//! - PI data: carriage return only

fn escape_with(s: &str, replace: impl Fn(char) -> Option<&'static str>) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match replace(ch) {
            Some(entity) => out.push_str(entity),
            None => out.push(ch),
        }
    }
    out
}

/// Escape text node content.
pub fn escape_text(s: &str) -> String {
    escape_with(s, |ch| match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '\r' => Some("&#xD;"),
        _ => None,
    })
}

/// Escape an attribute value.
pub fn escape_attr(s: &str) -> String {
    escape_with(s, |ch| match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '"' => Some("&quot;"),
        '\t' => Some("&#x9;"),
        '\n' => Some("&#xA;"),
        '\r' => Some("&#xD;"),
        _ => None,
    })
}

/// Escape processing instruction data.
pub fn escape_pi(s: &str) -> String {
    escape_with(s, |ch| (ch == '\r').then_some("&#xD;"))
}
