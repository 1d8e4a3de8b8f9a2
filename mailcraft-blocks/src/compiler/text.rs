//! Escaping for user content placed into markup.

/// Escape text content: `&`, `<` and `>`.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape an attribute value. Quotes are escaped as well as markup characters.
pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Escape text content but leave `{{ ... }}` and `{% ... %}` spans intact, so
/// a later templating pass still sees them.
pub fn escape_text_keeping_templates(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    loop {
        let open = match (rest.find("{{"), rest.find("{%")) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let Some(open) = open else {
            out.push_str(&escape_text(rest));
            return out;
        };
        let close_delim = if rest[open..].starts_with("{{") { "}}" } else { "%}" };
        let Some(close) = rest[open + 2..].find(close_delim) else {
            out.push_str(&escape_text(rest));
            return out;
        };
        let end = open + 2 + close + 2;
        out.push_str(&escape_text(&rest[..open]));
        out.push_str(&rest[open..end]);
        rest = &rest[end..];
    }
}

/// Escape a value substituted by inline templating. Braces become character
/// references so the whole-document pass leaves the value as it is.
pub fn escape_rendered(s: &str) -> String {
    escape_braces(&escape_attr(s))
}

/// Replace braces with character references.
pub fn escape_braces(s: &str) -> String {
    s.replace('{', "&#123;").replace('}', "&#125;")
}

/// Make `s` safe inside `<!-- ... -->`.
pub fn escape_comment(s: &str) -> String {
    s.replace("--", "- -").replace('>', "&gt;")
}
