//! small shared helpers

/// Render a string as a JSON-style quoted string
pub(crate) fn render_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a decimal so it reads back as a decimal
///
/// A fractionless f64 formats with a trailing `.0`, otherwise a reparse would
/// hand back an integer.
pub(crate) fn render_decimal(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{d:.1}")
    } else {
        format!("{d}")
    }
}

/// Whether text can appear as an unquoted path segment
pub(crate) fn is_safe_unquoted(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_string_escapes() {
        assert_eq!(render_json_string("a\"b\\c\nd"), r#""a\"b\\c\nd""#);
        assert_eq!(render_json_string(""), r#""""#);
    }

    #[test]
    fn decimals_keep_their_point() {
        assert_eq!(render_decimal(1.5), "1.5");
        assert_eq!(render_decimal(2.0), "2.0");
        assert_eq!(render_decimal(-3.0), "-3.0");
    }

    #[test]
    fn safe_unquoted() {
        assert!(is_safe_unquoted("foo-bar_1"));
        assert!(!is_safe_unquoted(""));
        assert!(!is_safe_unquoted("a.b"));
        assert!(!is_safe_unquoted("a b"));
    }
}
