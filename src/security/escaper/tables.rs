//! Fixed per-context escape tables.
//!
//! Characters missing from a table pass through unless the context's
//! fallback rule (control characters, CSS non-word characters) applies.

use phf::phf_map;

/// HTML body/attribute escapes (decimal numeric references)
pub static HTML_BASIC: phf::Map<char, &'static str> = phf_map! {
    '&' => "&amp;",
    '<' => "&lt;",
    '>' => "&gt;",
    '"' => "&quot;",
    '\'' => "&#39;",
    '/' => "&#47;",
};

/// Extra HTML escapes applied in advanced mode
pub static HTML_ADVANCED: phf::Map<char, &'static str> = phf_map! {
    '`' => "&#96;",
    '=' => "&#61;",
    '\\' => "&#92;",
    '(' => "&#40;",
    ')' => "&#41;",
    '[' => "&#91;",
    ']' => "&#93;",
    '{' => "&#123;",
    '}' => "&#125;",
};

/// JavaScript string literal escapes
pub static JAVASCRIPT: phf::Map<char, &'static str> = phf_map! {
    '\\' => "\\\\",
    '\'' => "\\'",
    '"' => "\\\"",
    '`' => "\\u0060",
    '\n' => "\\n",
    '\r' => "\\r",
    '\t' => "\\t",
    '\u{8}' => "\\b",
    '\u{c}' => "\\f",
    '\u{b}' => "\\v",
    '\0' => "\\u0000",
    '<' => "\\u003C",
    '>' => "\\u003E",
    '&' => "\\u0026",
    '/' => "\\/",
    '\u{2028}' => "\\u2028",
    '\u{2029}' => "\\u2029",
};

/// CSS string escapes; other non-word ASCII falls back to `\HH `
pub static CSS: phf::Map<char, &'static str> = phf_map! {
    '"' => "\\22 ",
    '\'' => "\\27 ",
    '\\' => "\\5c ",
    '\n' => "\\a ",
    '\r' => "\\d ",
    '\u{c}' => "\\c ",
};

/// XML text/attribute escapes
pub static XML: phf::Map<char, &'static str> = phf_map! {
    '&' => "&amp;",
    '<' => "&lt;",
    '>' => "&gt;",
    '"' => "&quot;",
    '\'' => "&apos;",
};

/// PlantUML label escapes
///
/// Newlines collapse into the `\n` label escape so no user text can start
/// a preprocessor line.
pub static PLANTUML: phf::Map<char, &'static str> = phf_map! {
    '<' => "&#60;",
    '>' => "&#62;",
    '"' => "~\"",
    '@' => "~@",
    '!' => "~!",
    '%' => "~%",
    '[' => "~[",
    ']' => "~]",
    '\n' => "\\n",
    '\r' => "",
};

/// JSON string escapes (HTML-safe)
pub static JSON: phf::Map<char, &'static str> = phf_map! {
    '"' => "\\\"",
    '\\' => "\\\\",
    '\n' => "\\n",
    '\r' => "\\r",
    '\t' => "\\t",
    '\u{8}' => "\\b",
    '\u{c}' => "\\f",
    '<' => "\\u003c",
    '>' => "\\u003e",
    '&' => "\\u0026",
    '\'' => "\\u0027",
    '\u{2028}' => "\\u2028",
    '\u{2029}' => "\\u2029",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_disjoint_html() {
        for key in HTML_ADVANCED.keys() {
            assert!(!HTML_BASIC.contains_key(key));
        }
    }

    #[test]
    fn test_html_uses_decimal_references() {
        assert_eq!(HTML_BASIC.get(&'\''), Some(&"&#39;"));
        assert_eq!(HTML_ADVANCED.get(&'='), Some(&"&#61;"));
    }

    #[test]
    fn test_line_separators_escaped() {
        assert_eq!(JAVASCRIPT.get(&'\u{2028}'), Some(&"\\u2028"));
        assert_eq!(JSON.get(&'\u{2029}'), Some(&"\\u2029"));
    }
}
